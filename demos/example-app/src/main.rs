use bootstage::prelude::*;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod modules;

use modules::database::DatabaseModule;
use modules::http::HttpModule;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config = Config::from_value(json!({
        "appName": "example-app",
        "environment": "development",
        "database": { "url": "memory://example", "poolSize": 4 },
        "http": { "host": "127.0.0.1", "port": 3000 }
    }));
    config.merge_env("EXAMPLE_APP");

    let app = match Application::builder()
        .config(config)
        .module(DatabaseModule)
        .module(HttpModule)
        .build()
    {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Failed to build application: {}", e);
            return ExitCode::FAILURE;
        }
    };

    command::run(&app, cli.command).await
}
