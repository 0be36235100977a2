//! Application Bootstrap
//!
//! Provides a high-level API for building applications whose modules hook
//! into the lifecycle stages.

use super::{
    shutdown, LifecycleManager, Owner, OwnerToken, Result, ShutdownHandler, StageRegistry,
};
use crate::config::Config;
use crate::error::BootstageError;
use crate::module::Module;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration key holding the application name
pub const APP_NAME: &str = "appName";

/// Configuration key holding the application root directory
pub const APP_DIR: &str = "appDir";

/// A running application and the owner of its lifecycle stages
///
/// `Application` is a cheap handle; clones share the same configuration,
/// stages and execution history. Every initializer receives a clone.
///
/// # Example
///
/// ```rust,ignore
/// use bootstage::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> ExitCode {
///     let app = Application::builder()
///         .app_name("inventory")
///         .module(DatabaseModule)
///         .module(HttpModule)
///         .build()
///         .expect("Failed to build application");
///
///     if app.start().await.is_err() {
///         let _ = app.shutdown().await;
///         return ExitCode::FAILURE;
///     }
///
///     app.shutdown_handler().wait_for_shutdown().await
/// }
/// ```
#[derive(Clone)]
pub struct Application {
    inner: Arc<ApplicationInner>,
}

struct ApplicationInner {
    token: OwnerToken,
    name: String,
    config: Config,
    lifecycle: LifecycleManager<Application>,
}

impl Application {
    /// Create a new application builder
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Create an application from a configuration with the default stages
    ///
    /// # Errors
    ///
    /// Returns [`BootstageError::MissingConfiguration`] if `appName` is not
    /// set.
    pub fn new(config: Config) -> crate::Result<Self> {
        Self::builder().config(config).build()
    }

    /// The `appName` this application was built with
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The application root directory (`appDir`)
    pub fn app_dir(&self) -> PathBuf {
        self.inner
            .config
            .get_str(APP_DIR)
            .map(PathBuf::from)
            .unwrap_or_default()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Stage registry; use `up`/`down` to add initializers
    pub fn stages(&self) -> &StageRegistry<Application> {
        self.inner.lifecycle.stages()
    }

    /// Get a reference to the lifecycle manager
    pub fn lifecycle(&self) -> &LifecycleManager<Application> {
        &self.inner.lifecycle
    }

    /// Run only the bootstrap stage
    pub async fn bootstrap(&self) -> Result<()> {
        self.inner.lifecycle.bootstrap(self).await
    }

    /// Run the stages up to, but not including, `starting`
    ///
    /// Used for consoles and task runners that need connections but must not
    /// bind services to ports.
    pub async fn initialize(&self) -> Result<()> {
        self.inner.lifecycle.initialize(self).await
    }

    /// Run all stages up to and including `running`
    pub async fn start(&self) -> Result<()> {
        self.inner.lifecycle.start(self).await
    }

    /// Run the teardowns for every stage that has run
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.lifecycle.shutdown(self).await
    }

    /// Stage names whose setup has completed, in execution order
    pub fn executed_stages(&self) -> Vec<String> {
        self.inner.lifecycle.executed_stages()
    }

    /// Create a shutdown handler for graceful shutdown
    pub fn shutdown_handler(&self) -> ShutdownHandler {
        ShutdownHandler::new(self.clone())
    }

    /// Spawn a background task that waits for shutdown signals
    /// and performs graceful shutdown automatically.
    ///
    /// Returns a handle that resolves to the shutdown's exit code.
    pub fn spawn_shutdown_handler(&self) -> tokio::task::JoinHandle<std::process::ExitCode> {
        let shutdown_handler = self.shutdown_handler();
        tokio::spawn(async move { shutdown_handler.wait_for_shutdown().await })
    }
}

impl Owner for Application {
    fn owner_token(&self) -> OwnerToken {
        self.inner.token
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.inner.name)
            .field("token", &self.inner.token)
            .field("executed", &self.executed_stages())
            .finish()
    }
}

/// Builder for Application
pub struct ApplicationBuilder {
    config: Config,
    stages: Option<(Vec<String>, String)>,
    modules: Vec<Box<dyn Module>>,
    exit_on_signal: bool,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    /// Create a new application builder
    pub fn new() -> Self {
        Self {
            config: Config::new(),
            stages: None,
            modules: Vec::new(),
            exit_on_signal: false,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Deep-merge values into the configuration
    pub fn merge(self, values: Value) -> Self {
        self.config.merge(values);
        self
    }

    /// Set `appName`
    pub fn app_name(self, name: impl Into<String>) -> Self {
        self.config.set(APP_NAME, Value::String(name.into()));
        self
    }

    /// Set `appDir`
    pub fn app_dir(self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_string_lossy().into_owned();
        self.config.set(APP_DIR, Value::String(dir));
        self
    }

    /// Use a custom stage order instead of the default five stages
    pub fn stages<I, S>(mut self, order: I, boundary: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order = order.into_iter().map(Into::into).collect();
        self.stages = Some((order, boundary.into()));
        self
    }

    /// Add a module whose initializers are registered during `build`
    pub fn module<M: Module + 'static>(mut self, module: M) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Shut down and exit the process when SIGINT, SIGTERM or SIGHUP arrives
    ///
    /// Installs the `app.shutdownHandlers` initializer in the first stage.
    pub fn exit_on_signal(mut self) -> Self {
        self.exit_on_signal = true;
        self
    }

    /// Validate the configuration and register every module
    ///
    /// # Errors
    ///
    /// Returns an error if `appName` is missing, the stage order is invalid,
    /// or a module fails to register.
    pub fn build(self) -> crate::Result<Application> {
        let config = self.config;

        let name = configured_name(&config).ok_or_else(|| BootstageError::missing(APP_NAME))?;

        if config.get(APP_DIR).is_none() {
            let cwd = std::env::current_dir()?;
            config.set(APP_DIR, Value::String(cwd.to_string_lossy().into_owned()));
        }

        let registry = match self.stages {
            Some((order, boundary)) => StageRegistry::with_stages(order, &boundary)?,
            None => StageRegistry::new(),
        };

        let app = Application {
            inner: Arc::new(ApplicationInner {
                token: OwnerToken::new(),
                lifecycle: LifecycleManager::new(name.clone(), registry),
                name,
                config,
            }),
        };

        if self.exit_on_signal {
            shutdown::install(app.stages())?;
        }

        for module in &self.modules {
            tracing::debug!(module = module.name(), "Registering module");
            module.register(app.stages())?;
        }

        tracing::debug!(app = %app.name(), "Application built");
        Ok(app)
    }
}

/// `appName` when set to something other than `""`, `0` or `false`
fn configured_name(config: &Config) -> Option<String> {
    match config.get(APP_NAME)? {
        Value::String(name) if !name.is_empty() => Some(name),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some(true.to_string()),
        _ => None,
    }
}
