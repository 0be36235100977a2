//! # Bootstage
//!
//! Staged startup and shutdown for long-running Rust services.
//!
//! An application moves through a fixed sequence of named stages
//! (`bootstrap`, `initialize`, `connections`, `starting`, `running` by
//! default). Modules register named initializers into the setup or teardown
//! half of a stage and constrain their order with `before`/`after`. Shutdown
//! tears down, in reverse, only the stages that actually ran.
//!
//! ## Features
//!
//! - **Ordered initializers**: `before`/`after` constraints resolved per stage,
//!   with cycle detection
//! - **Idempotent execution**: a stage runs at most once per owning application
//! - **Partial unwinding**: a failed start is torn down from the last completed stage
//! - **Layered configuration**: JSON values, deep merges and environment overlays
//! - **Commands**: `server`, `console` and `initializers` entry points built on clap
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bootstage::prelude::*;
//!
//! struct Database;
//!
//! impl Module for Database {
//!     fn register(&self, stages: &StageRegistry<Application>) -> Result<(), LifecycleError> {
//!         stages.up("connections")?.initializer(
//!             "db.connect",
//!             InitializerOptions::new(),
//!             |app: Application| async move {
//!                 tracing::info!(app = app.name(), "Connecting");
//!                 Ok(())
//!             },
//!         );
//!         stages.down("connections")?.initializer_sync(
//!             "db.disconnect",
//!             InitializerOptions::new(),
//!             |_app| Ok(()),
//!         );
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> ExitCode {
//!     let app = match Application::builder()
//!         .app_name("orders")
//!         .module(Database)
//!         .build()
//!     {
//!         Ok(app) => app,
//!         Err(_) => return ExitCode::FAILURE,
//!     };
//!
//!     command::server(&app, shutdown_signal()).await
//! }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod module;

// Re-export core types
pub use config::Config;
pub use error::{BootstageError, Result};
pub use lifecycle::{Application, ApplicationBuilder, LifecycleError};
pub use module::Module;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use bootstage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::command::{self, Cli, Command};
    pub use crate::config::Config;
    pub use crate::error::{BootstageError, Result};
    pub use crate::lifecycle::{
        Application, ApplicationBuilder, Component, InitializerOptions, LifecycleError,
        LifecycleManager, Owner, OwnerToken, Phase, ShutdownHandler, Stage, StageRegistry,
        shutdown_signal,
    };
    pub use crate::module::Module;
    pub use async_trait::async_trait;
    pub use std::process::ExitCode;
    pub use std::sync::Arc;
}
