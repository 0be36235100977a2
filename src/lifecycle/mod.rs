//! Lifecycle Stages Module
//!
//! This module runs application startup and shutdown as a fixed sequence of
//! named stages. Modules register initializers into a stage's setup or
//! teardown half; inside a stage, initializers are ordered by their
//! `before`/`after` constraints.
//!
//! # Lifecycle Phases
//!
//! ```text
//! |<------- initialize() ------->|
//! |<----------------------- start() ---------------------->|
//! bootstrap → initialize → connections → starting → running
//!
//! shutdown(): teardown of the stages that ran, newest first
//! running → starting → connections → initialize → bootstrap
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use bootstage::lifecycle::{Application, InitializerOptions};
//!
//! let app = Application::builder().app_name("orders").build()?;
//!
//! app.stages().up("connections")?.initializer(
//!     "db.connect",
//!     InitializerOptions::new().before("cache.connect"),
//!     |app: Application| async move {
//!         tracing::info!("Connecting to {}", app.config().get_str("db.url").unwrap_or_default());
//!         Ok(())
//!     },
//! );
//!
//! app.stages().down("connections")?.initializer_sync(
//!     "db.disconnect",
//!     InitializerOptions::new(),
//!     |_app| Ok(()),
//! );
//!
//! app.start().await?;
//! app.shutdown().await?;
//! ```

mod application;
mod error;
mod initializer;
mod manager;
mod registry;
mod shutdown;
mod stage;
mod traits;

pub use application::{Application, ApplicationBuilder, APP_DIR, APP_NAME};
pub use error::{HandlerError, LifecycleError, Result};
pub use initializer::{Handler, Initializer, InitializerOptions};
pub use manager::{ExecutionRecord, LifecycleManager};
pub use registry::{Phase, StagePair, StageRegistry, DEFAULT_BOUNDARY, DEFAULT_STAGES};
pub use shutdown::{exit_code, exit_status, shutdown_signal, ShutdownHandler, SHUTDOWN_HANDLERS};
pub use stage::Stage;
pub use traits::{Component, Owner, OwnerToken};
