use crate::lifecycle::{Application, Result, StageRegistry};

/// Trait for application modules
///
/// A module hooks its initializers into the lifecycle stages. Modules are
/// handed to [`ApplicationBuilder::module`](crate::lifecycle::ApplicationBuilder::module)
/// and registered while the application is built, before any stage runs.
///
/// # Example
/// ```rust,ignore
/// use bootstage::prelude::*;
///
/// pub struct CacheModule;
///
/// impl Module for CacheModule {
///     fn register(&self, stages: &StageRegistry<Application>) -> Result<(), LifecycleError> {
///         stages.up("connections")?.initializer_sync(
///             "cache.connect",
///             InitializerOptions::new().after("db.connect"),
///             |_app| Ok(()),
///         );
///         stages.down("connections")?.initializer_sync(
///             "cache.disconnect",
///             InitializerOptions::new(),
///             |_app| Ok(()),
///         );
///         Ok(())
///     }
/// }
/// ```
pub trait Module: Send + Sync {
    /// Register this module's initializers
    fn register(&self, stages: &StageRegistry<Application>) -> Result<()>;

    /// Name used in log output
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
