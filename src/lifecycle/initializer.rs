//! Initializers: named units of work registered into a stage

use futures_util::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

/// Type-erased initializer body
///
/// Synchronous and asynchronous handlers are both stored in this shape so the
/// stage can await every one of them the same way.
pub type Handler<C> = Arc<dyn Fn(C) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Ordering constraints for an initializer
///
/// Both names refer to other initializers in the same stage. They are not
/// checked when registering; a name nobody registers still anchors ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitializerOptions {
    pub before: Option<String>,
    pub after: Option<String>,
}

impl InitializerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run ahead of the named initializer
    pub fn before(mut self, name: impl Into<String>) -> Self {
        self.before = Some(name.into());
        self
    }

    /// Run after the named initializer
    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.after = Some(name.into());
        self
    }
}

/// A single named unit of work
///
/// Immutable once created; a stage replaces the whole initializer when the
/// same name is registered again.
pub struct Initializer<C> {
    name: String,
    options: InitializerOptions,
    handler: Handler<C>,
    location: &'static Location<'static>,
}

impl<C: Send + 'static> Initializer<C> {
    /// Create an initializer from an async handler
    #[track_caller]
    pub fn new<F, Fut>(name: impl Into<String>, options: InitializerOptions, handler: F) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            options,
            handler: Arc::new(move |owner| handler(owner).boxed()),
            location: Location::caller(),
        }
    }

    /// Create an initializer from a handler that finishes synchronously
    #[track_caller]
    pub fn new_sync<F>(name: impl Into<String>, options: InitializerOptions, handler: F) -> Self
    where
        F: Fn(C) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            options,
            handler: Arc::new(move |owner| futures_util::future::ready(handler(owner)).boxed()),
            location: Location::caller(),
        }
    }
}

impl<C> Initializer<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn before(&self) -> Option<&str> {
        self.options.before.as_deref()
    }

    pub fn after(&self) -> Option<&str> {
        self.options.after.as_deref()
    }

    pub fn options(&self) -> &InitializerOptions {
        &self.options
    }

    pub fn handler(&self) -> &Handler<C> {
        &self.handler
    }

    /// Source location of the registration call
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl<C> fmt::Debug for Initializer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Initializer")
            .field("name", &self.name)
            .field("before", &self.options.before)
            .field("after", &self.options.after)
            .field("location", &format_args!("{}", self.location))
            .finish()
    }
}
