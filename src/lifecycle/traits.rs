//! Owner identity and component hooks
//!
//! Every stage execution happens on behalf of an *owner*. The owner is handed
//! to each initializer handler, and its token is what a [`Stage`] records in
//! its idempotency ledger.
//!
//! [`Stage`]: super::Stage

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of an owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerToken(Uuid);

impl OwnerToken {
    /// Mint a fresh, unique token
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OwnerToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The context a stage executes for
///
/// Implementors are cheap handles (usually an `Arc` inside) because every
/// handler receives its own clone.
pub trait Owner: Clone + Send + Sync + 'static {
    /// Identity used for idempotency tracking
    fn owner_token(&self) -> OwnerToken;
}

impl Owner for OwnerToken {
    fn owner_token(&self) -> OwnerToken {
        *self
    }
}

/// A service that brings itself up in one stage and tears itself down in the
/// matching teardown stage
///
/// # Example
///
/// ```rust,ignore
/// use bootstage::prelude::*;
///
/// struct Database { pool: tokio::sync::RwLock<Option<Pool>> }
///
/// #[async_trait]
/// impl Component<Application> for Database {
///     async fn setup(&self, app: Application) -> anyhow::Result<()> {
///         let url = app.config().get_str("database.url").unwrap_or_default();
///         *self.pool.write().await = Some(Pool::connect(&url).await?);
///         Ok(())
///     }
///
///     async fn teardown(&self, _app: Application) -> anyhow::Result<()> {
///         if let Some(pool) = self.pool.write().await.take() {
///             pool.close().await;
///         }
///         Ok(())
///     }
/// }
///
/// app.stages().component("connections", "database", Arc::new(db))?;
/// ```
#[async_trait]
pub trait Component<C: Owner>: Send + Sync + 'static {
    /// Called when the stage's setup runs
    async fn setup(&self, owner: C) -> anyhow::Result<()>;

    /// Called when the stage's teardown runs
    async fn teardown(&self, _owner: C) -> anyhow::Result<()> {
        Ok(())
    }
}
