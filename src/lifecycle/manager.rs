//! Lifecycle Manager
//!
//! Sequences stages forward on start and unwinds them on shutdown.

use super::{LifecycleError, Owner, Phase, Result, StageRegistry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OnceCell};

/// One stage whose setup completed for the owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    pub stage: String,
    pub completed_at: DateTime<Utc>,
}

/// Runs the stages of a [`StageRegistry`] for a single owner
///
/// The manager is responsible for:
/// - Running setup stages in declared order (`bootstrap`, `initialize`, `start`)
/// - Recording which stages actually ran
/// - Tearing down exactly those stages, newest first, on `shutdown`
///
/// Each operation runs at most once; later and concurrent calls observe the
/// first outcome.
///
/// # Example
///
/// ```rust,ignore
/// use bootstage::lifecycle::{LifecycleManager, OwnerToken, StageRegistry};
///
/// let manager = LifecycleManager::new("worker", StageRegistry::new());
/// manager.stages().up("connections")?.initializer_sync("db", Default::default(), |_| Ok(()));
///
/// let owner = OwnerToken::new();
/// manager.start(&owner).await?;
/// // ... application runs ...
/// manager.shutdown(&owner).await?;
/// ```
pub struct LifecycleManager<C> {
    name: String,
    stages: StageRegistry<C>,
    history: Mutex<Vec<ExecutionRecord>>,
    chain: AsyncMutex<()>,
    stopping: AtomicBool,
    initialized: Mutex<Option<Result<()>>>,
    bootstrapped: OnceCell<Result<()>>,
    started: OnceCell<Result<()>>,
    shut_down: OnceCell<Result<()>>,
}

impl<C: Owner> LifecycleManager<C> {
    /// Create a manager; `name` only labels log output
    pub fn new(name: impl Into<String>, stages: StageRegistry<C>) -> Self {
        Self {
            name: name.into(),
            stages,
            history: Mutex::new(Vec::new()),
            chain: AsyncMutex::new(()),
            stopping: AtomicBool::new(false),
            initialized: Mutex::new(None),
            bootstrapped: OnceCell::new(),
            started: OnceCell::new(),
            shut_down: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &StageRegistry<C> {
        &self.stages
    }

    /// Run only the first stage's setup
    pub async fn bootstrap(&self, owner: &C) -> Result<()> {
        self.bootstrapped
            .get_or_init(|| self.run_bootstrap(owner))
            .await
            .clone()
    }

    /// Run every setup stage before the boundary stage
    ///
    /// Stages that succeed stay recorded even if a later one fails, so a
    /// following `shutdown` unwinds them. Later calls, including the one
    /// made by `start`, return the first outcome.
    pub async fn initialize(&self, owner: &C) -> Result<()> {
        let _chain = self.chain.lock().await;
        self.initialize_stages(owner).await
    }

    /// Run `initialize`, then every setup stage in order
    ///
    /// Stages already run by `initialize` are no-ops the second time.
    pub async fn start(&self, owner: &C) -> Result<()> {
        self.started
            .get_or_init(|| self.run_start(owner))
            .await
            .clone()
    }

    /// Tear down the stages that ran, in reverse of the order they ran in
    ///
    /// Stops at the first teardown failure. Once shutdown has begun, no
    /// setup stage runs again; later `bootstrap`, `initialize` or `start`
    /// calls fail with [`LifecycleError::ShuttingDown`].
    pub async fn shutdown(&self, owner: &C) -> Result<()> {
        self.shut_down
            .get_or_init(|| self.run_shutdown(owner))
            .await
            .clone()
    }

    /// Names of the stages whose setup completed, in the order they ran
    pub fn executed_stages(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|record| record.stage.clone())
            .collect()
    }

    /// Completed setup stages with their completion times
    pub fn history(&self) -> Vec<ExecutionRecord> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True once `start` has finished successfully
    pub fn is_started(&self) -> bool {
        matches!(self.started.get(), Some(Ok(())))
    }

    /// True once `shutdown` has been attempted and finished
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.initialized()
    }

    async fn run_bootstrap(&self, owner: &C) -> Result<()> {
        let _chain = self.chain.lock().await;
        if let Some(first) = self.stages.order().first() {
            self.run_setup(first, owner).await?;
        }
        tracing::info!(app = %self.name, "Bootstrapped");
        Ok(())
    }

    /// Before-boundary stages; the caller holds `chain`
    async fn initialize_stages(&self, owner: &C) -> Result<()> {
        let cached = self.lock_initialized().clone();
        if let Some(outcome) = cached {
            return outcome;
        }

        let outcome = self.setup_all(self.stages.before_boundary(), owner).await;
        if outcome.is_ok() {
            tracing::info!("Initialized - {}", self.name);
        }
        *self.lock_initialized() = Some(outcome.clone());
        outcome
    }

    async fn run_start(&self, owner: &C) -> Result<()> {
        let _chain = self.chain.lock().await;
        self.initialize_stages(owner).await?;
        self.setup_all(self.stages.order(), owner).await?;
        tracing::info!(app = %self.name, "Started");
        Ok(())
    }

    async fn run_shutdown(&self, owner: &C) -> Result<()> {
        let _chain = self.chain.lock().await;
        self.stopping.store(true, Ordering::Release);
        let executed = self.executed_stages();
        tracing::info!(app = %self.name, stages = executed.len(), "Shutting down");

        for name in executed.iter().rev() {
            let pair = self.stages.stage(name)?;
            pair.teardown.execute(owner).await.map_err(|e| {
                tracing::error!(stage = %name, "Teardown failed: {}", e);
                LifecycleError::stage_failed(name, Phase::Teardown, e)
            })?;
        }

        tracing::info!(app = %self.name, "Shutdown complete");
        Ok(())
    }

    async fn setup_all(&self, names: &[String], owner: &C) -> Result<()> {
        for name in names {
            self.run_setup(name, owner).await?;
        }
        Ok(())
    }

    async fn run_setup(&self, name: &str, owner: &C) -> Result<()> {
        if self.stopping.load(Ordering::Acquire) {
            return Err(LifecycleError::ShuttingDown(name.to_string()));
        }
        self.stages.up(name)?.execute(owner).await?;
        self.record(name);
        Ok(())
    }

    fn lock_initialized(&self) -> std::sync::MutexGuard<'_, Option<Result<()>>> {
        self.initialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, name: &str) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.iter().any(|record| record.stage == name) {
            return;
        }
        history.push(ExecutionRecord {
            stage: name.to_string(),
            completed_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{InitializerOptions, OwnerToken, DEFAULT_STAGES};
    use std::sync::Arc;

    type Recorder = Arc<Mutex<Vec<String>>>;

    /// One recording initializer per stage and phase
    fn manager_with_recorder() -> (LifecycleManager<OwnerToken>, Recorder) {
        let manager = LifecycleManager::new("test", StageRegistry::new());
        let recorder: Recorder = Arc::default();

        for name in DEFAULT_STAGES {
            let pair = manager.stages().stage(name).unwrap();
            for (stage, label) in [
                (&pair.setup, format!("up:{name}")),
                (&pair.teardown, format!("down:{name}")),
            ] {
                let recorder = Arc::clone(&recorder);
                stage.initializer_sync(label.clone(), InitializerOptions::new(), move |_| {
                    recorder.lock().unwrap().push(label.clone());
                    Ok(())
                });
            }
        }
        (manager, recorder)
    }

    #[tokio::test]
    async fn test_initialize_stops_before_boundary() {
        let (manager, recorder) = manager_with_recorder();
        let owner = OwnerToken::new();

        manager.initialize(&owner).await.unwrap();

        assert_eq!(
            *recorder.lock().unwrap(),
            vec!["up:bootstrap", "up:initialize", "up:connections"]
        );
        assert_eq!(
            manager.executed_stages(),
            vec!["bootstrap", "initialize", "connections"]
        );
        assert!(!manager.stages().up("starting").unwrap().loaded_for(&owner));
    }

    #[tokio::test]
    async fn test_full_cycle_order() {
        let (manager, recorder) = manager_with_recorder();
        let owner = OwnerToken::new();

        manager.start(&owner).await.unwrap();
        manager.shutdown(&owner).await.unwrap();

        assert_eq!(
            *recorder.lock().unwrap(),
            vec![
                "up:bootstrap",
                "up:initialize",
                "up:connections",
                "up:starting",
                "up:running",
                "down:running",
                "down:starting",
                "down:connections",
                "down:initialize",
                "down:bootstrap",
            ]
        );
        assert!(manager.is_started());
        assert!(manager.is_shut_down());
    }

    #[tokio::test]
    async fn test_partial_start_unwinds_only_what_ran() {
        let (manager, recorder) = manager_with_recorder();
        manager
            .stages()
            .up("connections")
            .unwrap()
            .initializer_sync("broken", InitializerOptions::new(), |_| {
                anyhow::bail!("no database")
            });
        let owner = OwnerToken::new();

        let err = manager.start(&owner).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InitializerFailed { ref initializer, .. } if initializer == "broken"
        ));
        assert_eq!(manager.executed_stages(), vec!["bootstrap", "initialize"]);

        recorder.lock().unwrap().clear();
        manager.shutdown(&owner).await.unwrap();

        assert_eq!(
            *recorder.lock().unwrap(),
            vec!["down:initialize", "down:bootstrap"]
        );
    }

    #[tokio::test]
    async fn test_operations_are_memoized() {
        let (manager, recorder) = manager_with_recorder();
        let owner = OwnerToken::new();

        let (a, b) = tokio::join!(manager.start(&owner), manager.start(&owner));
        a.unwrap();
        b.unwrap();
        manager.start(&owner).await.unwrap();
        manager.initialize(&owner).await.unwrap();
        assert_eq!(recorder.lock().unwrap().len(), 5);

        manager.shutdown(&owner).await.unwrap();
        manager.shutdown(&owner).await.unwrap();
        assert_eq!(recorder.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_failed_outcome_is_memoized() {
        let manager = LifecycleManager::<OwnerToken>::new("test", StageRegistry::new());
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        manager
            .stages()
            .up("bootstrap")
            .unwrap()
            .initializer_sync("flaky", InitializerOptions::new(), move |_| {
                *counter.lock().unwrap() += 1;
                anyhow::bail!("first call fails")
            });
        let owner = OwnerToken::new();

        assert!(manager.initialize(&owner).await.is_err());
        assert!(manager.initialize(&owner).await.is_err());
        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(manager.executed_stages().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_then_start_records_once() {
        let (manager, recorder) = manager_with_recorder();
        let owner = OwnerToken::new();

        manager.bootstrap(&owner).await.unwrap();
        assert_eq!(manager.executed_stages(), vec!["bootstrap"]);

        manager.start(&owner).await.unwrap();
        assert_eq!(manager.executed_stages(), DEFAULT_STAGES);
        assert_eq!(
            recorder
                .lock()
                .unwrap()
                .iter()
                .filter(|l| *l == "up:bootstrap")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_teardown_failure_stops_unwinding() {
        let (manager, recorder) = manager_with_recorder();
        manager
            .stages()
            .down("starting")
            .unwrap()
            .initializer_sync("stuck", InitializerOptions::new(), |_| {
                anyhow::bail!("port still bound")
            });
        let owner = OwnerToken::new();

        manager.start(&owner).await.unwrap();
        recorder.lock().unwrap().clear();

        let err = manager.shutdown(&owner).await.unwrap_err();
        match err {
            LifecycleError::StageFailed { stage, phase, .. } => {
                assert_eq!(stage, "starting");
                assert_eq!(phase, Phase::Teardown);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            *recorder.lock().unwrap(),
            vec!["down:running", "down:starting"]
        );
    }

    #[tokio::test]
    async fn test_history_has_timestamps() {
        let (manager, _) = manager_with_recorder();
        let owner = OwnerToken::new();
        let before = Utc::now();

        manager.initialize(&owner).await.unwrap();

        let history = manager.history();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|r| r.completed_at >= before));
        assert!(history.windows(2).all(|w| w[0].completed_at <= w[1].completed_at));
    }

    /// Like `manager_with_recorder`, with every handler taking a few milliseconds
    fn slow_manager_with_recorder() -> (LifecycleManager<OwnerToken>, Recorder) {
        let manager = LifecycleManager::new("slow", StageRegistry::new());
        let recorder: Recorder = Arc::default();

        for name in DEFAULT_STAGES {
            let pair = manager.stages().stage(name).unwrap();
            for (stage, label) in [
                (&pair.setup, format!("up:{name}")),
                (&pair.teardown, format!("down:{name}")),
            ] {
                let recorder = Arc::clone(&recorder);
                stage.initializer(label.clone(), InitializerOptions::new(), move |_| {
                    let recorder = Arc::clone(&recorder);
                    let label = label.clone();
                    async move {
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        recorder.lock().unwrap().push(label);
                        Ok(())
                    }
                });
            }
        }
        (manager, recorder)
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_start() {
        let (manager, recorder) = slow_manager_with_recorder();
        let owner = OwnerToken::new();

        let (started, stopped) = tokio::join!(manager.start(&owner), async {
            tokio::time::sleep(std::time::Duration::from_millis(7)).await;
            manager.shutdown(&owner).await
        });
        started.unwrap();
        stopped.unwrap();

        assert_eq!(
            *recorder.lock().unwrap(),
            vec![
                "up:bootstrap",
                "up:initialize",
                "up:connections",
                "up:starting",
                "up:running",
                "down:running",
                "down:starting",
                "down:connections",
                "down:initialize",
                "down:bootstrap",
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_during_initialize_blocks_start() {
        let (manager, recorder) = slow_manager_with_recorder();
        let owner = OwnerToken::new();

        let (initialized, stopped) = tokio::join!(manager.initialize(&owner), async {
            tokio::time::sleep(std::time::Duration::from_millis(7)).await;
            manager.shutdown(&owner).await
        });
        initialized.unwrap();
        stopped.unwrap();

        let err = manager.start(&owner).await.unwrap_err();
        assert!(matches!(err, LifecycleError::ShuttingDown(ref stage) if stage == "bootstrap"));

        let log = recorder.lock().unwrap().clone();
        let first_down = log.iter().position(|l| l.starts_with("down:")).unwrap();
        assert!(log[first_down..].iter().all(|l| l.starts_with("down:")));
        assert_eq!(
            log,
            vec![
                "up:bootstrap",
                "up:initialize",
                "up:connections",
                "down:connections",
                "down:initialize",
                "down:bootstrap",
            ]
        );
        assert!(!manager.stages().up("starting").unwrap().loaded_for(&owner));
    }

    #[tokio::test]
    async fn test_start_after_shutdown_runs_nothing() {
        let (manager, recorder) = manager_with_recorder();
        let owner = OwnerToken::new();

        manager.shutdown(&owner).await.unwrap();

        assert!(matches!(
            manager.start(&owner).await,
            Err(LifecycleError::ShuttingDown(_))
        ));
        assert!(manager.bootstrap(&owner).await.is_err());
        assert!(manager.initialize(&owner).await.is_err());
        assert!(recorder.lock().unwrap().is_empty());
        assert!(manager.executed_stages().is_empty());
    }
}
