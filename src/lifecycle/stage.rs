//! Stages: ordered, idempotent execution of initializers
//!
//! A stage owns a set of initializers. Their run order is derived from the
//! `before`/`after` constraints with a topological sort; names that only
//! appear in constraints take part in the ordering but never run.

use super::{Initializer, InitializerOptions, LifecycleError, Owner, OwnerToken, Result};
use dashmap::DashSet;
use futures_util::FutureExt;
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

/// A named phase of work, such as `connections.setup`
///
/// Registration and execution both go through `&self`, so a stage can be
/// shared freely; executions are serialized internally.
pub struct Stage<C> {
    name: String,
    initializers: RwLock<Vec<Arc<Initializer<C>>>>,
    executed: DashSet<OwnerToken>,
    running: Mutex<()>,
}

impl<C: Owner> Stage<C> {
    /// Create an empty stage
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initializers: RwLock::new(Vec::new()),
            executed: DashSet::new(),
            running: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an async initializer
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// stages.up("connections")?.initializer(
    ///     "connect.to.my.thing",
    ///     InitializerOptions::new().before("other"),
    ///     |app: Application| async move {
    ///         connect(app.config()).await?;
    ///         Ok(())
    ///     },
    /// );
    /// ```
    #[track_caller]
    pub fn initializer<F, Fut>(
        &self,
        name: impl Into<String>,
        options: InitializerOptions,
        handler: F,
    ) -> Arc<Initializer<C>>
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(Initializer::new(name, options, handler))
    }

    /// Register an initializer whose work completes synchronously
    #[track_caller]
    pub fn initializer_sync<F>(
        &self,
        name: impl Into<String>,
        options: InitializerOptions,
        handler: F,
    ) -> Arc<Initializer<C>>
    where
        F: Fn(C) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(Initializer::new_sync(name, options, handler))
    }

    /// Store an initializer, replacing any earlier one with the same name
    ///
    /// A replacement keeps the registration position of the initializer it
    /// replaces.
    pub fn register(&self, initializer: Initializer<C>) -> Arc<Initializer<C>> {
        let initializer = Arc::new(initializer);
        let mut initializers = self
            .initializers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match initializers
            .iter_mut()
            .find(|existing| existing.name() == initializer.name())
        {
            Some(existing) => *existing = Arc::clone(&initializer),
            None => initializers.push(Arc::clone(&initializer)),
        }

        if !self.executed.is_empty() {
            tracing::warn!(
                stage = %self.name,
                initializer = initializer.name(),
                "Initializer registered after the stage already ran"
            );
        }
        initializer
    }

    /// Look up a registered initializer by name
    pub fn get(&self, name: &str) -> Option<Arc<Initializer<C>>> {
        self.snapshot().into_iter().find(|i| i.name() == name)
    }

    /// Registered initializers in registration order
    pub fn initializers(&self) -> Vec<Arc<Initializer<C>>> {
        self.snapshot()
    }

    pub fn len(&self) -> usize {
        self.initializers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once this stage has completed for `owner`
    pub fn loaded_for(&self, owner: &C) -> bool {
        self.executed.contains(&owner.owner_token())
    }

    /// Initializers sorted so that every before/after constraint holds
    ///
    /// Unconstrained initializers keep registration order. Constraint-only
    /// names are dropped from the result.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::CyclicDependency`] if the constraints form a
    /// cycle.
    pub fn load_order(&self) -> Result<Vec<Arc<Initializer<C>>>> {
        let initializers = self.snapshot();

        let mut graph = ConstraintGraph::default();
        for init in &initializers {
            graph.node(init.name());
        }
        for init in &initializers {
            if let Some(before) = init.before() {
                graph.edge(init.name(), before);
            }
            if let Some(after) = init.after() {
                graph.edge(after, init.name());
            }
        }

        let sorted = graph
            .sort()
            .map_err(|nodes| LifecycleError::cyclic(&self.name, nodes))?;

        let by_name: HashMap<&str, &Arc<Initializer<C>>> =
            initializers.iter().map(|i| (i.name(), i)).collect();

        Ok(sorted
            .into_iter()
            .filter_map(|name| by_name.get(name).map(|init| Arc::clone(init)))
            .collect())
    }

    /// Run every initializer in load order on behalf of `owner`
    ///
    /// Handlers run one at a time; each must finish before the next starts.
    /// The first failure stops the stage. Once a run succeeds for an owner,
    /// later calls for that owner return immediately.
    pub async fn execute(&self, owner: &C) -> Result<()> {
        let token = owner.owner_token();
        if self.executed.contains(&token) {
            return Ok(());
        }

        let _running = self.running.lock().await;
        if self.executed.contains(&token) {
            return Ok(());
        }

        tracing::info!(stage = %self.name, "Stage");
        let order = self.load_order()?;

        for init in &order {
            tracing::debug!(stage = %self.name, initializer = init.name(), "Running initializer");
            invoke(init, owner.clone()).await.map_err(|e| {
                tracing::error!(
                    stage = %self.name,
                    initializer = init.name(),
                    "Initializer failed: {:#}",
                    e
                );
                LifecycleError::initializer_failed(&self.name, init.name(), e)
            })?;
        }

        self.executed.insert(token);
        tracing::debug!(stage = %self.name, initializers = order.len(), "Stage complete");
        Ok(())
    }

    fn snapshot(&self) -> Vec<Arc<Initializer<C>>> {
        self.initializers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<C> fmt::Debug for Stage<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .initializers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("initializers", &names)
            .field("executed_owners", &self.executed.len())
            .finish()
    }
}

/// Call a handler, turning a panic into an ordinary failure
async fn invoke<C>(init: &Initializer<C>, owner: C) -> anyhow::Result<()> {
    let handler = init.handler();
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(owner))) {
        Ok(future) => future,
        Err(payload) => return Err(panic_error(payload)),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(panic_error(payload)),
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    anyhow::anyhow!("initializer panicked: {}", message)
}

/// Name graph built from before/after constraints
///
/// Nodes are numbered in the order they are first seen, which is also the
/// tie-break order of the sort.
#[derive(Default)]
struct ConstraintGraph<'a> {
    nodes: Vec<&'a str>,
    index: HashMap<&'a str, usize>,
    outgoing: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl<'a> ConstraintGraph<'a> {
    fn node(&mut self, name: &'a str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(name);
        self.index.insert(name, idx);
        self.outgoing.push(Vec::new());
        self.in_degree.push(0);
        idx
    }

    /// `from` must come before `to`
    fn edge(&mut self, from: &'a str, to: &'a str) {
        let from = self.node(from);
        let to = self.node(to);
        self.outgoing[from].push(to);
        self.in_degree[to] += 1;
    }

    /// Kahn's algorithm, always taking the earliest-seen ready node
    fn sort(mut self) -> std::result::Result<Vec<&'a str>, Vec<String>> {
        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|&idx| self.in_degree[idx] == 0)
            .collect();
        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(next) = ready.pop_first() {
            sorted.push(self.nodes[next]);
            for &to in &self.outgoing[next] {
                self.in_degree[to] -= 1;
                if self.in_degree[to] == 0 {
                    ready.insert(to);
                }
            }
        }

        if sorted.len() < self.nodes.len() {
            let stuck = (0..self.nodes.len())
                .filter(|&idx| self.in_degree[idx] > 0)
                .map(|idx| self.nodes[idx].to_string())
                .collect();
            return Err(stuck);
        }
        Ok(sorted)
    }
}
