//! Stage registry
//!
//! Holds the ordered list of stage names and, for each name, a setup and a
//! teardown [`Stage`]. Collaborators register initializers here before the
//! orchestrator starts running stages.

use super::{Component, InitializerOptions, LifecycleError, Owner, Result, Stage};
use std::collections::HashMap;
use std::sync::Arc;
use strum_macros::{Display, EnumString};

/// Stages provided out of the box, in execution order
///
/// 1. `bootstrap` - set the stage: adjust configuration, add objects
/// 2. `initialize` - configuration is settled and can be used
/// 3. `connections` - establish connections to external services
/// 4. `starting` - bind to ports and get ready to serve
/// 5. `running` - the application is running
pub const DEFAULT_STAGES: [&str; 5] = [
    "bootstrap",
    "initialize",
    "connections",
    "starting",
    "running",
];

/// First stage that `initialize()` leaves for `start()`
pub const DEFAULT_BOUNDARY: &str = "starting";

/// Which half of a stage an initializer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Setup,
    Teardown,
}

/// The setup and teardown stages registered under one stage name
#[derive(Debug)]
pub struct StagePair<C> {
    pub setup: Stage<C>,
    pub teardown: Stage<C>,
}

impl<C: Owner> StagePair<C> {
    fn new(name: &str) -> Self {
        Self {
            setup: Stage::new(format!("{}.{}", name, Phase::Setup)),
            teardown: Stage::new(format!("{}.{}", name, Phase::Teardown)),
        }
    }

    /// The stage for one phase
    pub fn phase(&self, phase: Phase) -> &Stage<C> {
        match phase {
            Phase::Setup => &self.setup,
            Phase::Teardown => &self.teardown,
        }
    }
}

/// Ordered collection of stage pairs
#[derive(Debug)]
pub struct StageRegistry<C> {
    order: Vec<String>,
    boundary: usize,
    stages: HashMap<String, StagePair<C>>,
}

impl<C: Owner> Default for StageRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Owner> StageRegistry<C> {
    /// Registry with [`DEFAULT_STAGES`] and [`DEFAULT_BOUNDARY`]
    pub fn new() -> Self {
        let order: Vec<String> = DEFAULT_STAGES.iter().map(|s| s.to_string()).collect();
        let boundary = DEFAULT_STAGES
            .iter()
            .position(|s| *s == DEFAULT_BOUNDARY)
            .unwrap_or(DEFAULT_STAGES.len());
        Self::build(order, boundary)
    }

    /// Registry with a custom stage order
    ///
    /// `boundary` names the first stage that `initialize()` does not run.
    ///
    /// # Errors
    ///
    /// Fails if a stage name is repeated or the boundary is not in `order`.
    pub fn with_stages<I, S>(order: I, boundary: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        for name in order {
            let name = name.into();
            if names.contains(&name) {
                return Err(LifecycleError::DuplicateStage(name));
            }
            names.push(name);
        }

        let boundary = names
            .iter()
            .position(|name| name == boundary)
            .ok_or_else(|| LifecycleError::UnknownStage(boundary.to_string()))?;

        Ok(Self::build(names, boundary))
    }

    fn build(order: Vec<String>, boundary: usize) -> Self {
        let stages = order
            .iter()
            .map(|name| (name.clone(), StagePair::new(name)))
            .collect();
        Self {
            order,
            boundary,
            stages,
        }
    }

    /// Stage names in execution order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Stages that `initialize()` runs
    pub fn before_boundary(&self) -> &[String] {
        &self.order[..self.boundary]
    }

    /// Name of the boundary stage
    pub fn boundary(&self) -> &str {
        &self.order[self.boundary]
    }

    pub fn get(&self, name: &str) -> Option<&StagePair<C>> {
        self.stages.get(name)
    }

    /// The stage pair for `name`
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownStage`] for names outside the order.
    pub fn stage(&self, name: &str) -> Result<&StagePair<C>> {
        self.stages
            .get(name)
            .ok_or_else(|| LifecycleError::UnknownStage(name.to_string()))
    }

    /// Setup stage for `name`
    pub fn up(&self, name: &str) -> Result<&Stage<C>> {
        Ok(&self.stage(name)?.setup)
    }

    /// Teardown stage for `name`
    pub fn down(&self, name: &str) -> Result<&Stage<C>> {
        Ok(&self.stage(name)?.teardown)
    }

    /// Register a component's setup and teardown under the same initializer
    /// name in the given stage
    #[track_caller]
    pub fn component<T>(&self, stage: &str, name: &str, component: Arc<T>) -> Result<()>
    where
        T: Component<C>,
    {
        self.component_with(stage, name, InitializerOptions::new(), component)
    }

    /// Like [`component`](Self::component), with ordering constraints that
    /// apply to both phases
    #[track_caller]
    pub fn component_with<T>(
        &self,
        stage: &str,
        name: &str,
        options: InitializerOptions,
        component: Arc<T>,
    ) -> Result<()>
    where
        T: Component<C>,
    {
        let pair = self.stage(stage)?;

        let up = Arc::clone(&component);
        pair.setup.initializer(name, options.clone(), move |owner: C| {
            let up = Arc::clone(&up);
            async move { up.setup(owner).await }
        });

        let down = component;
        pair.teardown.initializer(name, options, move |owner: C| {
            let down = Arc::clone(&down);
            async move { down.teardown(owner).await }
        });

        Ok(())
    }
}
