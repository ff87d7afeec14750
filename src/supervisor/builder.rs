use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;

use crate::{
    listing::{KubectlLister, Lister},
    outage::OutageDetector,
    process::{KubectlSpawner, Spawner},
    recovery::{RecoveryPolicy, RecoveryScheduler},
    target::{TargetSpec, TargetState},
    Supervisor,
};

/// Builds a `Supervisor` instance with configurable parameters.
///
/// By default targets are listed and forwarded with `kubectl`; tests swap in
/// their own [`Lister`] and [`Spawner`].
pub struct SupervisorBuilder {
    targets: Vec<TargetSpec>,
    namespace: Option<String>,
    health_check_interval: Duration,
    recovery: RecoveryPolicy,
    lister: Arc<dyn Lister>,
    spawner: Arc<dyn Spawner>,
}

impl SupervisorBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            namespace: None,
            health_check_interval: Duration::from_secs(10),
            recovery: RecoveryPolicy::default(),
            lister: Arc::new(KubectlLister::new()),
            spawner: Arc::new(KubectlSpawner::new()),
        }
    }

    pub fn with_target(mut self, spec: TargetSpec) -> Self {
        self.targets.push(spec);
        self
    }

    pub fn with_targets<I>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = TargetSpec>,
    {
        self.targets.extend(specs);
        self
    }

    /// Namespace used by targets that do not name one.
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Sets the interval between health checks.
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Sets how many consecutive failed resolutions abandon a target.
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.recovery.max_attempts = attempts.max(1);
        self
    }

    /// Sets the fixed delay between recovery attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.recovery.interval = interval;
        self
    }

    pub fn with_lister(mut self, lister: impl Lister) -> Self {
        self.lister = Arc::new(lister);
        self
    }

    pub fn with_spawner(mut self, spawner: impl Spawner) -> Self {
        self.spawner = Arc::new(spawner);
        self
    }

    /// Constructs the `Supervisor` with the configured settings.
    pub fn build(self) -> Supervisor {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (user_tx, user_rx) = mpsc::unbounded_channel();
        let targets = self
            .targets
            .iter()
            .map(|spec| {
                let mut state = TargetState::from_spec(spec);
                if state.namespace.is_none() {
                    state.namespace = self.namespace.clone();
                }
                state
            })
            .collect();

        Supervisor {
            targets,
            lister: self.lister,
            spawner: self.spawner,
            recovery: RecoveryScheduler::new(self.recovery, internal_tx.clone()),
            outage: OutageDetector::default(),
            health_check_interval: self.health_check_interval,
            resolution_failures: Vec::new(),
            tx: internal_tx,
            rx: internal_rx,
            external_tx: user_tx,
            external_rx: user_rx,
        }
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
