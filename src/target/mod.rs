use crate::{process::ForwardProcess, TargetName};

/// A target as requested at startup. Never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub name: TargetName,
    pub port: u16,
    pub namespace: Option<String>,
    pub excluded: bool,
}

impl TargetSpec {
    pub fn new(name: impl Into<TargetName>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            namespace: None,
            excluded: false,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unresolved,
    Resolving,
    Starting,
    Running,
    Unhealthy,
    Recovering,
    Excluded,
    PermanentlyFailed,
}

impl Lifecycle {
    /// `Excluded` and `PermanentlyFailed` are never left once entered.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Lifecycle::Excluded | Lifecycle::PermanentlyFailed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Lifecycle::Running)
    }

    pub fn is_recovering(&self) -> bool {
        matches!(self, Lifecycle::Recovering)
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unresolved => write!(f, "unresolved"),
            Self::Resolving => write!(f, "resolving"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Recovering => write!(f, "recovering"),
            Self::Excluded => write!(f, "excluded"),
            Self::PermanentlyFailed => write!(f, "permanently failed"),
        }
    }
}

/// Point-in-time view of a target, handed out through the supervisor handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetStatus {
    pub name: TargetName,
    pub port: u16,
    pub lifecycle: Lifecycle,
    pub instance_id: Option<String>,
    pub retry_count: u32,
    pub has_process: bool,
    pub initialized: bool,
}

/// Mutable per-target state. Every transition is guarded on the current
/// lifecycle and returns `false` when it does not apply.
pub(crate) struct TargetState {
    pub(crate) name: TargetName,
    pub(crate) port: u16,
    pub(crate) namespace: Option<String>,
    pub(crate) instance_id: Option<String>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) process: Option<Box<dyn ForwardProcess>>,
    pub(crate) retry_count: u32,
    pub(crate) initialized: bool,
    pub(crate) generation: u64,
}

impl TargetState {
    pub(crate) fn from_spec(spec: &TargetSpec) -> Self {
        Self {
            name: spec.name.clone(),
            port: spec.port,
            namespace: spec.namespace.clone(),
            instance_id: None,
            lifecycle: if spec.excluded {
                Lifecycle::Excluded
            } else {
                Lifecycle::Unresolved
            },
            process: None,
            retry_count: 0,
            initialized: false,
            generation: 0,
        }
    }

    pub(crate) fn mark(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.lifecycle.is_terminal()
    }

    /// Kills and clears the owned process, if any. Already-dead processes are fine.
    pub(crate) fn kill_process(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.kill();
        }
        self.initialized = false;
    }

    pub(crate) fn begin_resolving(&mut self) -> bool {
        if self.lifecycle != Lifecycle::Unresolved {
            return false;
        }
        self.mark(Lifecycle::Resolving);
        true
    }

    /// Records a freshly resolved id. Valid from `Resolving` and `Recovering`.
    /// A successful re-resolution restores the full retry budget.
    pub(crate) fn assign(&mut self, instance_id: String) -> bool {
        if !matches!(self.lifecycle, Lifecycle::Resolving | Lifecycle::Recovering) {
            return false;
        }
        self.instance_id = Some(instance_id);
        self.retry_count = 0;
        self.mark(Lifecycle::Starting);
        true
    }

    /// Clears any previous process and returns the generation the next one runs under.
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.kill_process();
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    pub(crate) fn attach(&mut self, process: Box<dyn ForwardProcess>) {
        self.kill_process();
        self.process = Some(process);
    }

    /// Returns `true` only on the first `Started` of the current process.
    pub(crate) fn mark_started(&mut self) -> bool {
        if self.initialized || !matches!(self.lifecycle, Lifecycle::Starting | Lifecycle::Running) {
            return false;
        }
        self.initialized = true;
        self.retry_count = 0;
        self.mark(Lifecycle::Running);
        true
    }

    /// Kills the process and clears readiness before anything else.
    /// A second trigger while already recovering is a no-op.
    pub(crate) fn enter_recovering(&mut self) -> bool {
        if !matches!(
            self.lifecycle,
            Lifecycle::Starting | Lifecycle::Running | Lifecycle::Unhealthy
        ) {
            return false;
        }
        self.kill_process();
        self.mark(Lifecycle::Recovering);
        true
    }

    pub(crate) fn mark_unhealthy(&mut self) -> bool {
        if !matches!(self.lifecycle, Lifecycle::Starting | Lifecycle::Running) {
            return false;
        }
        self.kill_process();
        self.mark(Lifecycle::Unhealthy);
        true
    }

    /// Outage suspension: the process goes away but the lifecycle is left as recorded.
    pub(crate) fn suspend(&mut self) -> bool {
        if !self.lifecycle.is_running() {
            return false;
        }
        self.kill_process();
        true
    }

    pub(crate) fn exclude(&mut self) -> bool {
        if self.lifecycle.is_terminal() {
            return false;
        }
        self.kill_process();
        self.mark(Lifecycle::Excluded);
        true
    }

    pub(crate) fn fail_permanently(&mut self) -> bool {
        if self.lifecycle.is_terminal() {
            return false;
        }
        self.kill_process();
        self.mark(Lifecycle::PermanentlyFailed);
        true
    }

    pub(crate) fn status(&self) -> TargetStatus {
        TargetStatus {
            name: self.name.clone(),
            port: self.port,
            lifecycle: self.lifecycle,
            instance_id: self.instance_id.clone(),
            retry_count: self.retry_count,
            has_process: self.process.is_some(),
            initialized: self.initialized,
        }
    }
}
