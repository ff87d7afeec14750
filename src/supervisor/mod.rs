pub(crate) mod builder;
pub(crate) mod handle;

use std::{sync::Arc, time::Duration};

use handle::SupervisorMessage;
use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    classifier::{classify, LogEvent},
    error::SupervisorError,
    health,
    listing::Lister,
    messaging::SupervisorEvent,
    outage::{OutageDetector, QueryOutcome},
    process::{OutputSink, SpawnRequest, Spawner},
    recovery::{RecoveryScheduler, RetryDecision},
    resolver::{self, Resolution},
    supervisor::handle::SupervisorHandle,
    target::{Lifecycle, TargetState},
};

/// Why a supervisor stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Every target was excluded.
    NoTargetsLeft,
    /// Stopped through [`SupervisorHandle::shutdown`].
    Shutdown,
}

impl std::fmt::Display for SupervisorExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTargetsLeft => write!(f, "no more forward targets"),
            Self::Shutdown => write!(f, "shut down"),
        }
    }
}

/// What made a target go back to recovery.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    ForwardError,
    HealthCheck,
}

/// Keeps one forwarding process alive per target.
///
/// All state lives in this value and is only touched from the supervision
/// loop, so every handler runs to completion before the next event is seen.
/// Transitions are guarded on the current lifecycle, which makes racing
/// triggers (a health check and a log line declaring the same target dead)
/// harmless: the second one is a no-op.
pub struct Supervisor {
    targets: Vec<TargetState>,
    lister: Arc<dyn Lister>,
    spawner: Arc<dyn Spawner>,
    recovery: RecoveryScheduler,
    outage: OutageDetector,
    health_check_interval: Duration,
    resolution_failures: Vec<String>,
    tx: mpsc::UnboundedSender<SupervisorEvent>,
    rx: mpsc::UnboundedReceiver<SupervisorEvent>,
    external_tx: mpsc::UnboundedSender<SupervisorMessage>,
    external_rx: mpsc::UnboundedReceiver<SupervisorMessage>,
}

impl Supervisor {
    /// Runs the supervisor, consuming it and returning a handle for external control.
    pub fn run(self) -> SupervisorHandle {
        let user_tx = self.external_tx.clone();
        let handle = tokio::spawn(async move { self.run_and_supervise().await });
        SupervisorHandle::new(handle, user_tx)
    }

    async fn run_and_supervise(mut self) -> Result<SupervisorExit, SupervisorError> {
        let result = match self.start_all_targets().await {
            Ok(()) => self.supervise_all_targets().await,
            Err(err) => Err(err),
        };
        match &result {
            Ok(exit) => info!("stopping: {exit}"),
            Err(err) => error!("{err}"),
        }
        self.teardown();
        result
    }

    /// Resolves every target once and spawns its forwarding process.
    async fn start_all_targets(&mut self) -> Result<(), SupervisorError> {
        for target in self.targets.iter_mut() {
            target.begin_resolving();
        }
        info!("initializing");

        for namespace in self.namespaces() {
            if let Some((raw, _)) = self.query(namespace.as_deref()).await? {
                self.resolve_pending(&raw, namespace.as_deref())?;
            }
        }
        Ok(())
    }

    async fn supervise_all_targets(&mut self) -> Result<SupervisorExit, SupervisorError> {
        let mut health_check_interval = interval_at(
            Instant::now() + self.health_check_interval,
            self.health_check_interval,
        );
        health_check_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if let Some(exit) = self.finished()? {
                return Ok(exit);
            }

            tokio::select! {
                biased;
                Some(event) = self.rx.recv() => {
                    self.handle_event(event).await?;
                },
                Some(user_msg) = self.external_rx.recv() => {
                    if let Some(exit) = self.handle_user_message(user_msg) {
                        return Ok(exit);
                    }
                },
                _ = health_check_interval.tick() => {
                    self.check_all_health().await?;
                }
            }
        }
    }

    /// `Some` once no target is left to supervise.
    fn finished(&self) -> Result<Option<SupervisorExit>, SupervisorError> {
        if self.targets.iter().any(TargetState::is_active) {
            return Ok(None);
        }
        if self.resolution_failures.is_empty() {
            Ok(Some(SupervisorExit::NoTargetsLeft))
        } else {
            Err(SupervisorError::Resolution(
                self.resolution_failures.join("; "),
            ))
        }
    }

    fn handle_user_message(&mut self, msg: SupervisorMessage) -> Option<SupervisorExit> {
        match msg {
            SupervisorMessage::GetTargetStatus(name, reply) => {
                let status = self.index_of(&name).map(|i| self.targets[i].status());
                let _ = reply.send(status);
            }
            SupervisorMessage::GetAllTargetStatuses(reply) => {
                let _ = reply.send(self.targets.iter().map(TargetState::status).collect());
            }
            SupervisorMessage::Shutdown => return Some(SupervisorExit::Shutdown),
        }
        None
    }

    async fn handle_event(&mut self, event: SupervisorEvent) -> Result<(), SupervisorError> {
        match event {
            SupervisorEvent::Output {
                target,
                generation,
                line,
            } => self.handle_output(&target, generation, &line).await,
            SupervisorEvent::Exited { target, generation } => {
                if let Some(index) = self.current_process(&target, generation) {
                    let target = &mut self.targets[index];
                    if target.mark_unhealthy() {
                        warn!(name = %target.name, "forwarding process exited");
                    }
                }
                Ok(())
            }
            SupervisorEvent::RetryDue { target, ticket } => {
                if !self.recovery.take_due(&target, ticket) {
                    return Ok(());
                }
                match self.index_of(&target) {
                    Some(index) => self.retry_now(index).await,
                    None => Ok(()),
                }
            }
        }
    }

    async fn handle_output(
        &mut self,
        name: &str,
        generation: u64,
        line: &str,
    ) -> Result<(), SupervisorError> {
        // Output of a process that was already replaced or killed.
        let Some(index) = self.current_process(name, generation) else {
            return Ok(());
        };
        let line = line.trim_end();
        if line.trim().is_empty() {
            return Ok(());
        }

        let target = &mut self.targets[index];
        match classify(line, target) {
            LogEvent::Started => {
                if target.mark_started() {
                    info!(
                        name = %target.name,
                        port = target.port,
                        "started port forwarding"
                    );
                }
            }
            LogEvent::Activity => {
                info!(name = %target.name, "processing request");
            }
            LogEvent::TransientForwardError => {
                if self.enter_recovery(index, Trigger::ForwardError) {
                    self.retry_now(index).await?;
                }
            }
            LogEvent::PortConflict => {
                if target.exclude() {
                    warn!(
                        name = %target.name,
                        port = target.port,
                        "local port already in use, excluding target"
                    );
                    let name = target.name.clone();
                    self.recovery.cancel(&name);
                }
            }
            LogEvent::PermissionDenied => {
                target.fail_permanently();
                return Err(SupervisorError::PermissionDenied {
                    target: target.name.clone(),
                    port: target.port,
                });
            }
            LogEvent::Unclassified { fatal: true } => {
                target.fail_permanently();
                return Err(SupervisorError::InitializationFailed {
                    target: target.name.clone(),
                    port: target.port,
                    line: line.to_string(),
                });
            }
            LogEvent::Unclassified { fatal: false } => {
                info!(name = %target.name, "{line}");
            }
        }
        Ok(())
    }

    /// One listing query per namespace, then every running target is cross-checked.
    async fn check_all_health(&mut self) -> Result<(), SupervisorError> {
        for namespace in self.namespaces() {
            match self.query(namespace.as_deref()).await? {
                Some((raw, _)) => self.evaluate(&raw, namespace.as_deref())?,
                None => debug!(?namespace, "health check skipped, network is down"),
            }
        }
        Ok(())
    }

    /// Resolves pending targets and sends unhealthy ones to recovery.
    fn evaluate(&mut self, raw: &str, namespace: Option<&str>) -> Result<(), SupervisorError> {
        self.resolve_pending(raw, namespace)?;
        for index in health::check(raw, &self.targets, namespace) {
            if self.enter_recovery(index, Trigger::HealthCheck) {
                self.attempt_recovery(index, raw)?;
            }
        }
        Ok(())
    }

    /// Listing query gated by the outage detector. `None` while suspended.
    async fn query(
        &mut self,
        namespace: Option<&str>,
    ) -> Result<Option<(String, bool)>, SupervisorError> {
        let lister = Arc::clone(&self.lister);
        match self
            .outage
            .query(lister.as_ref(), namespace, &mut self.targets)
            .await?
        {
            QueryOutcome::Listing { raw, resumed } => Ok(Some((raw, resumed))),
            QueryOutcome::Suspended => Ok(None),
        }
    }

    /// Non-silent first resolution of targets still in `Resolving`.
    fn resolve_pending(&mut self, raw: &str, namespace: Option<&str>) -> Result<(), SupervisorError> {
        let pending: Vec<usize> = self
            .targets
            .iter()
            .enumerate()
            .filter(|(_, t)| t.lifecycle == Lifecycle::Resolving && t.namespace.as_deref() == namespace)
            .map(|(index, _)| index)
            .collect();

        for index in pending {
            let target = &mut self.targets[index];
            let failure = match resolver::resolve(raw, &target.name, false) {
                Ok(Resolution::Found(instance_id)) => {
                    debug!(name = %target.name, %instance_id, "resolved");
                    target.assign(instance_id);
                    self.spawn_process(index)?;
                    continue;
                }
                Ok(Resolution::WrongState(state)) => format!(
                    "pod {} is in {state} state, needs to be {}",
                    target.name,
                    resolver::READY_STATUS
                ),
                Ok(Resolution::NotFound) => format!("could not find pod {}", target.name),
                Err(err) => err.to_string(),
            };
            error!("{failure}");
            target.fail_permanently();
            self.resolution_failures.push(failure);
        }
        Ok(())
    }

    /// Moves a target to `Recovering`. `false` when it already is, or cannot be.
    fn enter_recovery(&mut self, index: usize, trigger: Trigger) -> bool {
        let target = &mut self.targets[index];
        if !target.enter_recovering() {
            return false;
        }
        match trigger {
            Trigger::ForwardError => {
                warn!(name = %target.name, "pod appears to be dead, trying to initialize again")
            }
            Trigger::HealthCheck => {
                debug!(name = %target.name, "pod is no longer ready, re-resolving")
            }
        }
        let name = target.name.clone();
        self.recovery.cancel(&name);
        true
    }

    /// Recovery attempt that needs a fresh listing first.
    async fn retry_now(&mut self, index: usize) -> Result<(), SupervisorError> {
        if !self.targets[index].lifecycle.is_recovering() {
            return Ok(());
        }
        let namespace = self.targets[index].namespace.clone();
        match self.query(namespace.as_deref()).await? {
            Some((raw, resumed)) => {
                if resumed {
                    self.evaluate(&raw, namespace.as_deref())?;
                }
                self.attempt_recovery(index, &raw)
            }
            None => {
                // Outages never count against the budget.
                let name = self.targets[index].name.clone();
                debug!(%name, "network is down, postponing recovery");
                self.recovery.schedule(&name);
                Ok(())
            }
        }
    }

    /// One silent resolution against `raw`; schedules the next attempt on failure.
    fn attempt_recovery(&mut self, index: usize, raw: &str) -> Result<(), SupervisorError> {
        let target = &mut self.targets[index];
        if !target.lifecycle.is_recovering() {
            return Ok(());
        }

        let resolution = resolver::resolve(raw, &target.name, true).unwrap_or_else(|err| {
            warn!(name = %target.name, "{err}");
            Resolution::NotFound
        });
        if let Resolution::Found(instance_id) = resolution {
            info!(name = %target.name, %instance_id, "pod is back, restarting port forwarding");
            target.assign(instance_id);
            return self.spawn_process(index);
        }

        let name = target.name.clone();
        match self.recovery.record_failure(target) {
            RetryDecision::Retry { remaining } => {
                info!(%name, remaining, "waiting for pod to come up");
                self.recovery.schedule(&name);
                Ok(())
            }
            RetryDecision::Exhausted { attempts } => {
                target.fail_permanently();
                Err(SupervisorError::RecoveryExhausted {
                    target: name,
                    attempts,
                })
            }
        }
    }

    /// Spawns the forwarding process of a `Starting` target, replacing any previous one.
    fn spawn_process(&mut self, index: usize) -> Result<(), SupervisorError> {
        let target = &mut self.targets[index];
        let Some(instance_id) = target.instance_id.clone() else {
            return Ok(());
        };
        let generation = target.next_generation();
        let request = SpawnRequest {
            target: target.name.clone(),
            instance_id,
            port: target.port,
            namespace: target.namespace.clone(),
        };
        let sink = OutputSink::new(target.name.clone(), generation, self.tx.clone());

        let process = self.spawner.spawn(&request, sink)?;
        debug!(
            name = %target.name,
            instance_id = %request.instance_id,
            pid = ?process.id(),
            "spawned forwarding process"
        );
        target.attach(process);
        Ok(())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.name == name)
    }

    /// Index of `name` if `generation` is its live process.
    fn current_process(&self, name: &str, generation: u64) -> Option<usize> {
        self.index_of(name).filter(|&index| {
            let target = &self.targets[index];
            target.generation == generation && target.process.is_some()
        })
    }

    /// Distinct namespaces of targets still being supervised.
    fn namespaces(&self) -> Vec<Option<String>> {
        let mut namespaces: Vec<Option<String>> = Vec::new();
        for target in self.targets.iter().filter(|t| t.is_active()) {
            if !namespaces.contains(&target.namespace) {
                namespaces.push(target.namespace.clone());
            }
        }
        namespaces
    }

    /// Kills every live process. Already-dead processes are ignored.
    fn teardown(&mut self) {
        self.recovery.cancel_all();
        for target in self.targets.iter_mut() {
            target.kill_process();
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.teardown();
    }
}
