use std::{collections::HashMap, time::Duration};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{messaging::SupervisorEvent, target::TargetState, TargetName};

/// Bounded retry with a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Consecutive failed resolutions after which a target is abandoned.
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    Retry { remaining: u32 },
    Exhausted { attempts: u32 },
}

struct PendingRetry {
    ticket: u64,
    token: CancellationToken,
}

/// One cancelable timer per target.
pub(crate) struct RecoveryScheduler {
    policy: RecoveryPolicy,
    pending: HashMap<TargetName, PendingRetry>,
    next_ticket: u64,
    tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl RecoveryScheduler {
    pub(crate) fn new(policy: RecoveryPolicy, tx: mpsc::UnboundedSender<SupervisorEvent>) -> Self {
        Self {
            policy,
            pending: HashMap::new(),
            next_ticket: 0,
            tx,
        }
    }

    /// Counts one failed resolution against the target's budget.
    pub(crate) fn record_failure(&self, target: &mut TargetState) -> RetryDecision {
        target.retry_count = target.retry_count.saturating_add(1);
        if target.retry_count >= self.policy.max_attempts {
            RetryDecision::Exhausted {
                attempts: target.retry_count,
            }
        } else {
            RetryDecision::Retry {
                remaining: self.policy.max_attempts - target.retry_count,
            }
        }
    }

    /// Schedules the next attempt for `target`, replacing any pending one.
    pub(crate) fn schedule(&mut self, target: &str) {
        self.cancel(target);

        self.next_ticket = self.next_ticket.wrapping_add(1);
        let ticket = self.next_ticket;
        let token = CancellationToken::new();
        let token_timer = token.clone();
        let tx = self.tx.clone();
        let delay = self.policy.interval;
        let name = target.to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = token_timer.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(SupervisorEvent::RetryDue { target: name, ticket });
                }
            }
        });

        self.pending
            .insert(target.to_string(), PendingRetry { ticket, token });
    }

    /// Consumes a fired timer. `false` for a timer that was replaced or cancelled meanwhile.
    pub(crate) fn take_due(&mut self, target: &str, ticket: u64) -> bool {
        match self.pending.get(target) {
            Some(pending) if pending.ticket == ticket => {
                self.pending.remove(target);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, target: &str) -> bool {
        self.pending.contains_key(target)
    }

    pub(crate) fn cancel(&mut self, target: &str) {
        if let Some(pending) = self.pending.remove(target) {
            pending.token.cancel();
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.token.cancel();
        }
    }
}
