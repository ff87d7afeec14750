//! Classification of `kubectl port-forward` output.
//!
//! The forwarding tool's output is not a stable interface, so every line is
//! matched against a fixed ordered table and anything unknown falls through
//! to [`LogEvent::Unclassified`].

use crate::target::TargetState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    /// The tunnel is up.
    Started,
    /// Routine traffic notice.
    Activity,
    /// The tunnel dropped while the process stays alive.
    TransientForwardError,
    /// Another process owns the local port.
    PortConflict,
    /// The local port cannot be bound at all.
    PermissionDenied,
    /// Unknown output. `fatal` when the current process never reported `Started`.
    Unclassified { fatal: bool },
}

const PATTERNS: &[(&str, LogEvent)] = &[
    ("Forwarding from", LogEvent::Started),
    ("Handling connection", LogEvent::Activity),
    ("an error occurred forwarding", LogEvent::TransientForwardError),
    ("address already in use", LogEvent::PortConflict),
    ("bind: permission denied", LogEvent::PermissionDenied),
];

pub(crate) fn classify(line: &str, target: &TargetState) -> LogEvent {
    PATTERNS
        .iter()
        .find(|(needle, _)| line.contains(needle))
        .map(|(_, event)| *event)
        .unwrap_or(LogEvent::Unclassified {
            fatal: !target.initialized,
        })
}
