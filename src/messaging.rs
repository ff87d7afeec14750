use crate::TargetName;

/// Internal events fed into the supervisor loop by process readers and retry timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SupervisorEvent {
    /// One line of output from a forwarding process.
    Output {
        target: TargetName,
        generation: u64,
        line: String,
    },
    /// Both output streams of a forwarding process closed.
    Exited { target: TargetName, generation: u64 },
    /// A scheduled recovery attempt is due. Only the latest `ticket` per target counts.
    RetryDue { target: TargetName, ticket: u64 },
}
