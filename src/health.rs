//! Periodic cross-check of starting and running targets against a fresh listing.

use crate::{resolver, target::Lifecycle, target::TargetState};

/// `true` when the target must go through recovery given `raw`.
///
/// A running target without a process was suspended by an outage and is
/// restarted from scratch.
pub(crate) fn needs_recovery(raw: &str, target: &TargetState) -> bool {
    match target.lifecycle {
        Lifecycle::Unhealthy => true,
        // A process that never reported `Started` is still tied to its instance.
        Lifecycle::Starting => target
            .instance_id
            .as_deref()
            .map_or(true, |id| !resolver::is_ready(raw, id)),
        Lifecycle::Running => {
            target.process.is_none()
                || target
                    .instance_id
                    .as_deref()
                    .map_or(true, |id| !resolver::is_ready(raw, id))
        }
        _ => false,
    }
}

/// Indexes of targets in `namespace` that need recovery. Reads only.
pub(crate) fn check(raw: &str, targets: &[TargetState], namespace: Option<&str>) -> Vec<usize> {
    targets
        .iter()
        .enumerate()
        .filter(|(_, target)| target.namespace.as_deref() == namespace)
        .filter(|(_, target)| needs_recovery(raw, target))
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{process::ForwardProcess, target::TargetSpec};

    struct Idle;

    impl ForwardProcess for Idle {
        fn kill(&mut self) {}
    }

    const LISTING: &str = "\
NAME                 READY   STATUS        RESTARTS   AGE
a-6b7c8d-aaaaa       1/1     Running       0          1h
b-6b7c8d-bbbbb       1/1     Terminating   0          1h
";

    fn running(name: &str, id: &str) -> TargetState {
        let mut target = TargetState::from_spec(&TargetSpec::new(name, 8080));
        target.instance_id = Some(id.to_string());
        target.process = Some(Box::new(Idle));
        target.mark(Lifecycle::Running);
        target
    }

    #[test]
    fn flags_ids_that_are_gone_or_not_ready() {
        let targets = vec![
            running("a", "a-6b7c8d-aaaaa"),
            running("b", "b-6b7c8d-bbbbb"),
            running("c", "c-6b7c8d-ccccc"),
        ];
        assert_eq!(check(LISTING, &targets, None), vec![1, 2]);
    }

    #[test]
    fn suspended_targets_restart_from_scratch() {
        let mut suspended = running("a", "a-6b7c8d-aaaaa");
        assert!(suspended.suspend());
        assert_eq!(suspended.lifecycle, Lifecycle::Running);
        assert_eq!(check(LISTING, &[suspended], None), vec![0]);
    }

    #[test]
    fn unhealthy_targets_always_recover_and_others_are_left_alone() {
        let mut unhealthy = running("a", "a-6b7c8d-aaaaa");
        unhealthy.mark(Lifecycle::Unhealthy);
        let mut recovering = running("b", "b-6b7c8d-bbbbb");
        recovering.mark(Lifecycle::Recovering);
        let mut excluded = running("c", "c-gone");
        excluded.mark(Lifecycle::Excluded);

        assert_eq!(
            check(LISTING, &[unhealthy, recovering, excluded], None),
            vec![0]
        );
    }

    #[test]
    fn starting_targets_recover_only_when_their_instance_is_gone() {
        let mut starting = running("a", "a-6b7c8d-aaaaa");
        starting.mark(Lifecycle::Starting);
        let mut stuck = running("b", "b-6b7c8d-bbbbb");
        stuck.mark(Lifecycle::Starting);

        assert_eq!(check(LISTING, &[starting, stuck], None), vec![1]);
    }

    #[test]
    fn only_targets_in_the_queried_namespace() {
        let mut other = TargetState::from_spec(&TargetSpec::new("c", 8080).with_namespace("prod"));
        other.instance_id = Some("c-gone".into());
        other.mark(Lifecycle::Running);

        assert!(check(LISTING, &[other], None).is_empty());
    }
}
