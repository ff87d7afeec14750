//! Mapping symbolic target names onto live instance ids.
//!
//! Input is the raw text of `kubectl get pods`:
//!
//! ```text
//! NAME                       READY   STATUS    RESTARTS   AGE
//! api-7d9f8b6c5d-x2k4q       1/1     Running   0          3h
//! worker-5c6d7e8f9-abcde     0/1     Pending   0          10s
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ResolveError;

/// Value of the status column for an instance that can be forwarded to.
pub const READY_STATUS: &str = "Running";

static ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[a-z0-9][-.a-z0-9]*)\s+\d+/\d+\s+(?P<status>\S+)")
        .expect("row pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    pub status: String,
}

impl Instance {
    pub fn is_ready(&self) -> bool {
        self.status == READY_STATUS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(String),
    NotFound,
    /// An instance exists but its status is not ready.
    WrongState(String),
}

/// Parses listing rows, skipping the header and anything that does not look like a row.
pub fn parse_listing(raw: &str) -> Vec<Instance> {
    raw.lines()
        .filter_map(|line| ROW.captures(line.trim()))
        .map(|caps| Instance {
            name: caps["name"].to_string(),
            status: caps["status"].to_string(),
        })
        .collect()
}

/// `true` when `instance` is `target` followed only by generated suffix segments.
fn is_instance_of(instance: &str, target: &str) -> bool {
    let Some(rest) = instance.strip_prefix(target) else {
        return false;
    };
    rest.is_empty()
        || (rest.starts_with('-')
            && rest[1..]
                .split('-')
                .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())))
}

/// Expands `prefix` to the single instance name it uniquely identifies.
pub fn complete(raw: &str, prefix: &str) -> Result<Option<String>, ResolveError> {
    let mut candidates: Vec<String> = parse_listing(raw)
        .into_iter()
        .map(|instance| instance.name)
        .filter(|name| name.starts_with(prefix))
        .collect();
    candidates.dedup();
    match candidates.len() {
        0 => Ok(None),
        1 => Ok(candidates.pop()),
        _ => Err(ResolveError::Ambiguous {
            prefix: prefix.to_string(),
            candidates,
        }),
    }
}

/// Finds the instance currently serving `target`.
///
/// With `silent`, a not-ready match is reported as [`Resolution::NotFound`] so
/// pollers can keep waiting. Silent lookups never fall back to prefix
/// completion: a target that already ran must come back under its own name.
pub fn resolve(raw: &str, target: &str, silent: bool) -> Result<Resolution, ResolveError> {
    let instances = parse_listing(raw);
    let mut matching: Vec<&Instance> = instances
        .iter()
        .filter(|instance| is_instance_of(&instance.name, target))
        .collect();

    if matching.is_empty() {
        if silent {
            return Ok(Resolution::NotFound);
        }
        let Some(completed) = complete(raw, target)? else {
            return Ok(Resolution::NotFound);
        };
        matching = instances.iter().filter(|i| i.name == completed).collect();
    }

    if let Some(ready) = matching.iter().find(|instance| instance.is_ready()) {
        return Ok(Resolution::Found(ready.name.clone()));
    }
    match matching.first() {
        Some(instance) if !silent => Ok(Resolution::WrongState(instance.status.clone())),
        _ => Ok(Resolution::NotFound),
    }
}

/// `true` when `instance_id` is listed and ready.
pub fn is_ready(raw: &str, instance_id: &str) -> bool {
    parse_listing(raw)
        .iter()
        .any(|instance| instance.name == instance_id && instance.is_ready())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
NAME                          READY   STATUS             RESTARTS   AGE
api-7d9f8b6c5d-x2k4q          1/1     Running            0          3h
api-7d9f8b6c5d-p9z8w          1/1     Running            2          3h
worker-5c6d7e8f9-abcde        0/1     CrashLoopBackOff   7          10m
redis-0                       1/1     Running            0          5d
apigateway-6f5e4d3c2b-qwert   1/1     Running            0          1d
";

    #[test]
    fn parses_rows_and_skips_header() {
        let instances = parse_listing(LISTING);
        assert_eq!(instances.len(), 5);
        assert_eq!(instances[0].name, "api-7d9f8b6c5d-x2k4q");
        assert_eq!(instances[2].status, "CrashLoopBackOff");
    }

    #[test]
    fn resolves_first_ready_replica() {
        assert_eq!(
            resolve(LISTING, "api", false).unwrap(),
            Resolution::Found("api-7d9f8b6c5d-x2k4q".into())
        );
        assert_eq!(
            resolve(LISTING, "redis", false).unwrap(),
            Resolution::Found("redis-0".into())
        );
    }

    #[test]
    fn suffix_pattern_does_not_swallow_longer_names() {
        assert!(is_instance_of("api-7d9f8b6c5d-x2k4q", "api"));
        assert!(!is_instance_of("apigateway-6f5e4d3c2b-qwert", "api"));
        assert!(!is_instance_of("api-", "api"));
    }

    #[test]
    fn not_ready_is_wrong_state_unless_silent() {
        assert_eq!(
            resolve(LISTING, "worker", false).unwrap(),
            Resolution::WrongState("CrashLoopBackOff".into())
        );
        assert_eq!(
            resolve(LISTING, "worker", true).unwrap(),
            Resolution::NotFound
        );
    }

    #[test]
    fn missing_target_is_not_found() {
        assert_eq!(
            resolve(LISTING, "postgres", false).unwrap(),
            Resolution::NotFound
        );
        assert_eq!(resolve("", "api", false).unwrap(), Resolution::NotFound);
    }

    #[test]
    fn unique_prefix_completes() {
        assert_eq!(
            resolve(LISTING, "apig", false).unwrap(),
            Resolution::Found("apigateway-6f5e4d3c2b-qwert".into())
        );
        assert_eq!(
            complete(LISTING, "red").unwrap(),
            Some("redis-0".to_string())
        );
    }

    #[test]
    fn silent_lookup_does_not_complete_to_another_workload() {
        let raw = "\
NAME                          READY   STATUS    RESTARTS   AGE
apigateway-6f5e4d3c2b-qwert   1/1     Running   0          1d
";
        assert_eq!(resolve(raw, "api", true).unwrap(), Resolution::NotFound);
        assert_eq!(resolve(LISTING, "apig", true).unwrap(), Resolution::NotFound);
        assert_eq!(
            resolve(raw, "api", false).unwrap(),
            Resolution::Found("apigateway-6f5e4d3c2b-qwert".into())
        );
    }

    #[test]
    fn ambiguous_prefix_is_an_error() {
        let err = resolve(LISTING, "ap", false).unwrap_err();
        let ResolveError::Ambiguous { prefix, candidates } = err;
        assert_eq!(prefix, "ap");
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn readiness_of_a_known_id() {
        assert!(is_ready(LISTING, "redis-0"));
        assert!(!is_ready(LISTING, "worker-5c6d7e8f9-abcde"));
        assert!(!is_ready(LISTING, "api-gone-12345"));
    }
}
