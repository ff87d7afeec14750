//! Port maps and target specs.
//!
//! Default ports come from two JSON maps of target name to port, merged in order:
//!
//! 1. System map: `/etc/forward-supervisor/pods.json`
//! 2. Local map: `~/.kube/pods.json`
//! 3. Extra map passed with `--config`
//!
//! Later maps override same-named entries of earlier ones. Missing files are skipped.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{error::ConfigError, target::TargetSpec, TargetName};

pub const SYSTEM_PORT_MAP_PATH: &str = "/etc/forward-supervisor/pods.json";

pub const LOCAL_PORT_MAP_FILE: &str = "pods.json";

pub type PortMap = BTreeMap<TargetName, u16>;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u64),
    Text(String),
}

fn parse_port(target: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| ConfigError::InvalidPort {
            target: target.to_string(),
            value: value.to_string(),
        })
}

/// Merges `overrides` on top of `base`. Applying the same overrides twice changes nothing.
pub fn merge(base: &PortMap, overrides: &PortMap) -> PortMap {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(name, port)| (name.clone(), *port)));
    merged
}

pub struct PortMapLoader {
    system_path: PathBuf,
    /// `None` without a home directory; the local map is then skipped.
    local_path: Option<PathBuf>,
}

impl PortMapLoader {
    #[must_use]
    pub fn new() -> Self {
        let local_path =
            dirs::home_dir().map(|home| home.join(".kube").join(LOCAL_PORT_MAP_FILE));
        if local_path.is_none() {
            warn!("no home directory, skipping local port map");
        }
        Self {
            system_path: PathBuf::from(SYSTEM_PORT_MAP_PATH),
            local_path,
        }
    }

    #[must_use]
    pub fn with_paths(system_path: PathBuf, local_path: Option<PathBuf>) -> Self {
        Self {
            system_path,
            local_path,
        }
    }

    /// Loads and merges every map. Unlike the default maps, a missing `extra` file is an error.
    pub fn load(&self, extra: Option<&Path>) -> Result<PortMap, ConfigError> {
        let mut ports = PortMap::new();
        for path in std::iter::once(&self.system_path).chain(self.local_path.as_ref()) {
            match load_file(path)? {
                Some(map) => {
                    debug!(?path, entries = map.len(), "loaded port map");
                    ports = merge(&ports, &map);
                }
                None => debug!(?path, "no port map found"),
            }
        }

        if let Some(path) = extra {
            let map = load_file(path)?.ok_or_else(|| ConfigError::ReadError {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "specified port map not found",
                ),
            })?;
            ports = merge(&ports, &map);
        }
        Ok(ports)
    }
}

impl Default for PortMapLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn load_file(path: &Path) -> Result<Option<PortMap>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let raw: BTreeMap<TargetName, PortValue> =
        serde_json::from_str(&contents).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;

    raw.into_iter()
        .map(|(name, value)| {
            let port = match value {
                PortValue::Number(n) => parse_port(&name, &n.to_string())?,
                PortValue::Text(text) => parse_port(&name, &text)?,
            };
            Ok((name, port))
        })
        .collect::<Result<PortMap, ConfigError>>()
        .map(Some)
}

/// Turns `NAME[:PORT]` requests into specs. With no requests, every mapped target is used.
pub fn target_specs(
    requests: &[String],
    ports: &PortMap,
    namespace: Option<&str>,
    exclude: &[String],
) -> Result<Vec<TargetSpec>, ConfigError> {
    let requests: Vec<String> = if requests.is_empty() {
        ports.keys().cloned().collect()
    } else {
        requests.to_vec()
    };
    if requests.is_empty() {
        return Err(ConfigError::NoTargets);
    }

    let mut specs: Vec<TargetSpec> = Vec::with_capacity(requests.len());
    for request in &requests {
        let (name, port) = match request.split_once(':') {
            Some((name, port)) => (name, parse_port(name, port)?),
            None => (
                request.as_str(),
                *ports
                    .get(request.as_str())
                    .ok_or_else(|| ConfigError::MissingPort(request.clone()))?,
            ),
        };
        if specs.iter().any(|spec| spec.name == name) {
            warn!(name, "target requested twice, keeping the first");
            continue;
        }

        let mut spec = TargetSpec::new(name, port);
        if let Some(namespace) = namespace {
            spec = spec.with_namespace(namespace);
        }
        if exclude.iter().any(|excluded| excluded == name) {
            spec = spec.excluded();
        }
        specs.push(spec);
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn map(entries: &[(&str, u16)]) -> PortMap {
        entries
            .iter()
            .map(|(name, port)| (name.to_string(), *port))
            .collect()
    }

    #[test]
    fn local_overrides_system_and_merge_is_idempotent() {
        let system = map(&[("api", 8080), ("redis", 6379)]);
        let local = map(&[("api", 9000), ("web", 3000)]);

        let merged = merge(&system, &local);
        assert_eq!(merged, map(&[("api", 9000), ("redis", 6379), ("web", 3000)]));
        assert_eq!(merge(&merged, &local), merged);
    }

    #[test]
    fn loads_both_maps_and_skips_missing_files() {
        let dir = tempdir().unwrap();
        let system = dir.path().join("system.json");
        let local = dir.path().join("local.json");
        fs::write(&system, r#"{ "api": 8080, "redis": "6379" }"#).unwrap();
        fs::write(&local, r#"{ "api": 9000 }"#).unwrap();

        let ports = PortMapLoader::with_paths(system.clone(), Some(local))
            .load(None)
            .unwrap();
        assert_eq!(ports, map(&[("api", 9000), ("redis", 6379)]));

        // No home directory: only the system map is read.
        let system_only = PortMapLoader::with_paths(system, None).load(None).unwrap();
        assert_eq!(system_only, map(&[("api", 8080), ("redis", 6379)]));

        let missing = PortMapLoader::with_paths(dir.path().join("a"), Some(dir.path().join("b")));
        assert!(missing.load(None).unwrap().is_empty());
        assert!(matches!(
            missing.load(Some(&dir.path().join("c"))),
            Err(ConfigError::ReadError { .. })
        ));
    }

    #[test]
    fn invalid_json_and_ports_are_errors() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ api: ").unwrap();
        assert!(matches!(load_file(&bad), Err(ConfigError::ParseError { .. })));

        fs::write(&bad, r#"{ "api": 70000 }"#).unwrap();
        assert!(matches!(load_file(&bad), Err(ConfigError::InvalidPort { .. })));
    }

    #[test]
    fn explicit_port_wins_and_missing_port_fails() {
        let ports = map(&[("api", 8080)]);
        let specs = target_specs(
            &["api".into(), "web:3000".into()],
            &ports,
            Some("prod"),
            &[],
        )
        .unwrap();
        assert_eq!(
            specs,
            vec![
                TargetSpec::new("api", 8080).with_namespace("prod"),
                TargetSpec::new("web", 3000).with_namespace("prod"),
            ]
        );

        assert!(matches!(
            target_specs(&["db".into()], &ports, None, &[]),
            Err(ConfigError::MissingPort(name)) if name == "db"
        ));
        assert!(matches!(
            target_specs(&["db:http".into()], &ports, None, &[]),
            Err(ConfigError::InvalidPort { .. })
        ));
    }

    #[test]
    fn no_requests_means_every_mapped_target_minus_exclusions() {
        let ports = map(&[("api", 8080), ("redis", 6379)]);
        let specs = target_specs(&[], &ports, None, &["redis".into()]).unwrap();
        assert_eq!(
            specs,
            vec![
                TargetSpec::new("api", 8080),
                TargetSpec::new("redis", 6379).excluded()
            ]
        );

        assert!(matches!(
            target_specs(&[], &PortMap::new(), None, &[]),
            Err(ConfigError::NoTargets)
        ));
    }
}
