//! Detection of lost connectivity to the cluster.
//!
//! Every listing query goes through [`OutageDetector::query`]. Connectivity
//! failures suspend forwarding instead of failing the run.

use tracing::{info, warn};

use crate::{error::ListingError, listing::Lister, target::TargetState};

const OUTAGE_SIGNALS: &[&str] = &[
    "network is unreachable",
    "tls handshake timeout",
    "network is down",
];

pub fn is_outage(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    OUTAGE_SIGNALS.iter().any(|signal| message.contains(signal))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum QueryOutcome {
    /// `resumed` is set on the first success after an outage.
    Listing { raw: String, resumed: bool },
    Suspended,
}

#[derive(Debug, Default)]
pub(crate) struct OutageDetector {
    suspended: bool,
}

impl OutageDetector {
    pub(crate) async fn query(
        &mut self,
        lister: &dyn Lister,
        namespace: Option<&str>,
        targets: &mut [TargetState],
    ) -> Result<QueryOutcome, ListingError> {
        match lister.list(namespace).await {
            Ok(raw) => {
                let resumed = std::mem::take(&mut self.suspended);
                if resumed {
                    info!("network is back, resuming port forwarding");
                }
                Ok(QueryOutcome::Listing { raw, resumed })
            }
            Err(err) if is_outage(&err.message()) => {
                if !self.suspended {
                    warn!(error = %err.message(), "network outage detected, suspending all forwarding");
                }
                self.suspended = true;
                for target in targets.iter_mut() {
                    if target.suspend() {
                        info!(name = %target.name, "forwarding suspended");
                    }
                }
                Ok(QueryOutcome::Suspended)
            }
            Err(err) => Err(err),
        }
    }
}
