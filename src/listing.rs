use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ListingError;

/// Source of the raw instance listing.
#[async_trait]
pub trait Lister: Send + Sync + 'static {
    async fn list(&self, namespace: Option<&str>) -> Result<String, ListingError>;
}

/// Runs `kubectl get pods`.
#[derive(Debug, Clone)]
pub struct KubectlLister {
    program: String,
}

impl KubectlLister {
    pub fn new() -> Self {
        Self::with_program("kubectl")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for KubectlLister {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Lister for KubectlLister {
    async fn list(&self, namespace: Option<&str>) -> Result<String, ListingError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("get").arg("pods");
        if let Some(namespace) = namespace {
            cmd.arg("--namespace").arg(namespace);
        }
        debug!(?namespace, "listing pods");

        let output = cmd.kill_on_drop(true).output().await?;
        if !output.status.success() {
            return Err(ListingError::Command(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
