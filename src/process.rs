use std::process::Stdio;

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines},
    process::{Child, ChildStderr, ChildStdout, Command},
    sync::mpsc,
};

use crate::{error::SpawnError, messaging::SupervisorEvent, TargetName};

/// An owned forwarding process. Dropping it must not leave the process running.
pub trait ForwardProcess: Send + 'static {
    /// Kills the process. Errors from processes that already exited are ignored.
    fn kill(&mut self);

    fn id(&self) -> Option<u32> {
        None
    }
}

/// What to forward: one instance, one local port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub target: TargetName,
    pub instance_id: String,
    pub port: u16,
    pub namespace: Option<String>,
}

/// Starts forwarding processes. Output lines go into the given [`OutputSink`].
pub trait Spawner: Send + Sync + 'static {
    fn spawn(
        &self,
        request: &SpawnRequest,
        sink: OutputSink,
    ) -> Result<Box<dyn ForwardProcess>, SpawnError>;
}

/// Routes output of one process generation back to the supervisor.
#[derive(Debug, Clone)]
pub struct OutputSink {
    target: TargetName,
    generation: u64,
    tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl OutputSink {
    pub(crate) fn new(
        target: TargetName,
        generation: u64,
        tx: mpsc::UnboundedSender<SupervisorEvent>,
    ) -> Self {
        Self {
            target,
            generation,
            tx,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns `false` once the supervisor is gone.
    pub fn line(&self, line: impl Into<String>) -> bool {
        self.tx
            .send(SupervisorEvent::Output {
                target: self.target.clone(),
                generation: self.generation,
                line: line.into(),
            })
            .is_ok()
    }

    pub fn closed(&self) {
        let _ = self.tx.send(SupervisorEvent::Exited {
            target: self.target.clone(),
            generation: self.generation,
        });
    }
}

/// Runs `kubectl port-forward`.
#[derive(Debug, Clone)]
pub struct KubectlSpawner {
    program: String,
}

impl KubectlSpawner {
    pub fn new() -> Self {
        Self::with_program("kubectl")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for KubectlSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl Spawner for KubectlSpawner {
    fn spawn(
        &self,
        request: &SpawnRequest,
        sink: OutputSink,
    ) -> Result<Box<dyn ForwardProcess>, SpawnError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("port-forward");
        if let Some(namespace) = &request.namespace {
            cmd.arg("--namespace").arg(namespace);
        }
        cmd.arg(&request.instance_id)
            .arg(request.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| SpawnError {
            target: request.target.clone(),
            source,
        })?;

        tokio::spawn(forward_output(child.stdout.take(), child.stderr.take(), sink));
        Ok(Box::new(KubectlProcess { child }))
    }
}

struct KubectlProcess {
    child: Child,
}

impl ForwardProcess for KubectlProcess {
    fn kill(&mut self) {
        let _ = self.child.start_kill();
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

async fn next_line<R: AsyncBufRead + Unpin>(lines: &mut Option<Lines<R>>) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

/// Merges stdout and stderr in arrival order until both close.
async fn forward_output(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    sink: OutputSink,
) {
    let mut out = stdout.map(|s| BufReader::new(s).lines());
    let mut err = stderr.map(|s| BufReader::new(s).lines());

    loop {
        tokio::select! {
            line = next_line(&mut out), if out.is_some() => match line {
                Some(line) => {
                    if !sink.line(line) {
                        return;
                    }
                }
                None => out = None,
            },
            line = next_line(&mut err), if err.is_some() => match line {
                Some(line) => {
                    if !sink.line(line) {
                        return;
                    }
                }
                None => err = None,
            },
            else => break,
        }
    }
    sink.closed();
}
