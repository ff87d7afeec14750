use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use forward_supervisor::{
    ForwardProcess, Lifecycle, ListingError, Lister, OutputSink, SpawnError, SpawnRequest,
    Spawner, SupervisorBuilder, SupervisorHandle, TargetSpec,
};

pub const HEALTH_INTERVAL: Duration = Duration::from_secs(10);
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

pub const STARTED: &str = "Forwarding from 127.0.0.1:8080 -> 8080";
pub const FORWARD_ERROR: &str = "E0412 10:02:11.123456    4242 portforward.go:400] an error occurred forwarding 8080 -> 8080: error forwarding port 8080 to pod, uid : exit status 1";
pub const PORT_IN_USE: &str = "Unable to listen on port 8080: Listeners failed to create with the following errors: [unable to create listener: Error listen tcp4 127.0.0.1:8080: bind: address already in use]";
pub const PERMISSION_DENIED: &str = "Unable to listen on port 80: Listeners failed to create with the following errors: [unable to create listener: Error listen tcp4 127.0.0.1:80: bind: permission denied]";
pub const NETWORK_UNREACHABLE: &str = "Unable to connect to the server: dial tcp 10.0.0.1:443: connect: network is unreachable";

/// Builds a `kubectl get pods` listing from `(name, status)` rows.
pub fn listing(rows: &[(&str, &str)]) -> String {
    let mut raw = String::from("NAME                   READY   STATUS    RESTARTS   AGE\n");
    for (name, status) in rows {
        raw.push_str(&format!("{name}   1/1     {status}   0          1h\n"));
    }
    raw
}

/// A listing source whose answer the test changes at will.
#[derive(Clone)]
pub struct ScriptedLister {
    response: Arc<Mutex<Result<String, String>>>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedLister {
    pub fn new(raw: String) -> Self {
        Self {
            response: Arc::new(Mutex::new(Ok(raw))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set(&self, raw: String) {
        *self.response.lock().unwrap() = Ok(raw);
    }

    pub fn fail(&self, stderr: &str) {
        *self.response.lock().unwrap() = Err(stderr.to_string());
    }
}

#[async_trait]
impl Lister for ScriptedLister {
    async fn list(&self, _namespace: Option<&str>) -> Result<String, ListingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .lock()
            .unwrap()
            .clone()
            .map_err(ListingError::Command)
    }
}

#[derive(Clone)]
pub struct SpawnRecord {
    pub request: SpawnRequest,
    pub sink: OutputSink,
    pub killed: Arc<AtomicBool>,
}

impl SpawnRecord {
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

struct FakeProcess {
    killed: Arc<AtomicBool>,
}

impl ForwardProcess for FakeProcess {
    fn kill(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
    }
}

/// Records every spawn and lets the test speak for the spawned processes.
#[derive(Clone, Default)]
pub struct RecordingSpawner {
    records: Arc<Mutex<Vec<SpawnRecord>>>,
}

impl RecordingSpawner {
    pub fn spawned(&self, target: &str) -> Vec<SpawnRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.request.target == target)
            .cloned()
            .collect()
    }

    pub fn live(&self, target: &str) -> usize {
        self.spawned(target).iter().filter(|r| !r.is_killed()).count()
    }

    pub fn all_killed(&self) -> bool {
        self.records.lock().unwrap().iter().all(SpawnRecord::is_killed)
    }

    /// Emits `line` from the most recent process of `target`.
    pub fn emit(&self, target: &str, line: &str) {
        let record = self
            .spawned(target)
            .pop()
            .unwrap_or_else(|| panic!("no process spawned for {target}"));
        record.sink.line(line);
    }

    pub fn exit(&self, target: &str) {
        if let Some(record) = self.spawned(target).pop() {
            record.sink.closed();
        }
    }
}

impl Spawner for RecordingSpawner {
    fn spawn(
        &self,
        request: &SpawnRequest,
        sink: OutputSink,
    ) -> Result<Box<dyn ForwardProcess>, SpawnError> {
        let killed = Arc::new(AtomicBool::new(false));
        self.records.lock().unwrap().push(SpawnRecord {
            request: request.clone(),
            sink,
            killed: killed.clone(),
        });
        Ok(Box::new(FakeProcess { killed }))
    }
}

#[allow(unused)]
pub fn builder(lister: &ScriptedLister, spawner: &RecordingSpawner) -> SupervisorBuilder {
    SupervisorBuilder::new()
        .with_lister(lister.clone())
        .with_spawner(spawner.clone())
        .with_health_check_interval(HEALTH_INTERVAL)
        .with_retry_interval(RETRY_INTERVAL)
}

// Helper function to create a supervisor with default settings
#[allow(unused)]
pub fn start(
    lister: &ScriptedLister,
    spawner: &RecordingSpawner,
    targets: &[(&str, u16)],
) -> SupervisorHandle {
    builder(lister, spawner)
        .with_targets(
            targets
                .iter()
                .map(|(name, port)| TargetSpec::new(*name, *port)),
        )
        .build()
        .run()
}

/// Lets the supervisor drain its queue.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[allow(unused)]
pub async fn lifecycle(handle: &SupervisorHandle, name: &str) -> Lifecycle {
    handle
        .get_target_status(name)
        .await
        .unwrap()
        .unwrap()
        .lifecycle
}
