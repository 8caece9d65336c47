use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use shellbridge_types::{BridgeError, ConnectionId};
use shellbridge_viewers::ViewerRegistry;

use super::connection::{ConnectionInfo, TerminalConnection};
use super::transport::{Credentials, HostTarget, ShellTransport};
use super::{MAX_CONCURRENT_CONNECTIONS, READ_CHUNK_SIZE};

/// Receiver of remote output on the non-viewer side of the fan-out.
///
/// Implemented by the command tracker; `connection_lost` fires when a
/// connection's stream closes so an in-flight command is not left
/// executing forever.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn append_output(&self, connection_id: ConnectionId, chunk: &str);
    async fn connection_lost(&self, connection_id: ConnectionId);
}

/// Registry of live terminal connections, keyed by connection id.
///
/// Each connection gets one blocking reader thread that forwards chunks
/// into an ordered pump task; the pump fans chunks out to attached viewers
/// (best-effort, drop on failure) and to the output sink. The pump never
/// blocks on a viewer.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<TerminalConnection>>>,
    transport: Arc<dyn ShellTransport>,
    viewers: Arc<ViewerRegistry>,
    sink: Arc<dyn OutputSink>,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(
        transport: Arc<dyn ShellTransport>,
        viewers: Arc<ViewerRegistry>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            transport,
            viewers,
            sink,
            max_connections: MAX_CONCURRENT_CONNECTIONS,
        }
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Open a remote shell and start its bridge.
    pub async fn connect(
        &self,
        target: HostTarget,
        credentials: Credentials,
    ) -> Result<ConnectionId, BridgeError> {
        if self.connections.read().await.len() >= self.max_connections {
            return Err(BridgeError::Transport(format!(
                "maximum concurrent connections ({}) reached",
                self.max_connections
            )));
        }

        let channel = self
            .transport
            .open(&target, &credentials)
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        let id = Uuid::new_v4();
        let conn = Arc::new(TerminalConnection::new(
            id,
            target,
            channel.writer,
            channel.process,
        ));

        let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
        spawn_reader(channel.reader, tx);

        let pump = tokio::spawn(pump_output(
            rx,
            Arc::clone(&conn),
            Arc::clone(&self.viewers),
            Arc::clone(&self.sink),
        ));
        conn.set_pump_task(pump);

        self.connections.write().await.insert(id, Arc::clone(&conn));
        tracing::info!(connection = %id, host = %conn.target(), "terminal connection opened");
        Ok(id)
    }

    /// Close the remote shell and remove the connection.
    ///
    /// The active command, if any, is failed through the sink; tracked
    /// command records are the caller's to clean up.
    pub async fn disconnect(&self, id: ConnectionId) -> Result<(), BridgeError> {
        let conn = self
            .connections
            .write()
            .await
            .remove(&id)
            .ok_or(BridgeError::ConnectionNotFound(id))?;
        conn.shutdown();
        self.sink.connection_lost(id).await;
        tracing::info!(connection = %id, "terminal connection closed");
        Ok(())
    }

    /// Write raw bytes to the remote input stream.
    pub async fn send_input(&self, id: ConnectionId, bytes: &[u8]) -> Result<(), BridgeError> {
        let conn = self
            .get(id)
            .await
            .ok_or(BridgeError::ConnectionNotFound(id))?;
        if !conn.is_alive() {
            return Err(BridgeError::ConnectionUnavailable(id));
        }
        conn.write_input(bytes).map_err(|e| {
            tracing::warn!(connection = %id, error = %e, "write to remote input failed");
            conn.mark_dead();
            BridgeError::ConnectionUnavailable(id)
        })
    }

    pub async fn attach_viewer(&self, id: ConnectionId, viewer_id: &str) -> Result<(), BridgeError> {
        let conn = self
            .get(id)
            .await
            .ok_or(BridgeError::ConnectionNotFound(id))?;
        conn.attach_viewer(viewer_id).await;
        Ok(())
    }

    pub async fn detach_viewer(&self, id: ConnectionId, viewer_id: &str) -> Result<(), BridgeError> {
        let conn = self
            .get(id)
            .await
            .ok_or(BridgeError::ConnectionNotFound(id))?;
        conn.detach_viewer(viewer_id).await;
        Ok(())
    }

    pub async fn get(&self, id: ConnectionId) -> Option<Arc<TerminalConnection>> {
        self.connections.read().await.get(&id).cloned()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn list(&self) -> Vec<ConnectionInfo> {
        let conns: Vec<Arc<TerminalConnection>> =
            self.connections.read().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(conns.len());
        for conn in conns {
            infos.push(conn.info().await);
        }
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }
}

/// Blocking reader loop, one thread per connection (parallel across
/// connections). Exits on EOF or read error; dropping the sender ends the
/// pump.
fn spawn_reader(mut reader: Box<dyn Read + Send>, tx: mpsc::UnboundedSender<Vec<u8>>) {
    std::thread::spawn(move || {
        let mut buffer = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buffer[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                Err(_) => break,
            }
        }
    });
}

/// Ordered fan-out: chunks reach viewers and the sink in read order for a
/// given connection. Viewer delivery is best-effort; a failed viewer is
/// detached on the spot.
async fn pump_output(
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    conn: Arc<TerminalConnection>,
    viewers: Arc<ViewerRegistry>,
    sink: Arc<dyn OutputSink>,
) {
    while let Some(chunk) = rx.recv().await {
        let text = String::from_utf8_lossy(&chunk).to_string();

        for viewer_id in conn.viewer_ids().await {
            if !viewers.send_frame(&viewer_id, text.clone()).await {
                conn.detach_viewer(&viewer_id).await;
                tracing::debug!(connection = %conn.id(), viewer = %viewer_id, "dropped dead viewer");
            }
        }

        sink.append_output(conn.id(), &text).await;
    }

    // Remote stream closed
    conn.mark_dead();
    sink.connection_lost(conn.id()).await;
    tracing::info!(connection = %conn.id(), "remote output stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ShellChannel, ShellProcess};
    use shellbridge_viewers::OutboundMessage;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct ChannelReader {
        rx: std_mpsc::Receiver<Vec<u8>>,
        pending: Vec<u8>,
    }

    impl Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pending.is_empty() {
                match self.rx.recv() {
                    Ok(data) => self.pending = data,
                    Err(_) => return Ok(0),
                }
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    struct ChannelWriter {
        tx: std_mpsc::Sender<Vec<u8>>,
    }

    impl Write for ChannelWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.tx
                .send(buf.to_vec())
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FakeProcess {
        killed: Arc<AtomicBool>,
    }

    impl ShellProcess for FakeProcess {
        fn kill(&mut self) -> anyhow::Result<()> {
            self.killed.store(true, Ordering::Relaxed);
            Ok(())
        }

        fn try_wait(&mut self) -> Option<i32> {
            None
        }
    }

    struct Probe {
        output_tx: std_mpsc::Sender<Vec<u8>>,
        input_rx: std_mpsc::Receiver<Vec<u8>>,
        killed: Arc<AtomicBool>,
    }

    struct FakeTransport {
        probes: Arc<StdMutex<Vec<Probe>>>,
    }

    impl FakeTransport {
        fn new() -> (Self, Arc<StdMutex<Vec<Probe>>>) {
            let probes = Arc::new(StdMutex::new(Vec::new()));
            (
                Self {
                    probes: Arc::clone(&probes),
                },
                probes,
            )
        }
    }

    #[async_trait]
    impl ShellTransport for FakeTransport {
        async fn open(
            &self,
            _target: &HostTarget,
            _credentials: &Credentials,
        ) -> anyhow::Result<ShellChannel> {
            let (output_tx, output_rx) = std_mpsc::channel();
            let (input_tx, input_rx) = std_mpsc::channel();
            let killed = Arc::new(AtomicBool::new(false));
            self.probes.lock().unwrap().push(Probe {
                output_tx,
                input_rx,
                killed: Arc::clone(&killed),
            });
            Ok(ShellChannel {
                reader: Box::new(ChannelReader {
                    rx: output_rx,
                    pending: Vec::new(),
                }),
                writer: Box::new(ChannelWriter { tx: input_tx }),
                process: Box::new(FakeProcess { killed }),
            })
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        chunks: StdMutex<Vec<(ConnectionId, String)>>,
        lost: StdMutex<Vec<ConnectionId>>,
    }

    #[async_trait]
    impl OutputSink for RecordingSink {
        async fn append_output(&self, connection_id: ConnectionId, chunk: &str) {
            self.chunks
                .lock()
                .unwrap()
                .push((connection_id, chunk.to_string()));
        }

        async fn connection_lost(&self, connection_id: ConnectionId) {
            self.lost.lock().unwrap().push(connection_id);
        }
    }

    fn make_registry() -> (
        ConnectionRegistry,
        Arc<StdMutex<Vec<Probe>>>,
        Arc<ViewerRegistry>,
        Arc<RecordingSink>,
    ) {
        let (transport, probes) = FakeTransport::new();
        let viewers = Arc::new(ViewerRegistry::new());
        let sink = Arc::new(RecordingSink::default());
        let registry = ConnectionRegistry::new(
            Arc::new(transport),
            Arc::clone(&viewers),
            sink.clone() as Arc<dyn OutputSink>,
        );
        (registry, probes, viewers, sink)
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within deadline");
    }

    #[tokio::test]
    async fn output_reaches_sink_in_order() {
        let (registry, probes, _viewers, sink) = make_registry();
        let id = registry
            .connect(HostTarget::new("h1"), Credentials::default())
            .await
            .unwrap();

        {
            let probes = probes.lock().unwrap();
            probes[0].output_tx.send(b"alpha".to_vec()).unwrap();
            probes[0].output_tx.send(b"beta".to_vec()).unwrap();
        }

        wait_for(|| sink.chunks.lock().unwrap().len() >= 2).await;
        let chunks = sink.chunks.lock().unwrap();
        assert_eq!(chunks[0], (id, "alpha".to_string()));
        assert_eq!(chunks[1], (id, "beta".to_string()));
    }

    #[tokio::test]
    async fn input_is_written_to_remote_stream() {
        let (registry, probes, _viewers, _sink) = make_registry();
        let id = registry
            .connect(HostTarget::new("h1"), Credentials::default())
            .await
            .unwrap();

        registry.send_input(id, b"ls -la\n").await.unwrap();

        let written = {
            let probes = probes.lock().unwrap();
            probes[0].input_rx.recv_timeout(Duration::from_secs(1)).unwrap()
        };
        assert_eq!(written, b"ls -la\n");
    }

    #[tokio::test]
    async fn attached_viewer_receives_frames_until_dropped() {
        let (registry, probes, viewers, _sink) = make_registry();
        let id = registry
            .connect(HostTarget::new("h1"), Credentials::default())
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        viewers.add_session("watcher", tx).await;
        registry.attach_viewer(id, "watcher").await.unwrap();

        probes.lock().unwrap()[0]
            .output_tx
            .send(b"prompt$ ".to_vec())
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match msg {
            OutboundMessage::Frame(text) => assert_eq!(text, "prompt$ "),
            other => panic!("unexpected message: {other:?}"),
        }

        // Closed viewer channel gets detached instead of stalling the pump
        drop(rx);
        probes.lock().unwrap()[0]
            .output_tx
            .send(b"more".to_vec())
            .unwrap();
        let conn = registry.get(id).await.unwrap();
        for _ in 0..200 {
            if conn.viewer_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(conn.viewer_count().await, 0);
    }

    #[tokio::test]
    async fn disconnect_kills_process_and_forgets_connection() {
        let (registry, probes, _viewers, sink) = make_registry();
        let id = registry
            .connect(HostTarget::new("h1"), Credentials::default())
            .await
            .unwrap();

        registry.disconnect(id).await.unwrap();
        assert!(probes.lock().unwrap()[0].killed.load(Ordering::Relaxed));
        assert!(!registry.contains(id).await);
        assert!(sink.lost.lock().unwrap().contains(&id));

        match registry.send_input(id, b"x").await {
            Err(BridgeError::ConnectionNotFound(_)) => {}
            other => panic!("expected ConnectionNotFound, got {other:?}"),
        }
        match registry.disconnect(id).await {
            Err(BridgeError::ConnectionNotFound(_)) => {}
            other => panic!("expected ConnectionNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_eof_marks_connection_dead() {
        let (registry, probes, _viewers, sink) = make_registry();
        let id = registry
            .connect(HostTarget::new("h1"), Credentials::default())
            .await
            .unwrap();

        // Dropping the output sender is EOF on the remote stream
        probes.lock().unwrap().clear();

        wait_for(|| sink.lost.lock().unwrap().contains(&id)).await;
        let conn = registry.get(id).await.unwrap();
        assert!(!conn.is_alive());
        match registry.send_input(id, b"x").await {
            Err(BridgeError::ConnectionUnavailable(_)) => {}
            other => panic!("expected ConnectionUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_cap_is_enforced() {
        let (transport, _probes) = FakeTransport::new();
        let viewers = Arc::new(ViewerRegistry::new());
        let sink = Arc::new(RecordingSink::default());
        let registry = ConnectionRegistry::new(
            Arc::new(transport),
            viewers,
            sink as Arc<dyn OutputSink>,
        )
        .with_max_connections(1);

        registry
            .connect(HostTarget::new("h1"), Credentials::default())
            .await
            .unwrap();
        let err = registry
            .connect(HostTarget::new("h2"), Credentials::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
    }
}
