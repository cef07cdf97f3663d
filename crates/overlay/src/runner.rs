//! The overlay node runner: lifecycle, puts, bounded gets, peer traffic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, mpsc};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::runtime::Runtime;

use crate::OverlayError;
use crate::key::InfoHash;
use crate::policy::{TypeFilter, ValueType};
use crate::proto::Message;
use crate::record::Record;
use crate::replica::Replica;

/// How long a search keeps collecting peer responses before settling for
/// whatever has arrived. Callers bound the overall wait separately.
const COLLECT_WINDOW: Duration = Duration::from_secs(2);

/// How often the background pump flushes the outbound queues.
const PUMP_INTERVAL: Duration = Duration::from_millis(50);

/// Records per `GetResp` datagram.
const RESPONSE_CHUNK: usize = 32;

const PRIORITY: usize = 0;
const REGULAR: usize = 1;

//================================================================================================
// Types
//================================================================================================

/// Network configuration for a [`Runner`].
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// The private network id; datagrams from other networks are dropped.
    pub network: u32,
    /// Whether the node runs its own worker threads.
    pub threaded: bool,
    /// Total inbound requests admitted per second; `-1` for unlimited.
    pub max_req_per_sec: i32,
    /// Inbound requests admitted per peer per second; `-1` for unlimited.
    pub max_peer_req_per_sec: i32,
    /// Probe up to ten successive ports when the requested one is taken.
    pub retry_ports: bool,
}

/// A handle on the result of a `get`: a future the caller must bound.
pub struct GetFuture {
    rx: mpsc::Receiver<Vec<Record>>,
}

/// An overlay node.
///
/// The runner owns a private tokio runtime. `put` is fire-and-forget
/// through a two-priority outbound queue; `get` returns a [`GetFuture`].
/// A runner is one-shot: once shut down it cannot be restarted.
pub struct Runner {
    inner: Arc<Inner>,
    runtime: Mutex<Option<Runtime>>,
}

struct Inner {
    config: Mutex<RunnerConfig>,
    node_id: OnceLock<InfoHash>,
    replica: Mutex<Replica>,
    peers: Mutex<HashSet<SocketAddr>>,
    outbound: [Mutex<VecDeque<(SocketAddr, Vec<u8>)>>; 2],
    socket: OnceLock<Arc<UdpSocket>>,
    handle: OnceLock<tokio::runtime::Handle>,
    running: AtomicBool,
    port: AtomicU16,
    next_token: AtomicU64,
    pending: Mutex<HashMap<u64, Pending>>,
    inbound_limit: Mutex<Option<TokenBucket>>,
    peer_limits: Mutex<HashMap<IpAddr, TokenBucket>>,
    searches: Mutex<VecDeque<String>>,
}

struct Pending {
    key: InfoHash,
    filter: TypeFilter,
    waiting: HashSet<SocketAddr>,
    tx: mpsc::Sender<Vec<Record>>,
}

struct TokenBucket {
    rate: i32,
    tokens: f64,
    last: Instant,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            network: 42,
            threaded: true,
            max_req_per_sec: -1,
            max_peer_req_per_sec: -1,
            retry_ports: true,
        }
    }
}

impl GetFuture {
    /// Waits at most `timeout` for the search to settle.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Timeout`] when the window expires first.
    pub fn wait_for(self, timeout: Duration) -> Result<Vec<Record>, OverlayError> {
        self.rx.recv_timeout(timeout).map_err(|_| OverlayError::Timeout)
    }

    fn ready(records: Vec<Record>) -> Self {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(records);
        GetFuture { rx }
    }
}

impl Default for Runner {
    fn default() -> Self {
        Runner::new()
    }
}

impl Runner {
    /// Creates a stopped runner; call [`Runner::run`] to bring it up.
    pub fn new() -> Self {
        Runner {
            inner: Arc::new(Inner {
                config: Mutex::new(RunnerConfig::default()),
                node_id: OnceLock::new(),
                replica: Mutex::new(Replica::new()),
                peers: Mutex::new(HashSet::new()),
                outbound: [Mutex::new(VecDeque::new()), Mutex::new(VecDeque::new())],
                socket: OnceLock::new(),
                handle: OnceLock::new(),
                running: AtomicBool::new(false),
                port: AtomicU16::new(0),
                next_token: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                inbound_limit: Mutex::new(None),
                peer_limits: Mutex::new(HashMap::new()),
                searches: Mutex::new(VecDeque::new()),
            }),
            runtime: Mutex::new(None),
        }
    }

    /// Binds the node and starts its worker threads, returning the bound
    /// port. Pass port `0` for an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::PortsInUse`] when no port in the probed
    /// range could be bound, or the underlying I/O error for anything else.
    pub fn run(&self, port: u16, config: RunnerConfig) -> Result<u16, OverlayError> {
        if self.is_running() {
            return Ok(self.port());
        }

        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.worker_threads(if config.threaded { 2 } else { 1 });
        let runtime = builder.enable_all().build()?;

        let attempts: u16 = if config.retry_ports && port != 0 { 10 } else { 1 };
        let mut bound = None;
        for probe in port..port.saturating_add(attempts) {
            match std::net::UdpSocket::bind(("0.0.0.0", probe)) {
                Ok(socket) => {
                    bound = Some(socket);
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    tracing::debug!(port = probe, "overlay port in use, probing the next one");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let Some(std_socket) = bound else {
            return Err(OverlayError::PortsInUse { start: port });
        };
        let actual = std_socket.local_addr()?.port();
        std_socket.set_nonblocking(true)?;
        // Register with the runtime's reactor without blocking the caller;
        // `run` stays callable from inside other runtimes.
        let socket = {
            let _guard = runtime.enter();
            UdpSocket::from_std(std_socket)?
        };

        *self.inner.config.lock() = config.clone();
        *self.inner.inbound_limit.lock() = Some(TokenBucket::new(config.max_req_per_sec));
        self.inner.port.store(actual, Ordering::Release);
        let _ = self.inner.node_id.set(InfoHash::get(format!(
            "overlay-node:{actual}:{:?}",
            Instant::now()
        )));

        let socket = Arc::new(socket);
        let _ = self.inner.socket.set(socket.clone());
        let _ = self.inner.handle.set(runtime.handle().clone());

        let inner = self.inner.clone();
        runtime.spawn(recv_loop(inner, socket));
        let inner = self.inner.clone();
        runtime.spawn(pump_loop(inner));

        self.inner.running.store(true, Ordering::Release);
        *self.runtime.lock() = Some(runtime);
        tracing::info!(port = actual, network = config.network, "overlay node running");
        Ok(actual)
    }

    /// Whether the node is up.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// The bound port, zero before `run`.
    pub fn port(&self) -> u16 {
        self.inner.port.load(Ordering::Acquire)
    }

    /// Registers a record kind; records of unregistered kinds are dropped.
    pub fn register_type(&self, vt: ValueType) {
        self.inner.replica.lock().register(vt);
    }

    /// Adds a known peer and greets it.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::BadPeer`] when `host:port` does not resolve.
    pub fn bootstrap(&self, host: &str, port: u16) -> Result<(), OverlayError> {
        let addr = (host, port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| OverlayError::BadPeer {
                peer: format!("{host}:{port}"),
            })?;
        self.inner.peers.lock().insert(addr);
        let network = self.inner.config.lock().network;
        self.inner.send_now(addr, &Message::Hello { network });
        tracing::info!(peer = %addr, "bootstrapping");
        Ok(())
    }

    /// Stores a record at a key: applied to the local replica immediately,
    /// queued for replication to every known peer, never awaited.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::NotRunning`] before `run` or after shutdown.
    pub fn put(&self, key: &InfoHash, record: Record) -> Result<(), OverlayError> {
        if !self.is_running() {
            return Err(OverlayError::NotRunning);
        }
        let stored = self.inner.replica.lock().apply(key, record.clone());
        // Replicate the stamped form when the local replica accepted the
        // record, the caller's form otherwise; each peer decides for itself.
        let outgoing = stored.unwrap_or(record);
        let peers: Vec<SocketAddr> = self.inner.peers.lock().iter().copied().collect();
        if peers.is_empty() {
            return Ok(());
        }
        let network = self.inner.config.lock().network;
        let msg = Message::Put {
            network,
            key: *key,
            record: outgoing,
        };
        if let Ok(bytes) = serde_json::to_vec(&msg) {
            let mut queue = self.inner.outbound[REGULAR].lock();
            for peer in peers {
                queue.push_back((peer, bytes.clone()));
            }
        }
        Ok(())
    }

    /// Starts a search for every record at `key` matching `filter`.
    ///
    /// The future settles once all reachable peers have answered or the
    /// collection window has elapsed; with no peers it is ready at once.
    pub fn get(&self, key: &InfoHash, filter: TypeFilter) -> GetFuture {
        self.inner.log_search(key);
        let local = self.inner.replica.lock().get(key, filter);
        let peers: HashSet<SocketAddr> = self.inner.peers.lock().clone();
        if peers.is_empty() || !self.is_running() {
            return GetFuture::ready(local);
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        self.inner.pending.lock().insert(
            token,
            Pending {
                key: *key,
                filter,
                waiting: peers.clone(),
                tx,
            },
        );

        let network = self.inner.config.lock().network;
        let msg = Message::GetReq {
            network,
            token,
            key: *key,
        };
        if let Ok(bytes) = serde_json::to_vec(&msg) {
            let mut queue = self.inner.outbound[PRIORITY].lock();
            for peer in &peers {
                queue.push_back((*peer, bytes.clone()));
            }
        }
        self.inner.flush(PRIORITY);

        if let Some(handle) = self.inner.handle.get() {
            let inner = self.inner.clone();
            handle.spawn(async move {
                tokio::time::sleep(COLLECT_WINDOW).await;
                inner.finalize(token);
            });
        }
        GetFuture { rx }
    }

    /// Pumps one outbound queue: the high-priority queue when it has
    /// traffic, the regular queue otherwise. Two successive calls drain
    /// both.
    pub fn loop_(&self) {
        if !self.inner.flush(PRIORITY) {
            self.inner.flush(REGULAR);
        }
    }

    /// Stops accepting work, flushes both queues, and invokes `cb` from
    /// another thread once the node has quiesced.
    pub fn shutdown(&self, cb: impl FnOnce() + Send + 'static) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.flush(PRIORITY);
        self.inner.flush(REGULAR);
        std::thread::spawn(cb);
    }

    /// Tears down the worker threads. Call after [`Runner::shutdown`].
    pub fn join(&self) {
        if let Some(runtime) = self.runtime.lock().take() {
            // Blocking teardown is forbidden inside an async context, and
            // callers may drop their storage from one.
            if tokio::runtime::Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(Duration::from_secs(2));
            }
        }
    }

    /// A human-readable status block for this node.
    pub fn node_info(&self) -> String {
        let config = self.inner.config.lock().clone();
        let id = self
            .inner
            .node_id
            .get()
            .map(ToString::to_string)
            .unwrap_or_else(|| "(not started)".into());
        let peers = self.inner.peers.lock().len();
        let keys = self.inner.replica.lock().key_count();
        format!(
            "Overlay node {id}\n\
             Belongs to network {} ({}) on port {}\n\
             Connected peers: {peers}\n\
             Keys stored locally: {keys}\n",
            config.network,
            if config.network == 0 { "public" } else { "private" },
            self.port(),
        )
    }

    /// One line per locally stored key.
    pub fn storage_log(&self) -> String {
        self.inner.replica.lock().dump()
    }

    /// The known peer set, one address per line.
    pub fn routing_tables_log(&self) -> String {
        let mut peers: Vec<String> = self
            .inner
            .peers
            .lock()
            .iter()
            .map(ToString::to_string)
            .collect();
        peers.sort();
        peers.join("\n")
    }

    /// The most recent searches, oldest first.
    pub fn searches_log(&self) -> String {
        let searches = self.inner.searches.lock();
        searches.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

impl Inner {
    fn handle_datagram(&self, bytes: &[u8], from: SocketAddr) {
        let Ok(msg) = serde_json::from_slice::<Message>(bytes) else {
            tracing::trace!(peer = %from, "undecodable datagram dropped");
            return;
        };
        let config = self.config.lock().clone();
        if let Some(network) = msg.network() {
            if network != config.network {
                tracing::trace!(peer = %from, network, "foreign-network datagram dropped");
                return;
            }
        }
        // Responses we solicited bypass the limiter; requests pay for
        // themselves and are dropped silently over budget.
        if !matches!(msg, Message::GetResp { .. }) && !self.admit(from, &config) {
            return;
        }
        match msg {
            Message::Hello { .. } => {
                self.peers.lock().insert(from);
                self.send_now(
                    from,
                    &Message::HelloAck {
                        network: config.network,
                    },
                );
            }
            Message::HelloAck { .. } => {
                self.peers.lock().insert(from);
            }
            Message::Put { key, record, .. } => {
                self.replica.lock().apply(&key, record);
            }
            Message::GetReq { token, key, .. } => {
                let records = self.replica.lock().get(&key, TypeFilter::Any);
                // Chunk the response so large result sets fit in datagrams.
                let chunks: Vec<&[Record]> = if records.is_empty() {
                    vec![&records[..]]
                } else {
                    records.chunks(RESPONSE_CHUNK).collect()
                };
                let last = chunks.len() - 1;
                for (i, chunk) in chunks.into_iter().enumerate() {
                    self.send_now(
                        from,
                        &Message::GetResp {
                            token,
                            key,
                            records: chunk.to_vec(),
                            done: i == last,
                        },
                    );
                }
            }
            Message::GetResp {
                token,
                key,
                records,
                done,
            } => {
                {
                    let mut replica = self.replica.lock();
                    for record in records {
                        replica.apply(&key, record);
                    }
                }
                if !done {
                    return;
                }
                let settled = {
                    let mut pending = self.pending.lock();
                    match pending.get_mut(&token) {
                        Some(p) => {
                            p.waiting.remove(&from);
                            p.waiting.is_empty()
                        }
                        None => false,
                    }
                };
                if settled {
                    self.finalize(token);
                }
            }
        }
    }

    /// Resolves a pending search with the merged local snapshot. Safe to
    /// call twice; only the first call delivers.
    fn finalize(&self, token: u64) {
        let Some(pending) = self.pending.lock().remove(&token) else {
            return;
        };
        let records = self.replica.lock().get(&pending.key, pending.filter);
        let _ = pending.tx.send(records);
    }

    /// Flushes one outbound queue; returns whether anything was sent.
    fn flush(&self, which: usize) -> bool {
        let Some(socket) = self.socket.get() else {
            return false;
        };
        let mut sent = false;
        let mut queue = self.outbound[which].lock();
        while let Some((addr, bytes)) = queue.pop_front() {
            match socket.try_send_to(&bytes, addr) {
                Ok(_) => sent = true,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    queue.push_front((addr, bytes));
                    break;
                }
                Err(e) => {
                    tracing::trace!(peer = %addr, error = %e, "outbound datagram dropped");
                }
            }
        }
        sent
    }

    fn send_now(&self, addr: SocketAddr, msg: &Message) {
        let Some(socket) = self.socket.get() else {
            return;
        };
        if let Ok(bytes) = serde_json::to_vec(msg) {
            if let Err(e) = socket.try_send_to(&bytes, addr) {
                tracing::trace!(peer = %addr, error = %e, "direct send failed");
            }
        }
    }

    fn admit(&self, from: SocketAddr, config: &RunnerConfig) -> bool {
        {
            let mut global = self.inbound_limit.lock();
            if let Some(bucket) = global.as_mut() {
                if !bucket.allow() {
                    return false;
                }
            }
        }
        let mut per_peer = self.peer_limits.lock();
        per_peer
            .entry(from.ip())
            .or_insert_with(|| TokenBucket::new(config.max_peer_req_per_sec))
            .allow()
    }

    fn log_search(&self, key: &InfoHash) {
        let mut searches = self.searches.lock();
        if searches.len() >= 64 {
            searches.pop_front();
        }
        searches.push_back(format!("get {key}"));
    }
}

impl TokenBucket {
    fn new(rate: i32) -> Self {
        TokenBucket {
            rate,
            tokens: rate.max(0) as f64,
            last: Instant::now(),
        }
    }

    fn allow(&mut self) -> bool {
        if self.rate < 0 {
            return true;
        }
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.rate as f64).min(self.rate as f64);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn recv_loop(inner: Arc<Inner>, socket: Arc<UdpSocket>) {
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => inner.handle_datagram(&buf[..len], from),
            // Unreachable-peer blowback surfaces here on some platforms;
            // only a shutdown actually ends the loop.
            Err(e) => {
                tracing::debug!(error = %e, "overlay socket error");
                if !inner.running.load(Ordering::Acquire) {
                    break;
                }
            }
        }
    }
}

async fn pump_loop(inner: Arc<Inner>) {
    let mut tick = tokio::time::interval(PUMP_INTERVAL);
    loop {
        tick.tick().await;
        inner.flush(PRIORITY);
        inner.flush(REGULAR);
    }
}

//================================================================================================
// Tests
//================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const KIND: u16 = 4242;

    fn test_type() -> ValueType {
        ValueType::new(
            KIND,
            "test records",
            Duration::from_secs(3600),
            Arc::new(|_, _| true),
            Arc::new(|_, _, _| true),
        )
    }

    fn started() -> Runner {
        let runner = Runner::new();
        runner.register_type(test_type());
        runner.run(0, RunnerConfig::default()).unwrap();
        runner
    }

    #[test]
    fn put_then_get_locally() {
        let runner = started();
        let key = InfoHash::get("somewhere");
        runner.put(&key, Record::new(KIND, 7, "hello")).unwrap();

        let records = runner
            .get(&key, TypeFilter::Kind(KIND))
            .wait_for(Duration::from_secs(1))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, b"hello");
        assert!(records[0].timestamp > 0);
    }

    #[test]
    fn put_before_run_is_refused() {
        let runner = Runner::new();
        let key = InfoHash::get("k");
        assert!(matches!(
            runner.put(&key, Record::new(KIND, 1, "x")),
            Err(OverlayError::NotRunning)
        ));
    }

    #[test]
    fn two_nodes_exchange_records() {
        let seeder = started();
        let reader = started();
        let key = InfoHash::get("shared");
        seeder.put(&key, Record::new(KIND, 1, "replicated")).unwrap();

        reader
            .bootstrap("127.0.0.1", seeder.port())
            .unwrap();
        // Give the hello round trip a moment to land.
        std::thread::sleep(Duration::from_millis(200));

        let records = reader
            .get(&key, TypeFilter::Kind(KIND))
            .wait_for(Duration::from_secs(4))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, b"replicated");
    }

    #[test]
    fn taken_port_is_an_error_without_retry() {
        let first = started();
        let second = Runner::new();
        let config = RunnerConfig {
            retry_ports: false,
            ..RunnerConfig::default()
        };
        assert!(matches!(
            second.run(first.port(), config),
            Err(OverlayError::PortsInUse { .. })
        ));
    }

    #[test]
    fn taken_port_probes_forward_with_retry() {
        let first = started();
        let second = Runner::new();
        let port = second.run(first.port(), RunnerConfig::default()).unwrap();
        assert_ne!(port, first.port());
        assert!(port > first.port());
        assert!(port <= first.port() + 10);
    }

    #[test]
    fn shutdown_invokes_callback() {
        let runner = started();
        let (tx, rx) = mpsc::channel();
        runner.shutdown(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(!runner.is_running());
        runner.join();
    }
}
