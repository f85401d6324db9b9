mod errors;
mod icmp;
mod shutdown;
mod socket;

pub use crate::errors::Error;
pub use crate::icmp::{EchoReply, EchoRequest, ICMP_HEADER_SIZE, PAYLOAD_SIZE};
use crate::socket::Socket;

use parking_lot::Mutex;
use shutdown::Shutdown;
use socket2::{Domain, Protocol, Type};
use tokio::sync::broadcast;
use tokio::task;
use tracing::{debug, trace, warn};

use core::fmt;
use std::{
    collections::HashMap,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// number of echo requests issued per measurement burst, unless overridden by config
pub const DEFAULT_PROBES: u32 = 4;
/// ident/seq base; replies below this are considered stale or foreign and are ignored
pub const SEQ_BASE: u16 = 1000;
const RECV_BUFFER_SIZE: usize = 512;

type SessionMap = Arc<Mutex<HashMap<String, Arc<MeasurementSession>>>>;

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64
}

/// a socket that knows how to speak ICMPv4 echo/reply
struct IcmpSocket {
    inner: Socket,
    decode_header: bool,
}

impl IcmpSocket {
    fn new() -> io::Result<Self> {
        let (inner, decode_header) = match Socket::new(Domain::IPV4, Type::DGRAM, Protocol::ICMPV4)
        {
            Ok(s) => (s, false),
            Err(err) => {
                warn!(
                    ?err,
                    "error building DGRAM socket, check ping_group_range. trying RAW socket"
                );
                (
                    Socket::new(Domain::IPV4, Type::RAW, Protocol::ICMPV4)?,
                    true,
                )
            }
        };
        debug!("created new icmpv4 socket");
        Ok(Self {
            inner,
            decode_header,
        })
    }

    async fn request(&self, target: Ipv4Addr, req: &EchoRequest<'_>) -> io::Result<()> {
        let target = SocketAddr::new(IpAddr::V4(target), 0);
        let mut buf = [0u8; ICMP_HEADER_SIZE + PAYLOAD_SIZE];
        req.encode(&mut buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        trace!(?target, seq_cnt = req.seq_cnt, "sending echo request");
        self.inner.send_to(&buf, &target).await?;
        Ok(())
    }

    /// not cancel-safe
    async fn reply(&self) -> io::Result<(EchoReply, SocketAddr)> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let (n, addr) = self.inner.recv(&mut buf).await?;
            trace!(buf = ?&buf[..n], ?addr, "received data on socket");
            if let Ok(reply) = EchoReply::decode(&buf[..n], self.decode_header) {
                return Ok((reply, addr));
            }
        }
    }
}

/// the result of a single measurement burst against one address (§4.1 "Summary derivation")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementResult {
    pub address: String,
    pub received: u32,
    pub alive: bool,
    pub loss_percent: u32,
    pub min_ms: Option<i64>,
    pub max_ms: Option<i64>,
    pub avg_ms: Option<i64>,
}

#[derive(Debug, Default)]
struct SessionState {
    received: u32,
    rtts: Vec<i64>,
}

/// transient accumulator for one burst's replies, shared between the engine's
/// reader task and the `send_echoes` caller. (C2)
#[derive(Debug)]
pub struct MeasurementSession {
    inner: Mutex<SessionState>,
}

impl MeasurementSession {
    fn new() -> Self {
        Self {
            inner: Mutex::new(SessionState::default()),
        }
    }

    fn record_reply(&self, rtt_ms: i64) {
        let mut inner = self.inner.lock();
        inner.rtts.push(rtt_ms);
        inner.received += 1;
    }

    fn summarize(&self, address: String, probes: u32) -> MeasurementResult {
        let inner = self.inner.lock();
        let received = inner.received;
        let alive = received > 0;
        let loss_percent = 100u32
            .saturating_sub((100 / probes) * received)
            .clamp(0, 100);

        let (min_ms, max_ms, avg_ms) = if alive {
            let min = inner.rtts.iter().min().copied().expect("received > 0");
            let max = inner.rtts.iter().max().copied().expect("received > 0");
            let avg = inner.rtts.iter().sum::<i64>() / inner.rtts.len() as i64;
            (Some(min), Some(max), Some(avg))
        } else {
            (None, None, None)
        };

        MeasurementResult {
            address,
            received,
            alive,
            loss_percent,
            min_ms,
            max_ms,
            avg_ms,
        }
    }
}

/// guard that always evicts a live session on drop, even if `send_echoes` is cancelled
struct Guard {
    sessions: SessionMap,
    key: String,
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.sessions.lock().remove(&self.key);
    }
}

/// owns the raw ICMP socket and demultiplexes inbound replies to outstanding
/// measurement sessions by peer address. (C1)
pub struct IcmpEngine {
    socket: Arc<IcmpSocket>,
    sessions: SessionMap,
    // on Drop this will stop our spawned reader task, but it is never read
    #[allow(dead_code)]
    notify_shutdown: broadcast::Sender<()>,
}

impl fmt::Debug for IcmpEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IcmpEngine").finish_non_exhaustive()
    }
}

impl Drop for IcmpEngine {
    fn drop(&mut self) {
        debug!("ICMP engine dropped");
    }
}

impl IcmpEngine {
    /// open a socket and start the background reader task
    pub fn new() -> errors::Result<Self> {
        let socket = Arc::new(IcmpSocket::new().map_err(errors::Error::SocketInit)?);
        // when notify_shutdown is dropped, the reader task shuts down
        let (notify_shutdown, _) = broadcast::channel(1);
        let sessions: SessionMap = Arc::new(Mutex::new(HashMap::new()));

        let reader_socket = socket.clone();
        let reader_sessions = sessions.clone();
        let mut shutdown = Shutdown::new(notify_shutdown.subscribe());
        task::spawn(async move {
            loop {
                tokio::select! {
                    ret = reader_socket.reply() => {
                        if let Ok((reply, addr)) = ret {
                            // a panic anywhere in per-datagram handling must not
                            // take down the reader task for the process's
                            // remaining lifetime (§7 "Panic inside reader callback").
                            let sessions = &reader_sessions;
                            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                                handle_reply(sessions, reply, addr);
                            }));
                            if let Err(payload) = outcome {
                                warn!(target: "panic", panic = %panic_message(&payload), "recovered panic in ICMP reader callback");
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        debug!("ICMP engine reader shutdown");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            socket,
            sessions,
            notify_shutdown,
        })
    }

    /// issue `probes` echo requests to `address`, one second apart, and collect
    /// replies for `probes` additional seconds after the last send.
    pub async fn send_echoes(&self, address: &str, probes: u32) -> errors::Result<MeasurementResult> {
        let ip: Ipv4Addr = address
            .parse()
            .map_err(|_| errors::Error::InvalidAddress(address.to_string()))?;

        let session = Arc::new(MeasurementSession::new());
        self.sessions
            .lock()
            .insert(address.to_string(), session.clone());
        let _guard = Guard {
            sessions: self.sessions.clone(),
            key: address.to_string(),
        };

        let mut write_failures = 0u32;
        for i in 0..probes {
            let seq = SEQ_BASE.wrapping_add(i as u16);
            let payload = now_ns().to_le_bytes();
            let req = EchoRequest {
                ident: seq,
                seq_cnt: seq,
                payload: &payload,
            };
            if let Err(err) = self.socket.request(ip, &req).await {
                warn!(?err, %address, seq, "failed to write probe, counting as missed");
                write_failures += 1;
            }
            if i + 1 < probes {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        if probes > 0 && write_failures == probes {
            return Err(errors::Error::SocketWrite {
                address: address.to_string(),
                source: io::Error::new(io::ErrorKind::Other, "every probe failed to send"),
            });
        }

        debug!(%address, probes, write_failures, "probes sent, collecting replies");
        tokio::time::sleep(Duration::from_secs(probes as u64)).await;

        Ok(session.summarize(address.to_string(), probes))
    }

    /// explicitly stop the background reader task that is spawned in `new`
    pub fn shutdown(self) {
        drop(self);
    }
}

/// best-effort extraction of a human-readable message from a caught panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn handle_reply(sessions: &SessionMap, reply: EchoReply, addr: SocketAddr) {
    if reply.seq_cnt < SEQ_BASE {
        trace!(seq_cnt = reply.seq_cnt, "ignoring reply below seq base");
        return;
    }
    let key = addr.ip().to_string();
    let session = sessions.lock().get(&key).cloned();
    let Some(session) = session else {
        warn!(%key, "reply for address with no live session, dropping");
        return;
    };
    let now = now_ns();
    let delta_ms = (now.saturating_sub(reply.sent_at_ns()) / 1_000_000) as i64;
    debug!(%key, seq_cnt = reply.seq_cnt, delta_ms, "received reply");
    session.record_reply(delta_ms);
}
