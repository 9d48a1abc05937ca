// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Persistent connection to the rig control daemon.
//!
//! A single task owns the socket: it dials, redials after a fixed delay when
//! the connection drops, and performs one request/response exchange at a
//! time. rigctld replies carry no correlation id, so callers never share the
//! socket. A plain [`RigLink::send`] is rejected with [`RigError::Busy`] while
//! another command or a [`RigSession`] holds the link.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::rig::command::RigCommand;
use crate::rig::endpoint::RigEndpoint;
use crate::rig::request::LinkRequest;
use crate::rig::{RigControl, RigFuture};
use crate::{RigError, RigResult};

const MAX_LINE_BYTES: usize = 4 * 1024;

/// Timing of the rig link.
#[derive(Debug, Clone)]
pub struct RigLinkConfig {
    pub connect_timeout: Duration,
    /// Default per-command reply timeout.
    pub command_timeout: Duration,
    /// Fixed delay between a dropped connection and the next dial.
    pub reconnect_delay: Duration,
    /// Quiet period required after a timed-out command before the next
    /// command is written.
    pub resync_window: Duration,
}

impl Default for RigLinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(3),
            reconnect_delay: Duration::from_secs(5),
            resync_window: Duration::from_millis(100),
        }
    }
}

/// Connectivity of the rig link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Connecting,
    Up,
    Down,
}

/// Opens the byte stream the link talks over.
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn dial(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Human-readable target for log lines.
    fn describe(&self) -> String;
}

/// Dials rigctld over TCP.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    endpoint: RigEndpoint,
}

impl TcpDialer {
    pub fn new(endpoint: RigEndpoint) -> Self {
        Self { endpoint }
    }
}

impl Dialer for TcpDialer {
    type Stream = TcpStream;

    fn dial(&self) -> impl Future<Output = io::Result<TcpStream>> + Send {
        let addr = self.endpoint.connect_addr();
        async move {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok::<TcpStream, io::Error>(stream)
        }
    }

    fn describe(&self) -> String {
        self.endpoint.connect_addr()
    }
}

/// Cloneable handle to the link task.
#[derive(Debug, Clone)]
pub struct RigLink {
    requests: mpsc::Sender<LinkRequest>,
    status: watch::Receiver<LinkStatus>,
    slot: Arc<Mutex<()>>,
    command_timeout: Duration,
}

impl RigLink {
    /// Spawn a link task dialing rigctld at `endpoint`.
    pub fn spawn_tcp(
        endpoint: RigEndpoint,
        config: RigLinkConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        Self::spawn(TcpDialer::new(endpoint), config, shutdown_rx)
    }

    pub fn spawn<D: Dialer>(
        dialer: D,
        config: RigLinkConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (requests, rx) = mpsc::channel(1);
        let (status_tx, status) = watch::channel(LinkStatus::Connecting);
        let command_timeout = config.command_timeout;
        let handle = tokio::spawn(run_link(dialer, config, rx, status_tx, shutdown_rx));
        let link = Self {
            requests,
            status,
            slot: Arc::new(Mutex::new(())),
            command_timeout,
        };
        (link, handle)
    }

    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    pub fn is_up(&self) -> bool {
        self.status() == LinkStatus::Up
    }

    pub fn subscribe_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Send one raw command line and return the first non-empty reply line.
    pub async fn send(&self, line: &str) -> RigResult<String> {
        self.send_with_timeout(line, self.command_timeout).await
    }

    pub async fn send_with_timeout(&self, line: &str, timeout: Duration) -> RigResult<String> {
        let _slot = self.slot.try_lock().map_err(|_| RigError::Busy)?;
        exchange(&self.requests, &self.status, line.to_string(), 1, timeout).await
    }

    /// Wait for exclusive use of the link.
    pub async fn session(&self) -> RigSession {
        let slot = self.slot.clone().lock_owned().await;
        self.session_with(slot)
    }

    /// Take exclusive use of the link, or fail with `Busy`.
    pub fn try_session(&self) -> RigResult<RigSession> {
        let slot = self.slot.clone().try_lock_owned().map_err(|_| RigError::Busy)?;
        Ok(self.session_with(slot))
    }

    fn session_with(&self, slot: OwnedMutexGuard<()>) -> RigSession {
        RigSession {
            _slot: slot,
            requests: self.requests.clone(),
            status: self.status.clone(),
            command_timeout: self.command_timeout,
        }
    }
}

impl RigControl for RigLink {
    fn execute(&mut self, command: RigCommand) -> RigFuture<'_, String> {
        Box::pin(async move {
            let _slot = self.slot.try_lock().map_err(|_| RigError::Busy)?;
            exchange(
                &self.requests,
                &self.status,
                command.to_string(),
                command.reply_lines(),
                self.command_timeout,
            )
            .await
        })
    }
}

/// Exclusive hold on the link. Plain sends are rejected until it is dropped.
#[derive(Debug)]
pub struct RigSession {
    _slot: OwnedMutexGuard<()>,
    requests: mpsc::Sender<LinkRequest>,
    status: watch::Receiver<LinkStatus>,
    command_timeout: Duration,
}

impl RigSession {
    pub async fn send(&mut self, line: &str) -> RigResult<String> {
        let timeout = self.command_timeout;
        self.send_with_timeout(line, timeout).await
    }

    pub async fn send_with_timeout(&mut self, line: &str, timeout: Duration) -> RigResult<String> {
        exchange(&self.requests, &self.status, line.to_string(), 1, timeout).await
    }
}

impl RigControl for RigSession {
    fn execute(&mut self, command: RigCommand) -> RigFuture<'_, String> {
        Box::pin(async move {
            exchange(
                &self.requests,
                &self.status,
                command.to_string(),
                command.reply_lines(),
                self.command_timeout,
            )
            .await
        })
    }
}

async fn exchange(
    requests: &mpsc::Sender<LinkRequest>,
    status: &watch::Receiver<LinkStatus>,
    line: String,
    reply_lines: usize,
    timeout: Duration,
) -> RigResult<String> {
    if *status.borrow() != LinkStatus::Up {
        return Err(RigError::LinkDown);
    }
    let (respond_to, reply) = oneshot::channel();
    requests
        .send(LinkRequest {
            line,
            reply_lines,
            timeout,
            respond_to,
        })
        .await
        .map_err(|_| RigError::LinkDown)?;
    reply.await.map_err(|_| RigError::LinkDown)?
}

enum ConnectionEnd {
    Shutdown,
    Released,
    Closed,
}

enum ExchangeError {
    Timeout,
    Io(io::Error),
}

impl From<io::Error> for ExchangeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

async fn run_link<D: Dialer>(
    dialer: D,
    config: RigLinkConfig,
    mut rx: mpsc::Receiver<LinkRequest>,
    status_tx: watch::Sender<LinkStatus>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let target = dialer.describe();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        status_tx.send_replace(LinkStatus::Connecting);
        info!("Rig link: connecting to {}", target);
        match time::timeout(config.connect_timeout, dialer.dial()).await {
            Ok(Ok(stream)) => {
                info!("Rig link: connected to {}", target);
                status_tx.send_replace(LinkStatus::Up);
                match serve_connection(stream, &config, &mut rx, &mut shutdown_rx).await {
                    Ok(ConnectionEnd::Shutdown) => break,
                    Ok(ConnectionEnd::Released) => {
                        debug!("Rig link: all handles dropped");
                        break;
                    }
                    Ok(ConnectionEnd::Closed) => {
                        warn!("Rig link: {} closed the connection", target);
                    }
                    Err(e) => warn!("Rig link to {} dropped: {}", target, e),
                }
            }
            Ok(Err(e)) => warn!("Rig link: connect to {} failed: {}", target, e),
            Err(_) => warn!(
                "Rig link: connect to {} timed out after {:?}",
                target, config.connect_timeout
            ),
        }

        status_tx.send_replace(LinkStatus::Down);
        info!("Rig link: reconnecting in {:?}", config.reconnect_delay);
        if !hold_down(config.reconnect_delay, &mut rx, &mut shutdown_rx).await {
            break;
        }
    }

    status_tx.send_replace(LinkStatus::Down);
    info!("Rig link shutting down");
}

/// Wait out the reconnect delay, failing any request that shows up meanwhile.
/// Returns false when the link should stop instead of redialing.
async fn hold_down(
    delay: Duration,
    rx: &mut mpsc::Receiver<LinkRequest>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let sleep = time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown_rx.changed() => {
                match changed {
                    Ok(()) if *shutdown_rx.borrow() => return false,
                    Ok(()) => {}
                    Err(_) => return false,
                }
            }
            req = rx.recv() => {
                let Some(req) = req else {
                    return false;
                };
                let _ = req.respond_to.send(Err(RigError::LinkDown));
            }
        }
    }
}

async fn serve_connection<S>(
    stream: S,
    config: &RigLinkConfig,
    rx: &mut mpsc::Receiver<LinkRequest>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> io::Result<ConnectionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut resync = false;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                match changed {
                    Ok(()) if *shutdown_rx.borrow() => return Ok(ConnectionEnd::Shutdown),
                    Ok(()) => {}
                    Err(_) => return Ok(ConnectionEnd::Shutdown),
                }
            }
            idle = reader.fill_buf() => {
                let available = idle?.len();
                if available == 0 {
                    return Ok(ConnectionEnd::Closed);
                }
                debug!("Rig link: discarding {} unsolicited bytes", available);
                reader.consume(available);
            }
            req = rx.recv() => {
                let Some(req) = req else {
                    return Ok(ConnectionEnd::Released);
                };
                if req.respond_to.is_closed() {
                    debug!("Rig link: caller gave up on {:?} before it was sent", req.line);
                    continue;
                }

                let window = if std::mem::take(&mut resync) {
                    config.resync_window
                } else {
                    Duration::ZERO
                };
                match exchange_line(&mut reader, &mut writer, &req, window).await {
                    Ok(reply) => {
                        debug!("Rig link: {:?} -> {:?}", req.line, reply);
                        let _ = req.respond_to.send(Ok(reply));
                    }
                    Err(ExchangeError::Timeout) => {
                        warn!("Rig link: no reply to {:?} within {:?}", req.line, req.timeout);
                        resync = true;
                        let _ = req.respond_to.send(Err(RigError::timeout(req.timeout)));
                    }
                    Err(ExchangeError::Io(e)) => {
                        let _ = req.respond_to.send(Err(RigError::LinkDown));
                        return Err(e);
                    }
                }
            }
        }
    }
}

async fn exchange_line<R, W>(
    reader: &mut R,
    writer: &mut W,
    req: &LinkRequest,
    resync_window: Duration,
) -> Result<String, ExchangeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let discarded = discard_pending(reader, resync_window).await?;
    if discarded > 0 {
        debug!(
            "Rig link: discarded {} stale bytes before {:?}",
            discarded, req.line
        );
    }

    let round_trip = async {
        writer.write_all(format!("{}\n", req.line).as_bytes()).await?;
        writer.flush().await?;
        read_reply(reader, req.reply_lines).await
    };
    match time::timeout(req.timeout, round_trip).await {
        Ok(result) => result.map_err(ExchangeError::Io),
        Err(_) => Err(ExchangeError::Timeout),
    }
}

/// Drop buffered bytes until the stream has been quiet for `window`.
async fn discard_pending<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    window: Duration,
) -> io::Result<usize> {
    let mut discarded = 0;
    loop {
        let available = match time::timeout(window, reader.fill_buf()).await {
            Ok(result) => result?.len(),
            Err(_) => return Ok(discarded),
        };
        if available == 0 {
            return Err(closed_by_daemon());
        }
        reader.consume(available);
        discarded += available;
    }
}

async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R, reply_lines: usize) -> io::Result<String> {
    let first = next_non_empty_line(reader).await?;
    if !first.starts_with("RPRT") {
        for _ in 1..reply_lines {
            next_non_empty_line(reader).await?;
        }
    }
    Ok(first)
}

async fn next_non_empty_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<String> {
    loop {
        let line = read_limited_line(reader, MAX_LINE_BYTES)
            .await?
            .ok_or_else(closed_by_daemon)?;
        let line = line.trim();
        if !line.is_empty() {
            return Ok(line.to_string());
        }
    }
}

/// Read one `\n`-terminated line. A line cut short by end of stream is
/// dropped and reported as `None`.
async fn read_limited_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max_bytes: usize,
) -> io::Result<Option<String>> {
    let mut line = Vec::with_capacity(64);
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(None);
        }

        if let Some(pos) = available.iter().position(|b| *b == b'\n') {
            if line.len() + pos > max_bytes {
                return Err(line_too_long(max_bytes));
            }
            line.extend_from_slice(&available[..pos]);
            reader.consume(pos + 1);
            return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
        }

        let len = available.len();
        if line.len() + len > max_bytes {
            return Err(line_too_long(max_bytes));
        }
        line.extend_from_slice(available);
        reader.consume(len);
    }
}

fn closed_by_daemon() -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "rig daemon closed the connection",
    )
}

fn line_too_long(max_bytes: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("reply line exceeds {max_bytes} bytes"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::net::TcpListener;

    struct DuplexDialer {
        peers: mpsc::UnboundedSender<DuplexStream>,
        refuse: Arc<AtomicBool>,
    }

    impl Dialer for DuplexDialer {
        type Stream = DuplexStream;

        fn dial(&self) -> impl Future<Output = io::Result<DuplexStream>> + Send {
            let result = if self.refuse.load(Ordering::SeqCst) {
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
            } else {
                let (client, server) = duplex(1024);
                self.peers
                    .send(server)
                    .map(|_| client)
                    .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "harness gone"))
            };
            std::future::ready(result)
        }

        fn describe(&self) -> String {
            "duplex".to_string()
        }
    }

    struct Daemon {
        io: BufReader<DuplexStream>,
    }

    impl Daemon {
        async fn expect(&mut self, command: &str) {
            let mut line = String::new();
            time::timeout(Duration::from_secs(2), self.io.read_line(&mut line))
                .await
                .expect("command arrives in time")
                .expect("read command");
            assert_eq!(line.trim_end(), command);
        }

        async fn reply(&mut self, text: &str) {
            self.io
                .get_mut()
                .write_all(text.as_bytes())
                .await
                .expect("write reply");
        }
    }

    struct Harness {
        link: RigLink,
        peers: mpsc::UnboundedReceiver<DuplexStream>,
        refuse: Arc<AtomicBool>,
        shutdown_tx: watch::Sender<bool>,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn start(refuse: bool) -> Self {
            let (peers_tx, peers) = mpsc::unbounded_channel();
            let refuse = Arc::new(AtomicBool::new(refuse));
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let dialer = DuplexDialer {
                peers: peers_tx,
                refuse: refuse.clone(),
            };
            let (link, task) = RigLink::spawn(dialer, test_config(), shutdown_rx);
            Self {
                link,
                peers,
                refuse,
                shutdown_tx,
                task,
            }
        }

        async fn accept(&mut self) -> Daemon {
            let stream = time::timeout(Duration::from_secs(2), self.peers.recv())
                .await
                .expect("link dials in time")
                .expect("dialer alive");
            wait_for_status(&self.link, LinkStatus::Up).await;
            Daemon {
                io: BufReader::new(stream),
            }
        }
    }

    fn test_config() -> RigLinkConfig {
        RigLinkConfig {
            connect_timeout: Duration::from_secs(1),
            command_timeout: Duration::from_millis(500),
            reconnect_delay: Duration::from_millis(20),
            resync_window: Duration::from_millis(100),
        }
    }

    async fn wait_for_status(link: &RigLink, want: LinkStatus) {
        let mut rx = link.subscribe_status();
        time::timeout(Duration::from_secs(2), rx.wait_for(|status| *status == want))
            .await
            .expect("status change in time")
            .expect("link task alive");
    }

    #[tokio::test]
    async fn returns_first_non_empty_line_across_partial_reads() {
        let mut harness = Harness::start(false);
        let mut daemon = harness.accept().await;

        let link = harness.link.clone();
        let pending = tokio::spawn(async move { link.send("f").await });

        daemon.expect("f").await;
        daemon.reply("\n\n1407").await;
        time::sleep(Duration::from_millis(20)).await;
        daemon.reply("4000\n").await;

        assert_eq!(pending.await.unwrap(), Ok("14074000".to_string()));
    }

    #[tokio::test]
    async fn mode_reply_passband_line_does_not_leak() {
        let mut harness = Harness::start(false);
        let mut daemon = harness.accept().await;

        let mut control = harness.link.clone();
        let pending = tokio::spawn(async move {
            let mode = control.get_mode().await;
            let ptt = control.get_ptt().await;
            (mode, ptt)
        });

        daemon.expect("m").await;
        daemon.reply("USB\n").await;
        time::sleep(Duration::from_millis(20)).await;
        daemon.reply("2400\n").await;
        daemon.expect("t").await;
        daemon.reply("0\n").await;

        let (mode, ptt) = pending.await.unwrap();
        assert_eq!(mode, Ok("USB".to_string()));
        assert_eq!(ptt, Ok(false));
    }

    #[tokio::test]
    async fn late_reply_is_never_delivered_to_the_next_command() {
        let mut harness = Harness::start(false);
        let mut daemon = harness.accept().await;

        let link = harness.link.clone();
        let first =
            tokio::spawn(async move { link.send_with_timeout("l RFPOWER", Duration::from_millis(50)).await });
        daemon.expect("l RFPOWER").await;
        assert_eq!(first.await.unwrap(), Err(RigError::Timeout(50)));

        let link = harness.link.clone();
        let second = tokio::spawn(async move { link.send("t").await });
        time::sleep(Duration::from_millis(30)).await;
        daemon.reply("0.500000\n").await;
        daemon.expect("t").await;
        daemon.reply("1\n").await;

        assert_eq!(second.await.unwrap(), Ok("1".to_string()));
    }

    #[tokio::test]
    async fn unsolicited_bytes_while_idle_are_dropped() {
        let mut harness = Harness::start(false);
        let mut daemon = harness.accept().await;

        daemon.reply("RPRT 0\n").await;
        time::sleep(Duration::from_millis(20)).await;

        let link = harness.link.clone();
        let pending = tokio::spawn(async move { link.send("f").await });
        daemon.expect("f").await;
        daemon.reply("7074000\n").await;
        assert_eq!(pending.await.unwrap(), Ok("7074000".to_string()));
    }

    #[tokio::test]
    async fn concurrent_send_is_rejected_as_busy() {
        let mut harness = Harness::start(false);
        let mut daemon = harness.accept().await;

        let link = harness.link.clone();
        let first = tokio::spawn(async move { link.send("f").await });
        daemon.expect("f").await;

        assert_eq!(harness.link.send("t").await, Err(RigError::Busy));

        daemon.reply("14074000\n").await;
        assert_eq!(first.await.unwrap(), Ok("14074000".to_string()));
    }

    #[tokio::test]
    async fn session_excludes_plain_sends() {
        let mut harness = Harness::start(false);
        let mut daemon = harness.accept().await;

        let mut session = harness.link.session().await;
        assert_eq!(harness.link.send("f").await, Err(RigError::Busy));
        assert!(harness.link.try_session().is_err());

        let (reply, ()) = tokio::join!(session.send("t"), async {
            daemon.expect("t").await;
            daemon.reply("0\n").await;
        });
        assert_eq!(reply, Ok("0".to_string()));

        drop(session);
        let link = harness.link.clone();
        let pending = tokio::spawn(async move { link.send("f").await });
        daemon.expect("f").await;
        daemon.reply("3573000\n").await;
        assert_eq!(pending.await.unwrap(), Ok("3573000".to_string()));
    }

    #[tokio::test]
    async fn down_link_fails_fast() {
        let harness = Harness::start(true);
        wait_for_status(&harness.link, LinkStatus::Down).await;
        assert_eq!(harness.link.send("f").await, Err(RigError::LinkDown));
        assert!(!harness.link.is_up());
    }

    #[tokio::test]
    async fn in_flight_command_fails_when_daemon_drops() {
        let mut harness = Harness::start(false);
        let mut daemon = harness.accept().await;

        let link = harness.link.clone();
        let pending = tokio::spawn(async move { link.send("f").await });
        daemon.expect("f").await;
        drop(daemon);

        assert_eq!(pending.await.unwrap(), Err(RigError::LinkDown));
    }

    #[tokio::test]
    async fn redials_after_daemon_closes() {
        let mut harness = Harness::start(false);
        let daemon = harness.accept().await;
        drop(daemon);

        let mut daemon = harness.accept().await;
        let link = harness.link.clone();
        let pending = tokio::spawn(async move { link.send("t").await });
        daemon.expect("t").await;
        daemon.reply("0\n").await;
        assert_eq!(pending.await.unwrap(), Ok("0".to_string()));
    }

    #[tokio::test]
    async fn redials_after_refused_connect() {
        let mut harness = Harness::start(true);
        wait_for_status(&harness.link, LinkStatus::Down).await;
        harness.refuse.store(false, Ordering::SeqCst);

        let _daemon = harness.accept().await;
        assert!(harness.link.is_up());
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let mut harness = Harness::start(false);
        let _daemon = harness.accept().await;

        harness.shutdown_tx.send(true).unwrap();
        time::timeout(Duration::from_secs(2), harness.task)
            .await
            .expect("task stops in time")
            .unwrap();
        assert_eq!(harness.link.status(), LinkStatus::Down);
    }

    #[tokio::test]
    async fn talks_to_rigctld_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (link, _task) = RigLink::spawn_tcp(
            RigEndpoint::new("127.0.0.1", port),
            test_config(),
            shutdown_rx,
        );

        let (socket, _) = listener.accept().await.unwrap();
        let mut daemon = BufReader::new(socket);
        wait_for_status(&link, LinkStatus::Up).await;

        let mut control = link.clone();
        let pending = tokio::spawn(async move { control.set_ptt(false).await });

        let mut line = String::new();
        daemon.read_line(&mut line).await.unwrap();
        assert_eq!(line, "T 0\n");
        daemon.get_mut().write_all(b"RPRT 0\n").await.unwrap();

        assert_eq!(pending.await.unwrap(), Ok(()));
    }
}
