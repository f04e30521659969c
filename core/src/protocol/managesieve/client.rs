/*
 * client.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! ManageSieve message pump.
//!
//! One tokio task owns the connection, the receive buffer and the request
//! queue. `SieveClient` is a cheap handle that talks to it over a channel,
//! so enqueueing from anywhere (including while a response is being parsed)
//! is just a message into the task. Responses are matched to the queue
//! head; pipelined requests may be in flight as long as no barrier command
//! (STARTTLS, AUTHENTICATE, LOGOUT) is crossed.

use std::future::pending;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use super::error::{ParseError, SieveError};
use super::logger::SieveLogger;
use super::parser::ResponseParser;
use super::queue::MessageQueue;
use super::request::{Command, Request, RequestResult};
use crate::config::DEFAULT_TIMEOUT_MS;
use crate::net::Connector;

const READ_CHUNK: usize = 8192;

/// Called when the connection has been idle for the keep-alive interval.
/// Returns the command to send, if any.
pub type IdleHook = Arc<dyn Fn() -> Option<Command> + Send + Sync>;
pub type TimeoutHook = Arc<dyn Fn() + Send + Sync>;
pub type DisconnectHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How long to wait for a response once a request is on the wire.
    pub timeout: Duration,
    /// Keep-alive interval; `None` disables the idle timer.
    pub idle: Option<Duration>,
    /// Whether the connection may be upgraded with STARTTLS.
    pub secure: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            idle: None,
            secure: true,
        }
    }
}

#[derive(Clone, Default)]
pub struct ClientHooks {
    pub on_idle: Option<IdleHook>,
    pub on_timeout: Option<TimeoutHook>,
    pub on_disconnected: Option<DisconnectHook>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Plain,
    Securable,
    Secured,
}

enum ClientCommand {
    Enqueue(Request),
    StartTls(oneshot::Sender<io::Result<()>>),
    Cancel(String),
    Disconnect(String, oneshot::Sender<()>),
}

/// Handle to a running message pump.
#[derive(Clone)]
pub struct SieveClient {
    host: String,
    port: u16,
    secure: bool,
    secured: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<ClientCommand>,
}

impl SieveClient {
    /// Open a connection and start the pump on it.
    pub async fn connect<C: Connector>(
        connector: Arc<C>,
        host: &str,
        port: u16,
        options: ClientOptions,
        hooks: ClientHooks,
        logger: SieveLogger,
    ) -> io::Result<Self> {
        logger.state(format_args!("Connecting to {}:{}", host, port));
        let stream = connector.connect(host, port).await?;
        Ok(Self::spawn(connector, stream, host, port, options, hooks, logger))
    }

    /// Start the pump on an already connected stream.
    pub fn spawn<C: Connector>(
        connector: Arc<C>,
        stream: C::Stream,
        host: &str,
        port: u16,
        options: ClientOptions,
        hooks: ClientHooks,
        logger: SieveLogger,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let secured = Arc::new(AtomicBool::new(false));
        let pump = Pump {
            connector,
            stream: Some(stream),
            host: host.to_string(),
            queue: MessageQueue::new(),
            buffer: BytesMut::with_capacity(READ_CHUNK),
            timeout: Timer::new(Some(options.timeout)),
            idle: Timer::new(options.idle),
            write_timeout: options.timeout,
            discard: false,
            failure: None,
            secured: secured.clone(),
            hooks,
            logger,
        };
        tokio::spawn(pump.run(rx));
        Self {
            host: host.to_string(),
            port,
            secure: options.secure,
            secured,
            tx,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// False once the pump has shut down.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn is_securable(&self) -> bool {
        self.secure
    }

    pub fn is_secured(&self) -> bool {
        self.secured.load(Ordering::SeqCst)
    }

    pub fn security(&self) -> Security {
        if self.is_secured() {
            Security::Secured
        } else if self.secure {
            Security::Securable
        } else {
            Security::Plain
        }
    }

    /// Hand a request to the pump. If the pump is gone the request is
    /// abandoned on the spot.
    pub fn add_request(&self, request: Request) {
        if let Err(mpsc::error::SendError(command)) =
            self.tx.send(ClientCommand::Enqueue(request))
        {
            if let ClientCommand::Enqueue(mut request) = command {
                request.abandon("Disconnected");
            }
        }
    }

    pub fn submit(&self, command: Command) -> oneshot::Receiver<RequestResult> {
        let (request, rx) = Request::new(command);
        self.add_request(request);
        rx
    }

    /// Queue a command and wait for its outcome.
    pub async fn send(&self, command: Command) -> RequestResult {
        wait(self.submit(command)).await
    }

    /// Upgrade the transport. Call after STARTTLS was answered with OK.
    pub async fn start_tls(&self) -> io::Result<()> {
        let (tx, rx) = oneshot::channel();
        let not_connected = || io::Error::new(io::ErrorKind::NotConnected, "client disconnected");
        self.tx
            .send(ClientCommand::StartTls(tx))
            .map_err(|_| not_connected())?;
        rx.await.map_err(|_| not_connected())?
    }

    /// Abandon every queued request with the given reason.
    pub fn cancel(&self, reason: &str) {
        let _ = self.tx.send(ClientCommand::Cancel(reason.to_string()));
    }

    /// Tear the connection down. Returns once the pump has stopped.
    pub async fn disconnect(&self, reason: &str) {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(ClientCommand::Disconnect(reason.to_string(), tx))
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

/// Await a submitted request; a vanished pump counts as abandonment.
pub async fn wait(rx: oneshot::Receiver<RequestResult>) -> RequestResult {
    rx.await
        .unwrap_or_else(|_| Err(SieveError::Abandoned("Disconnected".to_string())))
}

/// Single-shot timer. Re-arming replaces the deadline, so it never fires
/// twice for one arming.
struct Timer {
    period: Option<Duration>,
    deadline: Option<Instant>,
}

impl Timer {
    fn new(period: Option<Duration>) -> Self {
        Self {
            period,
            deadline: None,
        }
    }

    fn arm(&mut self) {
        self.deadline = self.period.map(|p| Instant::now() + p);
    }

    fn disarm(&mut self) {
        self.deadline = None;
    }

    fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            None => pending().await,
        }
    }
}

enum Event {
    Command(Option<ClientCommand>),
    Read(io::Result<usize>),
    Timeout,
    Idle,
}

struct Pump<C: Connector> {
    connector: Arc<C>,
    stream: Option<C::Stream>,
    host: String,
    queue: MessageQueue,
    buffer: BytesMut,
    timeout: Timer,
    idle: Timer,
    write_timeout: Duration,
    /// Set by a timeout: late bytes belong to abandoned requests.
    discard: bool,
    /// Fatal transport problem; the loop shuts down after the current event.
    failure: Option<String>,
    secured: Arc<AtomicBool>,
    hooks: ClientHooks,
    logger: SieveLogger,
}

async fn read_some<S: AsyncRead + Unpin>(
    stream: &mut Option<S>,
    buffer: &mut BytesMut,
) -> io::Result<usize> {
    match stream {
        Some(stream) => {
            buffer.reserve(READ_CHUNK);
            stream.read_buf(buffer).await
        }
        None => pending().await,
    }
}

impl<C: Connector> Pump<C> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ClientCommand>) {
        loop {
            let event = tokio::select! {
                command = rx.recv() => Event::Command(command),
                read = read_some(&mut self.stream, &mut self.buffer) => Event::Read(read),
                _ = self.timeout.expired() => Event::Timeout,
                _ = self.idle.expired() => Event::Idle,
            };
            match event {
                Event::Command(None) => {
                    self.shutdown("Client dropped").await;
                    break;
                }
                Event::Command(Some(ClientCommand::Enqueue(request))) => {
                    self.enqueue(request).await
                }
                Event::Command(Some(ClientCommand::StartTls(reply))) => {
                    let result = self.upgrade().await;
                    let _ = reply.send(result);
                }
                Event::Command(Some(ClientCommand::Cancel(reason))) => self.cancel(&reason),
                Event::Command(Some(ClientCommand::Disconnect(reason, reply))) => {
                    self.shutdown(&reason).await;
                    let _ = reply.send(());
                    break;
                }
                Event::Read(Ok(0)) => {
                    self.failure = Some("Connection closed by server".to_string())
                }
                Event::Read(Ok(n)) => self.on_data(n).await,
                Event::Read(Err(e)) => self.failure = Some(format!("Read failed: {}", e)),
                Event::Timeout => self.on_timeout(),
                Event::Idle => self.on_idle().await,
            }
            if let Some(reason) = self.failure.take() {
                self.shutdown(&reason).await;
                break;
            }
        }

        rx.close();
        while let Ok(command) = rx.try_recv() {
            match command {
                ClientCommand::Enqueue(mut request) => request.abandon("Disconnected"),
                ClientCommand::StartTls(reply) => {
                    let _ = reply.send(Err(io::Error::new(
                        io::ErrorKind::NotConnected,
                        "client disconnected",
                    )));
                }
                ClientCommand::Disconnect(_, reply) => {
                    let _ = reply.send(());
                }
                ClientCommand::Cancel(_) => {}
            }
        }
    }

    async fn enqueue(&mut self, request: Request) {
        self.logger
            .state(format_args!("Queued {}", request.command().name()));
        self.queue.enqueue(request);
        if !self.buffer.is_empty() {
            if self.discard {
                self.drop_buffer();
            } else {
                // a greeting may have arrived before anyone asked for it
                self.receive();
            }
        }
        if self.queue.expects_response() && !self.timeout.is_armed() {
            self.timeout.arm();
        }
        self.send_next().await;
    }

    async fn on_data(&mut self, n: usize) {
        let start = self.buffer.len() - n;
        self.logger.stream(&self.buffer[start..]);
        self.receive();
        self.send_next().await;
    }

    /// Match buffered bytes against the queue, front to back.
    fn receive(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if self.queue.is_empty() {
            if self.discard {
                self.drop_buffer();
            }
            return;
        }

        self.timeout.disarm();
        let mut consumed = 0;
        let mut fatal = false;
        let locked = self.queue.lock();
        while let Some(request) = locked.next() {
            if request.has_request() && !request.is_awaiting() {
                // not written yet, so no reply can be for it or anything behind it
                break;
            }
            let greeting = request.is_optional() && !request.has_request();
            if greeting && locked.capability_in_flight() {
                self.logger.state("Skipping optional INIT, CAPABILITY in flight");
                continue;
            }
            let Some(request) = locked.current() else {
                break;
            };
            let mut parser = ResponseParser::new(&self.buffer[consumed..]);
            match request.on_response(&mut parser) {
                Ok(done) => {
                    let used = parser.position();
                    self.logger.response(String::from_utf8_lossy(
                        &self.buffer[consumed..consumed + used],
                    ).trim_end());
                    consumed += used;
                    if !done {
                        locked.trunc_before();
                        break;
                    }
                    locked.trunc();
                }
                Err(_) if request.is_optional() => {
                    self.logger
                        .state(format_args!("Skipping optional {}", request.command().name()));
                }
                Err(ParseError::Incomplete) => break,
                Err(ParseError::Malformed(message)) => {
                    self.logger.warn(format_args!(
                        "Malformed response to {}: {}",
                        request.command().name(),
                        message
                    ));
                    request.fail(SieveError::Malformed(message));
                    locked.trunc();
                    fatal = true;
                    break;
                }
            }
        }
        self.queue.unlock();

        if fatal {
            self.buffer.clear();
        } else {
            self.buffer.advance(consumed);
        }

        if self.queue.expects_response() {
            self.timeout.arm();
        } else {
            self.idle.arm();
        }
    }

    /// Write every deliverable request.
    async fn send_next(&mut self) {
        while let Some(index) = self.queue.deliverable() {
            let rendered = match self.queue.get_mut(index) {
                Some(request) => request.render().map(|bytes| {
                    request.mark_sent();
                    (request.command().name(), bytes)
                }),
                None => break,
            };
            let (name, bytes) = match rendered {
                Ok(rendered) => rendered,
                Err(e) => {
                    if let Some(mut request) = self.queue.remove(index) {
                        request.fail(e);
                    }
                    continue;
                }
            };
            if name == "AUTHENTICATE" {
                self.logger.request("AUTHENTICATE ...");
            } else {
                self.logger
                    .request(String::from_utf8_lossy(&bytes).trim_end());
            }

            self.discard = false;
            self.idle.disarm();
            self.timeout.arm();
            if let Err(reason) = self.write(&bytes).await {
                if reason == "Timeout" {
                    self.on_timeout();
                }
                self.failure = Some(reason);
                return;
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), String> {
        let Some(stream) = self.stream.as_mut() else {
            return Err("Not connected".to_string());
        };
        let io = async {
            stream.write_all(bytes).await?;
            stream.flush().await
        };
        match time::timeout(self.write_timeout, io).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("Write failed: {}", e)),
            Err(_) => Err("Timeout".to_string()),
        }
    }

    fn on_timeout(&mut self) {
        self.timeout.disarm();
        let count = self.queue.drain("Timeout");
        self.logger
            .state(format_args!("Timeout, abandoned {} request(s)", count));
        self.buffer.clear();
        self.discard = true;
        if let Some(hook) = &self.hooks.on_timeout {
            hook();
        }
    }

    async fn on_idle(&mut self) {
        self.idle.disarm();
        // a leftover optional greeting does not count as traffic
        if self.queue.expects_response() {
            return;
        }
        let Some(command) = self.hooks.on_idle.as_ref().and_then(|hook| hook()) else {
            return;
        };
        self.logger
            .state(format_args!("Idle, sending {}", command.name()));
        let (request, rx) = Request::new(command);
        let logger = self.logger.clone();
        tokio::spawn(async move {
            if let Err(e) = wait(rx).await {
                logger.warn(format_args!("Keep-alive failed: {}", e));
            }
        });
        self.enqueue(request).await;
    }

    fn cancel(&mut self, reason: &str) {
        let count = self.queue.drain(reason);
        self.logger
            .state(format_args!("Canceled {} request(s): {}", count, reason));
        self.timeout.disarm();
        self.buffer.clear();
        self.discard = true;
    }

    async fn upgrade(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.take() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "not connected"));
        };
        // nothing sent in the clear may be read after the handshake
        self.buffer.clear();
        self.logger.state("Starting TLS handshake");
        match self.connector.upgrade(stream, &self.host).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.secured.store(true, Ordering::SeqCst);
                self.logger.state("TLS established");
                Ok(())
            }
            Err(e) => {
                self.failure = Some(format!("TLS handshake failed: {}", e));
                Err(e)
            }
        }
    }

    async fn shutdown(&mut self, reason: &str) {
        self.timeout.disarm();
        self.idle.disarm();
        let count = self.queue.drain(reason);
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.buffer.clear();
        self.logger.state(format_args!(
            "Disconnected from {} ({}), abandoned {} request(s)",
            self.host, reason, count
        ));
        if let Some(hook) = &self.hooks.on_disconnected {
            hook(reason);
        }
    }

    fn drop_buffer(&mut self) {
        self.logger
            .warn(format_args!("Discarding {} unsolicited bytes", self.buffer.len()));
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::managesieve::logger::LogLevel;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{duplex, DuplexStream};

    const GREETING: &str = "\"IMPLEMENTATION\" \"Test\"\r\n\"SASL\" \"PLAIN\"\r\nOK\r\n";

    struct Loopback;

    impl Connector for Loopback {
        type Stream = DuplexStream;

        async fn connect(&self, _host: &str, _port: u16) -> io::Result<DuplexStream> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "loopback"))
        }

        async fn upgrade(&self, stream: DuplexStream, _host: &str) -> io::Result<DuplexStream> {
            Ok(stream)
        }
    }

    fn start_with(options: ClientOptions, hooks: ClientHooks) -> (SieveClient, DuplexStream) {
        let (client_side, server_side) = duplex(4096);
        let client = SieveClient::spawn(
            Arc::new(Loopback),
            client_side,
            "localhost",
            4190,
            options,
            hooks,
            SieveLogger::new("test", LogLevel::empty()),
        );
        (client, server_side)
    }

    fn start(timeout_ms: u64) -> (SieveClient, DuplexStream) {
        let options = ClientOptions {
            timeout: Duration::from_millis(timeout_ms),
            idle: None,
            secure: false,
        };
        start_with(options, ClientHooks::default())
    }

    async fn expect(server: &mut DuplexStream, expected: &str) {
        let mut buf = vec![0u8; expected.len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&buf), expected);
    }

    async fn reply(server: &mut DuplexStream, data: &str) {
        server.write_all(data.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn greeting_buffered_before_init() {
        let (client, mut server) = start(1000);
        reply(&mut server, GREETING).await;
        time::sleep(Duration::from_millis(20)).await;
        let capabilities = client.send(Command::Init).await.unwrap().into_capabilities().unwrap();
        assert_eq!(capabilities.implementation, "Test");
        assert_eq!(capabilities.sasl, vec!["PLAIN".to_string()]);
    }

    #[tokio::test]
    async fn pipelined_replies_resolve_in_order() {
        let (client, mut server) = start(1000);
        let noop = client.submit(Command::Noop);
        let list = client.submit(Command::ListScripts);
        let delete = client.submit(Command::DeleteScript("old".into()));
        expect(&mut server, "NOOP\r\nLISTSCRIPTS\r\nDELETESCRIPT \"old\"\r\n").await;
        reply(
            &mut server,
            "OK \"noop\"\r\n\"a\"\r\n\"b\" ACTIVE\r\nOK\r\nNO (NONEXISTENT) \"gone\"\r\n",
        )
        .await;

        assert_eq!(wait(noop).await.unwrap().simple().message, "noop");
        let scripts = wait(list).await.unwrap().into_scripts().unwrap();
        assert_eq!(scripts.len(), 2);
        assert!(scripts[1].active);
        match wait(delete).await {
            Err(SieveError::Server(r)) => assert!(r.code.is("NONEXISTENT")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn logout_waits_for_earlier_replies() {
        let (client, mut server) = start(1000);
        let noop = client.submit(Command::Noop);
        let logout = client.submit(Command::Logout);
        expect(&mut server, "NOOP\r\n").await;
        time::sleep(Duration::from_millis(20)).await;
        reply(&mut server, "OK\r\n").await;
        expect(&mut server, "LOGOUT\r\n").await;
        reply(&mut server, "BYE\r\n").await;
        assert!(wait(noop).await.is_ok());
        assert!(wait(logout).await.is_ok());
    }

    #[tokio::test]
    async fn fragmented_literal_at_every_boundary() {
        let response = "{5}\r\nkeep;\r\nOK\r\n";
        for split in 0..=response.len() {
            let (client, mut server) = start(1000);
            let script = client.submit(Command::GetScript("a".into()));
            expect(&mut server, "GETSCRIPT \"a\"\r\n").await;
            reply(&mut server, &response[..split]).await;
            time::sleep(Duration::from_millis(2)).await;
            reply(&mut server, &response[split..]).await;
            let script = wait(script).await.unwrap().into_script().unwrap();
            assert_eq!(script, "keep;", "split at {}", split);
        }
    }

    #[tokio::test]
    async fn optional_request_is_skipped() {
        let (client, mut server) = start(1000);
        let capability = client.submit(Command::Capability);
        client.add_request(Request::detached(Command::Init).make_optional());
        let noop = client.submit(Command::Noop);
        expect(&mut server, "CAPABILITY\r\nNOOP\r\n").await;
        // only one capability block, not the extra one after STARTTLS
        reply(&mut server, GREETING).await;
        reply(&mut server, "OK\r\n").await;
        assert!(wait(capability).await.is_ok());
        assert!(wait(noop).await.is_ok());
    }

    #[tokio::test]
    async fn leftover_greeting_yields_to_capability() {
        let (client, mut server) = start(300);
        let first = client.submit(Command::Capability);
        client.add_request(Request::detached(Command::Init).make_optional());
        expect(&mut server, "CAPABILITY\r\n").await;
        reply(&mut server, GREETING).await;
        assert!(wait(first).await.is_ok());

        // no second block came, so the greeting is still queued
        let second = client.submit(Command::Capability);
        expect(&mut server, "CAPABILITY\r\n").await;
        reply(
            &mut server,
            "\"IMPLEMENTATION\" \"Test\"\r\n\"SASL\" \"SCRAM-SHA-1\"\r\nOK\r\n",
        )
        .await;
        let capabilities = wait(second).await.unwrap().into_capabilities().unwrap();
        assert_eq!(capabilities.sasl, vec!["SCRAM-SHA-1".to_string()]);
    }

    #[tokio::test]
    async fn leftover_greeting_does_not_block_keep_alive() {
        let hooks = ClientHooks {
            on_idle: Some(Arc::new(|| Some(Command::Noop))),
            ..Default::default()
        };
        let options = ClientOptions {
            timeout: Duration::from_secs(1),
            idle: Some(Duration::from_millis(30)),
            secure: false,
        };
        let (client, mut server) = start_with(options, hooks);
        let capability = client.submit(Command::Capability);
        client.add_request(Request::detached(Command::Init).make_optional());
        expect(&mut server, "CAPABILITY\r\n").await;
        reply(&mut server, GREETING).await;
        assert!(wait(capability).await.is_ok());
        expect(&mut server, "NOOP\r\n").await;
        reply(&mut server, "OK\r\n").await;
    }

    #[tokio::test]
    async fn timeout_abandons_and_discards_late_reply() {
        let (client, mut server) = start(50);
        let noop = client.submit(Command::Noop);
        expect(&mut server, "NOOP\r\n").await;
        match wait(noop).await {
            Err(SieveError::Abandoned(reason)) => assert_eq!(reason, "Timeout"),
            other => panic!("unexpected {:?}", other),
        }

        reply(&mut server, "OK \"late\"\r\n").await;
        time::sleep(Duration::from_millis(20)).await;
        let list = client.submit(Command::ListScripts);
        expect(&mut server, "LISTSCRIPTS\r\n").await;
        reply(&mut server, "\"only\" ACTIVE\r\nOK\r\n").await;
        let scripts = wait(list).await.unwrap().into_scripts().unwrap();
        assert_eq!(scripts[0].name, "only");
    }

    #[tokio::test]
    async fn malformed_reply_fails_request() {
        let (client, mut server) = start(1000);
        let noop = client.submit(Command::Noop);
        expect(&mut server, "NOOP\r\n").await;
        reply(&mut server, "WHAT\r\n").await;
        assert!(matches!(wait(noop).await, Err(SieveError::Malformed(_))));
    }

    #[tokio::test]
    async fn server_close_abandons_queue() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = disconnects.clone();
        let hooks = ClientHooks {
            on_disconnected: Some(Arc::new(move |_reason: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        };
        let (client, mut server) = start_with(ClientOptions::default(), hooks);
        let noop = client.submit(Command::Noop);
        expect(&mut server, "NOOP\r\n").await;
        drop(server);
        assert!(matches!(wait(noop).await, Err(SieveError::Abandoned(_))));
        time::sleep(Duration::from_millis(10)).await;
        assert!(!client.is_alive());
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(matches!(
            client.send(Command::Noop).await,
            Err(SieveError::Abandoned(_))
        ));
    }

    #[tokio::test]
    async fn idle_sends_keep_alive() {
        let hooks = ClientHooks {
            on_idle: Some(Arc::new(|| Some(Command::Noop))),
            ..Default::default()
        };
        let options = ClientOptions {
            timeout: Duration::from_secs(1),
            idle: Some(Duration::from_millis(30)),
            secure: false,
        };
        let (client, mut server) = start_with(options, hooks);
        reply(&mut server, GREETING).await;
        assert!(client.send(Command::Init).await.is_ok());
        expect(&mut server, "NOOP\r\n").await;
        reply(&mut server, "OK\r\n").await;
    }

    #[tokio::test]
    async fn start_tls_marks_secured() {
        let options = ClientOptions {
            secure: true,
            ..Default::default()
        };
        let (client, mut server) = start_with(options, ClientHooks::default());
        assert_eq!(client.security(), Security::Securable);
        let starttls = client.submit(Command::StartTls);
        expect(&mut server, "STARTTLS\r\n").await;
        reply(&mut server, "OK\r\n").await;
        assert!(wait(starttls).await.is_ok());
        client.start_tls().await.unwrap();
        assert_eq!(client.security(), Security::Secured);
    }

    #[tokio::test]
    async fn cancel_abandons_everything() {
        let (client, mut server) = start(1000);
        let a = client.submit(Command::Noop);
        let b = client.submit(Command::Logout);
        expect(&mut server, "NOOP\r\n").await;
        client.cancel("user");
        for rx in [a, b] {
            match wait(rx).await {
                Err(SieveError::Abandoned(reason)) => assert_eq!(reason, "user"),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
