//! WebSocket connection facade.
//!
//! Couples one [`Transport`] with the sans-I/O [`Protocol`] engine.
//! Outbound calls flush everything the engine queued before returning;
//! `recv` reads from the socket only when no event is pending.

use super::config::WebSocketConfig;
use super::error::HandshakeError;
use super::handshake::{ClientHandshake, HandshakeResponse};
use super::message::{CloseCode, CloseFrame, Event, Message};
use super::protocol::{Protocol, State, Transmit};
use crate::base::neterror::NetError;
use crate::dns::{GaiResolver, Resolve};
use crate::socket::connectjob::ConnectJob;
use crate::socket::tls::TlsConfig;
use crate::socket::transport::{Transport, TransportReader, TransportWriter};
use bytes::{Buf, Bytes, BytesMut};
use futures::Stream;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use url::Url;

/// Read direction, owned by whichever task is currently receiving.
struct ReadSide {
    transport: Option<TransportReader>,
    buf: BytesMut,
}

/// WebSocket client connection.
///
/// `Send + Sync`; share it behind an `Arc` to send from one task while
/// another receives.
///
/// # Example
/// ```ignore
/// let ws = WebSocket::connect("wss://echo.websocket.org").await?;
/// ws.send_text("Hello").await?;
/// while let Some(event) = ws.recv().await {
///     println!("{event:?}");
/// }
/// ```
pub struct WebSocket {
    url: Url,
    config: WebSocketConfig,
    resolver: Arc<dyn Resolve>,
    // Never held across an await
    protocol: Mutex<Protocol>,
    writer: tokio::sync::Mutex<Option<TransportWriter>>,
    reader: tokio::sync::Mutex<ReadSide>,
    state_tx: watch::Sender<State>,
    // Set on abort; interrupts a write stuck on a peer that stopped reading
    abort_tx: watch::Sender<bool>,
    // Fixed when our close frame goes out; the peer must finish by then
    close_deadline: OnceLock<Instant>,
    subprotocol: OnceLock<String>,
}

/// How a single socket read ended.
enum ReadOutcome {
    Read(Result<usize, NetError>),
    Closed,
    GraceExpired,
}

/// Parse and check a `ws://` / `wss://` URL.
pub fn validate_url(url: &str) -> Result<Url, NetError> {
    let url = Url::parse(url).map_err(|_| NetError::InvalidUrl)?;
    if url.scheme() != "ws" && url.scheme() != "wss" {
        return Err(NetError::UnknownUrlScheme);
    }
    if url.host_str().map_or(true, str::is_empty) || url.fragment().is_some() {
        return Err(NetError::InvalidUrl);
    }
    Ok(url)
}

impl WebSocket {
    /// Create an unopened connection. Call [`open`](Self::open) next.
    pub fn new(url: &str, config: WebSocketConfig) -> Result<Self, NetError> {
        Ok(Self::with_parts(
            validate_url(url)?,
            config,
            Arc::new(GaiResolver::new()),
        ))
    }

    fn with_parts(url: Url, config: WebSocketConfig, resolver: Arc<dyn Resolve>) -> Self {
        let protocol = Protocol::new(&config);
        let (state_tx, _) = watch::channel(State::Connecting);
        let (abort_tx, _) = watch::channel(false);
        Self {
            url,
            resolver,
            protocol: Mutex::new(protocol),
            writer: tokio::sync::Mutex::new(None),
            reader: tokio::sync::Mutex::new(ReadSide {
                transport: None,
                buf: BytesMut::with_capacity(config.read_buffer_size),
            }),
            state_tx,
            abort_tx,
            close_deadline: OnceLock::new(),
            subprotocol: OnceLock::new(),
            config,
        }
    }

    /// Connect to a WebSocket server with default settings.
    pub async fn connect(url: &str) -> Result<Self, NetError> {
        let ws = Self::new(url, WebSocketConfig::default())?;
        ws.open().await?;
        Ok(ws)
    }

    /// Get the URL this WebSocket is connected to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> State {
        self.with_protocol(|p| p.state())
    }

    /// Subprotocol selected by the server.
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.get().map(String::as_str)
    }

    /// Connect the transport and perform the opening handshake.
    ///
    /// On failure the connection moves to `Closed` without producing events.
    pub async fn open(&self) -> Result<(), NetError> {
        let mut writer = self.writer.lock().await;
        match self.state() {
            State::Connecting => {}
            State::Open => return Ok(()),
            State::Closing | State::Closed => return Err(NetError::ConnectionClosed),
        }

        let (transport, response, leftover) = match self.establish().await {
            Ok(parts) => parts,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "websocket open failed");
                self.with_protocol(Protocol::handshake_failed);
                return Err(e);
            }
        };

        let (read_half, write_half) = transport.split();
        *writer = Some(write_half);
        self.reader.lock().await.transport = Some(read_half);
        if let Some(selected) = response.subprotocol {
            let _ = self.subprotocol.set(selected);
        }

        self.with_protocol(|p| {
            p.receive_data(&leftover);
            p.handshake_complete();
        });
        tracing::debug!(url = %self.url, subprotocol = ?self.subprotocol(), "websocket connected");
        self.flush(&mut writer).await
    }

    async fn establish(&self) -> Result<(Transport, HandshakeResponse, BytesMut), NetError> {
        let host = self.url.host_str().ok_or(NetError::InvalidUrl)?;
        let port = self
            .url
            .port_or_known_default()
            .ok_or(NetError::InvalidUrl)?;
        let tls = (self.url.scheme() == "wss").then_some(&self.config.tls);

        let mut transport = ConnectJob::new(host, port, &*self.resolver)
            .tls(tls)
            .timeout(self.config.connect_timeout)
            .connect()
            .await?
            .with_read_chunk(self.config.read_buffer_size);

        let handshake = ClientHandshake::new(&self.url)?
            .protocols(self.config.subprotocols.iter().cloned())
            .headers(self.config.headers.clone());
        let exchange = exchange_handshake(&mut transport, &handshake);
        let (response, leftover) = match self.config.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| HandshakeError::TimedOut)??,
            None => exchange.await?,
        };

        Ok((
            transport.with_read_timeout(self.config.read_timeout),
            response,
            leftover,
        ))
    }

    /// Send a message. Fails with `NotOpen` unless the connection is open.
    ///
    /// Sending `Message::Close` starts the closing handshake; a later
    /// [`recv`](Self::recv) gives up on the peer once the close timeout
    /// has passed.
    pub async fn send(&self, msg: Message) -> Result<(), NetError> {
        let mut writer = self.writer.lock().await;
        self.with_protocol(|p| p.send(msg))?;
        self.flush(&mut writer).await
    }

    /// Send a text message.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), NetError> {
        self.send(Message::Text(text.into())).await
    }

    /// Send binary data.
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), NetError> {
        self.send(Message::Binary(data.into())).await
    }

    /// Ping the server.
    pub async fn ping(&self, data: impl Into<Bytes>) -> Result<(), NetError> {
        self.send(Message::Ping(data.into())).await
    }

    /// Send an unsolicited pong.
    pub async fn pong(&self, data: impl Into<Bytes>) -> Result<(), NetError> {
        self.send(Message::Pong(data.into())).await
    }

    /// Next event, reading from the socket as needed.
    ///
    /// Returns `None` before `open` succeeds, and after the `Closed` event
    /// has been returned.
    pub async fn recv(&self) -> Option<Event> {
        loop {
            let (event, state) = self.with_protocol(|p| (p.next_event(), p.state()));
            if event.is_some() {
                return event;
            }
            if state == State::Connecting {
                return None;
            }
            if state == State::Closed && self.reader.lock().await.transport.is_none() {
                return None;
            }
            self.pump().await;
        }
    }

    /// Stream of events ending after `Closed`.
    pub fn events(&self) -> impl Stream<Item = Event> + '_ {
        futures::stream::unfold(self, |ws| async move {
            let event = ws.recv().await?;
            Some((event, ws))
        })
    }

    /// Run the closing handshake.
    ///
    /// Sends a close frame, then waits up to the close timeout for the
    /// peer's close and EOF. The socket is released either way. Events
    /// that arrive meanwhile stay queued for [`recv`](Self::recv).
    pub async fn close(&self, code: CloseCode, reason: &str) -> Result<(), NetError> {
        if self.state() == State::Connecting {
            return Err(NetError::NotOpen {
                state: State::Connecting,
            });
        }

        let closing = async {
            {
                // A concurrent send may hold the writer for as long as the peer stalls
                let mut writer = self.writer.lock().await;
                if self.state() == State::Open {
                    self.with_protocol(|p| p.send_close(Some(CloseFrame::new(code, reason))))?;
                    self.flush(&mut writer).await?;
                }
            }
            self.wait_closed().await;
            Ok::<(), NetError>(())
        };

        match tokio::time::timeout(self.config.close_timeout, closing).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(url = %self.url, timeout = ?self.config.close_timeout, "close timed out, aborting");
                self.abort().await;
                Ok(())
            }
        }
    }

    fn with_protocol<R>(&self, f: impl FnOnce(&mut Protocol) -> R) -> R {
        let (result, state) = {
            let mut protocol = self.protocol.lock().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut protocol);
            (result, protocol.state())
        };
        if state == State::Closing {
            self.close_deadline
                .get_or_init(|| Instant::now() + self.config.close_timeout);
        }
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        result
    }

    /// Write everything the engine has queued. The caller holds the writer lock.
    async fn flush(&self, writer: &mut Option<TransportWriter>) -> Result<(), NetError> {
        let mut aborted = self.abort_tx.subscribe();
        for transmit in self.with_protocol(Protocol::data_to_send) {
            let Some(w) = writer.as_mut() else {
                return Ok(());
            };
            match transmit {
                Transmit::Data(data) => {
                    let written = tokio::select! {
                        result = w.send(&data) => result,
                        _ = abort_signal(&mut aborted) => Err(NetError::ConnectionClosed),
                    };
                    if let Err(e) = written {
                        tracing::debug!(error = %e, "websocket write failed");
                        *writer = None;
                        self.with_protocol(Protocol::abort);
                        return Err(e);
                    }
                }
                Transmit::Shutdown => {
                    if let Err(e) = w.shutdown_write().await {
                        tracing::debug!(error = %e, "half-close failed");
                    }
                }
            }
        }
        Ok(())
    }

    async fn pump(&self) {
        let mut read = self.reader.lock().await;
        // Another receiver may have produced events while we waited
        if self.with_protocol(|p| p.has_events()) {
            return;
        }
        self.read_once(&mut read).await;
    }

    /// One socket read fed through the engine, followed by a flush.
    async fn read_once(&self, read: &mut ReadSide) {
        if self.state() == State::Closed {
            self.release(read).await;
            return;
        }
        let ReadSide { transport, buf } = &mut *read;
        let Some(reader) = transport.as_mut() else {
            self.with_protocol(Protocol::abort);
            return;
        };

        let mut state_rx = self.state_tx.subscribe();
        let deadline = self.close_deadline.get().copied();
        let outcome = tokio::select! {
            result = reader.recv(buf) => ReadOutcome::Read(result),
            _ = closed_signal(&mut state_rx) => ReadOutcome::Closed,
            _ = grace_expired(deadline) => ReadOutcome::GraceExpired,
        };

        match outcome {
            ReadOutcome::Read(Ok(0)) => self.with_protocol(Protocol::receive_eof),
            ReadOutcome::Read(Ok(n)) => {
                tracing::trace!(bytes = n, "websocket read");
                self.with_protocol(|p| p.receive_data(&buf[..]));
                buf.clear();
            }
            ReadOutcome::Read(Err(NetError::ConnectionTimedOut)) => {
                self.with_protocol(|p| p.fail_transport(NetError::ConnectionTimedOut))
            }
            ReadOutcome::Read(Err(e)) => {
                tracing::debug!(error = %e, "websocket read failed");
                self.with_protocol(Protocol::receive_eof);
            }
            ReadOutcome::Closed => {}
            ReadOutcome::GraceExpired => {
                tracing::debug!(url = %self.url, timeout = ?self.config.close_timeout, "peer did not finish closing, aborting");
                self.with_protocol(Protocol::abort);
                self.abort_tx.send_replace(true);
            }
        }

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = self.flush(&mut writer).await {
                tracing::debug!(error = %e, "flush after read failed");
            }
        }

        if self.state() == State::Closed {
            self.release(read).await;
        }
    }

    /// Wait for the peer's EOF within the close timeout, then drop the socket.
    async fn release(&self, read: &mut ReadSide) {
        let Some(mut reader) = read.transport.take() else {
            return;
        };
        read.buf.clear();

        if self.with_protocol(|p| p.awaiting_peer_eof()) {
            match tokio::time::timeout(self.config.close_timeout, reader.drain_to_eof()).await {
                Ok(Ok(())) => tracing::trace!("peer closed the connection"),
                Ok(Err(e)) => tracing::debug!(error = %e, "error waiting for peer EOF"),
                Err(_) => tracing::debug!("timed out waiting for peer EOF"),
            }
            self.with_protocol(Protocol::receive_eof);
        }

        drop(reader);
        self.writer.lock().await.take();
        tracing::debug!(url = %self.url, "websocket released");
    }

    /// Drive the read side until the socket is released.
    async fn wait_closed(&self) {
        loop {
            let mut state_rx = self.state_tx.subscribe();
            let mut read = tokio::select! {
                biased;
                read = self.reader.lock() => read,
                // A concurrent receiver owns the read side and will release it
                _ = closed_signal(&mut state_rx) => return,
            };
            if read.transport.is_none() {
                return;
            }
            self.read_once(&mut read).await;
        }
    }

    /// Forced shutdown. Wakes a receiver blocked on the socket.
    async fn abort(&self) {
        self.with_protocol(Protocol::abort);
        self.abort_tx.send_replace(true);
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        if let Ok(mut read) = self.reader.try_lock() {
            read.transport.take();
        }
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("url", &self.url.as_str())
            .field("state", &self.state())
            .field("subprotocol", &self.subprotocol())
            .finish()
    }
}

async fn closed_signal(rx: &mut watch::Receiver<State>) {
    let _ = rx.wait_for(|s| *s == State::Closed).await;
}

async fn abort_signal(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|aborted| *aborted).await;
}

/// Resolves once the close deadline passes; never without one.
async fn grace_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Send the Upgrade request and read until the response is complete.
///
/// Returns bytes that followed the response.
async fn exchange_handshake(
    transport: &mut Transport,
    handshake: &ClientHandshake,
) -> Result<(HandshakeResponse, BytesMut), NetError> {
    transport.send(&handshake.request()?).await?;

    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some((response, consumed)) = handshake.parse_response(&buf)? {
            buf.advance(consumed);
            return Ok((response, buf));
        }
        if transport.recv(&mut buf).await? == 0 {
            return Err(HandshakeError::ConnectionClosed.into());
        }
    }
}

/// WebSocket connection builder.
#[derive(Clone)]
pub struct WebSocketBuilder {
    url: Option<Url>,
    config: WebSocketConfig,
    resolver: Option<Arc<dyn Resolve>>,
}

impl Default for WebSocketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WebSocketBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketBuilder")
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("config", &self.config)
            .field("custom_resolver", &self.resolver.is_some())
            .finish()
    }
}

impl WebSocketBuilder {
    /// Create a new WebSocket builder.
    pub fn new() -> Self {
        Self {
            url: None,
            config: WebSocketConfig::default(),
            resolver: None,
        }
    }

    /// Set the URL to connect to.
    pub fn url(mut self, url: &str) -> Result<Self, NetError> {
        self.url = Some(validate_url(url)?);
        Ok(self)
    }

    /// Add a header to the WebSocket handshake.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::try_from(name),
            http::header::HeaderValue::try_from(value),
        ) {
            self.config.headers.append(name, value);
        } else {
            tracing::warn!(header = name, "ignoring invalid handshake header");
        }
        self
    }

    /// Add a subprotocol.
    pub fn subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.config.subprotocols.push(protocol.into());
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = tls;
        self
    }

    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Grace period for the closing handshake.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn max_message_size(mut self, size: Option<usize>) -> Self {
        self.config.max_message_size = size;
        self
    }

    pub fn max_frame_size(mut self, size: Option<usize>) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Split outgoing messages into frames of at most `size` bytes.
    pub fn write_fragment_size(mut self, size: Option<usize>) -> Self {
        self.config.write_fragment_size = size;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: WebSocketConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom name resolver instead of getaddrinfo.
    pub fn resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Get the URL if set.
    pub fn get_url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Get the headers.
    pub fn get_headers(&self) -> &http::HeaderMap {
        &self.config.headers
    }

    /// Check if secure (wss://).
    pub fn is_secure(&self) -> bool {
        self.url.as_ref().is_some_and(|u| u.scheme() == "wss")
    }

    /// Create the connection without opening it.
    pub fn build(self) -> Result<WebSocket, NetError> {
        let url = self.url.ok_or(NetError::InvalidUrl)?;
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(GaiResolver::new()) as Arc<dyn Resolve>);
        Ok(WebSocket::with_parts(url, self.config, resolver))
    }

    /// Connect to the server.
    pub async fn connect(self) -> Result<WebSocket, NetError> {
        let ws = self.build()?;
        ws.open().await?;
        Ok(ws)
    }
}
