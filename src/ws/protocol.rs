//! Sans-I/O WebSocket client protocol engine.
//!
//! [`Protocol`] never touches a socket. The connection feeds it received
//! bytes with [`Protocol::receive_data`] / [`Protocol::receive_eof`], asks it
//! to send messages, then drains [`Protocol::data_to_send`] onto the wire and
//! [`Protocol::next_event`] to the caller.
//!
//! ```text
//! Connecting --handshake--> Open --close sent--> Closing --close received--> Closed
//!                             \--close received (echoed)------------------->/
//!                   any state --EOF / protocol error / abort--> Closed
//! ```

use super::config::WebSocketConfig;
use super::error::ProtocolError;
use super::frame::{Frame, FrameCodec, Opcode, MAX_CONTROL_PAYLOAD};
use super::message::{CloseCode, CloseFrame, Event, Message};
use crate::base::neterror::NetError;
use crate::base::random::random_bytes;
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Output for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transmit {
    /// Encoded frame bytes.
    Data(Bytes),
    /// Half-close the write side.
    Shutdown,
}

/// Text or binary message being reassembled from fragments.
#[derive(Debug)]
struct Partial {
    opcode: Opcode,
    data: BytesMut,
}

#[derive(Debug)]
pub struct Protocol {
    state: State,
    codec: FrameCodec,
    buffer: BytesMut,
    partial: Option<Partial>,
    max_message_size: Option<usize>,
    write_fragment_size: Option<usize>,
    events: VecDeque<Event>,
    transmits: VecDeque<Transmit>,
    close_sent: Option<CloseFrame>,
    close_received: Option<CloseFrame>,
    eof: bool,
    closed_emitted: bool,
    shutdown_queued: bool,
}

impl Protocol {
    pub fn new(config: &WebSocketConfig) -> Self {
        Self {
            state: State::Connecting,
            codec: FrameCodec::client().with_max_payload_size(config.max_frame_size),
            buffer: BytesMut::new(),
            partial: None,
            max_message_size: config.max_message_size,
            write_fragment_size: config.write_fragment_size.filter(|n| *n > 0),
            events: VecDeque::new(),
            transmits: VecDeque::new(),
            close_sent: None,
            close_received: None,
            eof: false,
            closed_emitted: false,
            shutdown_queued: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Close frame we sent, if any.
    pub fn close_sent(&self) -> Option<&CloseFrame> {
        self.close_sent.as_ref()
    }

    /// Close frame the peer sent, if any.
    pub fn close_received(&self) -> Option<&CloseFrame> {
        self.close_received.as_ref()
    }

    /// Closed, but the peer has not yet closed its side of the stream.
    pub fn awaiting_peer_eof(&self) -> bool {
        self.state == State::Closed && !self.eof
    }

    /// The Upgrade response was accepted.
    ///
    /// Bytes received before this call are processed now.
    pub fn handshake_complete(&mut self) {
        if self.state != State::Connecting {
            tracing::debug!(state = ?self.state, "handshake_complete outside Connecting");
            return;
        }
        self.state = State::Open;
        tracing::debug!("websocket open");
        self.process_buffer();
    }

    /// The opening handshake failed. Moves to `Closed` without events.
    pub fn handshake_failed(&mut self) {
        self.transmits.clear();
        self.buffer.clear();
        self.eof = true;
        self.shutdown_queued = true;
        self.closed_emitted = true;
        self.state = State::Closed;
    }

    /// Queue a message for sending.
    pub fn send(&mut self, msg: Message) -> Result<(), NetError> {
        match msg {
            Message::Close(frame) => return self.send_close(frame),
            _ => self.ensure_open()?,
        }
        match msg {
            Message::Text(text) => self.send_data(Opcode::Text, Bytes::from(text)),
            Message::Binary(data) => self.send_data(Opcode::Binary, data),
            Message::Ping(data) => self.send_control(Opcode::Ping, data),
            Message::Pong(data) => self.send_control(Opcode::Pong, data),
            Message::Close(_) => Ok(()),
        }
    }

    /// Start the closing handshake. `None` sends an empty close (1005).
    pub fn send_close(&mut self, frame: Option<CloseFrame>) -> Result<(), NetError> {
        self.ensure_open()?;
        let frame = frame.unwrap_or_else(|| CloseFrame::new(CloseCode::NO_STATUS, ""));
        if frame.code != CloseCode::NO_STATUS && !frame.code.is_allowed() {
            return Err(ProtocolError::InvalidCloseCode(frame.code.0).into());
        }
        if frame.reason.len() > CloseFrame::MAX_REASON_LEN {
            return Err(ProtocolError::ControlFrameTooLarge(2 + frame.reason.len()).into());
        }

        self.queue_frame(Frame::close(frame.to_payload()))?;
        tracing::debug!(code = frame.code.0, "sent close frame");
        self.close_sent = Some(frame);
        self.state = State::Closing;
        Ok(())
    }

    /// Feed bytes read from the transport.
    pub fn receive_data(&mut self, data: &[u8]) {
        if self.state == State::Closed || self.eof {
            tracing::trace!(len = data.len(), "dropping data after close");
            return;
        }
        self.buffer.extend_from_slice(data);
        if self.state != State::Connecting {
            self.process_buffer();
        }
    }

    /// The peer closed its side of the stream.
    pub fn receive_eof(&mut self) {
        if self.eof {
            return;
        }
        self.eof = true;
        self.buffer.clear();
        self.partial = None;
        if self.state == State::Closed {
            return;
        }

        tracing::debug!(state = ?self.state, "connection closed without close frame");
        self.state = State::Closed;
        self.queue_shutdown();
        self.emit_closed(CloseFrame::new(CloseCode::ABNORMAL, ""));
    }

    /// Fail the connection for a protocol violation.
    ///
    /// Emits `Error`, sends a close frame carrying the matching code unless
    /// one was already sent, half-closes, and emits `Closed(1006)`.
    pub fn fail(&mut self, err: ProtocolError) {
        if self.state == State::Closed {
            return;
        }
        tracing::debug!(error = %err, "failing websocket connection");
        self.events.push_back(Event::Error(err.clone().into()));

        if self.close_sent.is_none() && !self.eof {
            let frame = CloseFrame::new(err.close_code(), "");
            match self.queue_frame(Frame::close(frame.to_payload())) {
                Ok(()) => self.close_sent = Some(frame),
                Err(e) => tracing::debug!(error = %e, "could not queue close frame"),
            }
        }
        self.buffer.clear();
        self.partial = None;
        self.state = State::Closed;
        self.queue_shutdown();
        self.emit_closed(CloseFrame::new(CloseCode::ABNORMAL, ""));
    }

    /// Fail the connection for a transport-level error.
    pub fn fail_transport(&mut self, err: NetError) {
        if self.state == State::Closed {
            return;
        }
        tracing::debug!(error = %err, "transport failed");
        self.events.push_back(Event::Error(err));
        self.abort();
    }

    /// Give up on the connection without further I/O.
    ///
    /// Pending transmits are discarded. Emits `Closed(1006)` unless a
    /// `Closed` event was already produced.
    pub fn abort(&mut self) {
        self.transmits.clear();
        self.buffer.clear();
        self.partial = None;
        self.eof = true;
        self.shutdown_queued = true;
        self.state = State::Closed;
        self.emit_closed(CloseFrame::new(CloseCode::ABNORMAL, ""));
    }

    pub fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Everything queued for the transport, in order.
    pub fn data_to_send(&mut self) -> Vec<Transmit> {
        self.transmits.drain(..).collect()
    }

    fn ensure_open(&self) -> Result<(), NetError> {
        if self.state == State::Open {
            Ok(())
        } else {
            Err(NetError::NotOpen { state: self.state })
        }
    }

    fn queue_frame(&mut self, frame: Frame) -> Result<(), NetError> {
        let frame = frame.with_mask(random_bytes::<4>()?);
        let mut buf = BytesMut::with_capacity(frame.encoded_len());
        frame.encode(&mut buf);
        self.transmits.push_back(Transmit::Data(buf.freeze()));
        Ok(())
    }

    fn queue_shutdown(&mut self) {
        if !self.shutdown_queued {
            self.shutdown_queued = true;
            self.transmits.push_back(Transmit::Shutdown);
        }
    }

    fn emit_closed(&mut self, frame: CloseFrame) {
        if !self.closed_emitted {
            self.closed_emitted = true;
            self.events.push_back(Event::Closed(frame));
        }
    }

    fn send_data(&mut self, opcode: Opcode, payload: Bytes) -> Result<(), NetError> {
        let Some(size) = self.write_fragment_size.filter(|n| payload.len() > *n) else {
            return self.queue_frame(Frame::new(opcode, payload));
        };

        let mut offset = 0;
        let mut first = true;
        while offset < payload.len() {
            let end = (offset + size).min(payload.len());
            let op = if first { opcode } else { Opcode::Continuation };
            let frame = Frame::new(op, payload.slice(offset..end)).with_fin(end == payload.len());
            self.queue_frame(frame)?;
            first = false;
            offset = end;
        }
        Ok(())
    }

    fn send_control(&mut self, opcode: Opcode, payload: Bytes) -> Result<(), NetError> {
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(ProtocolError::ControlFrameTooLarge(payload.len()).into());
        }
        self.queue_frame(Frame::new(opcode, payload))
    }

    fn process_buffer(&mut self) {
        while self.state != State::Closed {
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(frame)) => self.handle_frame(frame),
                Ok(None) => break,
                Err(e) => self.fail(e),
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        tracing::trace!(opcode = ?frame.opcode, fin = frame.fin, len = frame.payload.len(), "frame received");
        match frame.opcode {
            Opcode::Text | Opcode::Binary => {
                if self.partial.is_some() {
                    return self.fail(ProtocolError::ExpectedContinuation);
                }
                if let Err(e) = self.check_message_size(frame.payload.len()) {
                    return self.fail(e);
                }
                if frame.fin {
                    self.deliver(frame.opcode, frame.payload);
                } else {
                    self.partial = Some(Partial {
                        opcode: frame.opcode,
                        data: BytesMut::from(&frame.payload[..]),
                    });
                }
            }
            Opcode::Continuation => {
                let Some(mut partial) = self.partial.take() else {
                    return self.fail(ProtocolError::UnexpectedContinuation);
                };
                if let Err(e) = self.check_message_size(partial.data.len() + frame.payload.len()) {
                    return self.fail(e);
                }
                partial.data.extend_from_slice(&frame.payload);
                if frame.fin {
                    self.deliver(partial.opcode, partial.data.freeze());
                } else {
                    self.partial = Some(partial);
                }
            }
            Opcode::Ping => {
                // Once our close is out, no further frames may follow it
                if self.state == State::Open {
                    if let Err(e) = self.queue_frame(Frame::pong(frame.payload.clone())) {
                        return self.fail_transport(e);
                    }
                }
                self.events.push_back(Event::Ping(frame.payload));
            }
            Opcode::Pong => self.events.push_back(Event::Pong(frame.payload)),
            Opcode::Close => self.handle_close(&frame.payload),
        }
    }

    fn handle_close(&mut self, payload: &[u8]) {
        let frame = match CloseFrame::from_payload(payload) {
            Ok(frame) => frame,
            Err(e) => return self.fail(e),
        };
        tracing::debug!(code = frame.code.0, reason = %frame.reason, "received close frame");

        if self.close_sent.is_none() {
            let echo = CloseFrame::new(frame.code, "");
            if let Err(e) = self.queue_frame(Frame::close(echo.to_payload())) {
                return self.fail_transport(e);
            }
            self.close_sent = Some(echo);
        }
        self.close_received = Some(frame.clone());
        self.partial = None;
        self.state = State::Closed;
        self.queue_shutdown();
        self.emit_closed(frame);
    }

    fn check_message_size(&self, size: usize) -> Result<(), ProtocolError> {
        match self.max_message_size {
            Some(max) if size > max => Err(ProtocolError::MessageTooLarge { size, max }),
            _ => Ok(()),
        }
    }

    fn deliver(&mut self, opcode: Opcode, payload: Bytes) {
        let msg = if opcode == Opcode::Text {
            match String::from_utf8(payload.to_vec()) {
                Ok(text) => Message::Text(text),
                Err(_) => return self.fail(ProtocolError::InvalidUtf8),
            }
        } else {
            Message::Binary(payload)
        };
        self.events.push_back(Event::Message(msg));
    }
}
