//! Scripted collaborators for unit tests: an in-memory broker wire, a raw
//! byte stream, a connector, a WiFi link, a recording delay and a wall clock.

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use core::task::Poll;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use embassy_time::{Duration, MockDriver};
use embedded_hal_async::delay::DelayNs;

use crate::clock::TimeSource;
use crate::packet::{ConnAck, EncodePacket, MqttPacket, Publish, SubAck, SUBACK_FAILURE};
use crate::runtime::WifiLink;
use crate::transport::{Connector, MqttTransport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeError {
    Closed,
    Tls(i32),
}

impl TransportError for FakeError {
    fn tls_error_code(&self) -> Option<i32> {
        match self {
            FakeError::Tls(code) => Some(*code),
            FakeError::Closed => None,
        }
    }
}

#[derive(Default)]
struct Wire {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    closed: bool,
}

/// The broker side of one socket.
#[derive(Clone, Default)]
pub struct Broker {
    wire: Rc<RefCell<Wire>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            wire: self.wire.clone(),
        }
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.wire.borrow_mut().inbound.push_back(bytes.to_vec());
    }

    pub fn push_packet(&self, packet: &impl EncodePacket) {
        let mut buf = [0u8; 512];
        let len = packet.encode(&mut buf).unwrap();
        self.push_bytes(&buf[..len]);
    }

    pub fn push_connack(&self, reason_code: u8) {
        self.push_packet(&ConnAck {
            session_present: false,
            reason_code,
        });
    }

    pub fn push_suback(&self, packet_id: u16, accepted: bool) {
        let mut reason_codes = heapless::Vec::new();
        reason_codes
            .push(if accepted { 0x00 } else { SUBACK_FAILURE })
            .unwrap();
        self.push_packet(&SubAck {
            packet_id,
            reason_codes,
        });
    }

    pub fn push_publish(&self, topic: &str, payload: &[u8]) {
        self.push_packet(&Publish::new(topic, payload));
    }

    pub fn close(&self) {
        self.wire.borrow_mut().closed = true;
    }

    /// Every packet the device wrote, one entry per `send`.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.wire.borrow().sent.clone()
    }

    /// Topic filters of every SUBSCRIBE the device wrote, in order.
    pub fn subscriptions(&self) -> Vec<std::string::String> {
        self.sent()
            .iter()
            .filter_map(|bytes| match crate::packet::decode(bytes) {
                Ok(Some(MqttPacket::Subscribe(sub))) => Some(sub.topics[0].0.to_string()),
                _ => None,
            })
            .collect()
    }

    /// `(topic, payload)` of every PUBLISH the device wrote, in order.
    pub fn published(&self) -> Vec<(std::string::String, Vec<u8>)> {
        self.sent()
            .iter()
            .filter_map(|bytes| match crate::packet::decode(bytes) {
                Ok(Some(MqttPacket::Publish(p))) => Some((p.topic.to_string(), p.payload.to_vec())),
                _ => None,
            })
            .collect()
    }
}

/// Device side of a [`Broker`] wire.
///
/// When nothing is queued, `recv` stays pending and moves the mock clock
/// forward on each poll so that read timeouts elapse.
pub struct FakeTransport {
    wire: Rc<RefCell<Wire>>,
}

impl MqttTransport for FakeTransport {
    type Error = FakeError;

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        let mut wire = self.wire.borrow_mut();
        if wire.closed {
            return Err(FakeError::Closed);
        }
        wire.sent.push(buf.to_vec());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        core::future::poll_fn(|_| {
            let mut wire = self.wire.borrow_mut();
            if let Some(chunk) = wire.inbound.front_mut() {
                let n = buf.len().min(chunk.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                chunk.drain(..n);
                if chunk.is_empty() {
                    wire.inbound.pop_front();
                }
                return Poll::Ready(Ok(n));
            }
            if wire.closed {
                return Poll::Ready(Err(FakeError::Closed));
            }
            MockDriver::get().advance(Duration::from_millis(50));
            Poll::Pending
        })
        .await
    }
}

/// Byte stream that serves a fixed input and then stays silent, moving the
/// mock clock forward while a read is pending. Writes are discarded.
pub struct ScriptedStream {
    input: VecDeque<u8>,
}

impl ScriptedStream {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
        }
    }
}

impl embedded_io_async::ErrorType for ScriptedStream {
    type Error = Infallible;
}

impl embedded_io_async::Read for ScriptedStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        core::future::poll_fn(|_| {
            if self.input.is_empty() {
                MockDriver::get().advance(Duration::from_millis(10));
                return Poll::Pending;
            }
            let n = buf.len().min(self.input.len());
            for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
                *slot = byte;
            }
            Poll::Ready(Ok(n))
        })
        .await
    }
}

impl embedded_io_async::Write for ScriptedStream {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(buf.len())
    }
}

/// Hands out scripted connection outcomes in order.
#[derive(Clone, Default)]
pub struct FakeConnector {
    script: Rc<RefCell<VecDeque<Result<Broker, i32>>>>,
    attempts: Rc<Cell<u32>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next attempt opens a socket to `broker`.
    pub fn accept(&self, broker: &Broker) {
        self.script.borrow_mut().push_back(Ok(broker.clone()));
    }

    /// Next attempt fails the TLS handshake with `code`.
    pub fn fail(&self, code: i32) {
        self.script.borrow_mut().push_back(Err(code));
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }
}

impl Connector for FakeConnector {
    type Transport = FakeTransport;
    type Error = FakeError;

    async fn connect(&mut self) -> Result<Self::Transport, Self::Error> {
        self.attempts.set(self.attempts.get() + 1);
        match self.script.borrow_mut().pop_front() {
            Some(Ok(broker)) => Ok(broker.transport()),
            Some(Err(code)) => Err(FakeError::Tls(code)),
            None => Err(FakeError::Tls(-1)),
        }
    }
}

/// WiFi link that reports "down" for a scripted number of polls.
#[derive(Clone, Default)]
pub struct FakeWifi {
    down_polls: Rc<Cell<u32>>,
    polls: Rc<Cell<u32>>,
}

impl FakeWifi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn go_down_for(&self, polls: u32) {
        self.down_polls.set(polls);
    }

    pub fn polls(&self) -> u32 {
        self.polls.get()
    }
}

impl WifiLink for FakeWifi {
    fn is_connected(&mut self) -> bool {
        self.polls.set(self.polls.get() + 1);
        match self.down_polls.get() {
            0 => true,
            n => {
                self.down_polls.set(n - 1);
                false
            }
        }
    }
}

/// Records every requested pause in milliseconds instead of sleeping.
#[derive(Clone, Default)]
pub struct RecordingDelay {
    pauses: Rc<RefCell<Vec<u32>>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> Vec<u32> {
        self.pauses.borrow().clone()
    }
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.pauses.borrow_mut().push(ns / 1_000_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.pauses.borrow_mut().push(ms);
    }
}

/// Wall clock that starts unset and jumps to `synced` after some reads.
pub struct FakeTimeSource {
    pub configured_servers: Vec<std::string::String>,
    pub offsets: Option<(i32, i32)>,
    reads_until_sync: Cell<u32>,
    synced: u64,
}

impl FakeTimeSource {
    pub fn new(reads_until_sync: u32, synced: u64) -> Self {
        Self {
            configured_servers: Vec::new(),
            offsets: None,
            reads_until_sync: Cell::new(reads_until_sync),
            synced,
        }
    }
}

impl TimeSource for FakeTimeSource {
    fn configure(&mut self, utc_offset_secs: i32, dst_offset_secs: i32, servers: &[&str]) {
        self.offsets = Some((utc_offset_secs, dst_offset_secs));
        self.configured_servers = servers.iter().map(|s| s.to_string()).collect();
    }

    fn now_epoch_secs(&self) -> u64 {
        match self.reads_until_sync.get() {
            0 => self.synced,
            n => {
                self.reads_until_sync.set(n - 1);
                0
            }
        }
    }
}
