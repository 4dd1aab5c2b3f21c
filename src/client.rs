//! # MQTT Client
//!
//! A single-owner MQTT 3.1.1 session over an [`MqttTransport`]. The client is
//! driven from one execution context: the owner calls [`MqttClient::poll`] in
//! its loop, and inbound messages are returned from there rather than pushed
//! through callbacks, so delivery never overlaps a publish or subscribe.

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Instant, Timer};

use crate::error::{ConnectReasonCode, MqttError, ProtocolError};
use crate::packet::{
    self, Connect, EncodePacket, MqttPacket, PingReq, PubAck, Publish, QoS, Subscribe,
};
use crate::transport::{MqttTransport, TransportError};

/// Connection parameters for [`MqttClient::connect`].
#[derive(Debug, Clone)]
pub struct MqttOptions<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub keep_alive: Duration,
    pub clean_session: bool,
    pub connect_timeout: Duration,
}

impl<'a> MqttOptions<'a> {
    pub fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            username: None,
            password: None,
            keep_alive: Duration::from_secs(15),
            clean_session: true,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_username(mut self, username: &'a str) -> Self {
        self.username = Some(username);
        self
    }

    pub fn with_password(mut self, password: &'a str) -> Self {
        self.password = Some(password);
        self
    }

    /// Keep-alive interval. `Duration::from_secs(0)` disables pings.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Something the broker sent that the owner may care about.
#[derive(Debug)]
pub enum MqttEvent<'a> {
    /// An application message on a subscribed topic.
    Message(Publish<'a>),
    /// The broker answered a SUBSCRIBE. `accepted` is false on a 0x80 return code.
    Subscribed { packet_id: u16, accepted: bool },
    /// The broker acknowledged a QoS 1 publish.
    Published { packet_id: u16 },
    /// Keep-alive answer.
    Pong,
}

/// An MQTT session with inline receive and transmit buffers of `BUF_SIZE` bytes.
pub struct MqttClient<T, const BUF_SIZE: usize> {
    transport: T,
    rx: [u8; BUF_SIZE],
    rx_len: usize,
    consumed: usize,
    tx: [u8; BUF_SIZE],
    connected: bool,
    next_packet_id: u16,
    keep_alive: Duration,
    last_sent: Instant,
    /// When the unanswered PINGREQ went out.
    ping_sent: Option<Instant>,
    poll_timeout: Duration,
}

impl<T, const BUF_SIZE: usize> MqttClient<T, BUF_SIZE>
where
    T: MqttTransport,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            rx: [0; BUF_SIZE],
            rx_len: 0,
            consumed: 0,
            tx: [0; BUF_SIZE],
            connected: false,
            next_packet_id: 1,
            keep_alive: Duration::from_secs(0),
            last_sent: Instant::from_ticks(0),
            ping_sent: None,
            poll_timeout: Duration::from_millis(100),
        }
    }

    /// How long [`poll`](Self::poll) waits for inbound data before returning `Ok(None)`.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Sends CONNECT and waits for the broker's CONNACK.
    pub async fn connect(&mut self, options: &MqttOptions<'_>) -> Result<(), MqttError<T::Error>> {
        self.connected = false;
        self.rx_len = 0;
        self.consumed = 0;
        self.ping_sent = None;

        let keep_alive_secs = options.keep_alive.as_secs().min(u16::MAX as u64) as u16;
        let connect = Connect::new(options.client_id, keep_alive_secs, options.clean_session)
            .with_credentials(options.username, options.password);
        self.send_packet(&connect).await?;

        let len = self
            .read_frame(options.connect_timeout)
            .await?
            .ok_or(MqttError::Timeout)?;
        self.consumed = len;

        let reason = match packet::decode(&self.rx[..len]).map_err(MqttError::from_codec)? {
            Some(MqttPacket::ConnAck(ack)) => ConnectReasonCode::from(ack.reason_code),
            _ => return Err(MqttError::Protocol(ProtocolError::InvalidResponse)),
        };
        if reason != ConnectReasonCode::Success {
            return Err(MqttError::ConnectionRefused(reason));
        }

        self.keep_alive = Duration::from_secs(keep_alive_secs as u64);
        self.connected = true;
        Ok(())
    }

    /// Sends a SUBSCRIBE for one filter and returns its packet id.
    ///
    /// The broker's verdict arrives later as [`MqttEvent::Subscribed`].
    pub async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, MqttError<T::Error>> {
        self.ensure_connected()?;
        let packet_id = self.allocate_packet_id();
        self.send_packet(&Subscribe::new(packet_id, topic, qos))
            .await?;
        Ok(packet_id)
    }

    /// Publishes a message. QoS 1 messages get a packet id and are
    /// acknowledged later through [`MqttEvent::Published`].
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
    ) -> Result<(), MqttError<T::Error>> {
        self.ensure_connected()?;
        let packet_id = match qos {
            QoS::AtMostOnce => None,
            _ => Some(self.allocate_packet_id()),
        };
        let publish = Publish {
            topic,
            qos,
            retain: false,
            payload,
            packet_id,
        };
        self.send_packet(&publish).await
    }

    /// Waits up to the poll timeout for one inbound packet.
    ///
    /// Sends a PINGREQ first when the keep-alive interval has elapsed. If
    /// nothing at all arrives within another interval after that ping, the
    /// session is dropped with [`MqttError::Timeout`]. Any transport failure
    /// marks the session as disconnected.
    pub async fn poll(&mut self) -> Result<Option<MqttEvent<'_>>, MqttError<T::Error>> {
        self.ensure_connected()?;
        self.discard_consumed();
        self.service_keep_alive().await?;

        let Some(len) = self.read_frame(self.poll_timeout).await? else {
            return Ok(None);
        };
        self.consumed = len;
        // Any inbound packet proves the broker is still there.
        self.ping_sent = None;

        let packet = match packet::decode(&self.rx[..len]) {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.connected = false;
                return Err(MqttError::from_codec(e));
            }
        };

        let event = match packet {
            MqttPacket::Publish(publish) => {
                if let (QoS::AtLeastOnce, Some(packet_id)) = (publish.qos, publish.packet_id) {
                    let ack_len = PubAck { packet_id }
                        .encode(&mut self.tx)
                        .map_err(MqttError::from_codec)?;
                    if let Err(e) = self.transport.send(&self.tx[..ack_len]).await {
                        self.connected = false;
                        return Err(MqttError::Transport(e));
                    }
                    self.last_sent = Instant::now();
                }
                MqttEvent::Message(publish)
            }
            MqttPacket::SubAck(ack) => MqttEvent::Subscribed {
                packet_id: ack.packet_id,
                accepted: ack.accepted(),
            },
            MqttPacket::PubAck(ack) => MqttEvent::Published {
                packet_id: ack.packet_id,
            },
            MqttPacket::PingResp => MqttEvent::Pong,
            MqttPacket::Connect(_)
            | MqttPacket::ConnAck(_)
            | MqttPacket::Subscribe(_)
            | MqttPacket::PingReq => {
                return Err(MqttError::Protocol(ProtocolError::InvalidResponse));
            }
        };
        Ok(Some(event))
    }

    async fn service_keep_alive(&mut self) -> Result<(), MqttError<T::Error>> {
        if self.keep_alive.as_ticks() == 0 {
            return Ok(());
        }
        match self.ping_sent {
            Some(sent) if sent.elapsed() >= self.keep_alive => {
                warn!("no PINGRESP within {} ms, dropping session", self.keep_alive.as_millis());
                self.connected = false;
                Err(MqttError::Timeout)
            }
            Some(_) => Ok(()),
            None if self.last_sent.elapsed() >= self.keep_alive => {
                self.send_packet(&PingReq).await?;
                self.ping_sent = Some(self.last_sent);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn ensure_connected(&self) -> Result<(), MqttError<T::Error>> {
        if self.connected {
            Ok(())
        } else {
            Err(MqttError::NotConnected)
        }
    }

    fn allocate_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        // Packet id 0 is reserved.
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }

    async fn send_packet(&mut self, packet: &impl EncodePacket) -> Result<(), MqttError<T::Error>> {
        let len = packet.encode(&mut self.tx).map_err(MqttError::from_codec)?;
        if let Err(e) = self.transport.send(&self.tx[..len]).await {
            self.connected = false;
            return Err(MqttError::Transport(e));
        }
        self.last_sent = Instant::now();
        Ok(())
    }

    fn discard_consumed(&mut self) {
        if self.consumed > 0 {
            self.rx.copy_within(self.consumed..self.rx_len, 0);
            self.rx_len -= self.consumed;
            self.consumed = 0;
        }
    }

    /// Reads until `rx` starts with a complete packet and returns its length.
    ///
    /// Returns `Ok(None)` when `timeout` passes first; bytes of a partial
    /// packet stay buffered for the next call. A read timeout reported by the
    /// transport itself only ends that read, not the wait.
    async fn read_frame(&mut self, timeout: Duration) -> Result<Option<usize>, MqttError<T::Error>> {
        let deadline = Instant::now() + timeout;
        loop {
            let frame = packet::frame_len(&self.rx[..self.rx_len]).map_err(|e| {
                self.connected = false;
                MqttError::from_codec(e)
            })?;
            if let Some(len) = frame {
                if len > BUF_SIZE {
                    self.connected = false;
                    return Err(MqttError::BufferTooSmall);
                }
                if len <= self.rx_len {
                    return Ok(Some(len));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            let read = select(
                self.transport.recv(&mut self.rx[self.rx_len..]),
                Timer::at(deadline),
            )
            .await;
            match read {
                Either::First(Ok(0)) => {
                    self.connected = false;
                    return Err(MqttError::Protocol(ProtocolError::ConnectionClosed));
                }
                Either::First(Ok(n)) => self.rx_len += n,
                Either::First(Err(e)) if e.is_timeout() => {}
                Either::First(Err(e)) => {
                    self.connected = false;
                    return Err(MqttError::Transport(e));
                }
                Either::Second(()) => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectReasonCode;
    use crate::mock::{Broker, FakeTransport, ScriptedStream};
    use crate::transport::StreamTransport;
    use embassy_futures::block_on;

    fn options() -> MqttOptions<'static> {
        MqttOptions::new("dev-1")
            .with_username("hub.example.net/dev-1/api-version=2019-03-30")
            .with_keep_alive(Duration::from_secs(0))
    }

    fn connected_client(broker: &Broker) -> MqttClient<FakeTransport, 512> {
        broker.push_connack(0);
        let mut client = MqttClient::new(broker.transport());
        block_on(client.connect(&options())).unwrap();
        client
    }

    #[test]
    fn connect_sends_identity_and_accepts_connack() {
        let broker = Broker::new();
        let client = connected_client(&broker);
        assert!(client.is_connected());

        let sent = broker.sent();
        let Some(MqttPacket::Connect(connect)) = packet::decode(&sent[0]).unwrap() else {
            panic!("expected CONNECT");
        };
        assert_eq!(connect.client_id, "dev-1");
        assert_eq!(
            connect.username,
            Some("hub.example.net/dev-1/api-version=2019-03-30")
        );
        assert_eq!(connect.password, None);
    }

    #[test]
    fn refused_connect_reports_reason() {
        let broker = Broker::new();
        broker.push_connack(5);
        let mut client: MqttClient<_, 512> = MqttClient::new(broker.transport());

        let err = block_on(client.connect(&options())).unwrap_err();
        assert!(matches!(
            err,
            MqttError::ConnectionRefused(ConnectReasonCode::NotAuthorized)
        ));
        assert!(!client.is_connected());
    }

    #[test]
    fn missing_connack_times_out() {
        let broker = Broker::new();
        let mut client: MqttClient<_, 512> = MqttClient::new(broker.transport());
        let err = block_on(client.connect(&options())).unwrap_err();
        assert!(matches!(err, MqttError::Timeout));
    }

    #[test]
    fn publish_while_disconnected_is_rejected_without_sending() {
        let broker = Broker::new();
        let mut client: MqttClient<_, 512> = MqttClient::new(broker.transport());
        let err = block_on(client.publish("t", b"x", QoS::AtMostOnce)).unwrap_err();
        assert!(matches!(err, MqttError::NotConnected));
        assert!(broker.sent().is_empty());
    }

    #[test]
    fn poll_reassembles_split_publish() {
        let broker = Broker::new();
        let mut client = connected_client(&broker);

        let mut bytes = [0u8; 64];
        let len = Publish::new("$iothub/methods/POST/ping/?$rid=42", b"{}")
            .encode(&mut bytes)
            .unwrap();
        broker.push_bytes(&bytes[..3]);
        broker.push_bytes(&bytes[3..len]);

        match block_on(client.poll()).unwrap() {
            Some(MqttEvent::Message(msg)) => {
                assert_eq!(msg.topic, "$iothub/methods/POST/ping/?$rid=42");
                assert_eq!(msg.payload, b"{}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(block_on(client.poll()).unwrap().is_none());
    }

    #[test]
    fn qos1_message_is_acknowledged() {
        let broker = Broker::new();
        let mut client = connected_client(&broker);

        let mut bytes = [0u8; 64];
        let len = Publish {
            topic: "devices/dev-1/messages/devicebound/x",
            qos: QoS::AtLeastOnce,
            retain: false,
            payload: b"hello",
            packet_id: Some(9),
        }
        .encode(&mut bytes)
        .unwrap();
        broker.push_bytes(&bytes[..len]);

        assert!(matches!(
            block_on(client.poll()).unwrap(),
            Some(MqttEvent::Message(_))
        ));
        let sent = broker.sent();
        assert_eq!(sent.last().unwrap(), &[0x40, 0x02, 0x00, 0x09]);
    }

    #[test]
    fn suback_rejection_is_surfaced() {
        let broker = Broker::new();
        let mut client = connected_client(&broker);
        let packet_id = block_on(client.subscribe("a/#", QoS::AtMostOnce)).unwrap();
        broker.push_suback(packet_id, false);

        match block_on(client.poll()).unwrap() {
            Some(MqttEvent::Subscribed {
                packet_id: id,
                accepted,
            }) => {
                assert_eq!(id, packet_id);
                assert!(!accepted);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn closed_stream_drops_the_session() {
        let broker = Broker::new();
        let mut client = connected_client(&broker);
        broker.close();

        assert!(block_on(client.poll()).is_err());
        assert!(!client.is_connected());
        assert!(matches!(
            block_on(client.publish("t", b"x", QoS::AtMostOnce)),
            Err(MqttError::NotConnected)
        ));
    }

    fn keep_alive_client(broker: &Broker) -> MqttClient<FakeTransport, 512> {
        broker.push_connack(0);
        let mut client = MqttClient::new(broker.transport());
        let options = options().with_keep_alive(Duration::from_secs(1));
        block_on(client.connect(&options)).unwrap();
        client
    }

    fn pings_sent(broker: &Broker) -> usize {
        broker
            .sent()
            .iter()
            .filter(|bytes| bytes.as_slice() == [0xC0, 0x00])
            .count()
    }

    #[test]
    fn idle_session_pings_after_keep_alive_interval() {
        let broker = Broker::new();
        let start = Instant::now();
        let mut client = keep_alive_client(&broker);

        let mut polls = 0;
        while pings_sent(&broker) == 0 && polls < 100 {
            assert!(block_on(client.poll()).unwrap().is_none());
            polls += 1;
        }

        assert_eq!(pings_sent(&broker), 1);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(client.is_connected());
    }

    #[test]
    fn unanswered_ping_drops_the_session() {
        let broker = Broker::new();
        let mut client = keep_alive_client(&broker);

        let mut outcome = None;
        for _ in 0..200 {
            if let Err(e) = block_on(client.poll()) {
                outcome = Some(e);
                break;
            }
        }

        assert!(matches!(outcome, Some(MqttError::Timeout)));
        assert_eq!(pings_sent(&broker), 1);
        assert!(!client.is_connected());
    }

    #[test]
    fn pong_keeps_the_session_alive() {
        let broker = Broker::new();
        let mut client = keep_alive_client(&broker);

        while pings_sent(&broker) == 0 {
            block_on(client.poll()).unwrap();
        }
        broker.push_bytes(&[0xD0, 0x00]);
        assert!(matches!(block_on(client.poll()).unwrap(), Some(MqttEvent::Pong)));

        while pings_sent(&broker) < 2 {
            block_on(client.poll()).unwrap();
        }
        assert!(client.is_connected());
    }

    #[test]
    fn transport_read_timeout_leaves_idle_session_up() {
        let stream = ScriptedStream::new(&[0x20, 0x02, 0x00, 0x00]);
        let transport = StreamTransport::new(stream, Duration::from_millis(50));
        let mut client: MqttClient<_, 512> = MqttClient::new(transport);
        block_on(client.connect(&options())).unwrap();

        assert!(block_on(client.poll()).unwrap().is_none());
        assert!(client.is_connected());
    }

    #[test]
    fn slow_connack_over_stream_reports_timeout() {
        let transport = StreamTransport::new(ScriptedStream::new(&[]), Duration::from_millis(50));
        let mut client: MqttClient<_, 512> = MqttClient::new(transport);
        let options = options().with_connect_timeout(Duration::from_millis(500));

        let err = block_on(client.connect(&options)).unwrap_err();
        assert!(matches!(err, MqttError::Timeout));
        assert_eq!(err.as_str(), "Connection timeout");
    }
}
