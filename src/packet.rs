//! # MQTT Packet Structures and Serialization
//!
//! MQTT 3.1.1 control packets used by a device session, the traits for
//! encoding and decoding them, and the framing helper that tells the client
//! when a complete packet has arrived.

use crate::error::{CodecResult, MqttError, ProtocolError};
use crate::util::{
    self, read_u16, read_utf8_string, write_bytes, write_utf8_string, write_variable_byte_integer,
};
use heapless::Vec;

/// Protocol level byte for MQTT 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;

/// Maximum number of filters carried by one SUBSCRIBE.
pub const MAX_SUBSCRIBE_FILTERS: usize = 8;

/// SUBACK return code signalling that the broker rejected a filter.
pub const SUBACK_FAILURE: u8 = 0x80;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    fn from_bits(bits: u8) -> CodecResult<Self> {
        match bits {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(MqttError::Protocol(ProtocolError::MalformedPacket)),
        }
    }
}

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    /// Encodes the complete packet at the start of `buf`, returning its length.
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize>;
}

/// A trait for packets that can be decoded from a byte buffer holding exactly one packet.
pub trait DecodePacket<'a>: Sized {
    fn decode(buf: &'a [u8]) -> CodecResult<Self>;
}

/// An enumeration of all MQTT control packets a device session handles.
#[derive(Debug)]
pub enum MqttPacket<'a> {
    Connect(Connect<'a>),
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    PubAck(PubAck),
    Subscribe(Subscribe<'a>),
    SubAck(SubAck),
    PingReq,
    PingResp,
}

/// Returns the total length of the first packet in `buf` once its fixed
/// header is complete, or `None` while the length bytes are still arriving.
pub fn frame_len(buf: &[u8]) -> CodecResult<Option<usize>> {
    if buf.is_empty() {
        return Ok(None);
    }
    let mut cursor = 1;
    let remaining = util::try_read_variable_byte_integer(&mut cursor, buf)?;
    Ok(remaining.map(|len| cursor + len))
}

/// Decodes a buffer holding exactly one packet into an `MqttPacket`.
pub fn decode(buf: &[u8]) -> CodecResult<Option<MqttPacket<'_>>> {
    if buf.is_empty() {
        return Ok(None);
    }

    let packet_type = buf[0] >> 4;
    let packet = match packet_type {
        1 => MqttPacket::Connect(Connect::decode(buf)?),
        2 => MqttPacket::ConnAck(ConnAck::decode(buf)?),
        3 => MqttPacket::Publish(Publish::decode(buf)?),
        4 => MqttPacket::PubAck(PubAck::decode(buf)?),
        8 => MqttPacket::Subscribe(Subscribe::decode(buf)?),
        9 => MqttPacket::SubAck(SubAck::decode(buf)?),
        12 => MqttPacket::PingReq,
        13 => MqttPacket::PingResp,
        _ => {
            return Err(MqttError::Protocol(ProtocolError::InvalidPacketType(
                packet_type,
            )));
        }
    };

    Ok(Some(packet))
}

/// Writes a fixed header and a variable-length body into `buf`.
///
/// The body is encoded after a 5 byte gap (header byte plus the longest
/// remaining length), then moved down next to the real header.
fn encode_framed(
    buf: &mut [u8],
    first_byte: u8,
    body: impl FnOnce(&mut [u8]) -> CodecResult<usize>,
) -> CodecResult<usize> {
    const BODY_START: usize = 5;
    if buf.len() < BODY_START {
        return Err(MqttError::BufferTooSmall);
    }
    let body_len = body(&mut buf[BODY_START..])?;
    buf[0] = first_byte;
    let len_bytes = write_variable_byte_integer(&mut buf[1..BODY_START], body_len)?;
    let header_len = 1 + len_bytes;
    buf.copy_within(BODY_START..BODY_START + body_len, header_len);
    Ok(header_len + body_len)
}

/// Splits a packet into its fixed-header flags and its body.
fn split_body(buf: &[u8], expected_type: u8) -> CodecResult<(u8, &[u8])> {
    let first = *buf
        .first()
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    if first >> 4 != expected_type {
        return Err(MqttError::Protocol(ProtocolError::InvalidPacketType(
            first >> 4,
        )));
    }
    let mut cursor = 1;
    let remaining = util::read_variable_byte_integer(&mut cursor, buf)?;
    let body = buf
        .get(cursor..cursor + remaining)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    Ok((first & 0x0F, body))
}

// --- CONNECT Packet ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect<'a> {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            clean_session,
            keep_alive,
            client_id,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: Option<&'a str>, password: Option<&'a str>) -> Self {
        self.username = username;
        self.password = password;
        self
    }
}

impl EncodePacket for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        encode_framed(buf, 0x10, |body| {
            let mut cursor = write_utf8_string(body, "MQTT")?;

            let mut flags = 0;
            if self.clean_session {
                flags |= 0x02;
            }
            if self.username.is_some() {
                flags |= 0x80;
            }
            if self.password.is_some() {
                flags |= 0x40;
            }
            cursor += write_bytes(&mut body[cursor..], &[PROTOCOL_LEVEL, flags])?;
            cursor += write_bytes(&mut body[cursor..], &self.keep_alive.to_be_bytes())?;

            cursor += write_utf8_string(&mut body[cursor..], self.client_id)?;
            if let Some(username) = self.username {
                cursor += write_utf8_string(&mut body[cursor..], username)?;
            }
            if let Some(password) = self.password {
                cursor += write_utf8_string(&mut body[cursor..], password)?;
            }
            Ok(cursor)
        })
    }
}

impl<'a> DecodePacket<'a> for Connect<'a> {
    fn decode(buf: &'a [u8]) -> CodecResult<Self> {
        let (_, body) = split_body(buf, 1)?;
        let mut cursor = 0;
        if read_utf8_string(&mut cursor, body)? != "MQTT" {
            return Err(MqttError::Protocol(ProtocolError::InvalidResponse));
        }
        let header = body
            .get(cursor..cursor + 2)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
        let flags = header[1];
        cursor += 2;
        let keep_alive = read_u16(&mut cursor, body)?;
        let client_id = read_utf8_string(&mut cursor, body)?;
        if flags & 0x04 != 0 {
            // Will topic and message are skipped.
            read_utf8_string(&mut cursor, body)?;
            let will_len = read_u16(&mut cursor, body)? as usize;
            cursor += will_len;
        }
        let username = if flags & 0x80 != 0 {
            Some(read_utf8_string(&mut cursor, body)?)
        } else {
            None
        };
        let password = if flags & 0x40 != 0 {
            Some(read_utf8_string(&mut cursor, body)?)
        } else {
            None
        };
        Ok(Self {
            clean_session: flags & 0x02 != 0,
            keep_alive,
            client_id,
            username,
            password,
        })
    }
}

// --- CONNACK Packet ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub reason_code: u8,
}

impl DecodePacket<'_> for ConnAck {
    fn decode(buf: &[u8]) -> CodecResult<Self> {
        let (_, body) = split_body(buf, 2)?;
        match body {
            [flags, reason_code] => Ok(Self {
                session_present: flags & 0x01 != 0,
                reason_code: *reason_code,
            }),
            _ => Err(MqttError::Protocol(ProtocolError::MalformedPacket)),
        }
    }
}

impl EncodePacket for ConnAck {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        write_bytes(
            buf,
            &[0x20, 0x02, self.session_present as u8, self.reason_code],
        )
    }
}

// --- PUBLISH Packet ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub retain: bool,
    pub payload: &'a [u8],
    pub packet_id: Option<u16>,
}

impl<'a> Publish<'a> {
    /// A QoS 0 message without packet id, the shape every device publish takes.
    pub fn new(topic: &'a str, payload: &'a [u8]) -> Self {
        Self {
            topic,
            qos: QoS::AtMostOnce,
            retain: false,
            payload,
            packet_id: None,
        }
    }
}

impl<'a> DecodePacket<'a> for Publish<'a> {
    fn decode(buf: &'a [u8]) -> CodecResult<Self> {
        let (flags, body) = split_body(buf, 3)?;
        let qos = QoS::from_bits((flags >> 1) & 0x03)?;

        let mut cursor = 0;
        let topic = read_utf8_string(&mut cursor, body)?;
        let packet_id = if qos != QoS::AtMostOnce {
            Some(read_u16(&mut cursor, body)?)
        } else {
            None
        };

        Ok(Publish {
            topic,
            qos,
            retain: flags & 0x01 != 0,
            payload: &body[cursor..],
            packet_id,
        })
    }
}

impl EncodePacket for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let first_byte = 0x30 | ((self.qos as u8) << 1) | self.retain as u8;
        encode_framed(buf, first_byte, |body| {
            let mut cursor = write_utf8_string(body, self.topic)?;
            if self.qos != QoS::AtMostOnce {
                let id = self
                    .packet_id
                    .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
                cursor += write_bytes(&mut body[cursor..], &id.to_be_bytes())?;
            }
            cursor += write_bytes(&mut body[cursor..], self.payload)?;
            Ok(cursor)
        })
    }
}

// --- PUBACK Packet ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAck {
    pub packet_id: u16,
}

impl DecodePacket<'_> for PubAck {
    fn decode(buf: &[u8]) -> CodecResult<Self> {
        let (_, body) = split_body(buf, 4)?;
        let mut cursor = 0;
        Ok(PubAck {
            packet_id: read_u16(&mut cursor, body)?,
        })
    }
}

impl EncodePacket for PubAck {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        let [hi, lo] = self.packet_id.to_be_bytes();
        write_bytes(buf, &[0x40, 0x02, hi, lo])
    }
}

// --- SUBSCRIBE Packet ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub topics: Vec<(&'a str, QoS), MAX_SUBSCRIBE_FILTERS>,
}

impl<'a> Subscribe<'a> {
    /// Creates a new Subscribe packet with a single topic.
    pub fn new(packet_id: u16, topic: &'a str, qos: QoS) -> Self {
        let mut topics = Vec::new();
        let _ = topics.push((topic, qos));
        Self { packet_id, topics }
    }
}

impl<'a> DecodePacket<'a> for Subscribe<'a> {
    fn decode(buf: &'a [u8]) -> CodecResult<Self> {
        let (_, body) = split_body(buf, 8)?;
        let mut cursor = 0;
        let packet_id = read_u16(&mut cursor, body)?;
        let mut topics = Vec::new();
        while cursor < body.len() {
            let topic = read_utf8_string(&mut cursor, body)?;
            let qos = body
                .get(cursor)
                .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
            cursor += 1;
            topics
                .push((topic, QoS::from_bits(*qos)?))
                .map_err(|_| MqttError::BufferTooSmall)?;
        }
        Ok(Subscribe { packet_id, topics })
    }
}

impl EncodePacket for Subscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        // SUBSCRIBE carries the reserved flag bits 0b0010.
        encode_framed(buf, 0x82, |body| {
            let mut cursor = write_bytes(body, &self.packet_id.to_be_bytes())?;
            for (topic, qos) in &self.topics {
                cursor += write_utf8_string(&mut body[cursor..], topic)?;
                cursor += write_bytes(&mut body[cursor..], &[*qos as u8])?;
            }
            Ok(cursor)
        })
    }
}

// --- SUBACK Packet ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    pub reason_codes: Vec<u8, MAX_SUBSCRIBE_FILTERS>,
}

impl SubAck {
    /// Whether the broker granted every filter of the matching SUBSCRIBE.
    pub fn accepted(&self) -> bool {
        !self.reason_codes.iter().any(|code| *code == SUBACK_FAILURE)
    }
}

impl DecodePacket<'_> for SubAck {
    fn decode(buf: &[u8]) -> CodecResult<Self> {
        let (_, body) = split_body(buf, 9)?;
        let mut cursor = 0;
        let packet_id = read_u16(&mut cursor, body)?;
        let mut reason_codes = Vec::new();
        for code in &body[cursor..] {
            reason_codes
                .push(*code)
                .map_err(|_| MqttError::Protocol(ProtocolError::MalformedPacket))?;
        }
        Ok(SubAck {
            packet_id,
            reason_codes,
        })
    }
}

impl EncodePacket for SubAck {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        encode_framed(buf, 0x90, |body| {
            let cursor = write_bytes(body, &self.packet_id.to_be_bytes())?;
            Ok(cursor + write_bytes(&mut body[cursor..], &self.reason_codes)?)
        })
    }
}

// --- PINGREQ / PINGRESP Packets ---
#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        write_bytes(buf, &[0xC0, 0x00])
    }
}

#[derive(Debug)]
pub struct PingResp;

impl EncodePacket for PingResp {
    fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        write_bytes(buf, &[0xD0, 0x00])
    }
}
