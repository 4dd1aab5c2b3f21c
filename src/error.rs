//! # Error Types
//!
//! Errors raised by the MQTT session, the packet codec and the connection
//! supervisor. None of them is fatal to the device: the runtime logs the
//! translation returned by `as_str()` and loops back to the supervisor.

use core::convert::Infallible;
use core::fmt;

/// Result type of the packet codec, which never touches a transport.
pub type CodecResult<T> = Result<T, MqttError<Infallible>>;

/// The primary error enum for the MQTT client.
///
/// It is generic over the transport error type `T`, allowing it to wrap
/// specific errors from the underlying network transport (TCP, TLS, UART).
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// A protocol-level error occurred, indicating a violation of the MQTT specification.
    Protocol(ProtocolError),
    /// The connection was refused by the broker. The enclosed code provides the reason.
    ConnectionRefused(ConnectReasonCode),
    /// The client is not currently connected to the broker.
    NotConnected,
    /// The buffer provided for an operation was too small.
    BufferTooSmall,
    /// An operation timed out.
    Timeout,
}

impl<T> MqttError<T> {
    /// Widens a codec error into an error of any transport type.
    pub fn from_codec(err: MqttError<Infallible>) -> Self {
        match err {
            MqttError::Transport(never) => match never {},
            MqttError::Protocol(p) => MqttError::Protocol(p),
            MqttError::ConnectionRefused(c) => MqttError::ConnectionRefused(c),
            MqttError::NotConnected => MqttError::NotConnected,
            MqttError::BufferTooSmall => MqttError::BufferTooSmall,
            MqttError::Timeout => MqttError::Timeout,
        }
    }

    /// Human readable translation, suitable for a serial log line.
    pub fn as_str(&self) -> &'static str {
        match self {
            MqttError::Transport(_) => "Connect failed",
            MqttError::Protocol(ProtocolError::ConnectionClosed) => "Connection lost",
            MqttError::Protocol(_) => "Protocol violation",
            MqttError::ConnectionRefused(code) => code.as_str(),
            MqttError::NotConnected => "Disconnected",
            MqttError::BufferTooSmall => "Buffer too small",
            MqttError::Timeout => "Connection timeout",
        }
    }
}

impl<T> fmt::Display for MqttError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents the reason codes for a connection refusal (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion,
    /// The client identifier is not valid.
    IdentifierRejected,
    /// The broker is unavailable.
    ServerUnavailable,
    /// The username or password is not valid.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// An unknown or unspecified error occurred.
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

impl ConnectReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Connected",
            Self::UnacceptableProtocolVersion => "Connect bad protocol",
            Self::IdentifierRejected => "Connect bad Client-ID",
            Self::ServerUnavailable => "Connect unavailable",
            Self::BadUserNameOrPassword => "Connect bad credentials",
            Self::NotAuthorized => "Connect unauthorized",
            Self::Other(_) => "Connect failed",
        }
    }
}

/// Enumerates specific MQTT protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid packet type was received.
    InvalidPacketType(u8),
    /// The server sent an invalid or unexpected response.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// The payload of a message exceeds the maximum allowable size.
    PayloadTooLarge,
    /// A string was not valid UTF-8.
    InvalidUtf8String,
}

/// Why a connection attempt made by the supervisor did not produce a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectFailure {
    /// The secure socket could not be opened. `code` is the TLS library's
    /// last error when the connector exposes one.
    Tls { code: Option<i32> },
    /// The broker answered CONNACK with a non-zero return code.
    Refused(ConnectReasonCode),
    /// No CONNACK arrived in time.
    Timeout,
    /// The socket closed or failed during the handshake.
    ConnectionLost,
    /// The broker answered with something other than CONNACK.
    Protocol,
}

impl ConnectFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tls { .. } => "Connect failed",
            Self::Refused(code) => code.as_str(),
            Self::Timeout => "Connection timeout",
            Self::ConnectionLost => "Connection lost",
            Self::Protocol => "Connect bad protocol",
        }
    }
}

impl<T> From<MqttError<T>> for ConnectFailure {
    fn from(err: MqttError<T>) -> Self {
        match err {
            MqttError::ConnectionRefused(code) => Self::Refused(code),
            MqttError::Timeout => Self::Timeout,
            MqttError::Transport(_)
            | MqttError::NotConnected
            | MqttError::Protocol(ProtocolError::ConnectionClosed) => Self::ConnectionLost,
            MqttError::Protocol(_) | MqttError::BufferTooSmall => Self::Protocol,
        }
    }
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
