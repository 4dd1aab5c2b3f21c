//! # MQTT Transport Abstraction
//!
//! `MqttTransport` abstracts the secure socket the session runs over, so the
//! client stays independent of the WiFi driver, the TCP stack and the TLS
//! library. `Connector` is the factory the connection supervisor uses to open
//! a fresh transport (TCP connect plus TLS handshake) on every attempt.
//!
//! With the Rust 2024 Edition, these traits use native `async fn`, removing the
//! need for the `#[async_trait]` macro.

use embassy_net::tcp::{Error as TcpError, TcpSocket};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};

/// A trait representing a transport for MQTT packets.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    /// The error type returned by the transport.
    type Error: TransportError;

    /// Sends a buffer of data over the transport.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Receives data from the transport into a buffer.
    ///
    /// Returns the number of bytes read. Zero means the peer closed the stream.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Errors raised while opening or using a secure socket.
pub trait TransportError: core::fmt::Debug {
    /// The TLS library's last error code, when the failure came from the
    /// handshake and the library exposes one.
    fn tls_error_code(&self) -> Option<i32> {
        None
    }

    /// Whether the failure only means no data arrived in time. The session
    /// treats such a read as empty instead of dropping the connection.
    fn is_timeout(&self) -> bool {
        false
    }
}

impl TransportError for TcpError {}

/// Opens a connected, authenticated transport to the broker.
///
/// Implementations own the broker address and the PEM material (CA trust
/// anchor, client certificate and private key) and perform the TCP connect
/// and TLS handshake each time `connect` is called.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Transport: MqttTransport;
    type Error: TransportError;

    async fn connect(&mut self) -> Result<Self::Transport, Self::Error>;
}

/// Errors of a [`StreamTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError<E> {
    /// The underlying stream failed.
    Io(E),
    /// No data arrived before the read timeout.
    Timeout,
}

impl<E: core::fmt::Debug> TransportError for StreamError<E> {
    fn is_timeout(&self) -> bool {
        matches!(self, StreamError::Timeout)
    }
}

/// Transport over any `embedded-io-async` byte stream.
///
/// Works for a plain `embassy-net` TCP socket as well as for a TLS connection
/// layered over it, since both expose `Read + Write`.
pub struct StreamTransport<S> {
    stream: S,
    timeout: Duration,
}

/// TCP transport implementation using `embassy-net`.
pub type TcpTransport<'a> = StreamTransport<TcpSocket<'a>>;

impl<S> StreamTransport<S> {
    /// Creates a new transport with the given stream and read timeout.
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self { stream, timeout }
    }

    /// Gives the stream back, e.g. to close the socket.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> StreamTransport<S> {
    /// A helper function to perform a read with a timeout.
    async fn read_with_timeout(&mut self, buf: &mut [u8]) -> Result<usize, StreamError<S::Error>> {
        // Use `select` to race the read operation against a timer.
        let read_fut = self.stream.read(buf);
        let timer = Timer::after(self.timeout);

        match futures::future::select(core::pin::pin!(read_fut), core::pin::pin!(timer)).await {
            futures::future::Either::Left((result, _)) => result.map_err(StreamError::Io),
            futures::future::Either::Right(((), _)) => Err(StreamError::Timeout),
        }
    }
}

impl<S: Read + Write> MqttTransport for StreamTransport<S> {
    type Error = StreamError<S::Error>;

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.stream.write_all(buf).await.map_err(StreamError::Io)?;
        // Flush to ensure data is actually sent to the network
        self.stream.flush().await.map_err(StreamError::Io)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.read_with_timeout(buf).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embassy_futures::block_on;

    /// In-memory stream serving a fixed byte string.
    struct Loopback {
        input: &'static [u8],
        written: std::vec::Vec<u8>,
        flushed: bool,
    }

    impl embedded_io_async::ErrorType for Loopback {
        type Error = Infallible;
    }

    impl Read for Loopback {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let n = buf.len().min(self.input.len());
            buf[..n].copy_from_slice(&self.input[..n]);
            self.input = &self.input[n..];
            Ok(n)
        }
    }

    impl Write for Loopback {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            self.flushed = true;
            Ok(())
        }
    }

    #[test]
    fn stream_transport_writes_and_flushes() {
        let stream = Loopback {
            input: &[0xD0, 0x00],
            written: std::vec::Vec::new(),
            flushed: false,
        };
        let mut transport = StreamTransport::new(stream, Duration::from_secs(1));

        block_on(transport.send(&[0xC0, 0x00])).unwrap();
        let mut buf = [0u8; 4];
        let n = block_on(transport.recv(&mut buf)).unwrap();
        assert_eq!(&buf[..n], &[0xD0, 0x00]);

        let stream = transport.into_inner();
        assert_eq!(stream.written, [0xC0, 0x00]);
        assert!(stream.flushed);
    }

    #[test]
    fn only_read_timeout_counts_as_no_data() {
        assert!(StreamError::<Infallible>::Timeout.is_timeout());
        assert!(!StreamError::Io(()).is_timeout());
    }
}
