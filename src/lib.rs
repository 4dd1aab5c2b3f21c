//! # Secure MQTT Device Runtime for IoT Hubs
//!
//! `myrtio-iothub` is a `no_std`, allocation-free device runtime that keeps a
//! WiFi microcontroller connected to an IoT hub over MQTT on TLS, answers
//! direct-method invocations and publishes periodic telemetry. It is built on
//! the [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Core Features
//!
//! - **MQTT 3.1.1 session:** connect with username, subscribe, publish at QoS 0/1,
//!   keep-alive pings and framed reads with a timeout. Buffers are `heapless`.
//! - **Connection supervision:** waits for WiFi, reconnects with a fixed-delay
//!   retry policy and restores every subscription on each new session.
//! - **Transport agnostic:** any `embedded-io-async` stream works, so the TLS
//!   stack of the firmware plugs in through the [`transport::Connector`] trait.
//! - **Device modules:** a command dispatcher (`ping`, `ping_verbose`) and a
//!   telemetry publisher, composed with [`runtime::ModulePair`].
//!
//! ## Wiring
//!
//! The firmware owns the HAL, the WiFi driver and the TLS stack, and hands
//! them to the runtime through its trait seams:
//!
//! ```ignore
//! use myrtio_iothub::config::DEVICE;
//! use myrtio_iothub::device::{CommandDispatcher, TelemetryPublisher};
//! use myrtio_iothub::runtime::{ConnectionSupervisor, ModulePair, MqttRuntime};
//! use myrtio_iothub::topics::DeviceTopics;
//! use myrtio_iothub::{MqttOptions, clock};
//!
//! clock::sync_time(&mut sntp, &mut delay, &DEVICE.ntp).await;
//!
//! let username = DEVICE.mqtt_username().unwrap();
//! let options = MqttOptions::new(DEVICE.device_id).with_username(&username);
//! let topics = DeviceTopics::new(DEVICE.device_id).unwrap();
//!
//! let supervisor = ConnectionSupervisor::new(wifi, tls_connector, delay, options);
//! let device = ModulePair::new(
//!     CommandDispatcher::new(&topics),
//!     TelemetryPublisher::new(&topics.telemetry),
//! );
//! let mut runtime: MqttRuntime<_, _, _, _, 4, 1024> = MqttRuntime::new(supervisor, device);
//! runtime.run().await
//! ```
//!
//! ## Logging
//!
//! Enable one of the `log`, `defmt` or `esp32-log` features to get
//! diagnostics. Without them every log call compiles away.

#![cfg_attr(not(test), no_std)]

// Must come first so the macros are visible in the modules below.
#[macro_use]
mod fmt;

pub mod client;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod packet;
pub mod runtime;
pub mod topics;
pub mod transport;
pub mod util;

#[cfg(test)]
mod mock;

// Re-export key types for easier access at the crate root.
pub use client::{MqttClient, MqttEvent, MqttOptions};
pub use packet::QoS;
pub use transport::{StreamTransport, TcpTransport};
