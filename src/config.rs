//! Compile-time device configuration.
//!
//! Values are baked into the firmware from `IOTHUB_*` environment variables
//! at build time. Unset variables fall back to placeholders, which build but
//! will be refused by the broker.

use core::fmt::Write;
use heapless::String;

/// API version appended to the MQTT username.
pub const API_VERSION: &str = "2019-03-30";

/// Maximum length of a derived MQTT username.
pub const MAX_USERNAME_LEN: usize = 192;

macro_rules! env_or {
    ($name:literal, $default:expr) => {
        match option_env!($name) {
            Some(value) => value,
            None => $default,
        }
    };
}

pub struct WifiConfig {
    pub ssid: &'static str,
    pub password: &'static str,
}

pub struct BrokerConfig {
    pub host: &'static str,
    pub port: u16,
}

pub struct NtpConfig {
    pub servers: [&'static str; 2],
    pub utc_offset_secs: i32,
    pub dst_offset_secs: i32,
    /// Any clock reading below this epoch means NTP has not answered yet.
    pub not_before_epoch_secs: u64,
}

/// PEM material compiled into the firmware for the TLS connector.
pub struct TlsCredentials {
    pub ca_cert_pem: &'static str,
    pub client_cert_pem: &'static str,
    pub client_key_pem: &'static str,
}

pub struct DeviceConfig {
    pub device_id: &'static str,
    pub wifi: WifiConfig,
    pub broker: BrokerConfig,
    pub ntp: NtpConfig,
    pub tls: TlsCredentials,
}

impl DeviceConfig {
    /// Username expected by the hub: `<host>/<device_id>/api-version=<version>`.
    ///
    /// Returns `None` when the result exceeds [`MAX_USERNAME_LEN`].
    pub fn mqtt_username(&self) -> Option<String<MAX_USERNAME_LEN>> {
        let mut username = String::new();
        write!(
            username,
            "{}/{}/api-version={}",
            self.broker.host, self.device_id, API_VERSION
        )
        .ok()?;
        Some(username)
    }
}

pub const DEVICE: DeviceConfig = DeviceConfig {
    device_id: env_or!("IOTHUB_DEVICE_ID", "YOUR_DEVICE_ID"),
    wifi: WifiConfig {
        ssid: env_or!("IOTHUB_WIFI_SSID", "YOUR_WIFI_SSID"),
        password: env_or!("IOTHUB_WIFI_PASSWORD", "YOUR_WIFI_PASSWORD"),
    },
    broker: BrokerConfig {
        host: env_or!(
            "IOTHUB_BROKER_HOST",
            "logicalis-eugeniostg-iothub.azure-devices.net"
        ),
        port: 8883,
    },
    ntp: NtpConfig {
        servers: ["pool.ntp.org", "time.nist.gov"],
        utc_offset_secs: -3 * 3600,
        dst_offset_secs: 0,
        not_before_epoch_secs: 1_510_592_825,
    },
    tls: TlsCredentials {
        ca_cert_pem: env_or!("IOTHUB_CA_PEM", ""),
        client_cert_pem: env_or!("IOTHUB_CLIENT_CERT_PEM", ""),
        client_key_pem: env_or!("IOTHUB_CLIENT_KEY_PEM", ""),
    },
};
