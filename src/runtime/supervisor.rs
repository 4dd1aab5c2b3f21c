//! Connection supervision.
//!
//! `ConnectionSupervisor::ensure_connected` brings the WiFi link and the MQTT
//! session up from whatever state they are in, re-subscribing the registered
//! filters every time a new session is opened. Waiting happens only through
//! the injected `DelayNs`, so every suspension point is visible to the caller.

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;

use super::registry::TopicRegistry;
use crate::client::{MqttClient, MqttOptions};
use crate::error::ConnectFailure;
use crate::packet::QoS;
use crate::transport::{Connector, TransportError};

/// `duration` in whole milliseconds, saturating at `u32::MAX`.
pub(crate) fn duration_ms(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

/// Station-mode WiFi link status.
pub trait WifiLink {
    fn is_connected(&mut self) -> bool;
}

/// How often and how long to retry a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until success.
    pub max_attempts: Option<u32>,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn forever(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            delay,
        }
    }

    pub const fn attempts(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            delay,
        }
    }

    /// One attempt, no pause.
    pub const fn single() -> Self {
        Self::attempts(1, Duration::from_ticks(0))
    }

    fn may_retry_after(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Pause between WiFi status polls.
    pub wifi_poll_interval: Duration,
    /// Policy of a blocking `ensure_connected`. Non-blocking calls always
    /// make a single attempt.
    pub blocking_retry: RetryPolicy,
    /// QoS requested for every subscription.
    pub subscribe_qos: QoS,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            wifi_poll_interval: Duration::from_millis(1000),
            blocking_retry: RetryPolicy::forever(Duration::from_secs(5)),
            subscribe_qos: QoS::AtMostOnce,
        }
    }
}

/// Outcome of [`ConnectionSupervisor::ensure_connected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionResult {
    /// The session was already up; nothing was done.
    AlreadyConnected,
    /// A new session was opened and the filters were subscribed.
    Connected { attempts: u32 },
    /// The retry policy ran out. Carries the last failure.
    Failed(ConnectFailure),
}

impl ConnectionResult {
    pub fn is_connected(&self) -> bool {
        !matches!(self, ConnectionResult::Failed(_))
    }
}

pub struct ConnectionSupervisor<'a, W, C, D> {
    wifi: W,
    connector: C,
    delay: D,
    options: MqttOptions<'a>,
    config: SupervisorConfig,
}

impl<'a, W, C, D> ConnectionSupervisor<'a, W, C, D>
where
    W: WifiLink,
    C: Connector,
    D: DelayNs,
{
    pub fn new(wifi: W, connector: C, delay: D, options: MqttOptions<'a>) -> Self {
        Self {
            wifi,
            connector,
            delay,
            options,
            config: SupervisorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    /// Polls the WiFi link until it reports connected. No timeout.
    pub async fn wait_for_wifi(&mut self, verbose: bool) {
        if self.wifi.is_connected() {
            return;
        }
        if verbose {
            info!("Waiting for WiFi");
        }
        while !self.wifi.is_connected() {
            self.delay
                .delay_ms(duration_ms(self.config.wifi_poll_interval))
                .await;
        }
        if verbose {
            info!("WiFi ok");
        }
    }

    /// Brings the WiFi link and the MQTT session up.
    ///
    /// A no-op when `session` is already connected. Otherwise waits for WiFi,
    /// then opens a new session and subscribes every filter in `topics`. A
    /// failed subscribe is logged and skipped. With `blocking` the attempt is
    /// repeated per [`SupervisorConfig::blocking_retry`]; without it exactly
    /// one attempt is made.
    pub async fn ensure_connected<const MAX_TOPICS: usize, const BUF_SIZE: usize>(
        &mut self,
        session: &mut Option<MqttClient<C::Transport, BUF_SIZE>>,
        topics: &TopicRegistry<MAX_TOPICS>,
        blocking: bool,
    ) -> ConnectionResult {
        if session.as_ref().is_some_and(|client| client.is_connected()) {
            return ConnectionResult::AlreadyConnected;
        }
        // A dead session still owns its socket; release it before dialing.
        *session = None;

        let policy = if blocking {
            self.config.blocking_retry
        } else {
            RetryPolicy::single()
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            self.wait_for_wifi(blocking).await;

            info!("MQTT connecting (attempt {})", attempts);
            let failure = match self.try_connect::<MAX_TOPICS, BUF_SIZE>(topics).await {
                Ok(client) => {
                    *session = Some(client);
                    return ConnectionResult::Connected { attempts };
                }
                Err(failure) => failure,
            };

            if !policy.may_retry_after(attempts) {
                warn!("MQTT connect failed, reason -> {}", failure.as_str());
                return ConnectionResult::Failed(failure);
            }
            warn!(
                "MQTT connect failed, reason -> {}; try again in {} ms",
                failure.as_str(),
                policy.delay.as_millis()
            );
            self.delay.delay_ms(duration_ms(policy.delay)).await;
        }
    }

    async fn try_connect<const MAX_TOPICS: usize, const BUF_SIZE: usize>(
        &mut self,
        topics: &TopicRegistry<MAX_TOPICS>,
    ) -> Result<MqttClient<C::Transport, BUF_SIZE>, ConnectFailure> {
        let transport = self.connector.connect().await.map_err(|e| {
            let code = e.tls_error_code();
            error!("SSL Error Code: {:?}", code);
            ConnectFailure::Tls { code }
        })?;

        let mut client = MqttClient::new(transport);
        client.connect(&self.options).await?;
        info!("MQTT connected as {}", self.options.client_id);

        for topic in topics.iter() {
            if let Err(e) = client.subscribe(topic, self.config.subscribe_qos).await {
                warn!("subscribe to {} failed: {}", topic, e.as_str());
            }
        }
        Ok(client)
    }
}
