//! Wall-clock synchronisation.
//!
//! TLS certificate validation needs a real date, so the firmware waits for
//! NTP before the first broker connection.

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;

use crate::config::NtpConfig;
use crate::runtime::duration_ms;

/// Interval between clock reads while waiting for NTP.
pub const TIME_SYNC_POLL: Duration = Duration::from_millis(500);

/// The platform's SNTP-backed wall clock.
pub trait TimeSource {
    /// Starts SNTP against `servers` with the given offsets.
    fn configure(&mut self, utc_offset_secs: i32, dst_offset_secs: i32, servers: &[&str]);

    /// Seconds since the Unix epoch as currently known to the device.
    fn now_epoch_secs(&self) -> u64;
}

/// Configures `time` from `ntp` and blocks until the clock is plausible.
///
/// There is no timeout: without a valid date no TLS session can be opened.
/// Returns the first plausible epoch reading.
pub async fn sync_time<S, D>(time: &mut S, delay: &mut D, ntp: &NtpConfig) -> u64
where
    S: TimeSource,
    D: DelayNs,
{
    info!("Setting up time using NTP");
    time.configure(ntp.utc_offset_secs, ntp.dst_offset_secs, &ntp.servers);

    let mut now = time.now_epoch_secs();
    while now < ntp.not_before_epoch_secs {
        delay.delay_ms(duration_ms(TIME_SYNC_POLL)).await;
        now = time.now_epoch_secs();
    }

    info!("Current time (epoch): {}", now);
    now
}
