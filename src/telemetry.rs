//! Periodic read-out of the running state of every discovered fan.
//!
//! Sampling is rate-limited by the publish interval and snapshots are
//! ephemeral: nothing is retained between publish cycles.

use crate::driver::{FanDriver, DEFAULT_PUBLISH_TELEMETRY_MS, MAX_FANS, SENSOR_DISCONNECTED_C};
use crate::map::DeviceMap;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One fan's worth of telemetry, in ascending fan-index order within a
/// snapshot. Fans whose sense diode reads the disconnected sentinel are
/// omitted entirely rather than reported with a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanTelemetry {
    pub fan: u8,
    pub running: bool,
    pub rpm: u16,
    pub duty_cycle: u8,
    pub temperature: f32,
}

pub type TelemetrySnapshot = Vec<FanTelemetry, MAX_FANS>;

#[derive(Debug)]
pub struct TelemetrySampler {
    publish_interval_ms: u32,
    last_publish_ms: u64,
    snapshots_published: u32,
}

impl Default for TelemetrySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySampler {
    pub fn new() -> Self {
        Self {
            publish_interval_ms: DEFAULT_PUBLISH_TELEMETRY_MS,
            last_publish_ms: 0,
            snapshots_published: 0,
        }
    }

    /// Set the publish interval in milliseconds. 0 disables sampling.
    pub fn set_publish_interval_ms(&mut self, interval_ms: u32) {
        self.publish_interval_ms = interval_ms;
    }

    pub fn publish_interval_ms(&self) -> u32 {
        self.publish_interval_ms
    }

    pub fn snapshots_published(&self) -> u32 {
        self.snapshots_published
    }

    /// Whether the next [`TelemetrySampler::sample`] call will fire. Skipped
    /// calls do not move the timer.
    pub fn due(&self, now_ms: u64) -> bool {
        self.publish_interval_ms != 0
            && now_ms.saturating_sub(self.last_publish_ms) > u64::from(self.publish_interval_ms)
    }

    /// Read rpm, duty cycle and temperature from every discovered fan, in
    /// ascending index order. Returns `None` when the interval has not elapsed
    /// or sampling is disabled. A fan whose channel cannot be selected, or
    /// whose diode reads disconnected, is left out of the snapshot; the timer
    /// still resets because the cycle fired.
    pub fn sample<D: FanDriver>(
        &mut self,
        map: &DeviceMap,
        driver: &mut D,
        now_ms: u64,
    ) -> Option<TelemetrySnapshot> {
        if !self.due(now_ms) {
            return None;
        }

        let mut snapshot = TelemetrySnapshot::new();

        for fan in map.fans() {
            if !driver.select_channel(fan.mux_address(), fan.channel as u8) {
                warn!(fan = fan.index, "channel select failed, fan not sampled");
                continue;
            }

            let temperature = driver.external_temperature();
            let duty_cycle = driver.duty_cycle();
            let rpm = driver.fan_rpm();

            if temperature == SENSOR_DISCONNECTED_C {
                continue;
            }

            // Capacity equals the addressable fan count, so this cannot fail.
            let _ = snapshot.push(FanTelemetry {
                fan: fan.index,
                running: rpm > 0,
                rpm,
                duty_cycle,
                temperature,
            });
        }

        self.last_publish_ms = now_ms;
        self.snapshots_published = self.snapshots_published.wrapping_add(1);

        Some(snapshot)
    }
}
