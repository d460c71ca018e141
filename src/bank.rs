//! Orchestrator for the whole fan bank.
//!
//! `FanBank` owns the driver, the device map, the per-fan state table and the
//! telemetry sampler. All operations run to completion on the caller's thread
//! and are bounded by the number of discovered fans times one bus transaction;
//! the external scheduler decides when to tick the watchdog and the sampler.
//!
//! Error policy: per-fan problems (bad index, failed select) are logged and
//! skipped without aborting the surrounding batch or tick. When discovery
//! found no fans at all, every public operation is a silent no-op.

use crate::control::FanState;
use crate::driver::{
    FanDriver, CHANNELS_PER_MUX, CURVE_HYSTERESIS_C, DEFAULT_CURVE, FAN_DEVICE_ADDRESS,
    MAX_CURVE_POINTS, MAX_FANS, MUX_ADDRESSES, MUX_COUNT,
};
use crate::map::{fan_index, DeviceMap, FanRef};
use crate::protocol::{
    CommandDocument, ConfigDocument, CurvePoint, FanCommandEntry, FanConfigEntry, IngestReport,
    MAX_DUTY_CYCLE, MAX_INTERVAL_SECONDS, MAX_TEMPERATURE_C,
};
use crate::telemetry::{TelemetrySampler, TelemetrySnapshot};
use heapless::FnvIndexMap;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use tracing::{debug, info, warn};

// FnvIndexMap requires a power-of-two capacity.
const_assert!(MAX_FANS.is_power_of_two());

pub type FanTable = FnvIndexMap<u8, FanState, MAX_FANS>;

/// Running counters, exposed for inspection and logs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BankStats {
    pub fans_found: u8,
    pub config_entries_applied: u32,
    pub command_entries_applied: u32,
    pub entries_skipped: u32,
    pub watchdog_reverts: u32,
    pub watchdog_deferrals: u32,
}

pub struct FanBank<D: FanDriver> {
    driver: D,
    map: DeviceMap,
    fans: FanTable,
    sampler: TelemetrySampler,
    stats: BankStats,
}

impl<D: FanDriver> FanBank<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            map: DeviceMap::new(),
            fans: FanTable::new(),
            sampler: TelemetrySampler::new(),
            stats: BankStats::default(),
        }
    }

    /// Scan the mux address space and every channel of each responding mux for
    /// fan controllers. Runs once at startup; a device that does not answer
    /// now does not exist for the rest of the session. Each fan found gets the
    /// default curve, hysteresis and watchdog window.
    pub fn discover(&mut self) -> u8 {
        info!("scanning for fan controllers");

        for mux in 0..MUX_COUNT {
            let mux_addr = MUX_ADDRESSES[mux];

            if !self.driver.open(mux_addr) {
                debug!("no mux at 0x{mux_addr:02X}");
                continue;
            }
            self.map.mark_mux_present(mux);
            debug!("mux present at 0x{mux_addr:02X}");

            for channel in 0..CHANNELS_PER_MUX {
                if !self.driver.select_channel(mux_addr, channel as u8) {
                    continue;
                }

                if !self.driver.open(FAN_DEVICE_ADDRESS) {
                    continue;
                }

                let index = fan_index(mux, channel);
                self.map.mark_device_detected(mux, channel);
                // The table capacity matches the addressable space, so the
                // insert cannot fail for a fresh index.
                let _ = self.fans.insert(index, FanState::new());

                self.driver.set_curve_enabled(true);
                self.driver.set_hysteresis(CURVE_HYSTERESIS_C);
                for (slot, (temperature, duty_cycle)) in DEFAULT_CURVE.iter().enumerate() {
                    self.driver
                        .set_curve_point(slot as u8, *temperature, *duty_cycle);
                }

                info!(fan = index, mux, channel, "fan controller found");
            }
        }

        self.stats.fans_found = self.map.fans_found();
        info!(fans_found = self.stats.fans_found, "scan complete");
        self.stats.fans_found
    }

    /// Revert every fan whose external-temperature override has gone stale.
    /// A fan whose channel cannot be selected this tick is left armed and
    /// retried on the next tick.
    pub fn poll_watchdog(&mut self, now_ms: u64) {
        if self.map.is_empty() {
            return;
        }

        for fan in self.map.fans() {
            let Some(state) = self.fans.get_mut(&fan.index) else {
                continue;
            };

            if !state.override_expired(now_ms) {
                continue;
            }

            if !Self::select(&mut self.driver, &fan) {
                debug!(fan = fan.index, "select failed, revert deferred");
                self.stats.watchdog_deferrals += 1;
                continue;
            }

            state.revert_to_onboard(&mut self.driver);
            self.stats.watchdog_reverts += 1;
            info!(fan = fan.index, "external temperature stale, reverting to onboard sensor");
        }
    }

    /// Produce a telemetry snapshot if the publish interval has elapsed.
    pub fn sample_telemetry(&mut self, now_ms: u64) -> Option<TelemetrySnapshot> {
        if self.map.is_empty() {
            return None;
        }

        self.sampler.sample(&self.map, &mut self.driver, now_ms)
    }

    /// Apply a configuration document: the global publish interval plus any
    /// per-fan timeout and curve settings. Invalid entries and out-of-range
    /// fields are skipped with a warning; the rest of the batch applies.
    pub fn apply_config(&mut self, doc: &ConfigDocument) -> IngestReport {
        let mut report = IngestReport::default();

        if self.map.is_empty() {
            return report;
        }

        if let Some(seconds) = doc.publish_fan_telemetry_seconds {
            if seconds <= MAX_INTERVAL_SECONDS {
                self.sampler.set_publish_interval_ms(seconds * 1000);
                report.record_applied();
            } else {
                warn!(seconds, "publish interval out of range, ignored");
                report.record_skipped();
            }
        }

        if let Some(entries) = &doc.fans {
            for entry in entries {
                if self.apply_fan_config(entry) {
                    self.stats.config_entries_applied += 1;
                    report.record_applied();
                } else {
                    self.stats.entries_skipped += 1;
                    report.record_skipped();
                }
            }
        }

        report
    }

    /// Apply a command document: per-fan duty cycles and external temperature
    /// reports. Same skip-and-continue policy as configuration.
    pub fn apply_command(&mut self, doc: &CommandDocument, now_ms: u64) -> IngestReport {
        let mut report = IngestReport::default();

        if self.map.is_empty() {
            return report;
        }

        if let Some(entries) = &doc.fans {
            for entry in entries {
                if self.apply_fan_command(entry, now_ms) {
                    self.stats.command_entries_applied += 1;
                    report.record_applied();
                } else {
                    self.stats.entries_skipped += 1;
                    report.record_skipped();
                }
            }
        }

        report
    }

    pub fn map(&self) -> &DeviceMap {
        &self.map
    }

    pub fn fan_state(&self, index: u8) -> Option<&FanState> {
        self.fans.get(&index)
    }

    pub fn sampler(&self) -> &TelemetrySampler {
        &self.sampler
    }

    pub fn stats(&self) -> &BankStats {
        &self.stats
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    fn apply_fan_config(&mut self, entry: &FanConfigEntry) -> bool {
        let fan = match self.map.validate(entry.fan) {
            Ok(fan) => fan,
            Err(e) => {
                warn!("config entry skipped: {e}");
                return false;
            }
        };

        if !Self::select(&mut self.driver, &fan) {
            warn!(fan = fan.index, "select failed, config entry skipped");
            return false;
        }

        // The state entry exists for every validated fan.
        let Some(state) = self.fans.get_mut(&fan.index) else {
            return false;
        };

        if let Some(seconds) = entry.external_temperature_timeout_seconds {
            if seconds <= MAX_INTERVAL_SECONDS {
                state.external_temp_timeout_ms = seconds * 1000;
            } else {
                warn!(fan = fan.index, seconds, "timeout out of range, ignored");
            }
        }

        if let Some(points) = &entry.fan_speed_thresholds {
            Self::apply_curve(&mut self.driver, fan.index, points);
        }

        true
    }

    /// Write curve points in array order, by slot index. Points are not
    /// deduplicated or sorted; an out-of-range point is skipped without
    /// disturbing its neighbors.
    fn apply_curve(driver: &mut D, fan: u8, points: &[CurvePoint]) {
        for (slot, point) in points.iter().take(MAX_CURVE_POINTS).enumerate() {
            if point.temperature > MAX_TEMPERATURE_C || point.duty_cycle > MAX_DUTY_CYCLE {
                warn!(
                    fan,
                    slot,
                    temperature = point.temperature,
                    duty_cycle = point.duty_cycle,
                    "curve point out of range, ignored"
                );
                continue;
            }
            driver.set_curve_point(slot as u8, point.temperature, point.duty_cycle);
        }

        if points.len() > MAX_CURVE_POINTS {
            warn!(fan, count = points.len(), "curve truncated to {MAX_CURVE_POINTS} points");
        }
    }

    fn apply_fan_command(&mut self, entry: &FanCommandEntry, now_ms: u64) -> bool {
        let fan = match self.map.validate(entry.fan) {
            Ok(fan) => fan,
            Err(e) => {
                warn!("command entry skipped: {e}");
                return false;
            }
        };

        if !Self::select(&mut self.driver, &fan) {
            warn!(fan = fan.index, "select failed, command entry skipped");
            return false;
        }

        let Some(state) = self.fans.get_mut(&fan.index) else {
            return false;
        };

        if let Some(duty_cycle) = entry.duty_cycle {
            if duty_cycle <= MAX_DUTY_CYCLE {
                state.apply_duty_cycle(&mut self.driver, duty_cycle);
                debug!(fan = fan.index, duty_cycle, "duty cycle applied");
            } else {
                warn!(fan = fan.index, duty_cycle, "duty cycle out of range, ignored");
            }
        }

        if let Some(degrees) = entry.external_temperature {
            if degrees <= MAX_TEMPERATURE_C {
                state.apply_external_temperature(&mut self.driver, degrees, now_ms);
                debug!(fan = fan.index, degrees, "external temperature applied");
            } else {
                warn!(fan = fan.index, degrees, "external temperature out of range, ignored");
            }
        }

        true
    }

    fn select(driver: &mut D, fan: &FanRef) -> bool {
        driver.select_channel(fan.mux_address(), fan.channel as u8)
    }
}
