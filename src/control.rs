//! Per-fan control-mode state machine and watchdog bookkeeping.
//!
//! The mode is stored explicitly rather than inferred from driver flags, but
//! every transition also issues the corresponding capability calls so the
//! hardware registers and the recorded mode cannot drift apart. The watchdog
//! timestamp is kept separate from the mode: a fan can sit in `Manual` with an
//! external-temperature override still armed underneath it.

use crate::driver::{FanDriver, DEFAULT_EXTERNAL_TEMP_TIMEOUT_MS};
use serde::{Deserialize, Serialize};

/// Which source drives the fan speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    /// The onboard sense diode feeds the temperature curve.
    Automatic,
    /// A caller-supplied temperature feeds the curve.
    ForcedExternal,
    /// Fixed duty cycle, curve disabled.
    Manual { duty_cycle: u8 },
}

/// Host-side state for one discovered fan. Duty cycle, curve contents and the
/// forced-temperature registers live in the hardware; only the mode, the
/// watchdog window and the last override timestamp are tracked here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanState {
    pub mode: ControlMode,
    /// 0 disables the watchdog for this fan.
    pub external_temp_timeout_ms: u32,
    /// `None` means no external-temperature override is in flight.
    pub last_external_temp_ms: Option<u64>,
}

impl Default for FanState {
    fn default() -> Self {
        Self {
            mode: ControlMode::Automatic,
            external_temp_timeout_ms: DEFAULT_EXTERNAL_TEMP_TIMEOUT_MS,
            last_external_temp_ms: None,
        }
    }
}

impl FanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a duty-cycle command. Zero re-enables the curve and hands control
    /// back to the temperature source; anything else pins the fan at that duty
    /// cycle. Never touches the override timestamp.
    pub fn apply_duty_cycle<D: FanDriver>(&mut self, driver: &mut D, duty_cycle: u8) {
        driver.set_curve_enabled(duty_cycle == 0);
        driver.set_duty_cycle(duty_cycle);

        self.mode = if duty_cycle == 0 {
            // If an override is still armed the re-enabled curve follows the
            // forced source, not the onboard diode.
            if self.last_external_temp_ms.is_some() {
                ControlMode::ForcedExternal
            } else {
                ControlMode::Automatic
            }
        } else {
            ControlMode::Manual { duty_cycle }
        };
    }

    /// Apply an external-temperature report. A non-zero value arms (or
    /// refreshes) the override; zero cancels it, reverting the curve input to
    /// the onboard diode and disarming the watchdog.
    ///
    /// A manual fan keeps its mode either way: the forced register is written
    /// but the pinned duty cycle still wins at the hardware.
    pub fn apply_external_temperature<D: FanDriver>(
        &mut self,
        driver: &mut D,
        degrees: u8,
        now_ms: u64,
    ) {
        driver.enable_forced_temperature(degrees > 0);
        driver.set_forced_temperature(degrees);

        if degrees > 0 {
            self.last_external_temp_ms = Some(now_ms);
            if self.mode == ControlMode::Automatic {
                self.mode = ControlMode::ForcedExternal;
            }
        } else {
            self.last_external_temp_ms = None;
            if self.mode == ControlMode::ForcedExternal {
                self.mode = ControlMode::Automatic;
            }
        }
    }

    /// Whether the override has gone stale. Strictly greater-than: a tick at
    /// exactly `last + timeout` does not expire.
    pub fn override_expired(&self, now_ms: u64) -> bool {
        match self.last_external_temp_ms {
            Some(last) if self.external_temp_timeout_ms > 0 => {
                now_ms.saturating_sub(last) > u64::from(self.external_temp_timeout_ms)
            }
            _ => false,
        }
    }

    /// Revert a stale override to onboard sensing. A manual fan stays manual;
    /// only the forced-temperature source is withdrawn.
    pub fn revert_to_onboard<D: FanDriver>(&mut self, driver: &mut D) {
        driver.enable_forced_temperature(false);
        self.last_external_temp_ms = None;
        if self.mode == ControlMode::ForcedExternal {
            self.mode = ControlMode::Automatic;
        }
    }
}
