//! In-memory bus for tests and the simulator binary.
//!
//! `SimulatedBus` models the topology the real transport would expose: a set
//! of present muxes, an optional fan controller behind each channel, and the
//! shared mux-select register. Individual channel selects can be forced to
//! fail to exercise the deferral paths.

use crate::driver::{
    FanDriver, CHANNELS_PER_MUX, FAN_DEVICE_ADDRESS, MAX_CURVE_POINTS, MUX_ADDRESSES, MUX_COUNT,
};
use serde::{Deserialize, Serialize};

/// Register file of one simulated EMC2101.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedDevice {
    pub curve_enabled: bool,
    pub hysteresis_c: u8,
    pub curve: [(u8, u8); MAX_CURVE_POINTS],
    pub curve_len: usize,
    pub duty_cycle: u8,
    pub rpm: u16,
    pub temperature_c: f32,
    pub forced_temperature_c: u8,
    pub forced_enabled: bool,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self {
            curve_enabled: false,
            hysteresis_c: 0,
            curve: [(0, 0); MAX_CURVE_POINTS],
            curve_len: 0,
            duty_cycle: 0,
            rpm: 0,
            temperature_c: 25.0,
            forced_temperature_c: 0,
            forced_enabled: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct SimulatedBus {
    mux_present: [bool; MUX_COUNT],
    devices: [[Option<SimulatedDevice>; CHANNELS_PER_MUX]; MUX_COUNT],
    selected: Option<(usize, usize)>,
    failing_selects: Vec<(usize, usize)>,
    select_count: u32,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style topology setup: install a device (and its mux) at the
    /// given position.
    pub fn with_device(mut self, mux: usize, channel: usize) -> Self {
        self.add_device(mux, channel);
        self
    }

    /// Builder-style setup of a mux with no devices behind it.
    pub fn with_mux(mut self, mux: usize) -> Self {
        self.add_mux(mux);
        self
    }

    pub fn add_mux(&mut self, mux: usize) {
        self.mux_present[mux] = true;
    }

    pub fn add_device(&mut self, mux: usize, channel: usize) {
        self.mux_present[mux] = true;
        self.devices[mux][channel] = Some(SimulatedDevice::default());
    }

    pub fn device(&self, mux: usize, channel: usize) -> Option<&SimulatedDevice> {
        self.devices[mux][channel].as_ref()
    }

    pub fn device_mut(&mut self, mux: usize, channel: usize) -> Option<&mut SimulatedDevice> {
        self.devices[mux][channel].as_mut()
    }

    /// Set the readings the next telemetry pass will observe.
    pub fn set_reading(&mut self, mux: usize, channel: usize, temperature_c: f32, rpm: u16) {
        if let Some(device) = self.devices[mux][channel].as_mut() {
            device.temperature_c = temperature_c;
            device.rpm = rpm;
        }
    }

    /// Force every select of this channel to fail until cleared.
    pub fn fail_select(&mut self, mux: usize, channel: usize) {
        if !self.failing_selects.contains(&(mux, channel)) {
            self.failing_selects.push((mux, channel));
        }
    }

    pub fn clear_select_failure(&mut self, mux: usize, channel: usize) {
        self.failing_selects.retain(|slot| *slot != (mux, channel));
    }

    pub fn select_count(&self) -> u32 {
        self.select_count
    }

    fn mux_index(addr: u8) -> Option<usize> {
        MUX_ADDRESSES.iter().position(|a| *a == addr)
    }

    fn selected_device_mut(&mut self) -> Option<&mut SimulatedDevice> {
        let (mux, channel) = self.selected?;
        self.devices[mux][channel].as_mut()
    }
}

impl FanDriver for SimulatedBus {
    fn select_channel(&mut self, mux_addr: u8, channel: u8) -> bool {
        self.select_count = self.select_count.wrapping_add(1);

        let Some(mux) = Self::mux_index(mux_addr) else {
            return false;
        };
        let channel = channel as usize;

        if channel >= CHANNELS_PER_MUX || !self.mux_present[mux] {
            return false;
        }
        if self.failing_selects.contains(&(mux, channel)) {
            return false;
        }

        self.selected = Some((mux, channel));
        true
    }

    fn open(&mut self, device_addr: u8) -> bool {
        if let Some(mux) = Self::mux_index(device_addr) {
            return self.mux_present[mux];
        }

        if device_addr == FAN_DEVICE_ADDRESS {
            if let Some((mux, channel)) = self.selected {
                return self.devices[mux][channel].is_some();
            }
        }

        false
    }

    fn set_curve_enabled(&mut self, enabled: bool) {
        if let Some(device) = self.selected_device_mut() {
            device.curve_enabled = enabled;
        }
    }

    fn set_hysteresis(&mut self, degrees: u8) {
        if let Some(device) = self.selected_device_mut() {
            device.hysteresis_c = degrees;
        }
    }

    fn set_curve_point(&mut self, index: u8, temperature: u8, duty_cycle: u8) {
        let index = index as usize;
        if index >= MAX_CURVE_POINTS {
            return;
        }
        if let Some(device) = self.selected_device_mut() {
            device.curve[index] = (temperature, duty_cycle);
            device.curve_len = device.curve_len.max(index + 1);
        }
    }

    fn set_duty_cycle(&mut self, percent: u8) {
        if let Some(device) = self.selected_device_mut() {
            device.duty_cycle = percent;
        }
    }

    fn duty_cycle(&mut self) -> u8 {
        self.selected_device_mut().map_or(0, |d| d.duty_cycle)
    }

    fn fan_rpm(&mut self) -> u16 {
        self.selected_device_mut().map_or(0, |d| d.rpm)
    }

    fn external_temperature(&mut self) -> f32 {
        self.selected_device_mut()
            .map_or(crate::driver::SENSOR_DISCONNECTED_C, |d| d.temperature_c)
    }

    fn set_forced_temperature(&mut self, degrees: u8) {
        if let Some(device) = self.selected_device_mut() {
            device.forced_temperature_c = degrees;
        }
    }

    fn enable_forced_temperature(&mut self, enabled: bool) {
        if let Some(device) = self.selected_device_mut() {
            device.forced_enabled = enabled;
        }
    }
}
