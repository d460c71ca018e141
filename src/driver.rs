//! Capability boundary to the fan-controller hardware.
//!
//! The bank never talks I2C directly; everything below the register level is
//! delegated to a [`FanDriver`] implementation (a real bus binding in firmware,
//! [`crate::sim::SimulatedBus`] in tests and the simulator). The bus carries up
//! to eight TCA9548 multiplexers, each exposing eight downstream channels with
//! at most one EMC2101 fan controller per channel.

/// Well-known bus addresses for the TCA9548 multiplexers.
pub const MUX_ADDRESSES: [u8; 8] = [0x70, 0x71, 0x72, 0x73, 0x74, 0x75, 0x76, 0x77];

pub const MUX_COUNT: usize = MUX_ADDRESSES.len();
pub const CHANNELS_PER_MUX: usize = 8;
pub const MAX_FANS: usize = MUX_COUNT * CHANNELS_PER_MUX;

/// Every EMC2101 answers on the same address; the mux channel disambiguates.
pub const FAN_DEVICE_ADDRESS: u8 = 0x4C;

/// The EMC2101 reports exactly 127 degrees when no sense diode is connected.
pub const SENSOR_DISCONNECTED_C: f32 = 127.0;

/// Curve programmed into every controller at discovery time.
pub const DEFAULT_CURVE: [(u8, u8); 3] = [(30, 25), (40, 50), (50, 100)];

/// Hysteresis applied to the lookup-table thresholds, in degrees.
pub const CURVE_HYSTERESIS_C: u8 = 5;

/// A controller holds at most eight (temperature, duty-cycle) curve slots.
pub const MAX_CURVE_POINTS: usize = 8;

/// How long after the last external temperature report before reverting to the
/// onboard sensor (per fan, configurable, 0 disables the watchdog).
pub const DEFAULT_EXTERNAL_TEMP_TIMEOUT_MS: u32 = 90_000;

/// How often telemetry is published (0 disables publishing).
pub const DEFAULT_PUBLISH_TELEMETRY_MS: u32 = 60_000;

/// Register-level operations of one bus segment.
///
/// The mux-select register is the shared resource on the segment: callers must
/// issue [`FanDriver::select_channel`] and then act before selecting again
/// (select-then-act). Read and write operations address whichever fan
/// controller sits behind the currently selected channel. Transport-level
/// timeouts are the implementation's concern; these calls return promptly.
pub trait FanDriver {
    /// Select a downstream channel on the given mux. Returns `false` if the
    /// select transaction failed; no other operation may be trusted until a
    /// select succeeds.
    fn select_channel(&mut self, mux_addr: u8, channel: u8) -> bool;

    /// Probe for a device at `device_addr`. Used with a mux address to detect
    /// the mux itself, and with [`FAN_DEVICE_ADDRESS`] (after a select) to
    /// detect and initialize a fan controller.
    fn open(&mut self, device_addr: u8) -> bool;

    /// Enable or disable the temperature lookup table. Disabled means the duty
    /// cycle register drives the fan directly.
    fn set_curve_enabled(&mut self, enabled: bool);

    fn set_hysteresis(&mut self, degrees: u8);

    /// Write one lookup-table slot. Slots are written in caller order; the
    /// last write to a slot index wins.
    fn set_curve_point(&mut self, index: u8, temperature: u8, duty_cycle: u8);

    fn set_duty_cycle(&mut self, percent: u8);

    fn duty_cycle(&mut self) -> u8;

    fn fan_rpm(&mut self) -> u16;

    /// Current reading of the external sense diode, in degrees. Returns
    /// [`SENSOR_DISCONNECTED_C`] when nothing is connected.
    fn external_temperature(&mut self) -> f32;

    /// Write the forced temperature register (takes effect only while forced
    /// temperature handling is enabled).
    fn set_forced_temperature(&mut self, degrees: u8);

    /// Substitute the forced temperature register for the sense diode as the
    /// curve input.
    fn enable_forced_temperature(&mut self, enabled: bool);
}
