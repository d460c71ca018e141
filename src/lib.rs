//! # Fan Bank Manager
//!
//! Management of a bank of EMC2101 fan controllers reachable through a tree of
//! TCA9548 I2C multiplexers: per-fan automatic (temperature-curve) and manual
//! (duty-cycle) control, plus a watchdog that reverts stale
//! external-temperature overrides to onboard sensing.
//!
//! ## Features
//!
//! - **Discovery**: one startup scan of the mux address space and every
//!   channel, programming a default curve into each controller found
//! - **Control modes**: an explicit per-fan state machine over automatic,
//!   forced-external-temperature and manual-duty control
//! - **Watchdog**: configurable per-fan staleness window for external
//!   temperature reports
//! - **Telemetry**: interval-gated snapshots of rpm, duty cycle and
//!   temperature for every discovered fan
//! - **Ingestion**: JSON config/command documents with per-entry validation
//!   that never aborts a batch
//!
//! ## Quick Start
//!
//! ```rust
//! use fanbus::{FanBank, SimulatedBus};
//!
//! // A bus with one mux (0x70) and one fan controller on channel 0.
//! let bus = SimulatedBus::new().with_device(0, 0);
//!
//! let mut bank = FanBank::new(bus);
//! assert_eq!(bank.discover(), 1);
//!
//! // The host scheduler polls with a monotonic millisecond clock.
//! bank.poll_watchdog(1_000);
//! if let Some(snapshot) = bank.sample_telemetry(61_000) {
//!     println!("{} fans reporting", snapshot.len());
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`driver`] - capability trait over the I2C transport and EMC2101 registers
//! - [`map`] - fan addressing, presence tracking and index validation
//! - [`control`] - per-fan control-mode state machine and watchdog bookkeeping
//! - [`telemetry`] - rate-limited sampling of running state
//! - [`protocol`] - config/command documents and wire handling
//! - [`bank`] - the orchestrator tying the above together
//! - [`sim`] - simulated bus for tests and the simulator binary

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod bank;
pub mod control;
pub mod driver;
pub mod map;
pub mod protocol;
pub mod sim;
pub mod telemetry;

// Re-export main public types for convenience
pub use bank::{BankStats, FanBank};
pub use control::{ControlMode, FanState};
pub use driver::FanDriver;
pub use map::{DeviceMap, FanRef, MapError};
pub use protocol::{CommandDocument, ConfigDocument, IngestReport, Request};
pub use sim::SimulatedBus;
pub use telemetry::{FanTelemetry, TelemetrySampler};
