//! Static addressing model for the fan bank.
//!
//! A fan is externally identified by a 1-based index derived from its position
//! in the mux tree: `index = mux * CHANNELS_PER_MUX + channel + 1`. The map
//! records which muxes answered during discovery and which channels carried a
//! fan controller, and validates raw indices arriving from config and command
//! documents against that topology.

use crate::driver::{CHANNELS_PER_MUX, MAX_FANS, MUX_ADDRESSES, MUX_COUNT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a raw fan index could not be resolved. All three are local to the
/// offending entry; batch processing continues past them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("fan {0} is outside the addressable range 1..={MAX_FANS}")]
    OutOfRange(u8),
    #[error("fan {0} addresses a mux that did not respond during discovery")]
    MuxNotFound(u8),
    #[error("fan {0} addresses a channel with no fan controller")]
    DeviceNotFound(u8),
}

/// One multiplexer slot: whether the mux answered, and which of its channels
/// carried a detected fan controller.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MuxSlot {
    pub present: bool,
    pub channels: [bool; CHANNELS_PER_MUX],
}

/// A validated fan identity. Only [`DeviceMap::validate`] and
/// [`DeviceMap::fans`] produce these, so holding one implies the backing mux
/// and channel were detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanRef {
    pub index: u8,
    pub mux: usize,
    pub channel: usize,
}

impl FanRef {
    pub fn mux_address(&self) -> u8 {
        MUX_ADDRESSES[self.mux]
    }
}

/// Compute the 1-based fan index for a (mux, channel) position.
pub fn fan_index(mux: usize, channel: usize) -> u8 {
    debug_assert!(mux < MUX_COUNT && channel < CHANNELS_PER_MUX);
    (mux * CHANNELS_PER_MUX + channel + 1) as u8
}

/// Inverse of [`fan_index`]. Callers must pass an in-range index.
pub fn fan_address(index: u8) -> (usize, usize) {
    debug_assert!(index >= 1 && index as usize <= MAX_FANS);
    let slot = (index - 1) as usize;
    (slot / CHANNELS_PER_MUX, slot % CHANNELS_PER_MUX)
}

/// Presence tracking for the whole bank, populated once by discovery and never
/// mutated afterward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceMap {
    muxes: [MuxSlot; MUX_COUNT],
    fans_found: u8,
}

impl DeviceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_mux_present(&mut self, mux: usize) {
        self.muxes[mux].present = true;
    }

    pub fn mark_device_detected(&mut self, mux: usize, channel: usize) {
        self.muxes[mux].channels[channel] = true;
        self.fans_found = self.fans_found.saturating_add(1);
    }

    pub fn mux_present(&self, mux: usize) -> bool {
        self.muxes[mux].present
    }

    pub fn device_detected(&self, mux: usize, channel: usize) -> bool {
        self.muxes[mux].channels[channel]
    }

    pub fn fans_found(&self) -> u8 {
        self.fans_found
    }

    /// True when discovery found nothing; every public bank operation becomes
    /// a silent no-op in that case.
    pub fn is_empty(&self) -> bool {
        self.fans_found == 0
    }

    /// Resolve a raw 1-based index from an external document into a validated
    /// [`FanRef`].
    pub fn validate(&self, raw: u8) -> Result<FanRef, MapError> {
        if raw == 0 || raw as usize > MAX_FANS {
            return Err(MapError::OutOfRange(raw));
        }

        let (mux, channel) = fan_address(raw);

        if !self.muxes[mux].present {
            return Err(MapError::MuxNotFound(raw));
        }

        if !self.muxes[mux].channels[channel] {
            return Err(MapError::DeviceNotFound(raw));
        }

        Ok(FanRef {
            index: raw,
            mux,
            channel,
        })
    }

    /// Iterate every discovered fan in ascending index order.
    pub fn fans(&self) -> impl Iterator<Item = FanRef> + '_ {
        self.muxes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.present)
            .flat_map(|(mux, slot)| {
                slot.channels
                    .iter()
                    .enumerate()
                    .filter(|(_, detected)| **detected)
                    .map(move |(channel, _)| FanRef {
                        index: fan_index(mux, channel),
                        mux,
                        channel,
                    })
            })
    }
}
