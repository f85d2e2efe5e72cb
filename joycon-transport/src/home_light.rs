//! HOME button LED pattern encoder
//!
//! The pattern is a 25-byte block: a two-byte header followed by up to 15
//! mini-cycles. Mini-cycles are packed in pairs into 3 bytes: one byte holding
//! both 4-bit intensities (odd index high nibble, even index low nibble),
//! then one timing byte per mini-cycle.
//!
//! All inputs are nibbles; anything above 15 is truncated to its low 4 bits.

use crate::error::TransportError;

/// Encoded pattern length
pub const HOME_LIGHT_LEN: usize = 25;
/// Highest mini-cycle index
pub const MAX_MINI_CYCLES: u8 = 15;

const HEADER_LEN: usize = 2;

/// Write-only encoder for the HOME light pattern block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeLightPattern {
    data: [u8; HOME_LIGHT_LEN],
}

impl HomeLightPattern {
    pub fn new() -> Self {
        Self {
            data: [0; HOME_LIGHT_LEN],
        }
    }

    /// Set the header nibbles
    ///
    /// - `mini_cycle_count`: number of mini-cycles (0 = none)
    /// - `global_duration`: base step duration, 8ms-175ms (0 = off)
    /// - `start_intensity`: 0x0 = 0%, 0xF = 100%
    /// - `full_cycle_count`: pattern repeats (0 = forever)
    pub fn set_header(
        &mut self,
        mini_cycle_count: u8,
        global_duration: u8,
        start_intensity: u8,
        full_cycle_count: u8,
    ) -> &mut Self {
        self.data[0] = nibbles(mini_cycle_count, global_duration);
        self.data[1] = nibbles(start_intensity, full_cycle_count);
        self
    }

    /// Set mini-cycle `index` (1-based, masked to 4 bits)
    ///
    /// Only the nibble belonging to `index` is touched in the shared
    /// intensity byte.
    pub fn set_mini_cycle(
        &mut self,
        index: u8,
        intensity: u8,
        transition_duration: u8,
        duration_multiplier: u8,
    ) -> Result<&mut Self, TransportError> {
        let index = usize::from(index & 0x0F);
        if index == 0 {
            return Err(TransportError::InvalidArgument(
                "home light mini-cycle index must be 1..=15".into(),
            ));
        }

        let pair = HEADER_LEN + 3 * ((index - 1) / 2);
        let intensity = intensity & 0x0F;
        if index % 2 == 1 {
            self.data[pair] = (self.data[pair] & 0x0F) | (intensity << 4);
            self.data[pair + 1] = nibbles(transition_duration, duration_multiplier);
        } else {
            self.data[pair] = (self.data[pair] & 0xF0) | intensity;
            self.data[pair + 2] = nibbles(transition_duration, duration_multiplier);
        }
        Ok(self)
    }

    pub fn as_bytes(&self) -> &[u8; HOME_LIGHT_LEN] {
        &self.data
    }
}

impl Default for HomeLightPattern {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn nibbles(high: u8, low: u8) -> u8 {
    ((high & 0x0F) << 4) | (low & 0x0F)
}
