//! HD rumble waveform codec
//!
//! A rumble block is 4 bytes driving one actuator with a high-frequency and a
//! low-frequency band. Both bands carry the same logarithmic frequency index
//! (clamped to each band's range) and the same amplitude index, so a block
//! can be checked for internal consistency on decode.
//!
//! Layout:
//! ```text
//! byte 0: hf[7:0]
//! byte 1: hf_amp[7:1] | hf[8]
//! byte 2: lf_amp[15] | lf[6:0]
//! byte 3: lf_amp[7:0]
//! ```

use std::fmt;

use crate::error::TransportError;

/// Lowest frequency the actuator reproduces (Hz)
pub const MIN_FREQUENCY: f64 = 40.87;
/// Highest frequency the actuator reproduces (Hz)
pub const MAX_FREQUENCY: f64 = 1252.57;

/// Frequency index band limits
const HF_MIN: i32 = 0x60;
const HF_MAX: i32 = 0xDF;
const LF_MIN: i32 = 0x41;
const LF_MAX: i32 = 0xBF;

/// Amplitude curve breakpoints
const AMP_ZERO_BELOW: f64 = 0.008;
const AMP_PIECE_LOW: f64 = 0.112491;
const AMP_PIECE_MID: f64 = 0.224982;
/// Largest amplitude index produced for amplitude 1.0
const AMP_MAX_INDEX: u8 = 100;

/// Decoded rumble value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RumbleWaveform {
    /// Frequency in Hz
    pub frequency: f64,
    /// Amplitude, 0.0 (off) to 1.0 (full)
    pub amplitude: f64,
}

/// Encoded 4-byte rumble block
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rumble(pub [u8; 4]);

impl Rumble {
    /// Neutral "no vibration" block sent when nothing should rumble
    pub const NEUTRAL: Rumble = Rumble([0x00, 0x01, 0x40, 0x40]);

    /// Encode a frequency/amplitude pair
    pub fn new(frequency: f64, amplitude: f64) -> Result<Self, TransportError> {
        encode(frequency, amplitude).map(Self)
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Decode back into frequency and amplitude
    pub fn waveform(&self) -> Result<RumbleWaveform, TransportError> {
        decode(self.0)
    }
}

impl Default for Rumble {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl fmt::Debug for Rumble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "Rumble({a:02x} {b:02x} {c:02x} {d:02x})")
    }
}

/// Encode `frequency` (Hz) and `amplitude` (0..=1) into a rumble block
///
/// Frequency is clamped to [`MIN_FREQUENCY`, `MAX_FREQUENCY`]. Amplitude
/// outside `0.0..=1.0` is rejected.
pub fn encode(frequency: f64, amplitude: f64) -> Result<[u8; 4], TransportError> {
    if frequency.is_nan() {
        return Err(TransportError::InvalidArgument(
            "rumble frequency is NaN".into(),
        ));
    }
    let index = frequency_index(frequency.clamp(MIN_FREQUENCY, MAX_FREQUENCY));
    let amp = amplitude_index(amplitude)?;

    let hf = ((index.clamp(HF_MIN, HF_MAX) - HF_MIN) * 4) as u16;
    let lf = (index.clamp(LF_MIN, LF_MAX) - 0x40) as u8;
    let (hf_amp, lf_amp) = amplitude_fields(amp);

    Ok([
        (hf & 0xFF) as u8,
        hf_amp | (hf >> 8) as u8,
        lf | (lf_amp >> 8) as u8,
        (lf_amp & 0xFF) as u8,
    ])
}

/// Decode a rumble block
///
/// Fails with `InconsistentRumble` when the two bands disagree about the
/// frequency or amplitude index. [`Rumble::NEUTRAL`] is such a block: it is
/// a hardware idle marker, not an encoded waveform.
pub fn decode(bytes: [u8; 4]) -> Result<RumbleWaveform, TransportError> {
    let hf = u16::from(bytes[0]) | (u16::from(bytes[1] & 0x01) << 8);
    let hf_amp = bytes[1] & 0xFE;
    let lf = bytes[2] & 0x7F;
    let lf_amp = (u16::from(bytes[2] & 0x80) << 8) | u16::from(bytes[3]);

    // The LF band saturates first, so it identifies the index unless clamped
    let lf_index = i32::from(lf) + 0x40;
    let index = if lf_index < LF_MAX {
        lf_index
    } else {
        if hf % 4 != 0 {
            return Err(TransportError::InconsistentRumble(format!(
                "high band value 0x{hf:03X} is not a multiple of 4"
            )));
        }
        i32::from(hf / 4) + HF_MIN
    };

    if !(LF_MIN..=HF_MAX).contains(&index) {
        return Err(TransportError::InconsistentRumble(format!(
            "frequency index 0x{index:02X} out of range"
        )));
    }
    let expected_hf = ((index.clamp(HF_MIN, HF_MAX) - HF_MIN) * 4) as u16;
    let expected_lf = (index.clamp(LF_MIN, LF_MAX) - 0x40) as u8;
    if expected_hf != hf || expected_lf != lf {
        return Err(TransportError::InconsistentRumble(format!(
            "bands disagree: hf=0x{hf:03X} lf=0x{lf:02X} (index 0x{index:02X} expects hf=0x{expected_hf:03X} lf=0x{expected_lf:02X})"
        )));
    }

    let amp = hf_amp >> 1;
    if amp > AMP_MAX_INDEX {
        return Err(TransportError::InconsistentRumble(format!(
            "amplitude index {amp} exceeds {AMP_MAX_INDEX}"
        )));
    }
    let (_, expected_lf_amp) = amplitude_fields(amp);
    if expected_lf_amp != lf_amp {
        return Err(TransportError::InconsistentRumble(format!(
            "amplitude bands disagree: hf_amp=0x{hf_amp:02X} lf_amp=0x{lf_amp:04X}"
        )));
    }

    Ok(RumbleWaveform {
        frequency: 10.0 * 2f64.powf(f64::from(index) / 32.0),
        amplitude: amplitude_from_index(amp),
    })
}

fn frequency_index(frequency: f64) -> i32 {
    ((frequency / 10.0).log2() * 32.0).round() as i32
}

fn amplitude_index(amplitude: f64) -> Result<u8, TransportError> {
    if amplitude.is_nan() || !(0.0..=1.0).contains(&amplitude) {
        return Err(TransportError::InvalidArgument(format!(
            "rumble amplitude {amplitude} outside 0.0..=1.0"
        )));
    }
    if amplitude < AMP_ZERO_BELOW {
        return Ok(0);
    }

    let scaled = (amplitude * 5.0 / 18.0).log2();
    let index = if amplitude < AMP_PIECE_LOW {
        ((scaled + 9.0) * 4.0).round() - 1.0
    } else if amplitude < AMP_PIECE_MID {
        ((scaled + 6.0) * 16.0).round() - 1.0
    } else {
        ((scaled + 5.0) * 32.0).round() - 1.0
    };

    if !(0.0..=f64::from(AMP_MAX_INDEX)).contains(&index) {
        return Err(TransportError::Internal(format!(
            "amplitude {amplitude} produced index {index}"
        )));
    }
    Ok(index as u8)
}

fn amplitude_from_index(amp: u8) -> f64 {
    let next = f64::from(amp) + 1.0;
    let value = match amp {
        0 => return 0.0,
        1..=0x0F => 3.6 * 2f64.powf(next / 4.0 - 9.0),
        0x10..=0x1F => 3.6 * 2f64.powf(next / 16.0 - 6.0),
        _ => 3.6 * 2f64.powf(next / 32.0 - 5.0),
    };
    value.min(1.0)
}

/// Split an amplitude index into the HF byte and the 16-bit LF field
fn amplitude_fields(amp: u8) -> (u8, u16) {
    let hf_amp = amp << 1;
    let lf_amp = 0x8000 * u16::from(amp & 1) + 0x40 + u16::from(amp >> 1);
    (hf_amp, lf_amp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_pinned_bytes() {
        assert_eq!(encode(100.0, 1.0).unwrap(), [0x28, 0xC8, 0x2A, 0x72]);
        assert_eq!(encode(200.0, 0.5).unwrap(), [0xA8, 0x88, 0x4A, 0x62]);
        assert_eq!(encode(160.0, 0.0).unwrap(), [0x80, 0x00, 0x40, 0x40]);
        assert_eq!(encode(1000.0, 0.2).unwrap(), [0xD4, 0x39, 0x7F, 0x4E]);
    }

    #[test]
    fn test_encode_band_edges() {
        assert_eq!(
            encode(MIN_FREQUENCY, 0.3).unwrap(),
            [0x00, 0x58, 0x01, 0x56]
        );
        assert_eq!(
            encode(MAX_FREQUENCY, 0.01).unwrap(),
            [0xFC, 0x03, 0xFF, 0x40]
        );
    }

    #[test]
    fn test_frequency_is_clamped() {
        assert_eq!(encode(1.0, 0.3).unwrap(), encode(MIN_FREQUENCY, 0.3).unwrap());
        assert_eq!(
            encode(50_000.0, 0.01).unwrap(),
            encode(MAX_FREQUENCY, 0.01).unwrap()
        );
    }

    #[test]
    fn test_invalid_amplitude() {
        for amp in [-0.01, 1.01, f64::NAN] {
            assert!(matches!(
                encode(100.0, amp),
                Err(TransportError::InvalidArgument(_))
            ));
        }
        assert!(matches!(
            encode(f64::NAN, 0.5),
            Err(TransportError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_decode_pinned() {
        let w = decode([0x28, 0xC8, 0x2A, 0x72]).unwrap();
        assert!((w.frequency - 100.0).abs() < 1.0);
        assert_eq!(w.amplitude, 1.0);

        let w = decode([0x80, 0x00, 0x40, 0x40]).unwrap();
        assert!((w.frequency - 160.0).abs() < 1e-9);
        assert_eq!(w.amplitude, 0.0);
    }

    #[test]
    fn test_decode_high_band_only() {
        // index above the LF range is recovered from the HF band
        let w = decode([0xFC, 0x03, 0xFF, 0x40]).unwrap();
        assert!((w.frequency - MAX_FREQUENCY).abs() < 0.1);
    }

    #[test]
    fn test_decode_inconsistent() {
        // neutral idle marker: HF says index 0xA0, LF says 0x80
        assert!(matches!(
            decode(Rumble::NEUTRAL.0),
            Err(TransportError::InconsistentRumble(_))
        ));
        // amplitude bands disagree
        assert!(matches!(
            decode([0x28, 0xC8, 0x2A, 0x70]),
            Err(TransportError::InconsistentRumble(_))
        ));
        // frequency bands disagree
        assert!(matches!(
            decode([0x2C, 0xC8, 0x2A, 0x72]),
            Err(TransportError::InconsistentRumble(_))
        ));
        // LF index 0x40 is below the playable range
        assert!(matches!(
            decode([0x00, 0x00, 0x00, 0x40]),
            Err(TransportError::InconsistentRumble(_))
        ));
    }

    #[test]
    fn test_rumble_value_type() {
        assert_eq!(Rumble::default(), Rumble::NEUTRAL);
        let r = Rumble::new(100.0, 1.0).unwrap();
        assert_eq!(r.as_bytes(), &[0x28, 0xC8, 0x2A, 0x72]);
        assert_eq!(format!("{r:?}"), "Rumble(28 c8 2a 72)");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn prop_quantized_idempotence(
            frequency in MIN_FREQUENCY..=MAX_FREQUENCY,
            amplitude in 0.0f64..=1.0,
        ) {
            let first = encode(frequency, amplitude).unwrap();
            let decoded = decode(first).unwrap();
            let second = encode(decoded.frequency, decoded.amplitude).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
