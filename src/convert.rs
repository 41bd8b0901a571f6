//! Raw code to engineering-unit conversion.
//!
//! The ADC delivers a 24-bit offset-binary code with zero at `0x7FFFFF`.
//! The code is normalised to a signed scale fraction and multiplied by the
//! range's full-scale constant. The extended-ohm range measures against the
//! internal shunt resistor and needs the divider inversion instead.

use crate::error::{DmmError, Result};
use crate::range::{Range, DIVIDER_FULL_SCALE};
use crate::session::SessionState;

/// Raw code of a zero reading.
pub const ZERO_CODE: u32 = 0x7F_FFFF;

/// Smallest divider denominator accepted, relative to the internal resistance.
const MIN_DENOMINATOR_RATIO: f64 = 1e-9;

/// Signed scale fraction of a raw code, roughly in `[-1, 1]`.
pub fn scale_of(raw_code: u32) -> f64 {
    f64::from(raw_code) / f64::from(ZERO_CODE) - 1.0
}

/// Convert a scale fraction on `range` to engineering units.
///
/// `internal_resistance` is only consulted for the extended-ohm range,
/// where it is required.
pub fn convert_scale(range: Range, scale: f64, internal_resistance: Option<u32>) -> Result<f64> {
    if !range.is_extended_ohm() {
        return Ok(scale * range.full_scale());
    }

    let r_internal = internal_resistance
        .map(f64::from)
        .ok_or_else(|| DmmError::NotSupported {
            message: "extended-ohm conversion needs a calibrated internal resistance".to_string(),
        })?;

    let divider = scale * DIVIDER_FULL_SCALE;
    let denominator = r_internal - divider;
    if denominator <= r_internal * MIN_DENOMINATOR_RATIO {
        return Err(DmmError::Overrange { range, scale });
    }

    let value = divider * r_internal / denominator;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DmmError::Overrange { range, scale })
    }
}

/// Convert a raw code using the session's selected range.
///
/// Fails with [`DmmError::NotSupported`] if no range is selected.
pub fn convert(session: &SessionState, raw_code: u32) -> Result<f64> {
    let range = session.selected_range.ok_or_else(|| DmmError::NotSupported {
        message: "no measurement range selected".to_string(),
    })?;
    convert_scale(range, scale_of(raw_code), session.internal_resistance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() <= 1e-6 * expected.abs().max(1.0)
    }

    fn session_on(range: Range) -> SessionState {
        SessionState {
            selected_range: Some(range),
            internal_resistance: Some(1_000_000),
            ..SessionState::default()
        }
    }

    #[test]
    fn test_zero_code_converts_to_zero() {
        for range in Range::ALL.into_iter().filter(|r| !r.is_extended_ohm()) {
            assert_eq!(convert(&session_on(range), ZERO_CODE).unwrap(), 0.0, "{range}");
        }
        assert_eq!(convert(&session_on(Range::ExtendedOhm), ZERO_CODE).unwrap(), 0.0);
    }

    #[test]
    fn test_code_extremes_hit_full_scale() {
        for range in Range::ALL.into_iter().filter(|r| !r.is_extended_ohm()) {
            let session = session_on(range);
            let low = convert(&session, 0x00_0000).unwrap();
            let high = convert(&session, 0xFF_FFFF).unwrap();
            assert!(close(low, -range.full_scale()), "{range}: {low}");
            assert!(close(high, range.full_scale()), "{range}: {high}");
        }
    }

    #[test]
    fn test_extended_ohm_divider() {
        let value = convert_scale(Range::ExtendedOhm, 0.1, Some(1_000_000)).unwrap();
        assert!((value - 333_333.333_333).abs() < 1e-3, "{value}");
    }

    #[test]
    fn test_extended_ohm_negative_scale() {
        let value = convert_scale(Range::ExtendedOhm, -0.1, Some(1_000_000)).unwrap();
        let expected = -250_000.0 * 1_000_000.0 / 1_250_000.0;
        assert!(close(value, expected), "{value}");
    }

    #[test]
    fn test_extended_ohm_saturates_at_divider_pole() {
        // 0.4 x 2.5 MOhm equals the internal resistance
        let err = convert_scale(Range::ExtendedOhm, 0.4, Some(1_000_000)).unwrap_err();
        assert!(matches!(err, DmmError::Overrange { range: Range::ExtendedOhm, .. }));

        let err = convert_scale(Range::ExtendedOhm, 0.9, Some(1_000_000)).unwrap_err();
        assert!(matches!(err, DmmError::Overrange { .. }));
    }

    #[test]
    fn test_extended_ohm_requires_resistance() {
        let err = convert_scale(Range::ExtendedOhm, 0.1, None).unwrap_err();
        assert!(matches!(err, DmmError::NotSupported { .. }));
    }

    #[test]
    fn test_unselected_range_not_supported() {
        let err = convert(&SessionState::default(), ZERO_CODE).unwrap_err();
        assert!(matches!(err, DmmError::NotSupported { .. }));
    }
}
