//! Calibration store access.
//!
//! The NI 4050 keeps its internal shunt resistance and the per-range
//! zero/full-scale calibration words in an onboard EEPROM. A byte is read by
//! latching the 16-bit address into two address registers (high byte first)
//! and reading the data register.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{DmmError, Result};
use crate::port::RegisterPort;
use crate::regs::{self, eeprom};
use crate::session::SessionState;

/// Nominal internal shunt resistance in ohms.
pub const INTERNAL_RESISTANCE_SPEC: u32 = 1_000_000;

/// Which copy of the calibration constants to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationArea {
    /// User-adjusted constants.
    User,
    /// Constants loaded at power-up (the working set).
    #[default]
    Load,
    /// Constants written at factory calibration.
    Factory,
}

impl CalibrationArea {
    /// Base address of this area in the calibration store.
    pub fn base(self) -> u32 {
        match self {
            Self::User => eeprom::AREA_USER,
            Self::Load => eeprom::AREA_LOAD,
            Self::Factory => eeprom::AREA_FACTORY,
        }
    }
}

/// Accepted window for the calibrated internal resistance, in ohms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResistanceBounds {
    /// Lowest accepted value
    pub min: u32,
    /// Highest accepted value
    pub max: u32,
}

impl ResistanceBounds {
    /// Whether `value` lies inside the window (inclusive).
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl Default for ResistanceBounds {
    /// 0.8 and 1.2 times the nominal resistance.
    fn default() -> Self {
        Self {
            min: INTERNAL_RESISTANCE_SPEC / 10 * 8,
            max: INTERNAL_RESISTANCE_SPEC / 10 * 12,
        }
    }
}

/// Reads bytes and calibration words from one unit's calibration store.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalibrationReader {
    area: CalibrationArea,
    bounds: ResistanceBounds,
}

impl CalibrationReader {
    /// Reader over `area`, validating resistance against `bounds`.
    pub fn new(area: CalibrationArea, bounds: ResistanceBounds) -> Self {
        Self { area, bounds }
    }

    /// Calibration area in use.
    pub fn area(&self) -> CalibrationArea {
        self.area
    }

    /// Accepted internal-resistance window.
    pub fn bounds(&self) -> ResistanceBounds {
        self.bounds
    }

    /// Read one byte at an absolute calibration-store address.
    pub fn read_config_byte<P: RegisterPort + ?Sized>(&self, port: &mut P, address: u32) -> Result<u8> {
        port.write_byte(regs::EEPROM_ADDR2_REG, (address >> 8) as u8)?;
        port.write_byte(regs::EEPROM_ADDR1_REG, address as u8)?;
        let value = port.read_byte(regs::EEPROM_DATA_REG)?;
        trace!(address = format_args!("{:#06x}", address), value, "EEPROM read");
        Ok(value)
    }

    /// Read a 3-byte little-endian word starting at `address`.
    ///
    /// The result is the raw 24-bit word; no sign interpretation is applied.
    pub fn read_config_word<P: RegisterPort + ?Sized>(&self, port: &mut P, address: u32) -> Result<u32> {
        let mut word = 0u32;
        for i in 0..3 {
            let byte = self.read_config_byte(port, address + i)?;
            word += u32::from(byte) << (8 * i);
        }
        Ok(word)
    }

    /// Read the zero-scale and full-scale words for a range whose
    /// calibration constants sit at `cal_offset` within the area.
    pub fn read_scale_coefficients<P: RegisterPort + ?Sized>(
        &self,
        port: &mut P,
        cal_offset: u32,
    ) -> Result<(u32, u32)> {
        let base = self.area.base() + cal_offset;
        let zero = self.read_config_word(port, base + eeprom::CAL_ZERO)?;
        let full = self.read_config_word(port, base + eeprom::CAL_FULL)?;
        debug!(zero, full, "Read scale calibration coefficients");
        Ok((zero, full))
    }

    /// Read and validate the internal shunt resistance.
    ///
    /// On success the value is stored in `session`; an out-of-spec value
    /// leaves the session untouched.
    pub fn read_internal_resistance<P: RegisterPort + ?Sized>(
        &self,
        port: &mut P,
        session: &mut SessionState,
    ) -> Result<u32> {
        let address = self.area.base() | eeprom::INTERNAL_RESISTANCE;
        let value = self.read_config_word(port, address)?;

        if !self.bounds.contains(value) {
            warn!(
                value,
                min = self.bounds.min,
                max = self.bounds.max,
                "Internal resistance out of spec"
            );
            return Err(DmmError::OutOfSpec {
                value,
                min: self.bounds.min,
                max: self.bounds.max,
            });
        }

        debug!(value, "Internal resistance");
        session.internal_resistance = Some(value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedCard;

    #[test]
    fn test_config_byte_latches_address_high_then_low() {
        let mut card = SimulatedCard::new();
        card.set_eeprom_byte(0x0812, 0xAB);
        let reader = CalibrationReader::default();

        assert_eq!(reader.read_config_byte(&mut card, 0x0812).unwrap(), 0xAB);
        assert_eq!(
            card.writes(),
            &[(regs::EEPROM_ADDR2_REG, 0x08), (regs::EEPROM_ADDR1_REG, 0x12)]
        );
    }

    #[test]
    fn test_config_word_is_little_endian() {
        let mut card = SimulatedCard::new();
        card.set_eeprom_word(0x0900, 0x12_34_56);
        let reader = CalibrationReader::default();
        assert_eq!(reader.read_config_word(&mut card, 0x0900).unwrap(), 0x12_34_56);
        assert_eq!(card.eeprom_byte(0x0900), 0x56);
    }

    #[test]
    fn test_resistance_accepted_and_stored() {
        let mut card = SimulatedCard::new();
        card.set_internal_resistance(1_000_000);
        let mut session = SessionState::new();

        let value = CalibrationReader::default()
            .read_internal_resistance(&mut card, &mut session)
            .unwrap();
        assert_eq!(value, 1_000_000);
        assert_eq!(session.internal_resistance, Some(1_000_000));
    }

    #[test]
    fn test_resistance_out_of_spec_rejected() {
        for value in [700_000, 1_300_000] {
            let mut card = SimulatedCard::new();
            card.set_internal_resistance(value);
            let mut session = SessionState::new();
            session.internal_resistance = Some(1_000_000);

            let err = CalibrationReader::default()
                .read_internal_resistance(&mut card, &mut session)
                .unwrap_err();
            assert!(matches!(err, DmmError::OutOfSpec { value: v, .. } if v == value));
            assert_eq!(session.internal_resistance, Some(1_000_000));
        }
    }

    #[test]
    fn test_resistance_bounds_are_inclusive() {
        let bounds = ResistanceBounds::default();
        assert_eq!(bounds.min, 800_000);
        assert_eq!(bounds.max, 1_200_000);
        assert!(bounds.contains(800_000));
        assert!(bounds.contains(1_200_000));
        assert!(!bounds.contains(799_999));
        assert!(!bounds.contains(1_200_001));
    }

    #[test]
    fn test_scale_coefficients_follow_area() {
        let mut card = SimulatedCard::new();
        card.set_eeprom_word(eeprom::AREA_FACTORY + 0x26, 0x80_00_10);
        card.set_eeprom_word(eeprom::AREA_FACTORY + 0x29, 0x55_44_33);
        let reader = CalibrationReader::new(CalibrationArea::Factory, ResistanceBounds::default());

        let (zero, full) = reader.read_scale_coefficients(&mut card, 0x26).unwrap();
        assert_eq!(zero, 0x80_00_10);
        assert_eq!(full, 0x55_44_33);
    }
}
