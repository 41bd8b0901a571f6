//! NI 4050 register map.
//!
//! Offsets are relative to the unit's I/O window. The read side and the
//! write side of the window overlap: offset 0 is the command register when
//! written and the status register when read, offsets 1..=3 are the ADC
//! data bytes when read.

use bitflags::bitflags;

/// Command register (write).
pub const COMMAND_REG: u16 = 0x0;
/// ADC command register (write).
pub const ADC_COMMAND_REG: u16 = 0x1;
/// ADC data-in register, target of the selected ADC register (write).
pub const ADC_WRITE_REG: u16 = 0x2;
/// Front-end configuration register (write).
pub const CONFIG_REG: u16 = 0x3;
/// Calibration-store address, low byte.
pub const EEPROM_ADDR1_REG: u16 = 0x4;
/// Calibration-store address, high byte.
pub const EEPROM_ADDR2_REG: u16 = 0x5;
/// Calibration-store data byte at the latched address.
pub const EEPROM_DATA_REG: u16 = 0x6;

/// Status register (read).
pub const STATUS_REG: u16 = 0x0;
/// First of three little-endian ADC data bytes (read).
pub const ADC_DATA1_REG: u16 = 0x1;

/// Size of the I/O window in bytes.
pub const WINDOW_SIZE: u16 = 0x8;

bitflags! {
    /// Status register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Data available in the conversion buffer
        const D_AVAIL = 0x20;
        /// Front end powered down
        const PWRDN = 0x10;
        /// Acquisition enabled
        const ACQ_EN = 0x08;
        /// ADC accepts the next register write
        const ADC_RDY = 0x04;
        /// Conversion overflowed the input range
        const OVERFLOW = 0x02;
        /// A fresh conversion is ready to read
        const NEW_DATA = 0x01;
    }
}

/// Command register bits.
#[allow(missing_docs)]
pub mod command {
    pub const EEPROM_WE: u8 = 0x40;
    pub const PWRDN: u8 = 0x10;
    pub const ADCINTEN: u8 = 0x04;
    pub const DEFAULT: u8 = 0x00;
}

/// ADC command register bits.
#[allow(missing_docs)]
pub mod adc_command {
    /// Idle value of the ADC command register.
    pub const DEFAULT: u8 = 0x04;
    pub const START: u8 = 0x80;

    pub const REGSEL_MODEREG: u8 = 0x10;
    pub const REGSEL_FILTERHIGH: u8 = 0x20;
    pub const REGSEL_FILTERLOW: u8 = 0x30;
    pub const REGSEL_DATAREG: u8 = 0x50;
    pub const REGSEL_ZEROCALIB: u8 = 0x60;
    pub const REGSEL_FULLCALIB: u8 = 0x70;

    pub const READ: u8 = 0x08;
    pub const WRITE: u8 = 0x00;

    pub const MODE_OHMS: u8 = 0x00;
    pub const MODE_VDC: u8 = 0x01;
    pub const MODE_VAC: u8 = 0x02;
    pub const MODE_DIODE: u8 = 0x01;

    /// Writing this code resets the ADC.
    pub const RESET: u8 = 0xFF;
}

/// ADC write register bits (mode, gain, filter).
#[allow(missing_docs)]
pub mod adc_write {
    /// Filter reset bit in the mode register.
    pub const FILTER_RESET: u8 = 0x01;
    /// Filter synchronisation, OR-ed into register-select commands.
    pub const FSYNCH: u8 = 0x01;

    pub const GAIN_1: u8 = 0x00;
    pub const GAIN_2: u8 = 0x04;
    pub const GAIN_4: u8 = 0x08;
    pub const GAIN_8: u8 = 0x0C;
    pub const GAIN_16: u8 = 0x10;
    pub const GAIN_64: u8 = 0x18;

    pub const FILTERHIGH_10HZ: u8 = 0x67;
    pub const FILTERHIGH_50HZ: u8 = 0x61;
    pub const FILTERHIGH_60HZ: u8 = 0x61;

    pub const FILTERLOW_10HZ: u8 = 0x80;
    pub const FILTERLOW_50HZ: u8 = 0x80;
    pub const FILTERLOW_60HZ: u8 = 0x40;
}

/// Configuration register fields.
#[allow(missing_docs)]
pub mod config {
    pub const OHMS_RANGE_NONE: u8 = 0x00;
    pub const OHMS_RANGE_HIGH: u8 = 0x20;
    pub const OHMS_RANGE_LOW: u8 = 0x40;

    pub const AC_RANGE_NONE: u8 = 0x00;
    pub const AC_RANGE_LOW: u8 = 0x10;

    pub const OHMS_MODE_VOLTS: u8 = 0x08;
    pub const OHMS_MODE_OHMS: u8 = 0x00;

    pub const INPUT_HIGH_VDC: u8 = 0x06;
    pub const INPUT_LOW_VDC: u8 = 0x05;
    pub const INPUT_HIGH_VAC: u8 = 0x02;
    pub const INPUT_LOW_VAC: u8 = 0x03;
    pub const INPUT_EXTOHMS: u8 = 0x07;
    pub const INPUT_OHMS: u8 = 0x05;
    pub const INPUT_DIODE: u8 = 0x05;
}

/// Calibration store (EEPROM) layout.
#[allow(missing_docs)]
pub mod eeprom {
    pub const AREA_USER: u32 = 0x0400;
    pub const AREA_LOAD: u32 = 0x0800;
    pub const AREA_FACTORY: u32 = 0x0C00;

    pub const MODE_VDC: u32 = 0x0000;
    pub const MODE_VAC: u32 = 0x00A0;
    pub const MODE_OHMS: u32 = 0x0140;
    pub const MODE_DIODE: u32 = 0x01E0;

    pub const INTERNAL_RESISTANCE: u32 = 0x01F2;

    pub const RANGE_250V: u32 = 0x00;
    pub const RANGE_25V: u32 = 0x20;
    pub const RANGE_2V: u32 = 0x40;
    pub const RANGE_200MV: u32 = 0x60;
    pub const RANGE_20MV: u32 = 0x80;
    pub const RANGE_EXTOHM: u32 = 0x00;
    pub const RANGE_2MOHM: u32 = 0x00;
    pub const RANGE_200KOHM: u32 = 0x20;
    pub const RANGE_20KOHM: u32 = 0x40;
    pub const RANGE_2KOHM: u32 = 0x60;
    pub const RANGE_200OHM: u32 = 0x80;

    pub const FILTER_10HZ: u32 = 0x00;
    pub const FILTER_50HZ: u32 = 0x06;
    pub const FILTER_60HZ: u32 = 0x0C;

    pub const CAL_ZERO: u32 = 0x00;
    pub const CAL_FULL: u32 = 0x03;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_decoding() {
        let status = Status::from_bits_truncate(0xC0 | 0x04 | 0x02);
        assert!(status.contains(Status::ADC_RDY));
        assert!(status.contains(Status::OVERFLOW));
        assert!(!status.contains(Status::NEW_DATA));
    }
}
