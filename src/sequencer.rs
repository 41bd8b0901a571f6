//! ADC arming sequence and raw acquisition.
//!
//! Arming a range is a strictly ordered series of register writes. Every
//! write after the initial reset waits for the ADC-ready status bit first;
//! a timeout at any step aborts the sequence and leaves the hardware in an
//! undefined state that the next start re-resets.

use std::sync::Arc;

use tracing::{debug, instrument, trace, warn};

use crate::calibration::CalibrationReader;
use crate::error::Result;
use crate::poll::{PollLimits, ReadyPoller};
use crate::port::RegisterPort;
use crate::range::{register_select_command, ProfileTable, Range, RangeProfile};
use crate::regs::{self, adc_command, command, Status};
use crate::session::{AdcState, SessionState};

/// Drives the register protocol for one unit at a time.
#[derive(Debug, Clone)]
pub struct AdcSequencer {
    profiles: Arc<ProfileTable>,
    calibration: CalibrationReader,
    poller: ReadyPoller,
    limits: PollLimits,
}

impl AdcSequencer {
    /// Sequencer over `profiles`.
    pub fn new(
        profiles: Arc<ProfileTable>,
        calibration: CalibrationReader,
        poller: ReadyPoller,
        limits: PollLimits,
    ) -> Self {
        Self {
            profiles,
            calibration,
            poller,
            limits,
        }
    }

    /// Range profiles in use.
    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    /// Calibration reader in use.
    pub fn calibration(&self) -> &CalibrationReader {
        &self.calibration
    }

    /// Poll limits in use.
    pub fn limits(&self) -> PollLimits {
        self.limits
    }

    /// Arm the front end for `range_id`.
    ///
    /// On success the session's range and calibration coefficients are
    /// updated together. An unknown range or out-of-spec resistance fails
    /// before any register is touched and leaves the session as it was. A
    /// later failure keeps the previously selected range but marks the ADC
    /// idle.
    #[instrument(skip_all, fields(range = range_id))]
    pub fn start_measurement<P: RegisterPort + ?Sized>(
        &self,
        port: &mut P,
        session: &mut SessionState,
        range_id: i32,
    ) -> Result<Range> {
        let profile = *self.profiles.lookup(range_id)?;
        self.calibration.read_internal_resistance(port, session)?;

        match self.arm(port, session, &profile) {
            Ok((zero, full)) => {
                session.zero_scale_coeff = zero;
                session.full_scale_coeff = full;
                session.selected_range = Some(profile.range);
                session.adc_state = AdcState::Ready;
                debug!(range = %profile.range, "Measurement started");
                Ok(profile.range)
            }
            Err(err) => {
                warn!(range = %profile.range, error = %err, "Start sequence aborted");
                session.adc_state = AdcState::Idle;
                Err(err)
            }
        }
    }

    fn arm<P: RegisterPort + ?Sized>(
        &self,
        port: &mut P,
        session: &mut SessionState,
        profile: &RangeProfile,
    ) -> Result<(u32, u32)> {
        session.adc_state = AdcState::Resetting;
        debug!("Reset registers to known state");
        port.write_byte(regs::COMMAND_REG, command::DEFAULT)?;
        // 0x04 is the ADC command register's idle value, not a command
        port.write_byte(regs::ADC_COMMAND_REG, adc_command::DEFAULT)?;
        port.write_byte(regs::ADC_WRITE_REG, 0x00)?;
        port.write_byte(regs::CONFIG_REG, 0x00)?;
        port.write_byte(regs::ADC_COMMAND_REG, adc_command::RESET)?;

        session.adc_state = AdcState::ConfiguringRange;
        let (zero, full) = self
            .calibration
            .read_scale_coefficients(port, profile.cal_offset)?;

        debug!("Set config register");
        self.write_when_ready(port, regs::CONFIG_REG, profile.config_register())?;

        debug!("Set ADC mode");
        self.write_when_ready(port, regs::ADC_COMMAND_REG, profile.mode_select_command())?;
        self.write_when_ready(port, regs::ADC_WRITE_REG, profile.filter_reset_gain())?;

        debug!("Set filter frequency");
        self.write_when_ready(
            port,
            regs::ADC_COMMAND_REG,
            register_select_command(adc_command::REGSEL_FILTERHIGH),
        )?;
        self.write_when_ready(port, regs::ADC_WRITE_REG, profile.filter_high)?;
        self.write_when_ready(
            port,
            regs::ADC_COMMAND_REG,
            register_select_command(adc_command::REGSEL_FILTERLOW),
        )?;
        self.write_when_ready(port, regs::ADC_WRITE_REG, profile.filter_low)?;

        session.adc_state = AdcState::LoadingCalibration;
        debug!("Load zero-scale calibration");
        self.write_coefficient(port, adc_command::REGSEL_ZEROCALIB, zero)?;
        debug!("Load full-scale calibration");
        self.write_coefficient(port, adc_command::REGSEL_FULLCALIB, full)?;

        session.adc_state = AdcState::Arming;
        debug!("Restart modulator and filter");
        self.write_when_ready(port, regs::ADC_COMMAND_REG, profile.restart_command())?;
        self.write_when_ready(port, regs::ADC_WRITE_REG, profile.gain)?;

        debug!("Select data register for reading");
        self.write_when_ready(port, regs::ADC_COMMAND_REG, profile.data_read_command())?;

        Ok((zero, full))
    }

    /// Select a calibration register and write its three bytes high to low.
    fn write_coefficient<P: RegisterPort + ?Sized>(&self, port: &mut P, select: u8, word: u32) -> Result<()> {
        self.write_when_ready(port, regs::ADC_COMMAND_REG, register_select_command(select))?;
        for shift in [16, 8, 0] {
            self.write_when_ready(port, regs::ADC_WRITE_REG, (word >> shift) as u8)?;
        }
        Ok(())
    }

    fn write_when_ready<P: RegisterPort + ?Sized>(&self, port: &mut P, offset: u16, value: u8) -> Result<()> {
        self.poller
            .wait_ready("ADC ready", self.limits.adc_ready, || {
                let status = Status::from_bits_truncate(port.read_byte(regs::STATUS_REG)?);
                Ok(status.contains(Status::ADC_RDY))
            })?;
        trace!(offset, value = format_args!("{:#04x}", value), "Register write");
        port.write_byte(offset, value)?;
        Ok(())
    }

    /// Wait for a fresh conversion and read its 24-bit raw code.
    ///
    /// The data bytes are little-endian across the three data registers.
    pub fn read_raw<P: RegisterPort + ?Sized>(&self, port: &mut P, session: &mut SessionState) -> Result<u32> {
        let previous = session.adc_state;
        if previous == AdcState::Ready {
            session.adc_state = AdcState::Measuring;
        }

        let result = self.read_raw_inner(port);
        session.adc_state = previous;
        result
    }

    fn read_raw_inner<P: RegisterPort + ?Sized>(&self, port: &mut P) -> Result<u32> {
        let mut overflow_seen = false;
        self.poller
            .wait_ready("measurement data", self.limits.data_ready, || {
                let status = Status::from_bits_truncate(port.read_byte(regs::STATUS_REG)?);
                if status.contains(Status::OVERFLOW) && !overflow_seen {
                    warn!("ADC overflow");
                    overflow_seen = true;
                }
                Ok(status.contains(Status::NEW_DATA))
            })?;

        let mut raw = 0u32;
        for i in 0..3u16 {
            let byte = port.read_byte(regs::ADC_DATA1_REG + i)?;
            raw += u32::from(byte) << (8 * i);
        }
        debug!(raw = format_args!("{:06x}", raw), "Measurement raw value");
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::ResistanceBounds;
    use crate::error::DmmError;
    use crate::poll::NoSleep;
    use crate::sim::SimulatedCard;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn sequencer() -> AdcSequencer {
        AdcSequencer::new(
            Arc::new(ProfileTable::standard()),
            CalibrationReader::new(Default::default(), ResistanceBounds::default()),
            ReadyPoller::with_sleeper(Duration::from_millis(1), NoSleep),
            PollLimits {
                adc_ready: 5,
                data_ready: 8,
            },
        )
    }

    #[test]
    fn test_arming_sequence_for_2vdc() {
        let mut card = SimulatedCard::with_reading(1_000_000, 0x7F_FFFF);
        card.set_eeprom_word(0x84C, 0x80_12_34);
        card.set_eeprom_word(0x84F, 0x56_78_9A);
        let mut session = SessionState::new();

        let range = sequencer()
            .start_measurement(&mut card, &mut session, Range::Vdc2.id())
            .unwrap();

        assert_eq!(range, Range::Vdc2);
        assert_eq!(
            card.adc_writes(),
            vec![
                (0, 0x00),
                (1, 0x04),
                (2, 0x00),
                (3, 0x00),
                (1, 0xFF),
                (3, 0x0D),
                (1, 0x15),
                (2, 0x01),
                (1, 0x25),
                (2, 0x61),
                (1, 0x35),
                (2, 0x40),
                (1, 0x65),
                (2, 0x80),
                (2, 0x12),
                (2, 0x34),
                (1, 0x75),
                (2, 0x56),
                (2, 0x78),
                (2, 0x9A),
                (1, 0x15),
                (2, 0x00),
                (1, 0x5D),
            ]
        );
        assert_eq!(session.selected_range, Some(Range::Vdc2));
        assert_eq!(session.zero_scale_coeff, 0x80_12_34);
        assert_eq!(session.full_scale_coeff, 0x56_78_9A);
        assert_eq!(session.adc_state, AdcState::Ready);
    }

    #[test]
    fn test_unknown_range_touches_nothing() {
        let mut card = SimulatedCard::with_reading(1_000_000, 0);
        let mut session = SessionState::new();
        session.selected_range = Some(Range::Ohm200);
        session.adc_state = AdcState::Ready;

        let err = sequencer()
            .start_measurement(&mut card, &mut session, 42)
            .unwrap_err();

        assert!(matches!(err, DmmError::NotFound { range: 42 }));
        assert!(card.writes().is_empty());
        assert_eq!(session.selected_range, Some(Range::Ohm200));
        assert_eq!(session.adc_state, AdcState::Ready);
    }

    #[test]
    fn test_out_of_spec_resistance_aborts_before_reset() {
        let mut card = SimulatedCard::with_reading(1_300_000, 0);
        let mut session = SessionState::new();

        let err = sequencer()
            .start_measurement(&mut card, &mut session, Range::Vdc25.id())
            .unwrap_err();

        assert!(matches!(err, DmmError::OutOfSpec { .. }));
        assert!(card.adc_writes().is_empty());
        assert_eq!(session.selected_range, None);
    }

    #[test]
    fn test_timeout_mid_sequence_keeps_previous_range() {
        let mut card = SimulatedCard::with_reading(1_000_000, 0);
        let mut session = SessionState::new();
        let seq = sequencer();
        seq.start_measurement(&mut card, &mut session, Range::Vac250.id())
            .unwrap();
        let coeffs = (session.zero_scale_coeff, session.full_scale_coeff);

        card.clear_log();
        // reset (5 writes) + config + mode select, then the ADC stops answering
        card.stall_after_writes(7);
        let err = seq
            .start_measurement(&mut card, &mut session, Range::KiloOhm2.id())
            .unwrap_err();

        assert!(matches!(err, DmmError::Timeout { attempts: 5, .. }));
        assert_eq!(card.adc_writes().len(), 7);
        assert_eq!(session.selected_range, Some(Range::Vac250));
        assert_eq!((session.zero_scale_coeff, session.full_scale_coeff), coeffs);
        assert_eq!(session.adc_state, AdcState::Idle);
    }

    #[test]
    fn test_read_after_failed_start_is_not_armed() {
        let mut card = SimulatedCard::with_reading(1_000_000, 0xFF_FFFF);
        let mut session = SessionState::new();
        let seq = sequencer();
        seq.start_measurement(&mut card, &mut session, Range::Vac250.id())
            .unwrap();
        assert!(session.is_armed());

        card.clear_log();
        card.stall_after_writes(7);
        seq.start_measurement(&mut card, &mut session, Range::KiloOhm2.id())
            .unwrap_err();

        // The 2 kOhm configuration already reached the card
        assert!(card.adc_writes().contains(&(regs::CONFIG_REG, 0x45)));
        assert_eq!(session.selected_range, Some(Range::Vac250));
        assert!(!session.is_armed());
    }

    #[test]
    #[traced_test]
    fn test_overflow_warns_once_and_keeps_polling() {
        let mut card = SimulatedCard::new();
        card.set_overflow(true);
        card.push_sample(0x12_34_56);
        card.delay_data(3);
        let mut session = SessionState::new();

        let raw = sequencer().read_raw(&mut card, &mut session).unwrap();

        assert_eq!(raw, 0x12_34_56);
        assert_eq!(card.status_reads(), 4);
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|line| line.contains("ADC overflow")).count() {
                1 => Ok(()),
                n => Err(format!("expected one overflow warning, got {n}")),
            }
        });
    }

    #[test]
    fn test_read_raw_assembles_little_endian() {
        let mut card = SimulatedCard::new();
        card.push_sample(0xAB_CD_EF);
        let mut session = SessionState::new();
        assert_eq!(sequencer().read_raw(&mut card, &mut session).unwrap(), 0xAB_CD_EF);
    }

    #[test]
    fn test_read_raw_times_out_on_data_limit() {
        let mut card = SimulatedCard::new();
        let mut session = SessionState::new();
        session.adc_state = AdcState::Ready;

        let err = sequencer().read_raw(&mut card, &mut session).unwrap_err();

        assert!(matches!(err, DmmError::Timeout { attempts: 8, .. }));
        assert_eq!(card.status_reads(), 8);
        assert_eq!(session.adc_state, AdcState::Ready);
    }
}
