//! Per-unit session state.

use crate::range::Range;

/// Where the ADC sequencer is in arming a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdcState {
    /// Nothing armed (fresh unit, or a start sequence was aborted).
    #[default]
    Idle,
    /// Registers being reset to a known state.
    Resetting,
    /// Configuration, mode and filter registers being written.
    ConfiguringRange,
    /// Zero/full-scale coefficients being loaded.
    LoadingCalibration,
    /// Modulator restart and data-register select.
    Arming,
    /// A range is armed and conversions are running.
    Ready,
    /// A raw acquisition read is in progress.
    Measuring,
}

/// Mutable state of one attached unit.
///
/// Created on attach, mutated by start-measurement and calibration
/// re-reads, dropped on detach.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Internal shunt resistance in ohms, once a read has passed validation.
    pub internal_resistance: Option<u32>,
    /// Range armed by the last successful start-measurement.
    pub selected_range: Option<Range>,
    /// Zero-scale calibration coefficient (24-bit word).
    pub zero_scale_coeff: u32,
    /// Full-scale calibration coefficient (24-bit word).
    pub full_scale_coeff: u32,
    /// Whether a session currently holds the unit open.
    pub open: bool,
    /// Sequencer progress.
    pub adc_state: AdcState,
}

impl SessionState {
    /// State of a freshly attached unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a range is armed and readable.
    pub fn is_armed(&self) -> bool {
        self.selected_range.is_some()
            && matches!(self.adc_state, AdcState::Ready | AdcState::Measuring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_unarmed() {
        let session = SessionState::new();
        assert_eq!(session.selected_range, None);
        assert_eq!(session.internal_resistance, None);
        assert_eq!(session.adc_state, AdcState::Idle);
        assert!(!session.open);
        assert!(!session.is_armed());
    }

    #[test]
    fn test_armed_requires_range_and_ready_state() {
        let mut session = SessionState::new();
        session.selected_range = Some(Range::Vdc2);
        assert!(!session.is_armed());
        session.adc_state = AdcState::Ready;
        assert!(session.is_armed());
    }
}
