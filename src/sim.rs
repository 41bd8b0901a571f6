//! Simulated NI 4050 card.
//!
//! [`SimulatedCard`] models the card at register level: a calibration store
//! behind the address/data registers, a status register with ADC-ready and
//! new-data bits, and a queue of raw acquisition codes behind the data
//! registers. Every write is recorded so tests can check the exact
//! programming sequence. Clones share state, so a test can keep a handle
//! after handing the card to the dispatcher.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::port::RegisterPort;
use crate::regs::{self, eeprom, Status};

const EEPROM_SIZE: usize = 0x1000;

#[derive(Debug)]
struct CardState {
    eeprom: Vec<u8>,
    address_high: u8,
    address_low: u8,
    writes: Vec<(u16, u8)>,
    samples: VecDeque<u32>,
    repeat_last_sample: bool,
    adc_ready: bool,
    stall_after_writes: Option<usize>,
    overflow: bool,
    data_delay: usize,
    present: bool,
    status_reads: usize,
}

impl Default for CardState {
    fn default() -> Self {
        Self {
            eeprom: vec![0; EEPROM_SIZE],
            address_high: 0,
            address_low: 0,
            writes: Vec::new(),
            samples: VecDeque::new(),
            repeat_last_sample: false,
            adc_ready: true,
            stall_after_writes: None,
            overflow: false,
            data_delay: 0,
            present: true,
            status_reads: 0,
        }
    }
}

impl CardState {
    fn adc_register_writes(&self) -> usize {
        self.writes
            .iter()
            .filter(|(offset, _)| *offset <= regs::CONFIG_REG)
            .count()
    }

    fn status(&self) -> Status {
        let mut status = Status::empty();
        let stalled = self
            .stall_after_writes
            .is_some_and(|limit| self.adc_register_writes() >= limit);
        if self.adc_ready && !stalled {
            status |= Status::ADC_RDY;
        }
        if !self.samples.is_empty() {
            status |= Status::NEW_DATA | Status::D_AVAIL;
        }
        if self.overflow {
            status |= Status::OVERFLOW;
        }
        status
    }

    fn eeprom_address(&self) -> usize {
        (usize::from(self.address_high) << 8 | usize::from(self.address_low)) % EEPROM_SIZE
    }
}

/// Register-level model of an NI 4050 card.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCard {
    state: Arc<Mutex<CardState>>,
}

impl SimulatedCard {
    /// Blank card: zeroed calibration store, ADC always ready, no data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Card with a nominal internal resistance and a repeating raw code,
    /// ready to arm any range.
    pub fn with_reading(internal_resistance: u32, raw_code: u32) -> Self {
        let card = Self::new();
        card.set_internal_resistance(internal_resistance);
        card.push_sample(raw_code);
        card.set_repeat_last_sample(true);
        card
    }

    /// Set one calibration-store byte.
    pub fn set_eeprom_byte(&self, address: u32, value: u8) {
        self.state.lock().eeprom[address as usize % EEPROM_SIZE] = value;
    }

    /// Calibration-store byte at `address`.
    pub fn eeprom_byte(&self, address: u32) -> u8 {
        self.state.lock().eeprom[address as usize % EEPROM_SIZE]
    }

    /// Store a 24-bit word little-endian at `address`.
    pub fn set_eeprom_word(&self, address: u32, word: u32) {
        for (i, byte) in word.to_le_bytes().iter().take(3).enumerate() {
            self.set_eeprom_byte(address + i as u32, *byte);
        }
    }

    /// Store the internal resistance word in the load area.
    pub fn set_internal_resistance(&self, ohms: u32) {
        self.set_eeprom_word(eeprom::AREA_LOAD | eeprom::INTERNAL_RESISTANCE, ohms);
    }

    /// Queue a raw acquisition code.
    pub fn push_sample(&self, raw_code: u32) {
        self.state.lock().samples.push_back(raw_code & 0xFF_FFFF);
    }

    /// Keep serving the last queued code instead of draining the queue.
    pub fn set_repeat_last_sample(&self, repeat: bool) {
        self.state.lock().repeat_last_sample = repeat;
    }

    /// Force the ADC-ready bit on or off.
    pub fn set_adc_ready(&self, ready: bool) {
        self.state.lock().adc_ready = ready;
    }

    /// Clear the ADC-ready bit once `count` writes have reached the command,
    /// ADC and configuration registers.
    pub fn stall_after_writes(&self, count: usize) {
        self.state.lock().stall_after_writes = Some(count);
    }

    /// Raise or clear the overflow status bit.
    pub fn set_overflow(&self, overflow: bool) {
        self.state.lock().overflow = overflow;
    }

    /// Withhold the new-data bit for the next `polls` status reads.
    pub fn delay_data(&self, polls: usize) {
        self.state.lock().data_delay = polls;
    }

    /// Simulate removal of the card.
    pub fn unplug(&self) {
        self.state.lock().present = false;
    }

    /// Every write so far as `(offset, value)`.
    pub fn writes(&self) -> Vec<(u16, u8)> {
        self.state.lock().writes.clone()
    }

    /// Writes excluding calibration-store address latching.
    pub fn adc_writes(&self) -> Vec<(u16, u8)> {
        self.state
            .lock()
            .writes
            .iter()
            .copied()
            .filter(|(offset, _)| *offset <= regs::CONFIG_REG)
            .collect()
    }

    /// Forget recorded writes and status-read count.
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.writes.clear();
        state.status_reads = 0;
    }

    /// Number of status-register reads so far.
    pub fn status_reads(&self) -> usize {
        self.state.lock().status_reads
    }
}

impl RegisterPort for SimulatedCard {
    fn read_byte(&mut self, offset: u16) -> io::Result<u8> {
        let mut state = self.state.lock();
        match offset {
            regs::STATUS_REG => {
                state.status_reads += 1;
                let mut status = state.status();
                if state.data_delay > 0 {
                    state.data_delay -= 1;
                    status.remove(Status::NEW_DATA | Status::D_AVAIL);
                }
                Ok(0xC0 | status.bits())
            }
            1..=3 => {
                let index = usize::from(offset - regs::ADC_DATA1_REG);
                let sample = state.samples.front().copied().unwrap_or(0);
                if offset == 3 && !(state.repeat_last_sample && state.samples.len() == 1) {
                    state.samples.pop_front();
                }
                Ok(sample.to_le_bytes()[index])
            }
            regs::EEPROM_DATA_REG => {
                let address = state.eeprom_address();
                Ok(state.eeprom[address])
            }
            _ => Ok(0),
        }
    }

    fn write_byte(&mut self, offset: u16, value: u8) -> io::Result<()> {
        let mut state = self.state.lock();
        match offset {
            regs::EEPROM_ADDR1_REG => state.address_low = value,
            regs::EEPROM_ADDR2_REG => state.address_high = value,
            regs::EEPROM_DATA_REG => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "calibration store is write-protected",
                ))
            }
            _ => {}
        }
        state.writes.push((offset, value));
        Ok(())
    }

    fn is_present(&self) -> bool {
        self.state.lock().present
    }
}
