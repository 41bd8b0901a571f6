//! Command dispatch and unit registry.
//!
//! The [`Dispatcher`] owns every attached unit. Units live in a fixed-size
//! arena addressed by generational [`UnitHandle`]s, so a handle to a
//! detached unit can never reach whatever is attached in its slot later.
//!
//! Commands are issued through a [`UnitSession`], obtained with
//! [`Dispatcher::open`]. Only one session per unit may be open at a time.
//! Each unit has its own lock: at most one command is in flight per unit,
//! while commands against different units run concurrently.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::convert;
use crate::error::{DmmError, Result};
use crate::port::RegisterPort;
use crate::range::Range;
use crate::sequencer::AdcSequencer;
use crate::session::SessionState;

/// Raw control code of the (unhandled) ADC-ready query.
pub const CODE_ADC_READY: u32 = 0;
/// Raw control code of [`Request::ReadConfigByte`].
pub const CODE_READ_CONFIG_BYTE: u32 = 1;
/// Raw control code of [`Request::WriteConfigByte`].
pub const CODE_WRITE_CONFIG_BYTE: u32 = 2;
/// Raw control code of [`Request::ReadInternalResistance`].
pub const CODE_READ_INTERNAL_RESISTANCE: u32 = 3;
/// Raw control code of [`Request::StartMeasurement`].
pub const CODE_START_MEASUREMENT: u32 = 4;
/// Raw control code of [`Request::ReadConvertedValue`].
pub const CODE_READ_CONVERTED_VALUE: u32 = 5;

/// A control request against one unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Request {
    /// Read one calibration-store byte.
    ReadConfigByte {
        /// Absolute calibration-store address
        address: u32,
    },
    /// Write one calibration-store byte (never supported).
    WriteConfigByte {
        /// Absolute calibration-store address
        address: u32,
        /// Byte to store
        data: u8,
    },
    /// Re-read and validate the internal shunt resistance.
    ReadInternalResistance,
    /// Arm the front end for a range identifier.
    StartMeasurement {
        /// Range identifier, see [`Range::id`]
        range: i32,
    },
    /// Wait for a fresh conversion and return it in engineering units.
    ReadConvertedValue,
}

/// A request as it arrives from the character-device boundary: a control
/// code plus whichever argument fields that code uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawRequest {
    /// Control code (`CODE_*`)
    pub code: u32,
    /// Calibration-store address for codes 1 and 2
    pub address: u32,
    /// Byte to write for code 2
    pub data: u8,
    /// Range identifier for code 4
    pub range: i32,
}

impl TryFrom<RawRequest> for Request {
    type Error = DmmError;

    fn try_from(raw: RawRequest) -> Result<Self> {
        match raw.code {
            CODE_READ_CONFIG_BYTE => Ok(Self::ReadConfigByte {
                address: raw.address,
            }),
            CODE_WRITE_CONFIG_BYTE => Ok(Self::WriteConfigByte {
                address: raw.address,
                data: raw.data,
            }),
            CODE_READ_INTERNAL_RESISTANCE => Ok(Self::ReadInternalResistance),
            CODE_START_MEASUREMENT => Ok(Self::StartMeasurement { range: raw.range }),
            CODE_READ_CONVERTED_VALUE => Ok(Self::ReadConvertedValue),
            code => Err(DmmError::NotImplemented { code }),
        }
    }
}

/// Successful outcome of a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response {
    /// Calibration-store byte
    ConfigByte(u8),
    /// Validated internal resistance in ohms
    InternalResistance(u32),
    /// Range the front end is now armed for
    MeasurementStarted(Range),
    /// Converted reading in the range's engineering unit
    Value(f64),
}

/// Stable reference to an attached unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitHandle {
    index: usize,
    generation: u32,
}

impl UnitHandle {
    /// Instance index of the unit (its slot number).
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nidmm{}", self.index)
    }
}

struct Unit {
    port: Box<dyn RegisterPort>,
    session: SessionState,
}

struct UnitSlot {
    index: usize,
    attached: AtomicBool,
    unit: Mutex<Unit>,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    unit: Option<Arc<UnitSlot>>,
}

/// Routes control requests to attached units.
pub struct Dispatcher {
    sequencer: AdcSequencer,
    slots: RwLock<Vec<Slot>>,
}

impl Dispatcher {
    /// Dispatcher with room for `max_units` concurrently attached units.
    pub fn new(sequencer: AdcSequencer, max_units: usize) -> Self {
        let slots = (0..max_units).map(|_| Slot::default()).collect();
        Self {
            sequencer,
            slots: RwLock::new(slots),
        }
    }

    /// Sequencer shared by all units.
    pub fn sequencer(&self) -> &AdcSequencer {
        &self.sequencer
    }

    /// Attach a unit behind `port`, priming its internal resistance.
    ///
    /// An out-of-spec resistance is logged and the unit is attached without
    /// one; later requests re-read it.
    pub fn attach(&self, port: impl RegisterPort + 'static) -> Result<UnitHandle> {
        let mut slots = self.slots.write();
        let (index, slot) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.unit.is_none())
            .ok_or_else(|| DmmError::Registry {
                message: "all unit slots in use".to_string(),
            })?;

        let mut unit = Unit {
            port: Box::new(port),
            session: SessionState::new(),
        };
        if let Err(err) = self
            .sequencer
            .calibration()
            .read_internal_resistance(&mut unit.port, &mut unit.session)
        {
            warn!(unit = index, error = %err, "Could not prime internal resistance");
        }

        slot.generation = slot.generation.wrapping_add(1);
        slot.unit = Some(Arc::new(UnitSlot {
            index,
            attached: AtomicBool::new(true),
            unit: Mutex::new(unit),
        }));

        let handle = UnitHandle {
            index,
            generation: slot.generation,
        };
        info!(unit = %handle, "Unit attached");
        Ok(handle)
    }

    /// Detach a unit, dropping its session state.
    ///
    /// A session still open on the unit stays valid as a value but every
    /// further request through it fails with [`DmmError::Unavailable`].
    pub fn detach(&self, handle: UnitHandle) -> Result<()> {
        let unit = {
            let mut slots = self.slots.write();
            slots
                .get_mut(handle.index)
                .filter(|slot| slot.generation == handle.generation)
                .and_then(|slot| slot.unit.take())
                .ok_or(DmmError::Unavailable {
                    unit: handle.index,
                })?
        };

        // The registry lock is not held past this point.
        unit.attached.store(false, Ordering::SeqCst);
        if unit.unit.lock().session.open {
            warn!(unit = %handle, "Detaching unit with an open session");
        }
        info!(unit = %handle, "Unit detached");
        Ok(())
    }

    /// Handles of every attached unit, by instance index.
    pub fn units(&self) -> Vec<UnitHandle> {
        self.slots
            .read()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.unit.is_some())
            .map(|(index, slot)| UnitHandle {
                index,
                generation: slot.generation,
            })
            .collect()
    }

    /// Open a session on a unit.
    ///
    /// Fails with [`DmmError::Busy`] while another session is open and with
    /// [`DmmError::Unavailable`] if the unit is gone.
    pub fn open(&self, handle: UnitHandle) -> Result<UnitSession> {
        let slot = self.slot(handle)?;
        {
            let mut unit = slot.unit.lock();
            if !unit.port.is_present() {
                return Err(DmmError::Unavailable {
                    unit: handle.index,
                });
            }
            if unit.session.open {
                debug!(unit = %handle, "Unit already open");
                return Err(DmmError::Busy {
                    unit: handle.index,
                });
            }
            unit.session.open = true;
        }
        info!(unit = %handle, "Session opened");
        Ok(UnitSession {
            slot,
            sequencer: self.sequencer.clone(),
        })
    }

    fn slot(&self, handle: UnitHandle) -> Result<Arc<UnitSlot>> {
        self.slots
            .read()
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.unit.clone())
            .ok_or(DmmError::Unavailable {
                unit: handle.index,
            })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("units", &self.units())
            .finish()
    }
}

/// An open session on one unit. Closing (or dropping) it releases the unit.
pub struct UnitSession {
    slot: Arc<UnitSlot>,
    sequencer: AdcSequencer,
}

impl UnitSession {
    /// Instance index of the unit.
    pub fn unit(&self) -> usize {
        self.slot.index
    }

    /// Decode and execute a raw request.
    pub fn dispatch_raw(&self, raw: RawRequest) -> Result<Response> {
        let request = Request::try_from(raw).inspect_err(|_| {
            debug!(unit = self.slot.index, code = raw.code, "Unknown request code");
        })?;
        self.dispatch(request)
    }

    /// Execute a request with the unit locked for its whole duration.
    #[instrument(skip(self), fields(unit = self.slot.index))]
    pub fn dispatch(&self, request: Request) -> Result<Response> {
        let mut guard = self.slot.unit.lock();
        if !self.slot.attached.load(Ordering::SeqCst) || !guard.port.is_present() {
            return Err(DmmError::Unavailable {
                unit: self.slot.index,
            });
        }
        let Unit { port, session } = &mut *guard;

        match request {
            Request::ReadConfigByte { address } => self
                .sequencer
                .calibration()
                .read_config_byte(port, address)
                .map(Response::ConfigByte),
            Request::WriteConfigByte { address, .. } => Err(DmmError::NotSupported {
                message: format!("calibration store write at {:#06x}", address),
            }),
            Request::ReadInternalResistance => self
                .sequencer
                .calibration()
                .read_internal_resistance(port, session)
                .map(Response::InternalResistance),
            Request::StartMeasurement { range } => self
                .sequencer
                .start_measurement(port, session, range)
                .map(Response::MeasurementStarted),
            Request::ReadConvertedValue => {
                if !session.is_armed() {
                    return Err(DmmError::NotSupported {
                        message: "no measurement range armed".to_string(),
                    });
                }
                let raw = self.sequencer.read_raw(port, session)?;
                convert::convert(session, raw).map(Response::Value)
            }
        }
    }

    /// Snapshot of the unit's session state.
    pub fn state(&self) -> SessionState {
        self.slot.unit.lock().session.clone()
    }

    /// Release the unit.
    pub fn close(self) {}
}

impl Drop for UnitSession {
    fn drop(&mut self) {
        self.slot.unit.lock().session.open = false;
        info!(unit = self.slot.index, "Session closed");
    }
}

impl fmt::Debug for UnitSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitSession")
            .field("unit", &self.slot.index)
            .finish()
    }
}
