//! Measurement protocol engine for the NI 4050 digital multimeter.
//!
//! This crate drives the register-level protocol of the NI 4050 DMM card:
//! reading calibration constants from its on-board store, arming the ADC for
//! one of 17 measurement ranges, polling for conversions and turning raw
//! 24-bit codes into volts or ohms.
//!
//! # Architecture
//!
//! ## Hardware Boundary
//! - [`RegisterPort`] - byte-wide access to the card's 8-register window
//! - [`SimulatedCard`] - register-level model of the card for tests and the simulator
//!
//! ## Protocol
//! - [`CalibrationReader`] - calibration-store bytes, words and the internal resistance
//! - [`ReadyPoller`] - bounded status polling with an injectable [`Sleeper`]
//! - [`AdcSequencer`] - reset, configuration and calibration load for a range
//! - [`convert`] - raw code to engineering units
//!
//! ## Dispatch
//! - [`Dispatcher`] - unit registry with generational [`UnitHandle`]s
//! - [`UnitSession`] - exclusive open session routing [`Request`]s
//!
//! # Example
//!
//! ```
//! use ni4050::{config::DriverConfig, Range, Request, Response, SimulatedCard};
//!
//! # fn example() -> anyhow::Result<()> {
//! let dmm = DriverConfig::default().dispatcher();
//! let unit = dmm.attach(SimulatedCard::with_reading(1_000_000, 0x7F_FFFF))?;
//!
//! let session = dmm.open(unit)?;
//! session.dispatch(Request::StartMeasurement { range: Range::Vdc2.id() })?;
//! if let Response::Value(volts) = session.dispatch(Request::ReadConvertedValue)? {
//!     println!("{volts:.6} V");
//! }
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod config;
pub mod convert;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod poll;
pub mod port;
pub mod range;
pub mod regs;
pub mod sequencer;
pub mod session;
pub mod sim;

pub use calibration::{CalibrationArea, CalibrationReader, ResistanceBounds};
pub use config::DriverConfig;
pub use dispatcher::{Dispatcher, RawRequest, Request, Response, UnitHandle, UnitSession};
pub use error::{DmmError, Result};
pub use poll::{NoSleep, PollLimits, ReadyPoller, Sleeper, ThreadSleeper};
#[cfg(unix)]
pub use port::IoPortWindow;
pub use port::RegisterPort;
pub use range::{ProfileTable, Range, RangeProfile};
pub use sequencer::AdcSequencer;
pub use session::{AdcState, SessionState};
pub use sim::SimulatedCard;
