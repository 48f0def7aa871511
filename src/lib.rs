#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

//! An embedded async battery monitor, charger arbiter and SMB135x charger driver.
//!
//! The pieces stack as follows:
//!
//! - [`battery::BatteryMonitor`] samples voltage and NTC temperature through a
//!   [`sampling::SamplingSource`], derives capacity, health and status from the tables in
//!   [`calibration`] and reports through a [`host::Host`].
//! - [`charger::ChargerCore`] arbitrates the charge current from the battery's requests,
//!   its ceilings and what the inputs can deliver, then programs a
//!   [`charger::ChargerBackend`].
//! - [`smb135x::Smb135x`] is such a backend for the SMB1356/7/8/9 chargers.

pub mod battery;
pub mod calibration;
pub mod charger;
pub mod host;
pub mod sampling;
pub mod smb135x;

mod error;

pub use battery::{BatteryDescriptor, BatteryMonitor, Health, Status};
pub use charger::{ChargerBackend, ChargerCore, ChargerRegistry};
pub use error::Error;
pub use host::{Host, SupplyType, UsbSupply};
pub use smb135x::Smb135x;

#[cfg(test)]
mod testing;
