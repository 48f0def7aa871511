//! Error type shared by the battery monitor, the charger arbiter and the chip backend.

use core::fmt;

/// Errors reported by this crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    /// A required argument was empty or out of range.
    InvalidArgument,
    /// A bounded table is full.
    OutOfMemory,
    /// The write or action is not allowed right now.
    PermissionDenied,
    /// The property or attribute is unknown or not writable.
    InvalidProperty,
    /// The operation is not valid in the current state.
    InvalidState,
    /// A bus transaction failed after all retries.
    Hardware,
    /// The platform rejected the power-supply registration.
    RegistrationFailed,
    /// A configuration value could not be parsed as a base-10 integer.
    Parse,
    /// The operation is not supported.
    NotImplemented,
    /// The charger chip did not answer on the bus.
    DeviceNotFound,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::InvalidArgument => "invalid argument",
            Error::OutOfMemory => "out of memory",
            Error::PermissionDenied => "permission denied",
            Error::InvalidProperty => "invalid property",
            Error::InvalidState => "invalid state",
            Error::Hardware => "hardware i/o error",
            Error::RegistrationFailed => "registration failed",
            Error::Parse => "malformed integer",
            Error::NotImplemented => "not implemented",
            Error::DeviceNotFound => "device not found",
        };
        f.write_str(msg)
    }
}
