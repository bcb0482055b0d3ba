use core::fmt;

use crate::pins::PinId;

pub type Result<T> = core::result::Result<T, Error>;

/// Everything that can go wrong while bringing up or using the bus.
///
/// `InvalidPin`, `PinBusy` and `PinUnavailable` are reported before any traffic hits the wires,
/// the NACK variants after a transfer has already started (and been closed
/// with a STOP condition).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Pin number is not a usable gpio line.
    InvalidPin(PinId),
    /// Pin is already reserved by another owner.
    PinBusy(PinId),
    /// Pin exists but the gpio driver refused to set it up.
    PinUnavailable(PinId),
    /// Address does not fit into 7 bits.
    InvalidAddress(u8),
    /// No slave acknowledged the address frame.
    AddressNacked,
    /// The slave refused the data byte at `byte_index`.
    DataNacked { byte_index: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidPin(pin) => write!(f, "gpio {} is not valid", pin),
            Error::PinBusy(pin) => write!(f, "gpio {} is busy", pin),
            Error::PinUnavailable(pin) => write!(f, "gpio {} cannot be set up", pin),
            Error::InvalidAddress(address) => {
                write!(f, "address {:#04x} does not fit into 7 bits", address)
            }
            Error::AddressNacked => write!(f, "address not acknowledged"),
            Error::DataNacked { byte_index } => {
                write!(f, "data byte {} not acknowledged", byte_index)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
