use core::fmt;

use crate::errors::{Error, Result};

/// 7-bit slave address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address(u8);

impl Address {
    pub const MAX: u8 = 0x7F;

    pub const fn new(raw: u8) -> Result<Self> {
        if raw > Self::MAX {
            Err(Error::InvalidAddress(raw))
        } else {
            Ok(Self(raw))
        }
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    /// First byte on the wire: address in the upper seven bits, R/W bit last.
    pub const fn header(self, direction: Direction) -> u8 {
        (self.0 << 1) | direction as u8
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self> {
        Self::new(raw)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Value of the R/W bit that follows the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Direction {
    Write = 0,
    Read = 1,
}

/// Buffer of a single transfer, its variant decides the direction.
#[derive(Debug)]
pub enum Payload<'a> {
    Write(&'a [u8]),
    Read(&'a mut [u8]),
}

/// One logical i2c operation. Built by the caller, consumed by
/// [`Bus::transfer`](crate::Bus::transfer).
#[derive(Debug)]
pub struct TransferRequest<'a> {
    pub address: Address,
    pub payload: Payload<'a>,
}

impl<'a> TransferRequest<'a> {
    pub fn write(address: Address, bytes: &'a [u8]) -> Self {
        Self {
            address,
            payload: Payload::Write(bytes),
        }
    }

    pub fn read(address: Address, buffer: &'a mut [u8]) -> Self {
        Self {
            address,
            payload: Payload::Read(buffer),
        }
    }

    pub fn direction(&self) -> Direction {
        match self.payload {
            Payload::Write(_) => Direction::Write,
            Payload::Read(_) => Direction::Read,
        }
    }

    pub fn len(&self) -> usize {
        match &self.payload {
            Payload::Write(bytes) => bytes.len(),
            Payload::Read(buffer) => buffer.len(),
        }
    }

    /// An empty request only probes the address.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How a transfer ended. The first NACK wins, bytes already clocked out are
/// not repeated.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferOutcome {
    Success,
    AddressNacked,
    DataNacked { byte_index: usize },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        *self == TransferOutcome::Success
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            TransferOutcome::Success => Ok(()),
            TransferOutcome::AddressNacked => Err(Error::AddressNacked),
            TransferOutcome::DataNacked { byte_index } => Err(Error::DataNacked { byte_index }),
        }
    }
}
