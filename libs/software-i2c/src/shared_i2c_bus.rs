use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::blocking::{
    delay::DelayUs,
    i2c::{Read, Write, WriteRead},
};

use crate::{
    errors::{Error, Result},
    pins::LineControl,
    single_client::Bus,
    transfer::{Address, TransferOutcome},
};

/// A [`Bus`] that several drivers can talk through.
///
/// Every transfer runs inside a critical section, so transfers coming from
/// different accessors never interleave on the wires.
pub struct SharedBus<L, D>(Mutex<RefCell<Bus<L, D>>>)
where
    L: LineControl,
    D: DelayUs<u32>;

/// Handle given to a single driver. Cheap to copy.
pub struct SharedBusAccessor<'a, L, D>(&'a SharedBus<L, D>)
where
    L: LineControl,
    D: DelayUs<u32>;

impl<L, D> From<Bus<L, D>> for SharedBus<L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
    fn from(bus: Bus<L, D>) -> Self {
        Self(Mutex::new(RefCell::new(bus)))
    }
}

impl<L, D> SharedBus<L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
    pub fn make_accessor(&self) -> SharedBusAccessor<'_, L, D> {
        SharedBusAccessor(self)
    }

    pub fn into_inner(self) -> Bus<L, D> {
        self.0.into_inner().into_inner()
    }

    fn with_bus<R>(&self, f: impl FnOnce(&mut Bus<L, D>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.0.borrow(cs).borrow_mut()))
    }
}

impl<'a, L, D> Clone for SharedBusAccessor<'a, L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, L, D> Copy for SharedBusAccessor<'a, L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
}

impl<'a, L, D> SharedBusAccessor<'a, L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
    pub fn transfer_write(&self, address: Address, payload: &[u8]) -> TransferOutcome {
        self.0.with_bus(|bus| bus.transfer_write(address, payload))
    }

    pub fn transfer_read(&self, address: Address, buffer: &mut [u8]) -> TransferOutcome {
        self.0.with_bus(|bus| bus.transfer_read(address, buffer))
    }

    pub fn probe(&self, address: Address) -> bool {
        self.0.with_bus(|bus| bus.probe(address))
    }
}

//-----------------------------------------------------------------------------

impl<'a, L, D> Write for SharedBusAccessor<'a, L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
    type Error = Error;

    #[inline]
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<()> {
        let address = Address::new(address)?;
        self.transfer_write(address, bytes).into_result()
    }
}

impl<'a, L, D> Read for SharedBusAccessor<'a, L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
    type Error = Error;

    #[inline]
    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<()> {
        let address = Address::new(address)?;
        self.transfer_read(address, buffer).into_result()
    }
}

impl<'a, L, D> WriteRead for SharedBusAccessor<'a, L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
    type Error = Error;

    #[inline]
    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<()> {
        let address = Address::new(address)?;
        self.0
            .with_bus(|bus| bus.transfer_write_read(address, bytes, buffer))
            .into_result()
    }
}
