#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! This crate provides the ability to designate any two
//! gpio pins as SDA/SCL which allows you to introduce i2c
//! master capabilities into your project.
//!
//! In order to use these pins, you must include a pull-up
//! resistor on both lines. Both lines are driven open-drain:
//! the master only ever pulls a wire low or lets it go.
//!
//! ```ignore
//! let mut bus = bus_init(gpio, 4, 17, delay)?;
//! let outcome = bus.transfer_write(Address::new(0x3C)?, &[0x00, 0xAE]);
//! let delay = bus_deinit(bus);
//! ```

#[macro_use]
mod logging;

pub mod errors;
pub mod pins;
mod shared_i2c_bus;
mod single_client;
pub mod transfer;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use errors::{Error, Result};
pub use pins::{GpioController, GpioError, LineControl, OpenDrainPins, PinId, PinPair};
pub use shared_i2c_bus::{SharedBus, SharedBusAccessor};
pub use single_client::{bus_deinit, bus_init, bus_init_with_config, Bus, BusConfig};
pub use transfer::{Address, Direction, Payload, TransferOutcome, TransferRequest};
