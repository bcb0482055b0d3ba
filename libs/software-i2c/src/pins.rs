//! Line level access to the two bus wires.
//!
//! Both lines are open-drain: driving `High` releases the wire to the
//! external pull-up, driving `Low` pulls it down. Nothing above this module
//! touches a pin directly.
//!
//! A gpio chip without an open-drain mode gets it emulated by [`PinPair`]:
//! a released line is switched to input, only a low level is ever driven.

use embedded_hal::digital::v2::{InputPin, OutputPin, PinState};

use crate::errors::{Error, Result};

/// Number of a gpio line on its controller.
pub type PinId = u32;

/// Reasons a controller refuses to hand out a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpioError {
    InvalidPin,
    PinBusy,
    /// The line exists but could not be set up (permissions, driver error).
    Unavailable,
}

/// Gpio chip with numbered lines that must be requested before use.
///
/// Line operations are infallible on purpose: a failed toggle shows up as a
/// missing ACK on the bus, there is nothing better the engine could do.
pub trait GpioController {
    fn is_valid(&self, pin: PinId) -> bool;

    /// Reserve `pin` exclusively. `label` names the owner for diagnostics.
    fn request(&mut self, pin: PinId, label: &'static str) -> core::result::Result<(), GpioError>;

    fn free(&mut self, pin: PinId);

    fn direction_output(&mut self, pin: PinId, level: PinState);

    fn direction_input(&mut self, pin: PinId);

    fn get_value(&mut self, pin: PinId) -> PinState;
}

/// The primitives the protocol engine is built on.
pub trait LineControl {
    fn drive_clock(&mut self, level: PinState);

    fn drive_data(&mut self, level: PinState);

    /// Let go of SDA and sample it. The next `drive_data` takes it back.
    fn read_data(&mut self) -> PinState;

    /// Let go of SCL and sample it, for clock stretch detection.
    fn read_clock(&mut self) -> PinState;
}

/// SCL and SDA claimed from a [`GpioController`].
///
/// Both lines are reserved together in [`PinPair::acquire`] and freed
/// together in [`PinPair::release`], which also runs on drop.
pub struct PinPair<G: GpioController> {
    gpio: G,
    clock_pin: PinId,
    data_pin: PinId,
    claimed: bool,
}

impl<G: GpioController> PinPair<G> {
    /// Validate and reserve both lines, then park them released (high).
    ///
    /// If the data line cannot be claimed the clock line is handed back
    /// before returning, so a failed acquire holds nothing.
    pub fn acquire(mut gpio: G, clock_pin: PinId, data_pin: PinId) -> Result<Self> {
        for pin in [clock_pin, data_pin] {
            if !gpio.is_valid(pin) {
                i2c_error!("gpio {} is not valid", pin);
                return Err(Error::InvalidPin(pin));
            }
        }
        if clock_pin == data_pin {
            return Err(Error::PinBusy(data_pin));
        }

        claim_pin(&mut gpio, clock_pin, "SCL")?;
        if let Err(e) = claim_pin(&mut gpio, data_pin, "SDA") {
            gpio.free(clock_pin);
            return Err(e);
        }

        Ok(Self {
            gpio,
            clock_pin,
            data_pin,
            claimed: true,
        })
    }

    /// Return both lines to the controller. Calling it twice is harmless.
    pub fn release(&mut self) {
        if self.claimed {
            self.claimed = false;
            self.gpio.free(self.clock_pin);
            self.gpio.free(self.data_pin);
            i2c_debug!("released SCL={} SDA={}", self.clock_pin, self.data_pin);
        }
    }

    pub fn clock_pin(&self) -> PinId {
        self.clock_pin
    }

    pub fn data_pin(&self) -> PinId {
        self.data_pin
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }
}

fn claim_pin<G: GpioController>(gpio: &mut G, pin: PinId, label: &'static str) -> Result<()> {
    gpio.request(pin, label).map_err(|e| {
        i2c_error!("{} gpio {} request failed", label, pin);
        match e {
            GpioError::InvalidPin => Error::InvalidPin(pin),
            GpioError::PinBusy => Error::PinBusy(pin),
            GpioError::Unavailable => Error::PinUnavailable(pin),
        }
    })?;
    gpio.direction_output(pin, PinState::High);

    Ok(())
}

impl<G: GpioController> PinPair<G> {
    // Never drive a 1, a slave may be pulling the wire down at the same time.
    fn drive(&mut self, pin: PinId, level: PinState) {
        if !self.claimed {
            return;
        }
        match level {
            PinState::High => self.gpio.direction_input(pin),
            PinState::Low => self.gpio.direction_output(pin, PinState::Low),
        }
    }
}

impl<G: GpioController> LineControl for PinPair<G> {
    fn drive_clock(&mut self, level: PinState) {
        self.drive(self.clock_pin, level);
    }

    fn drive_data(&mut self, level: PinState) {
        self.drive(self.data_pin, level);
    }

    fn read_data(&mut self) -> PinState {
        if !self.claimed {
            return PinState::High;
        }
        self.gpio.direction_input(self.data_pin);
        self.gpio.get_value(self.data_pin)
    }

    fn read_clock(&mut self) -> PinState {
        if !self.claimed {
            return PinState::High;
        }
        self.gpio.direction_input(self.clock_pin);
        self.gpio.get_value(self.clock_pin)
    }
}

impl<G: GpioController> Drop for PinPair<G> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Lines that are already configured as open-drain embedded-hal pins.
///
/// ```ignore
/// let lines = OpenDrainPins::new(
///     pins.gpio4.into_open_drain_output(),
///     pins.gpio5.into_open_drain_output(),
/// );
/// ```
pub struct OpenDrainPins<SDA, SCL> {
    /// The pin referencing the sda line.
    sda_pin: SDA,
    /// The pin referencing the scl line.
    scl_pin: SCL,
}

impl<SDA, SCL> OpenDrainPins<SDA, SCL>
where
    SDA: OutputPin + InputPin,
    SCL: OutputPin + InputPin,
{
    pub fn new(sda: SDA, scl: SCL) -> Self {
        Self {
            sda_pin: sda,
            scl_pin: scl,
        }
    }

    pub fn release(self) -> (SDA, SCL) {
        (self.sda_pin, self.scl_pin)
    }
}

impl<SDA, SCL> LineControl for OpenDrainPins<SDA, SCL>
where
    SDA: OutputPin + InputPin,
    SCL: OutputPin + InputPin,
{
    fn drive_clock(&mut self, level: PinState) {
        let _ = self.scl_pin.set_state(level);
    }

    fn drive_data(&mut self, level: PinState) {
        let _ = self.sda_pin.set_state(level);
    }

    fn read_data(&mut self) -> PinState {
        let _ = self.sda_pin.set_high();
        sample(self.sda_pin.is_low())
    }

    fn read_clock(&mut self) -> PinState {
        let _ = self.scl_pin.set_high();
        sample(self.scl_pin.is_low())
    }
}

// An unreadable line counts as released, which ends up as a NACK.
fn sample<E>(is_low: core::result::Result<bool, E>) -> PinState {
    match is_low {
        Ok(true) => PinState::Low,
        _ => PinState::High,
    }
}
