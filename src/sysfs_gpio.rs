use core::fmt::Write;
use std::{collections::HashMap, io::ErrorKind};

use embedded_hal::digital::v2::PinState;
use gpio_software_i2c::{GpioController, GpioError, PinId};
use linux_embedded_hal::sysfs_gpio::{self, Direction, Pin};

use crate::logger::{Channel, Logger, Stdout};

/// Gpio lines of the kernel's `/sys/class/gpio` interface.
///
/// A line counts as taken while it is exported, by us or by anybody else.
/// Lines are unexported again when freed.
pub struct SysfsGpio {
    pin_count: PinId,
    claimed: HashMap<PinId, Pin>,
    log: Logger<Stdout>,
}

impl SysfsGpio {
    pub fn new(pin_count: PinId, log: Logger<Stdout>) -> Self {
        Self {
            pin_count,
            claimed: HashMap::new(),
            log,
        }
    }

    fn line(&self, pin: PinId) -> Option<&Pin> {
        self.claimed.get(&pin)
    }
}

/// The kernel answers an export of a line it does not have with ENOENT or
/// EINVAL. Anything else means the line exists but we may not use it.
fn export_error(e: &sysfs_gpio::Error) -> GpioError {
    match e {
        sysfs_gpio::Error::Io(io)
            if matches!(io.kind(), ErrorKind::NotFound | ErrorKind::InvalidInput) =>
        {
            GpioError::InvalidPin
        }
        _ => GpioError::Unavailable,
    }
}

impl GpioController for SysfsGpio {
    fn is_valid(&self, pin: PinId) -> bool {
        pin < self.pin_count
    }

    fn request(&mut self, pin: PinId, label: &'static str) -> Result<(), GpioError> {
        if self.claimed.contains_key(&pin) {
            return Err(GpioError::PinBusy);
        }

        let line = Pin::new(pin as u64);
        if line.is_exported() {
            let _ = write!(
                self.log.channel(Channel::Gpio),
                "{} gpio {} is already exported",
                label,
                pin
            );
            return Err(GpioError::PinBusy);
        }
        if let Err(e) = line.export() {
            let _ = write!(
                self.log.channel(Channel::Gpio),
                "{} gpio {} export failed: {}",
                label,
                pin,
                e
            );
            return Err(export_error(&e));
        }

        self.claimed.insert(pin, line);
        Ok(())
    }

    fn free(&mut self, pin: PinId) {
        if let Some(line) = self.claimed.remove(&pin) {
            let _ = line.set_direction(Direction::In);
            let _ = line.unexport();
        }
    }

    fn direction_output(&mut self, pin: PinId, level: PinState) {
        if let Some(line) = self.line(pin) {
            let direction = match level {
                PinState::High => Direction::High,
                PinState::Low => Direction::Low,
            };
            let _ = line.set_direction(direction);
        }
    }

    fn direction_input(&mut self, pin: PinId) {
        if let Some(line) = self.line(pin) {
            let _ = line.set_direction(Direction::In);
        }
    }

    fn get_value(&mut self, pin: PinId) -> PinState {
        match self.line(pin).map(Pin::get_value) {
            Some(Ok(0)) => PinState::Low,
            // an unreadable line reads as released
            _ => PinState::High,
        }
    }
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        let pins: Vec<PinId> = self.claimed.keys().copied().collect();
        for pin in pins {
            self.free(pin);
        }
    }
}
