use std::time::{Duration, Instant};

use embedded_hal::blocking::delay::DelayUs;

/// Busy waits on the monotonic clock.
///
/// `thread::sleep` rounds a few microseconds up to the scheduler tick, which
/// would stretch every bus clock to tens of microseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinDelay;

impl DelayUs<u32> for SpinDelay {
    fn delay_us(&mut self, us: u32) {
        let deadline = Instant::now() + Duration::from_micros(us as u64);
        while Instant::now() < deadline {
            core::hint::spin_loop();
        }
    }
}
