use embedded_hal::{
    blocking::{
        delay::DelayUs,
        i2c::{Read, Write, WriteRead},
    },
    digital::v2::PinState,
};

use crate::{
    errors::{Error, Result},
    pins::{GpioController, LineControl, PinId, PinPair},
    transfer::{Address, Direction, Payload, TransferOutcome, TransferRequest},
};

/// Timing knobs of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Pause after every line transition, in microseconds. 5us keeps the
    /// clock under the 100kHz standard mode limit; tune it down when the
    /// gpio toggles slowly on its own.
    pub settle_delay_us: u32,
    /// How many times to poll SCL for a stretching slave before sampling a
    /// bit. 0 samples right away.
    pub clock_stretch_polls: u32,
}

impl BusConfig {
    pub const fn new() -> Self {
        Self {
            settle_delay_us: 5,
            clock_stretch_polls: 0,
        }
    }

    pub const fn settle_delay_us(mut self, us: u32) -> Self {
        self.settle_delay_us = us;
        self
    }

    pub const fn clock_stretch_polls(mut self, polls: u32) -> Self {
        self.clock_stretch_polls = polls;
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Represents a two-wire i2c master.
///
/// A transfer runs to completion on the calling thread and never yields.
/// If the thread is interrupted mid-transfer by the host the wires may stay
/// in a non-idle state. A slave left holding SDA low in the middle of a byte
/// is not recovered: the bus stays unusable until that slave lets go.
pub struct Bus<L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
    /// The scl and sda lines.
    lines: L,
    /// Provider for the settle delay.
    delay: D,
    config: BusConfig,
}

/// Acquire `clock_pin` and `data_pin` from `gpio` and build a bus on them
/// with the default timing.
pub fn bus_init<G, D>(
    gpio: G,
    clock_pin: PinId,
    data_pin: PinId,
    delay: D,
) -> Result<Bus<PinPair<G>, D>>
where
    G: GpioController,
    D: DelayUs<u32>,
{
    bus_init_with_config(gpio, clock_pin, data_pin, delay, BusConfig::default())
}

pub fn bus_init_with_config<G, D>(
    gpio: G,
    clock_pin: PinId,
    data_pin: PinId,
    delay: D,
    config: BusConfig,
) -> Result<Bus<PinPair<G>, D>>
where
    G: GpioController,
    D: DelayUs<u32>,
{
    let lines = PinPair::acquire(gpio, clock_pin, data_pin)?;
    i2c_debug!("i2c bus on SCL={} SDA={}", clock_pin, data_pin);

    Ok(Bus::with_config(lines, delay, config))
}

/// Tear the bus down: both lines go back to the gpio controller. The delay
/// provider is handed back to the caller.
pub fn bus_deinit<G, D>(bus: Bus<PinPair<G>, D>) -> D
where
    G: GpioController,
    D: DelayUs<u32>,
{
    let (mut lines, delay) = bus.into_parts();
    lines.release();
    delay
}

impl<L, D> Bus<L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
    pub fn new(lines: L, delay: D) -> Self {
        Self::with_config(lines, delay, BusConfig::default())
    }

    /// Lines are released on construction so the first START begins from
    /// the idle level.
    pub fn with_config(lines: L, delay: D, config: BusConfig) -> Self {
        let mut res = Self {
            lines,
            delay,
            config,
        };

        clock_release(&mut res);
        data_release(&mut res);

        res
    }

    pub fn config(&self) -> BusConfig {
        self.config
    }

    pub fn set_config(&mut self, config: BusConfig) {
        self.config = config;
    }

    pub fn into_parts(self) -> (L, D) {
        (self.lines, self.delay)
    }

    /// Write `payload` to `address`. An empty payload only probes the
    /// address.
    pub fn transfer_write(&mut self, address: Address, payload: &[u8]) -> TransferOutcome {
        i2c_start_condition(self);

        let outcome = if !i2c_write_address(self, address, Direction::Write) {
            TransferOutcome::AddressNacked
        } else {
            match payload.iter().position(|&byte| !i2c_write_byte(self, byte)) {
                Some(byte_index) => TransferOutcome::DataNacked { byte_index },
                None => TransferOutcome::Success,
            }
        };

        i2c_end_condition(self);
        report(address, outcome);

        outcome
    }

    /// Fill `buffer` from `address`. Every byte but the last is
    /// acknowledged by the master.
    pub fn transfer_read(&mut self, address: Address, buffer: &mut [u8]) -> TransferOutcome {
        // with nothing to NACK the slave would keep SDA for its first bit
        if buffer.is_empty() {
            return self.transfer_write(address, &[]);
        }

        i2c_start_condition(self);

        let outcome = if !i2c_write_address(self, address, Direction::Read) {
            TransferOutcome::AddressNacked
        } else {
            i2c_read_bytes(self, buffer);
            TransferOutcome::Success
        };

        i2c_end_condition(self);
        report(address, outcome);

        outcome
    }

    /// Write `bytes`, then read `buffer` after a repeated START.
    pub fn transfer_write_read(
        &mut self,
        address: Address,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> TransferOutcome {
        if buffer.is_empty() {
            return self.transfer_write(address, bytes);
        }

        i2c_start_condition(self);

        let mut outcome = if !i2c_write_address(self, address, Direction::Write) {
            TransferOutcome::AddressNacked
        } else {
            match bytes.iter().position(|&byte| !i2c_write_byte(self, byte)) {
                Some(byte_index) => TransferOutcome::DataNacked { byte_index },
                None => TransferOutcome::Success,
            }
        };

        if outcome.is_success() {
            // repeated START
            i2c_start_condition(self);
            if i2c_write_address(self, address, Direction::Read) {
                i2c_read_bytes(self, buffer);
            } else {
                outcome = TransferOutcome::AddressNacked;
            }
        }

        i2c_end_condition(self);
        report(address, outcome);

        outcome
    }

    pub fn transfer(&mut self, request: TransferRequest<'_>) -> TransferOutcome {
        match request.payload {
            Payload::Write(bytes) => self.transfer_write(request.address, bytes),
            Payload::Read(buffer) => self.transfer_read(request.address, buffer),
        }
    }

    /// Address-only write, true if some slave answered.
    pub fn probe(&mut self, address: Address) -> bool {
        self.transfer_write(address, &[]).is_success()
    }
}

fn report(address: Address, outcome: TransferOutcome) {
    match outcome {
        TransferOutcome::Success => {}
        TransferOutcome::AddressNacked => {
            i2c_debug!("i2c address {} not acknowledged", address);
        }
        TransferOutcome::DataNacked { byte_index } => {
            i2c_error!("i2c {} refused data byte {}", address, byte_index);
        }
    }
}

fn settle<L, D>(i2c: &mut Bus<L, D>)
where
    L: LineControl,
    D: DelayUs<u32>,
{
    i2c.delay.delay_us(i2c.config.settle_delay_us);
}

fn clock_low<L, D>(i2c: &mut Bus<L, D>)
where
    L: LineControl,
    D: DelayUs<u32>,
{
    i2c.lines.drive_clock(PinState::Low);
    settle(i2c);
}

fn clock_release<L, D>(i2c: &mut Bus<L, D>)
where
    L: LineControl,
    D: DelayUs<u32>,
{
    i2c.lines.drive_clock(PinState::High);
    settle(i2c);
}

fn data_low<L, D>(i2c: &mut Bus<L, D>)
where
    L: LineControl,
    D: DelayUs<u32>,
{
    i2c.lines.drive_data(PinState::Low);
    settle(i2c);
}

fn data_release<L, D>(i2c: &mut Bus<L, D>)
where
    L: LineControl,
    D: DelayUs<u32>,
{
    i2c.lines.drive_data(PinState::High);
    settle(i2c);
}

/// SDA falls while SCL is high, then SCL is pulled down. Also serves as
/// the repeated START: SDA goes up first while SCL is still low.
fn i2c_start_condition<L, D>(i2c: &mut Bus<L, D>)
where
    L: LineControl,
    D: DelayUs<u32>,
{
    data_release(i2c);
    clock_release(i2c);
    data_low(i2c);
    clock_low(i2c);
}

/// SDA rises while SCL is high. Called with SCL low, leaves both lines
/// released.
fn i2c_end_condition<L, D>(i2c: &mut Bus<L, D>)
where
    L: LineControl,
    D: DelayUs<u32>,
{
    data_low(i2c);
    clock_release(i2c);
    data_release(i2c);
}

/// SDA only changes while SCL is low.
fn i2c_write_bit<L, D>(i2c: &mut Bus<L, D>, high: bool)
where
    L: LineControl,
    D: DelayUs<u32>,
{
    if high {
        data_release(i2c);
    } else {
        data_low(i2c);
    }

    // **************
    // Pulse the clock
    // **************
    clock_release(i2c);
    clock_low(i2c);
}

/// Hand SDA to the slave for one clock and sample it while SCL is high.
fn i2c_read_bit<L, D>(i2c: &mut Bus<L, D>) -> bool
where
    L: LineControl,
    D: DelayUs<u32>,
{
    data_release(i2c);
    clock_release(i2c);
    i2c_wait_clock_stretch(i2c);

    let high = i2c.lines.read_data() == PinState::High;

    // Bring clock back down
    clock_low(i2c);

    high
}

/// Bounded wait for a slave holding SCL low. Once the window is used up the
/// bit is sampled anyway, master and slave are out of step from then on.
fn i2c_wait_clock_stretch<L, D>(i2c: &mut Bus<L, D>)
where
    L: LineControl,
    D: DelayUs<u32>,
{
    let polls = i2c.config.clock_stretch_polls;
    if polls == 0 {
        return;
    }

    for _ in 0..polls {
        if i2c.lines.read_clock() == PinState::High {
            return;
        }
        settle(i2c);
    }

    i2c_warn!("SCL still held low after {} polls", polls);
}

/// Low ninth bit from the slave.
fn i2c_read_ack<L, D>(i2c: &mut Bus<L, D>) -> bool
where
    L: LineControl,
    D: DelayUs<u32>,
{
    !i2c_read_bit(i2c)
}

fn i2c_write_address<L, D>(i2c: &mut Bus<L, D>, address: Address, direction: Direction) -> bool
where
    L: LineControl,
    D: DelayUs<u32>,
{
    // Address frame
    let mut mask = 0x1 << 6;
    for _ in 0..7 {
        i2c_write_bit(i2c, address.raw() & mask != 0);
        mask >>= 1;
    }

    // R/W bit
    i2c_write_bit(i2c, direction == Direction::Read);

    i2c_read_ack(i2c)
}

fn i2c_write_byte<L, D>(i2c: &mut Bus<L, D>, byte: u8) -> bool
where
    L: LineControl,
    D: DelayUs<u32>,
{
    let mut mask = 0x1 << 7;
    for _ in 0..8 {
        i2c_write_bit(i2c, byte & mask != 0);
        mask >>= 1;
    }

    i2c_read_ack(i2c)
}

fn i2c_read_bytes<L, D>(i2c: &mut Bus<L, D>, buffer: &mut [u8])
where
    L: LineControl,
    D: DelayUs<u32>,
{
    let last = buffer.len().saturating_sub(1);

    for (index, place) in buffer.iter_mut().enumerate() {
        let mut byte: u8 = 0;
        let mut mask = 0x1 << 7;
        for _ in 0..8 {
            if i2c_read_bit(i2c) {
                byte |= mask;
            }
            mask >>= 1;
        }
        *place = byte;

        // ACK all but the last byte, a NACK tells the slave to let go of SDA
        i2c_write_bit(i2c, index == last);
    }
}

//-----------------------------------------------------------------------------

impl<L, D> Write for Bus<L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
    type Error = Error;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<()> {
        self.transfer_write(Address::new(address)?, bytes)
            .into_result()
    }
}

impl<L, D> Read for Bus<L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
    type Error = Error;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<()> {
        self.transfer_read(Address::new(address)?, buffer)
            .into_result()
    }
}

impl<L, D> WriteRead for Bus<L, D>
where
    L: LineControl,
    D: DelayUs<u32>,
{
    type Error = Error;

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<()> {
        self.transfer_write_read(Address::new(address)?, bytes, buffer)
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{AckPolicy, BusEvent, Frame, SimSlave, SimulatedGpio};

    use embedded_hal_mock::delay::MockNoop;

    const SCL: PinId = 4;
    const SDA: PinId = 17;

    fn setup(slave: SimSlave) -> (SimulatedGpio, Bus<PinPair<SimulatedGpio>, MockNoop>) {
        let gpio = SimulatedGpio::new(SCL, SDA).with_slave(slave);
        let bus = bus_init(gpio.clone(), SCL, SDA, MockNoop::new()).unwrap();
        (gpio, bus)
    }

    fn address(raw: u8) -> Address {
        Address::new(raw).unwrap()
    }

    fn assert_idle_at_both_ends(gpio: &SimulatedGpio) {
        let trace = gpio.trace();
        let first = trace.first().unwrap();
        let last = trace.last().unwrap();
        assert!(first.scl && first.sda, "bus not idle before: {:?}", first);
        assert!(last.scl && last.sda, "bus not idle after: {:?}", last);
    }

    /// SDA may only move under a high SCL as part of START or STOP.
    fn assert_no_stray_conditions(gpio: &SimulatedGpio, starts: usize, stops: usize) {
        let trace = gpio.trace();
        assert_eq!(trace.starts(), starts);
        assert_eq!(trace.stops(), stops);
    }

    #[test]
    fn test_display_command() {
        let (gpio, mut bus) = setup(SimSlave::new(0x3C));

        let outcome = bus.transfer_write(address(0x3C), &[0x00, 0xAE]);
        assert_eq!(outcome, TransferOutcome::Success);

        let trace = gpio.trace();
        assert_eq!(trace.starts(), 1);
        assert_eq!(trace.stops(), 1);
        assert_eq!(
            trace.frames(),
            vec![
                Frame { byte: 0x78, acked: true },
                Frame { byte: 0x00, acked: true },
                Frame { byte: 0xAE, acked: true },
            ]
        );
        assert_eq!(trace.events().first(), Some(&BusEvent::Start));
        assert_eq!(trace.events().last(), Some(&BusEvent::Stop));
        assert_idle_at_both_ends(&gpio);

        assert_eq!(gpio.slave().unwrap().received(), &[0x00, 0xAE]);
    }

    #[test]
    fn test_clock_count_for_any_payload() {
        for raw in [0x08, 0x3C, 0x50, 0x7F] {
            for len in 0..5usize {
                let (gpio, mut bus) = setup(SimSlave::new(raw));
                let payload: Vec<u8> = (0..len as u8).map(|i| i.wrapping_mul(37)).collect();

                assert!(bus.transfer_write(address(raw), &payload).is_success());

                let trace = gpio.trace();
                assert_eq!(trace.clock_pulses(), 7 + 1 + 8 * len + (len + 1));
                assert_no_stray_conditions(&gpio, 1, 1);
                assert_idle_at_both_ends(&gpio);
            }
        }
    }

    #[test]
    fn test_bit_order() {
        let (gpio, mut bus) = setup(SimSlave::new(0x3C));

        assert!(bus.transfer_write(address(0x3C), &[0b1011_0010]).is_success());

        let bits = gpio.trace().bits();
        // address, R/W, ack
        assert_eq!(
            &bits[..9],
            &[false, true, true, true, true, false, false, false, false]
        );
        assert_eq!(
            &bits[9..17],
            &[true, false, true, true, false, false, true, false]
        );
        // data ack
        assert!(!bits[17]);
        assert_eq!(bits.len(), 18);
    }

    #[test]
    fn test_address_nack() {
        let (gpio, mut bus) = setup(SimSlave::new(0x3C).with_ack(AckPolicy::Never));

        let outcome = bus.transfer_write(address(0x3C), &[0x00, 0xAE]);
        assert_eq!(outcome, TransferOutcome::AddressNacked);

        let trace = gpio.trace();
        let events = trace.events();
        assert_eq!(events.len(), 1 + 9 + 1);
        assert_eq!(events[0], BusEvent::Start);
        assert_eq!(events[9], BusEvent::Bit(true));
        assert_eq!(events[10], BusEvent::Stop);
        assert_idle_at_both_ends(&gpio);

        assert!(gpio.slave().unwrap().received().is_empty());
    }

    #[test]
    fn test_nobody_home() {
        let (gpio, mut bus) = setup(SimSlave::new(0x3C));

        assert_eq!(
            bus.transfer_write(address(0x3D), &[0x01]),
            TransferOutcome::AddressNacked
        );
        assert!(!bus.probe(address(0x3D)));
        assert!(bus.probe(address(0x3C)));
        assert_no_stray_conditions(&gpio, 3, 3);
    }

    #[test]
    fn test_data_nack_stops_transfer() {
        let (gpio, mut bus) = setup(SimSlave::new(0x3C).with_ack(AckPolicy::NackDataByte(1)));

        let outcome = bus.transfer_write(address(0x3C), &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(outcome, TransferOutcome::DataNacked { byte_index: 1 });

        let trace = gpio.trace();
        assert_eq!(
            trace.frames(),
            vec![
                Frame { byte: 0x78, acked: true },
                Frame { byte: 0x11, acked: true },
                Frame { byte: 0x22, acked: false },
            ]
        );
        assert_eq!(trace.clock_pulses(), 27);
        assert_eq!(trace.events().last(), Some(&BusEvent::Stop));
        assert_idle_at_both_ends(&gpio);

        assert_eq!(gpio.slave().unwrap().received(), &[0x11, 0x22]);
    }

    #[test]
    fn test_data_nack_on_first_byte() {
        let (gpio, mut bus) = setup(SimSlave::new(0x3C).with_ack(AckPolicy::NackDataByte(0)));

        assert_eq!(
            bus.transfer_write(address(0x3C), &[0xAA, 0xBB]),
            TransferOutcome::DataNacked { byte_index: 0 }
        );
        assert_eq!(gpio.slave().unwrap().received(), &[0xAA]);
        assert_idle_at_both_ends(&gpio);
    }

    #[test]
    fn test_transfers_are_independent() {
        let (gpio, mut bus) = setup(SimSlave::new(0x3C).with_ack(AckPolicy::NackDataByte(0)));

        assert!(!bus.transfer_write(address(0x3C), &[0x01]).is_success());
        // the slave starts counting data bytes again after START
        assert!(!bus.transfer_write(address(0x3C), &[0x02]).is_success());
        assert!(bus.transfer_write(address(0x3C), &[]).is_success());

        assert_no_stray_conditions(&gpio, 3, 3);
        assert_idle_at_both_ends(&gpio);
    }

    #[test]
    fn test_read() {
        let (gpio, mut bus) = setup(SimSlave::new(0x50).with_read_data(&[0xDE, 0xAD, 0xBE]));

        let mut buffer = [0u8; 3];
        assert!(bus.transfer_read(address(0x50), &mut buffer).is_success());
        assert_eq!(buffer, [0xDE, 0xAD, 0xBE]);

        let frames = gpio.trace().frames();
        assert_eq!(
            frames,
            vec![
                Frame { byte: 0xA1, acked: true },
                Frame { byte: 0xDE, acked: true },
                Frame { byte: 0xAD, acked: true },
                Frame { byte: 0xBE, acked: false },
            ]
        );
        assert_no_stray_conditions(&gpio, 1, 1);
        assert_idle_at_both_ends(&gpio);
    }

    #[test]
    fn test_read_nack() {
        let (gpio, mut bus) = setup(SimSlave::new(0x50));

        let mut buffer = [0x55u8; 2];
        assert_eq!(
            bus.transfer_read(address(0x51), &mut buffer),
            TransferOutcome::AddressNacked
        );
        assert_eq!(buffer, [0x55, 0x55]);
        assert_idle_at_both_ends(&gpio);
    }

    #[test]
    fn test_empty_read_probes_with_write_bit() {
        let (gpio, mut bus) = setup(SimSlave::new(0x50));

        assert!(bus.transfer_read(address(0x50), &mut []).is_success());
        assert_eq!(gpio.slave().unwrap().headers(), &[0xA0]);
    }

    #[test]
    fn test_write_read_repeated_start() {
        let (gpio, mut bus) = setup(SimSlave::new(0x50).with_read_data(&[0x42, 0x43]));

        let mut buffer = [0u8; 2];
        assert!(bus
            .transfer_write_read(address(0x50), &[0x00, 0x10], &mut buffer)
            .is_success());
        assert_eq!(buffer, [0x42, 0x43]);

        assert_no_stray_conditions(&gpio, 2, 1);
        assert_eq!(gpio.slave().unwrap().headers(), &[0xA0, 0xA1]);
        assert_eq!(gpio.slave().unwrap().received(), &[0x00, 0x10]);

        let frames = gpio.trace().frames();
        assert_eq!(frames.len(), 6);
        assert_eq!(frames[3], Frame { byte: 0xA1, acked: true });
        assert_idle_at_both_ends(&gpio);
    }

    #[test]
    fn test_transfer_request() {
        let (gpio, mut bus) = setup(SimSlave::new(0x50).with_read_data(&[0x99]));

        assert!(bus
            .transfer(TransferRequest::write(address(0x50), &[0x07]))
            .is_success());

        let mut buffer = [0u8; 1];
        assert!(bus
            .transfer(TransferRequest::read(address(0x50), &mut buffer))
            .is_success());
        assert_eq!(buffer, [0x99]);
        assert_eq!(gpio.slave().unwrap().headers(), &[0xA0, 0xA1]);
    }

    #[test]
    fn test_clock_stretch_within_window() {
        let gpio = SimulatedGpio::new(SCL, SDA).with_slave(SimSlave::new(0x3C).with_clock_stretch(3));
        let config = BusConfig::new().clock_stretch_polls(8);
        let mut bus = bus_init_with_config(gpio.clone(), SCL, SDA, MockNoop::new(), config).unwrap();

        assert!(bus.transfer_write(address(0x3C), &[0x00, 0xAE]).is_success());

        let trace = gpio.trace();
        assert_eq!(trace.clock_pulses(), 27);
        assert_eq!(trace.frames().len(), 3);
        assert_no_stray_conditions(&gpio, 1, 1);
        assert_idle_at_both_ends(&gpio);
    }

    #[test]
    fn test_stretch_without_polling_loses_bits() {
        let (gpio, mut bus) = setup(SimSlave::new(0x3C).with_clock_stretch(10));

        // the held clock swallows two data bits, the slave's ack lands on
        // the third and the byte ends one short
        assert_eq!(
            bus.transfer_write(address(0x3C), &[0x00, 0xAE]),
            TransferOutcome::DataNacked { byte_index: 0 }
        );

        let trace = gpio.trace();
        assert_eq!(trace.clock_pulses(), 15);
        assert_no_stray_conditions(&gpio, 1, 1);
        assert_idle_at_both_ends(&gpio);
    }

    #[test]
    fn test_stretch_longer_than_window() {
        let gpio = SimulatedGpio::new(SCL, SDA).with_slave(SimSlave::new(0x3C).with_clock_stretch(10));
        let config = BusConfig::new().clock_stretch_polls(2);
        let mut bus = bus_init_with_config(gpio.clone(), SCL, SDA, MockNoop::new(), config).unwrap();

        assert_eq!(
            bus.transfer_write(address(0x3C), &[0x00, 0xAE]),
            TransferOutcome::DataNacked { byte_index: 0 }
        );

        let trace = gpio.trace();
        assert_eq!(trace.clock_pulses(), 16);
        assert_no_stray_conditions(&gpio, 1, 1);
        assert_idle_at_both_ends(&gpio);
    }

    #[test]
    fn test_lines_never_driven_against_slave() {
        let (gpio, mut bus) = setup(SimSlave::new(0x50).with_read_data(&[0x00, 0x0F, 0xF0]));

        assert!(bus.transfer_write(address(0x50), &[0x00, 0xAE, 0xFF]).is_success());

        let mut buffer = [0u8; 3];
        assert!(bus.transfer_read(address(0x50), &mut buffer).is_success());
        assert_eq!(buffer, [0x00, 0x0F, 0xF0]);

        let mut buffer = [0u8; 2];
        assert!(bus
            .transfer_write_read(address(0x50), &[0x10], &mut buffer)
            .is_success());
        assert!(!bus.probe(address(0x51)));

        assert_eq!(gpio.contentions(), 0);
        assert_idle_at_both_ends(&gpio);
    }

    #[test]
    fn test_stretching_slave_is_never_fought() {
        let gpio = SimulatedGpio::new(SCL, SDA).with_slave(SimSlave::new(0x3C).with_clock_stretch(3));
        let config = BusConfig::new().clock_stretch_polls(8);
        let mut bus = bus_init_with_config(gpio.clone(), SCL, SDA, MockNoop::new(), config).unwrap();

        assert!(bus.transfer_write(address(0x3C), &[0x00, 0xAE]).is_success());
        assert_eq!(gpio.contentions(), 0);
    }

    #[test]
    fn test_embedded_hal_traits() {
        let (gpio, mut bus) = setup(SimSlave::new(0x50).with_read_data(&[0x01, 0x02]));

        assert_eq!(Write::write(&mut bus, 0x50, &[0xAA]), Ok(()));
        assert_eq!(Write::write(&mut bus, 0x51, &[0xAA]), Err(Error::AddressNacked));
        assert_eq!(
            Write::write(&mut bus, 0x80, &[0xAA]),
            Err(Error::InvalidAddress(0x80))
        );

        let mut buffer = [0u8; 2];
        assert_eq!(Read::read(&mut bus, 0x50, &mut buffer), Ok(()));
        assert_eq!(buffer, [0x01, 0x02]);

        let mut buffer = [0u8; 1];
        assert_eq!(
            WriteRead::write_read(&mut bus, 0x50, &[0x00], &mut buffer),
            Ok(())
        );
        assert_eq!(buffer, [0x01]);

        // the invalid address never reached the wires
        assert_eq!(gpio.trace().starts(), 5);
    }

    #[test]
    fn test_deinit_releases_pins() {
        let (gpio, bus) = setup(SimSlave::new(0x3C));
        assert!(gpio.is_claimed(SCL));

        let _delay = bus_deinit(bus);
        assert!(!gpio.is_claimed(SCL));
        assert!(!gpio.is_claimed(SDA));

        // pins can be claimed again right away
        let bus = bus_init(gpio.clone(), SCL, SDA, MockNoop::new());
        assert!(bus.is_ok());
    }

    #[test]
    fn test_init_errors_hold_nothing() {
        let gpio = SimulatedGpio::new(SCL, SDA);
        assert_eq!(
            bus_init(gpio.clone(), SCL, 99, MockNoop::new()).err(),
            Some(Error::InvalidPin(99))
        );
        assert!(!gpio.is_claimed(SCL));

        gpio.reserve(SDA, "w1");
        assert!(matches!(
            bus_init(gpio.clone(), SCL, SDA, MockNoop::new()),
            Err(Error::PinBusy(SDA))
        ));
        assert!(!gpio.is_claimed(SCL));
    }

    #[test]
    fn test_open_drain_bus() {
        use crate::pins::OpenDrainPins;
        use embedded_hal_mock::pin::{Mock as PinMock, State, Transaction};

        // probe of an empty bus: START, 8 bits, released SDA reads high, STOP
        let mut sda = vec![Transaction::set(State::High)];
        let mut scl = vec![Transaction::set(State::High)];
        // START
        sda.extend([Transaction::set(State::High), Transaction::set(State::Low)]);
        scl.extend([Transaction::set(State::High), Transaction::set(State::Low)]);
        // 0x3C << 1 | W
        for bit in [0, 1, 1, 1, 1, 0, 0, 0] {
            sda.push(Transaction::set(if bit == 1 { State::High } else { State::Low }));
            scl.extend([Transaction::set(State::High), Transaction::set(State::Low)]);
        }
        // ack clock
        sda.extend([
            Transaction::set(State::High),
            Transaction::set(State::High),
            Transaction::get(State::High),
        ]);
        scl.extend([Transaction::set(State::High), Transaction::set(State::Low)]);
        // STOP
        sda.extend([Transaction::set(State::Low), Transaction::set(State::High)]);
        scl.push(Transaction::set(State::High));

        let lines = OpenDrainPins::new(PinMock::new(&sda), PinMock::new(&scl));
        let mut bus = Bus::new(lines, MockNoop::new());

        assert!(!bus.probe(address(0x3C)));

        let (lines, _) = bus.into_parts();
        let (mut sda, mut scl) = lines.release();
        sda.done();
        scl.done();
    }
}
