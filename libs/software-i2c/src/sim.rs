//! Simulated gpio chip with an i2c slave wired to two of its lines.
//!
//! The wires are modelled open-drain: a line is low when either the master
//! or the slave pulls it low, otherwise the pull-up keeps it high. Every
//! change of the wire levels is appended to a [`Trace`], one wire at a time,
//! the way a logic analyzer would capture it.
//!
//! A master pin driven high is a push-pull output. If the slave pulls the
//! same wire low at that moment the clash is counted as a contention (the
//! wire still reads low), see [`SimulatedGpio::contentions`].

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use embedded_hal::digital::v2::PinState;

use crate::pins::{GpioController, GpioError, PinId};

/// Lines 0..=27, the gpio header of a Raspberry Pi.
pub const DEFAULT_PIN_COUNT: PinId = 28;

/// Wire levels, `true` is high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub scl: bool,
    pub sda: bool,
}

/// Bus condition decoded from consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Start,
    /// SDA level at a rising SCL edge.
    Bit(bool),
    Stop,
}

/// Eight bits plus the acknowledge clock that follows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub byte: u8,
    pub acked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Trace {
    samples: Vec<Sample>,
}

impl Trace {
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn first(&self) -> Option<Sample> {
        self.samples.first().copied()
    }

    pub fn last(&self) -> Option<Sample> {
        self.samples.last().copied()
    }

    /// Decode the samples. A clock pulse only counts as a bit when SDA
    /// stays put while SCL is high, otherwise it carries START or STOP.
    pub fn events(&self) -> Vec<BusEvent> {
        let mut events = Vec::new();
        let mut pending = None;

        for pair in self.samples.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if !prev.scl && next.scl {
                pending = Some(next.sda);
            } else if prev.scl && !next.scl {
                if let Some(bit) = pending.take() {
                    events.push(BusEvent::Bit(bit));
                }
            } else if prev.scl && next.scl && prev.sda != next.sda {
                pending = None;
                events.push(if next.sda {
                    BusEvent::Stop
                } else {
                    BusEvent::Start
                });
            }
        }

        events
    }

    pub fn starts(&self) -> usize {
        self.count(|e| e == BusEvent::Start)
    }

    pub fn stops(&self) -> usize {
        self.count(|e| e == BusEvent::Stop)
    }

    /// Number of SCL pulses, acknowledge clocks included.
    pub fn clock_pulses(&self) -> usize {
        self.count(|e| matches!(e, BusEvent::Bit(_)))
    }

    pub fn bits(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BusEvent::Bit(bit) => Some(bit),
                _ => None,
            })
            .collect()
    }

    /// Group the bits after each START into 9-bit frames. A frame cut short
    /// by START or STOP is dropped.
    pub fn frames(&self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut bits: Vec<bool> = Vec::with_capacity(9);

        for event in self.events() {
            match event {
                BusEvent::Start | BusEvent::Stop => bits.clear(),
                BusEvent::Bit(bit) => {
                    bits.push(bit);
                    if bits.len() == 9 {
                        let byte = bits[..8]
                            .iter()
                            .fold(0u8, |byte, &bit| (byte << 1) | bit as u8);
                        frames.push(Frame {
                            byte,
                            acked: !bits[8],
                        });
                        bits.clear();
                    }
                }
            }
        }

        frames
    }

    fn count(&self, f: impl Fn(BusEvent) -> bool) -> usize {
        self.events().into_iter().filter(|&e| f(e)).count()
    }
}

/// When the simulated slave acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    Always,
    Never,
    /// Acknowledge the address and every data byte except this one.
    NackDataByte(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterAck {
    Receive,
    Transmit,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlaveState {
    Idle,
    Receive { byte: u8, count: u8, header: bool },
    /// Eighth bit seen, the acknowledge goes out at the next falling edge.
    AckPending { acked: bool, then: AfterAck },
    Ack { then: AfterAck, stretched: bool },
    /// Bit `bit` of read byte `index` is on SDA.
    Transmit { index: usize, bit: u8 },
    MasterAck { index: usize },
    MasterAcked { index: usize },
    /// Not addressed or refused, wait for the next START.
    Ignore,
}

/// Slave device behind the simulated wires.
#[derive(Debug, Clone)]
pub struct SimSlave {
    address: u8,
    ack: AckPolicy,
    read_data: Vec<u8>,
    stretch_ops: u32,
    state: SlaveState,
    data_index: usize,
    sda_low: bool,
    scl_low: bool,
    stretch_left: u32,
    headers: Vec<u8>,
    received: Vec<u8>,
}

impl SimSlave {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            ack: AckPolicy::Always,
            read_data: Vec::new(),
            stretch_ops: 0,
            state: SlaveState::Idle,
            data_index: 0,
            sda_low: false,
            scl_low: false,
            stretch_left: 0,
            headers: Vec::new(),
            received: Vec::new(),
        }
    }

    pub fn with_ack(mut self, ack: AckPolicy) -> Self {
        self.ack = ack;
        self
    }

    /// Bytes served to read transfers, repeated when the master reads more.
    pub fn with_read_data(mut self, data: &[u8]) -> Self {
        self.read_data = data.to_vec();
        self
    }

    /// Hold SCL low during each acknowledge clock for `ops` controller calls.
    pub fn with_clock_stretch(mut self, ops: u32) -> Self {
        self.stretch_ops = ops;
        self
    }

    /// Address bytes (address and R/W bit) seen after each START.
    pub fn headers(&self) -> &[u8] {
        &self.headers
    }

    /// Data bytes written by the master, refused ones included.
    pub fn received(&self) -> &[u8] {
        &self.received
    }

    fn observe(&mut self, prev: Sample, next: Sample) {
        if !prev.scl && next.scl {
            self.clock_rise(next.sda);
        } else if prev.scl && !next.scl {
            self.clock_fall();
        } else if prev.scl && next.scl && prev.sda != next.sda {
            self.sda_low = false;
            self.state = if next.sda {
                SlaveState::Idle
            } else {
                self.data_index = 0;
                SlaveState::Receive {
                    byte: 0,
                    count: 0,
                    header: true,
                }
            };
        }
    }

    fn clock_rise(&mut self, sda: bool) {
        match self.state {
            SlaveState::Receive {
                byte,
                count,
                header,
            } => {
                let byte = (byte << 1) | sda as u8;
                let count = count + 1;
                self.state = if count < 8 {
                    SlaveState::Receive {
                        byte,
                        count,
                        header,
                    }
                } else if header {
                    self.on_header(byte)
                } else {
                    self.on_data(byte)
                };
            }
            SlaveState::MasterAck { index } => {
                self.state = if sda {
                    SlaveState::Ignore
                } else {
                    SlaveState::MasterAcked { index }
                };
            }
            _ => {}
        }
    }

    fn clock_fall(&mut self) {
        match self.state {
            SlaveState::AckPending { acked, then } => {
                self.sda_low = acked;
                self.state = SlaveState::Ack {
                    then,
                    stretched: false,
                };
            }
            SlaveState::Ack { then, .. } => {
                self.sda_low = false;
                self.state = match then {
                    AfterAck::Receive => SlaveState::Receive {
                        byte: 0,
                        count: 0,
                        header: false,
                    },
                    AfterAck::Transmit => self.present(0, 7),
                    AfterAck::Ignore => SlaveState::Ignore,
                };
            }
            SlaveState::Transmit { index, bit } => {
                self.state = if bit == 0 {
                    self.sda_low = false;
                    SlaveState::MasterAck { index }
                } else {
                    self.present(index, bit - 1)
                };
            }
            SlaveState::MasterAcked { index } => {
                self.state = self.present(index + 1, 7);
            }
            _ => {}
        }
    }

    fn on_header(&mut self, header: u8) -> SlaveState {
        self.headers.push(header);
        let acked = header >> 1 == self.address && self.ack != AckPolicy::Never;
        let then = match (acked, header & 1) {
            (false, _) => AfterAck::Ignore,
            (true, 0) => AfterAck::Receive,
            _ => AfterAck::Transmit,
        };
        SlaveState::AckPending { acked, then }
    }

    fn on_data(&mut self, byte: u8) -> SlaveState {
        self.received.push(byte);
        let index = self.data_index;
        self.data_index += 1;

        let acked = match self.ack {
            AckPolicy::Always => true,
            AckPolicy::Never => false,
            AckPolicy::NackDataByte(refused) => index != refused,
        };
        SlaveState::AckPending {
            acked,
            then: if acked {
                AfterAck::Receive
            } else {
                AfterAck::Ignore
            },
        }
    }

    fn present(&mut self, index: usize, bit: u8) -> SlaveState {
        let byte = if self.read_data.is_empty() {
            0xFF
        } else {
            self.read_data[index % self.read_data.len()]
        };
        self.sda_low = byte & (1 << bit) == 0;
        SlaveState::Transmit { index, bit }
    }

    /// Master let go of SCL while we are acknowledging: keep it down.
    fn hold_clock(&mut self) {
        if let SlaveState::Ack {
            then,
            stretched: false,
        } = self.state
        {
            if self.stretch_ops > 0 {
                self.scl_low = true;
                self.stretch_left = self.stretch_ops;
                self.state = SlaveState::Ack {
                    then,
                    stretched: true,
                };
            }
        }
    }

    fn tick(&mut self) {
        if self.stretch_left > 0 {
            self.stretch_left -= 1;
            if self.stretch_left == 0 {
                self.scl_low = false;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinMode {
    Output(bool),
    Input,
}

#[derive(Debug)]
struct SimState {
    pin_count: PinId,
    scl_pin: PinId,
    sda_pin: PinId,
    claimed: BTreeMap<PinId, &'static str>,
    denied: BTreeSet<PinId>,
    modes: BTreeMap<PinId, PinMode>,
    contentions: usize,
    slave: Option<SimSlave>,
    levels: Sample,
    trace: Trace,
}

impl SimState {
    /// Level the master puts on `pin`, high when released.
    fn master_level(&self, pin: PinId) -> bool {
        match self.modes.get(&pin) {
            Some(PinMode::Output(level)) => *level,
            _ => true,
        }
    }

    fn driven_high(&self, pin: PinId) -> bool {
        self.modes.get(&pin) == Some(&PinMode::Output(true))
    }

    /// Master drives a wire high while the slave pulls it low.
    fn contended(&self) -> bool {
        self.slave.as_ref().map_or(false, |s| {
            (s.scl_low && self.driven_high(self.scl_pin))
                || (s.sda_low && self.driven_high(self.sda_pin))
        })
    }

    fn wire_levels(&self) -> Sample {
        let (slave_scl_low, slave_sda_low) = self
            .slave
            .as_ref()
            .map_or((false, false), |s| (s.scl_low, s.sda_low));
        Sample {
            scl: self.master_level(self.scl_pin) && !slave_scl_low,
            sda: self.master_level(self.sda_pin) && !slave_sda_low,
        }
    }

    fn tick(&mut self) {
        if let Some(slave) = self.slave.as_mut() {
            slave.tick();
        }
    }

    fn propagate(&mut self) {
        loop {
            if self.master_level(self.scl_pin) && !self.levels.scl {
                if let Some(slave) = self.slave.as_mut() {
                    slave.hold_clock();
                }
            }

            let target = self.wire_levels();
            let prev = self.levels;
            if target == prev {
                break;
            }

            // one wire per sample, clock first
            let next = if target.scl != prev.scl {
                Sample {
                    scl: target.scl,
                    ..prev
                }
            } else {
                target
            };
            self.levels = next;
            self.trace.samples.push(next);

            if let Some(slave) = self.slave.as_mut() {
                slave.observe(prev, next);
            }
        }

        if self.contended() {
            self.contentions += 1;
        }
    }
}

/// Cloneable handle to the simulated chip; clones share the same wires.
#[derive(Debug, Clone)]
pub struct SimulatedGpio {
    inner: Rc<RefCell<SimState>>,
}

impl SimulatedGpio {
    /// Chip with [`DEFAULT_PIN_COUNT`] lines, the bus wired to `scl_pin`
    /// and `sda_pin`, and nothing listening on it yet.
    pub fn new(scl_pin: PinId, sda_pin: PinId) -> Self {
        let idle = Sample {
            scl: true,
            sda: true,
        };
        Self {
            inner: Rc::new(RefCell::new(SimState {
                pin_count: DEFAULT_PIN_COUNT,
                scl_pin,
                sda_pin,
                claimed: BTreeMap::new(),
                denied: BTreeSet::new(),
                modes: BTreeMap::new(),
                contentions: 0,
                slave: None,
                levels: idle,
                trace: Trace {
                    samples: vec![idle],
                },
            })),
        }
    }

    pub fn with_pin_count(self, pin_count: PinId) -> Self {
        self.inner.borrow_mut().pin_count = pin_count;
        self
    }

    pub fn with_slave(self, slave: SimSlave) -> Self {
        self.inner.borrow_mut().slave = Some(slave);
        self
    }

    /// Claim `pin` on behalf of some other driver.
    pub fn reserve(&self, pin: PinId, label: &'static str) {
        self.inner.borrow_mut().claimed.insert(pin, label);
    }

    /// Make every request of `pin` fail as if the driver refused it.
    pub fn deny(&self, pin: PinId) {
        self.inner.borrow_mut().denied.insert(pin);
    }

    /// Level `pin` is driven to, `None` while it is an input.
    pub fn driven_level(&self, pin: PinId) -> Option<bool> {
        match self.inner.borrow().modes.get(&pin) {
            Some(PinMode::Output(level)) => Some(*level),
            _ => None,
        }
    }

    /// Controller calls that left the master driving a wire high against
    /// the slave pulling it low.
    pub fn contentions(&self) -> usize {
        self.inner.borrow().contentions
    }

    pub fn is_claimed(&self, pin: PinId) -> bool {
        self.inner.borrow().claimed.contains_key(&pin)
    }

    pub fn trace(&self) -> Trace {
        self.inner.borrow().trace.clone()
    }

    /// Forget the captured samples, keeping the current levels as the
    /// first one.
    pub fn clear_trace(&self) {
        let mut state = self.inner.borrow_mut();
        let levels = state.levels;
        state.trace.samples.clear();
        state.trace.samples.push(levels);
    }

    pub fn slave(&self) -> Option<SimSlave> {
        self.inner.borrow().slave.clone()
    }
}

impl GpioController for SimulatedGpio {
    fn is_valid(&self, pin: PinId) -> bool {
        pin < self.inner.borrow().pin_count
    }

    fn request(&mut self, pin: PinId, label: &'static str) -> Result<(), GpioError> {
        let mut state = self.inner.borrow_mut();
        if pin >= state.pin_count {
            return Err(GpioError::InvalidPin);
        }
        if state.claimed.contains_key(&pin) {
            return Err(GpioError::PinBusy);
        }
        if state.denied.contains(&pin) {
            return Err(GpioError::Unavailable);
        }
        state.claimed.insert(pin, label);
        Ok(())
    }

    fn free(&mut self, pin: PinId) {
        let mut state = self.inner.borrow_mut();
        state.tick();
        state.claimed.remove(&pin);
        state.modes.remove(&pin);
        state.propagate();
    }

    fn direction_output(&mut self, pin: PinId, level: PinState) {
        let mut state = self.inner.borrow_mut();
        state.tick();
        state
            .modes
            .insert(pin, PinMode::Output(level == PinState::High));
        state.propagate();
    }

    fn direction_input(&mut self, pin: PinId) {
        let mut state = self.inner.borrow_mut();
        state.tick();
        state.modes.insert(pin, PinMode::Input);
        state.propagate();
    }

    fn get_value(&mut self, pin: PinId) -> PinState {
        let mut state = self.inner.borrow_mut();
        state.tick();
        state.propagate();

        let high = if pin == state.scl_pin {
            state.levels.scl
        } else if pin == state.sda_pin {
            state.levels.sda
        } else {
            state.master_level(pin)
        };
        if high {
            PinState::High
        } else {
            PinState::Low
        }
    }
}
