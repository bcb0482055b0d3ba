use std::io::Write as _;

/// Part of the program a record comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    App,
    Gpio,
    Bus,
    Display,
    Sim,
}

impl Channel {
    fn tag(self) -> &'static str {
        match self {
            Channel::App => "app",
            Channel::Gpio => "gpio",
            Channel::Bus => "i2c",
            Channel::Display => "oled",
            Channel::Sim => "sim",
        }
    }
}

/// Writes one line per record: `<prefix> [<channel>] <text>`.
pub struct Logger<T: core::fmt::Write> {
    prefix: &'static str,
    output: T,
    records: usize,
}

impl<T: core::fmt::Write> Logger<T> {
    pub fn new(prefix: &'static str, output: T) -> Self {
        Self {
            prefix,
            output,
            records: 0,
        }
    }

    /// Every write through the returned writer is a record of its own.
    pub fn channel(&mut self, channel: Channel) -> ChannelWriter<'_, T> {
        ChannelWriter {
            logger: self,
            channel,
        }
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn into_output(self) -> T {
        self.output
    }

    fn begin(&mut self, channel: Channel) -> core::fmt::Result {
        self.records += 1;
        write!(self.output, "{} [{}] ", self.prefix, channel.tag())
    }
}

pub struct ChannelWriter<'a, T: core::fmt::Write> {
    logger: &'a mut Logger<T>,
    channel: Channel,
}

impl<'a, T: core::fmt::Write> core::fmt::Write for ChannelWriter<'a, T> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.logger.begin(self.channel)?;
        self.logger.output.write_str(s)?;
        self.logger.output.write_char('\n')
    }

    fn write_char(&mut self, c: char) -> core::fmt::Result {
        self.logger.begin(self.channel)?;
        self.logger.output.write_char(c)?;
        self.logger.output.write_char('\n')
    }

    fn write_fmt(&mut self, args: core::fmt::Arguments<'_>) -> core::fmt::Result {
        self.logger.begin(self.channel)?;
        self.logger.output.write_fmt(args)?;
        self.logger.output.write_char('\n')
    }
}

/// Process stdout as a `core::fmt::Write` sink.
pub struct Stdout;

impl core::fmt::Write for Stdout {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        std::io::stdout()
            .write_all(s.as_bytes())
            .map_err(|_| core::fmt::Error)
    }
}
