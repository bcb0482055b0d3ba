use anyhow::{anyhow, bail, Context, Result};
use gpio_software_i2c::{Address, BusConfig, PinId};

pub const DEFAULT_SCL_PIN: PinId = 4;
pub const DEFAULT_SDA_PIN: PinId = 17;

// 5us per transition keeps the clock below 100kHz
pub const DEFAULT_SETTLE_DELAY_US: u32 = 5;
pub const DEFAULT_STRETCH_POLLS: u32 = 0;

pub const DISPLAY_ADDRESS: Address = match Address::new(0x3C) {
    Ok(address) => address,
    Err(_) => panic!("display address does not fit into 7 bits"),
};

// reserved addresses are skipped
pub const SCAN_FIRST_ADDRESS: u8 = 0x08;
pub const SCAN_LAST_ADDRESS: u8 = 0x77;

// sysfs numbering goes past the header pins on newer kernels
pub const SYSFS_GPIO_COUNT: PinId = 1024;

pub const YELLOW_LINE_HEIGTH: u32 = 16;

pub const LOG_PREFIX: &str = "bitbang-oled:";

pub const USAGE: &str = "usage: bitbang-oled [--scl N] [--sda N] [--delay-us N] \
[--stretch-polls N] [--address 0xNN] [--scan] [--simulate]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub scl: PinId,
    pub sda: PinId,
    pub settle_delay_us: u32,
    pub stretch_polls: u32,
    pub address: Address,
    pub scan: bool,
    pub simulate: bool,
    pub help: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scl: DEFAULT_SCL_PIN,
            sda: DEFAULT_SDA_PIN,
            settle_delay_us: DEFAULT_SETTLE_DELAY_US,
            stretch_polls: DEFAULT_STRETCH_POLLS,
            address: DISPLAY_ADDRESS,
            scan: false,
            simulate: false,
            help: false,
        }
    }
}

impl AppConfig {
    /// Parse command line arguments, program name already stripped.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let flag = arg.as_ref();
            match flag {
                "--scan" => config.scan = true,
                "--simulate" => config.simulate = true,
                "-h" | "--help" => config.help = true,
                "--scl" | "--sda" | "--delay-us" | "--stretch-polls" | "--address" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("{} needs a value", flag))?;
                    let value = parse_number(value.as_ref())
                        .with_context(|| format!("bad value for {}", flag))?;

                    match flag {
                        "--scl" => config.scl = value,
                        "--sda" => config.sda = value,
                        "--delay-us" => config.settle_delay_us = value,
                        "--stretch-polls" => config.stretch_polls = value,
                        _ => {
                            let raw = u8::try_from(value)
                                .map_err(|_| anyhow!("address {:#x} is out of range", value))?;
                            config.address = Address::new(raw)?;
                        }
                    }
                }
                other => bail!("unknown argument {:?}\n{}", other, USAGE),
            }
        }

        if config.scl == config.sda {
            bail!("SCL and SDA must be different pins");
        }

        Ok(config)
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig::new()
            .settle_delay_us(self.settle_delay_us)
            .clock_stretch_polls(self.stretch_polls)
    }
}

fn parse_number(s: &str) -> Result<u32> {
    let res = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };
    Ok(res)
}
