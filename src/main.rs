use core::fmt::Write;

use anyhow::{Context, Result};
use arrayvec::ArrayVec;
use display_interface_i2c::I2CInterface;
use gpio_software_i2c::{
    bus_deinit, bus_init_with_config,
    sim::{SimSlave, SimulatedGpio},
    Address, GpioController, SharedBus,
};

mod config;
mod delay;
mod display;
mod logger;
mod sysfs_gpio;

use config::{
    AppConfig, LOG_PREFIX, SCAN_FIRST_ADDRESS, SCAN_LAST_ADDRESS, SYSFS_GPIO_COUNT, USAGE,
};
use delay::SpinDelay;
use display::Display;
use logger::{Channel, Logger, Stdout};

const SCAN_CAPACITY: usize = (SCAN_LAST_ADDRESS - SCAN_FIRST_ADDRESS + 1) as usize;

fn main() -> Result<()> {
    let config = AppConfig::from_args(std::env::args().skip(1))?;
    let mut log = Logger::new(LOG_PREFIX, Stdout);

    if config.help {
        println!("{}", USAGE);
        return Ok(());
    }

    write!(
        log.channel(Channel::App),
        "Startup! SCL={} SDA={}",
        config.scl,
        config.sda
    )?;

    if config.simulate {
        let gpio = SimulatedGpio::new(config.scl, config.sda)
            .with_slave(SimSlave::new(config.address.raw()));

        run(gpio.clone(), &config, &mut log)?;

        let trace = gpio.trace();
        write!(
            log.channel(Channel::Sim),
            "trace: {} samples, {} START, {} STOP, {} clock pulses, {} bytes, {} contentions",
            trace.samples().len(),
            trace.starts(),
            trace.stops(),
            trace.clock_pulses(),
            trace.frames().len(),
            gpio.contentions()
        )?;
    } else {
        let gpio = sysfs_gpio::SysfsGpio::new(SYSFS_GPIO_COUNT, Logger::new(LOG_PREFIX, Stdout));
        run(gpio, &config, &mut log)?;
    }

    Ok(())
}

fn run<G, W>(gpio: G, config: &AppConfig, log: &mut Logger<W>) -> Result<()>
where
    G: GpioController,
    W: core::fmt::Write,
{
    let bus = bus_init_with_config(
        gpio,
        config.scl,
        config.sda,
        SpinDelay,
        config.bus_config(),
    )
    .with_context(|| format!("failed to acquire SCL={} SDA={}", config.scl, config.sda))?;

    let bus = SharedBus::from(bus);

    {
        let mut found: ArrayVec<Address, SCAN_CAPACITY> = ArrayVec::new();
        if config.scan {
            let scanner = bus.make_accessor();
            for raw in SCAN_FIRST_ADDRESS..=SCAN_LAST_ADDRESS {
                let address = Address::new(raw)?;
                if scanner.probe(address) {
                    write!(log.channel(Channel::Bus), "device at {}", address)?;
                    found.push(address);
                }
            }
            write!(
                log.channel(Channel::Bus),
                "scan done, {} device(s)",
                found.len()
            )?;
        }

        write!(log.channel(Channel::Display), "Display init...")?;
        let mut display = Display::new(I2CInterface::new(
            bus.make_accessor(),
            config.address.raw(),
            0x40,
        ));
        display
            .init()
            .with_context(|| format!("no display at {}", config.address))?;

        display.draw_splash(config, &found)?;
        write!(log.channel(Channel::Display), "Display draw...")?;
    }

    bus_deinit(bus.into_inner());

    Ok(())
}
