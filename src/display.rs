use core::fmt::Write;

use anyhow::{anyhow, Result};
use arrayvec::ArrayString;
use display_interface::{DisplayError, WriteOnlyDataCommand};
use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{self, MonoTextStyle, MonoTextStyleBuilder},
    pixelcolor::BinaryColor,
    prelude::{Point, Size},
    primitives::{Primitive, PrimitiveStyle, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
    Drawable,
};
use gpio_software_i2c::Address;
use ssd1306::{mode::BufferedGraphicsMode, prelude::DisplayConfig, Ssd1306};

use crate::config::{AppConfig, YELLOW_LINE_HEIGTH};

const LINE_H: i32 = 12;

pub struct Display<'a, DI> {
    disp: Ssd1306<
        DI,
        ssd1306::size::DisplaySize128x64,
        BufferedGraphicsMode<ssd1306::size::DisplaySize128x64>,
    >,
    title_font: MonoTextStyle<'a, BinaryColor>,
    small_font: MonoTextStyle<'a, BinaryColor>,
}

impl<'a, DI> Display<'a, DI>
where
    DI: WriteOnlyDataCommand,
{
    pub fn new(interface: DI) -> Self {
        Self {
            disp: ssd1306::Ssd1306::new(
                interface,
                ssd1306::size::DisplaySize128x64,
                ssd1306::rotation::DisplayRotation::Rotate0,
            )
            .into_buffered_graphics_mode(),
            title_font: MonoTextStyleBuilder::new()
                .font(&mono_font::ascii::FONT_7X13_BOLD)
                .text_color(BinaryColor::On)
                .build(),
            small_font: MonoTextStyleBuilder::new()
                .font(&mono_font::ascii::FONT_6X10)
                .text_color(BinaryColor::On)
                .build(),
        }
    }

    /// Runs the controller init sequence, the first command is display off.
    pub fn init(&mut self) -> Result<()> {
        self.disp.init().map_err(display_error)
    }

    /// Title bar, bus settings and the addresses found by a scan.
    pub fn draw_splash(&mut self, config: &AppConfig, found: &[Address]) -> Result<()> {
        DrawTarget::clear(&mut self.disp, BinaryColor::Off).map_err(display_error)?;

        self.draw_title().map_err(display_error)?;

        let mut buf: ArrayString<32> = ArrayString::new();
        write!(buf, "SCL {} SDA {}", config.scl, config.sda)?;
        self.draw_line(&buf, 0).map_err(display_error)?;

        buf.clear();
        write!(buf, "settle {}us", config.settle_delay_us)?;
        self.draw_line(&buf, 1).map_err(display_error)?;

        buf.clear();
        if found.is_empty() {
            write!(buf, "oled at {}", config.address)?;
        } else {
            write!(buf, "found")?;
            for address in found.iter().take(3) {
                write!(buf, " {}", address)?;
            }
        }
        self.draw_line(&buf, 2).map_err(display_error)?;

        self.disp.flush().map_err(display_error)
    }

    fn draw_title(&mut self) -> Result<(), DisplayError> {
        let max_wigth = self.disp.dimensions().0 as u32;

        Rectangle::new(Point::zero(), Size::new(max_wigth, YELLOW_LINE_HEIGTH))
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(&mut self.disp)?;

        Text::with_text_style(
            "bitbang i2c",
            Point::new(max_wigth as i32 / 2, 2),
            MonoTextStyleBuilder::from(&self.title_font)
                .background_color(BinaryColor::On)
                .text_color(BinaryColor::Off)
                .build(),
            TextStyleBuilder::new()
                .alignment(Alignment::Center)
                .baseline(Baseline::Top)
                .build(),
        )
        .draw(&mut self.disp)?;

        Ok(())
    }

    fn draw_line(&mut self, text: &str, row: i32) -> Result<(), DisplayError> {
        Text::with_baseline(
            text,
            Point::new(0, YELLOW_LINE_HEIGTH as i32 + 2 + row * LINE_H),
            self.small_font,
            Baseline::Top,
        )
        .draw(&mut self.disp)?;

        Ok(())
    }
}

// DisplayError is not a std error
fn display_error(e: DisplayError) -> anyhow::Error {
    anyhow!("display error: {:?}", e)
}
