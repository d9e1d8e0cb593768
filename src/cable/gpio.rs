//! Bit-banged probe on plain GPIO lines
use embedded_hal::{delay::DelayNs, digital::{InputPin, OutputPin, PinState}};

use crate::cable::Cable;
use crate::error::{Error, Result};

pub struct Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    half_period: u32,
    delay: Delay,
    clock: Clk,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms
}

fn pin_error<E: embedded_hal::digital::Error>(err: E) -> Error {
    Error::transport(format!("GPIO pin error: {:?}", err.kind()))
}

impl<Clk, Tdi, Tdo, Tms, Delay> Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    pub fn new(freq_khz: u32, clock: Clk, tdi: Tdi, tdo: Tdo, tms: Tms, delay: Delay) -> Gpio<Clk, Tdi, Tdo, Tms, Delay> {
        let period_ns = 1_000_000 / freq_khz.max(1);
        let half_period = period_ns / 2;
        Gpio { half_period, clock, tdi, tdo, tms, delay }
    }
}

impl<Clk, Tdi, Tdo, Tms, Delay> Cable for Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    fn enter_jtag_mode(&mut self) -> Result<()> {
        // clock idles low, TMS high keeps the TAP parked in reset
        self.clock.set_low().map_err(pin_error)?;
        self.tms.set_high().map_err(pin_error)?;
        self.tdi.set_low().map_err(pin_error)?;
        Ok(())
    }

    fn transact(&mut self, tms: bool, tdi: bool) -> Result<bool> {
        self.tms.set_state(PinState::from(tms)).map_err(pin_error)?;
        self.tdi.set_state(PinState::from(tdi)).map_err(pin_error)?;
        self.delay.delay_ns(self.half_period);

        // TAP samples TMS/TDI on the rising edge
        self.clock.set_high().map_err(pin_error)?;
        self.delay.delay_ns(self.half_period);

        // and moves TDO on the falling edge
        self.clock.set_low().map_err(pin_error)?;
        self.tdo.is_high().map_err(pin_error)
    }
}
