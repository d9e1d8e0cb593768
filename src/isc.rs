//! In-system configuration of a single CoolRunner-II on the chain.  `Cpld` wraps a `JtagSM` the
//! way the rest of the crate expects to talk to the part: read its identity, erase it, program
//! a full configuration image, and put it in INTEST for boundary-scan probing.
//!
//! The device has no ready flag on this interface, so every settle time is a fixed wait.
//! Waiting less than the datasheet times gives silently bad results, not an error.
use core::ops::DerefMut;

use embedded_hal::delay::DelayNs;
use tracing::{debug, info};

use crate::cable::Cable;
use crate::error::{Error, Result};
use crate::image::ConfigurationImage;
use crate::profile::DeviceProfile;
use crate::statemachine::JtagSM;

pub const BYPASS: u8 = 0b11111111;
pub const EXTEST: u8 = 0b00000000;
pub const IDCODE: u8 = 0b00000001;
pub const INTEST: u8 = 0b00000010;
pub const SAMPLE: u8 = 0b00000011;
pub const ISC_DISABLE: u8 = 0b11000000;
pub const ISC_ENABLE: u8 = 0b11101000;
pub const ISC_PROGRAM: u8 = 0b11101010;
pub const ISC_ERASE: u8 = 0b11101101;
pub const ISC_READ: u8 = 0b11101110;
pub const ISC_INIT: u8 = 0b11110000;
pub const USERCODE: u8 = 0b11111101;

const ENABLE_SETTLE_MS: u32 = 1;
const ERASE_MS: u32 = 100;
const DISCHARGE_MS: u32 = 1;
const INIT_PULSE_MS: u32 = 1;
const ROW_PROGRAM_MS: u32 = 10;

/// Gray code of a row index; consecutive rows differ in exactly one address bit
pub fn gray(i: u32) -> u32 {
    i ^ (i >> 1)
}

pub fn gray_decode(mut g: u32) -> u32 {
    let mut i = g;
    while g != 0 {
        g >>= 1;
        i ^= g;
    }
    i
}

/// ceil(log2(rows)), the row address width
pub fn address_bits(rows: usize) -> usize {
    if rows <= 1 {
        0
    } else {
        (usize::BITS - (rows - 1).leading_zeros()) as usize
    }
}

/// `width` bits of `value`, LSB first
pub fn num2arr(value: u32, width: usize) -> Vec<bool> {
    (0..width).map(|i| (value >> i) & 1 != 0).collect()
}

/// Bits LSB first into an integer
pub fn arr2num(bits: &[bool]) -> u32 {
    bits.iter()
        .enumerate()
        .fold(0, |acc, (i, &b)| acc | ((b as u32) << i))
}

/// `std::thread::sleep` behind the embedded-hal delay trait
#[derive(Clone, Copy, Debug, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(ns as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(ms as u64));
    }
}

pub struct Cpld<T, D> {
    pub sm: JtagSM<T>,
    pub delay: D,
    rows: usize,
    width: usize,
}

impl<T, U, D> Cpld<T, D>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized,
          D: DelayNs
{
    /// Drive the part described by `profile` through an already-open state machine
    pub fn new(sm: JtagSM<T>, delay: D, profile: &DeviceProfile) -> Self {
        Self {
            sm,
            delay,
            rows: profile.image_rows,
            width: profile.image_width,
        }
    }

    /// Shift an instruction from Run-Test/Idle; leaves the TAP in Exit1-IR
    fn shift_instruction(&mut self, opcode: u8) -> Result<()> {
        self.sm.shift_ir_from_rti()?;
        self.sm.shift(&num2arr(opcode as u32, 8), true)?;
        Ok(())
    }

    fn instruction_then_idle(&mut self, opcode: u8, settle_ms: u32) -> Result<()> {
        self.shift_instruction(opcode)?;
        self.sm.rti_from_exit1()?;
        if settle_ms > 0 {
            self.delay.delay_ms(settle_ms);
        }
        Ok(())
    }

    // 32-bit data register from Shift-DR, ending in Test-Logic-Reset
    fn read_word(&mut self) -> Result<u32> {
        let bits = self.sm.shift(&[false; 32], true)?;
        self.sm.reset()?;
        Ok(arr2num(&bits))
    }

    /// IDCODE is selected by Test-Logic-Reset, so no instruction shift is needed
    pub fn idcode(&mut self) -> Result<u32> {
        self.sm.reset()?;
        self.sm.rti_from_tlr()?;
        self.sm.shift_dr_from_rti()?;
        self.read_word()
    }

    pub fn usercode(&mut self) -> Result<u32> {
        self.sm.reset()?;
        self.sm.rti_from_tlr()?;
        self.shift_instruction(USERCODE)?;
        self.sm.shift_dr_from_exit1()?;
        self.read_word()
    }

    /// Read IDCODE and fail unless it matches `expected` under `mask`
    pub fn verify_idcode(&mut self, expected: u32, mask: u32) -> Result<u32> {
        let actual = self.idcode()?;
        if actual & mask != expected & mask {
            return Err(Error::IdcodeMismatch { expected, mask, actual });
        }
        info!("IDCODE {actual:#010x}");
        Ok(actual)
    }

    fn discharge(&mut self) -> Result<()> {
        self.instruction_then_idle(ISC_INIT, DISCHARGE_MS)
    }

    fn init_pulse(&mut self) -> Result<()> {
        self.shift_instruction(ISC_INIT)?;
        self.sm.init_pulse_from_exit1()?;
        self.delay.delay_ms(INIT_PULSE_MS);
        Ok(())
    }

    // Common tail of erase and program: load the array, leave ISC mode, park in reset
    fn finish(&mut self) -> Result<()> {
        self.discharge()?;
        self.init_pulse()?;
        self.instruction_then_idle(ISC_DISABLE, 0)?;
        self.shift_instruction(BYPASS)?;
        self.sm.reset()
    }

    /// Bulk erase.  The erase time is fixed by the device and not polled.
    pub fn erase(&mut self) -> Result<()> {
        debug!("erasing");
        self.sm.reset()?;
        self.sm.rti_from_tlr()?;
        self.instruction_then_idle(ISC_ENABLE, ENABLE_SETTLE_MS)?;
        self.instruction_then_idle(ISC_ERASE, ERASE_MS)?;
        self.finish()
    }

    /// Program every row of `image`.  Each row is shifted reversed, followed by its Gray-coded
    /// address, reversed, which selects the row in the device's address latch.  The image is
    /// checked against the device geometry before anything is clocked.
    pub fn program(&mut self, image: &ConfigurationImage) -> Result<()> {
        image.check_geometry(self.rows, self.width)?;
        let addr_bits = address_bits(self.rows);
        debug!("programming {} rows of {} fuses", self.rows, self.width);

        self.sm.reset()?;
        self.sm.rti_from_tlr()?;
        self.instruction_then_idle(ISC_ENABLE, ENABLE_SETTLE_MS)?;
        self.shift_instruction(ISC_PROGRAM)?;
        self.sm.shift_dr_from_exit1()?;

        let last = image.row_count().saturating_sub(1);
        for (i, row) in image.rows().iter().enumerate() {
            // In Shift-DR
            let row_bits: Vec<bool> = row.iter().rev().copied().collect();
            self.sm.shift(&row_bits, false)?;
            let mut addr = num2arr(gray(i as u32), addr_bits);
            addr.reverse();
            self.sm.shift(&addr, true)?;
            self.sm.rti_from_exit1()?;
            self.delay.delay_ms(ROW_PROGRAM_MS);
            if i != last {
                self.sm.shift_dr_from_rti()?;
            }
        }

        // In Run-Test/Idle
        self.finish()
    }

    /// Load INTEST from Test-Logic-Reset; leaves the TAP in Exit1-IR, ready for
    /// `shift_dr_from_exit1`
    pub fn enter_intest(&mut self) -> Result<()> {
        self.sm.rti_from_tlr()?;
        self.shift_instruction(INTEST)
    }
}
