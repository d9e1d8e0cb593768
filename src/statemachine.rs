//! This provides a higher-level interface than the `Cable` trait.  It tracks the state of the
//! TAP on every clock and offers the fixed navigation sequences the configuration protocol is
//! built from, plus the pipelined shift primitive.
//!
//! The probe's TDO lags TDI by one TCK: the bit returned by a clock is the register bit that
//! will be shifted out by the *next* clock.  `JtagSM` keeps that bit in `last_bit`, seeded by
//! every navigation that lands in Shift-DR or Shift-IR.
use core::ops::DerefMut;

use crate::cable::Cable;
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

use JtagState::*;

// Indexed by state; [TMS=0, TMS=1]
const EDGES: [[JtagState; 2]; 16] = [
    /* Reset     */ [Idle, Reset],
    /* Idle      */ [Idle, SelectDR],
    /* SelectDR  */ [CaptureDR, SelectIR],
    /* CaptureDR */ [ShiftDR, Exit1DR],
    /* ShiftDR   */ [ShiftDR, Exit1DR],
    /* Exit1DR   */ [PauseDR, UpdateDR],
    /* PauseDR   */ [PauseDR, Exit2DR],
    /* Exit2DR   */ [ShiftDR, UpdateDR],
    /* UpdateDR  */ [Idle, SelectDR],
    /* SelectIR  */ [CaptureIR, Reset],
    /* CaptureIR */ [ShiftIR, Exit1IR],
    /* ShiftIR   */ [ShiftIR, Exit1IR],
    /* Exit1IR   */ [PauseIR, UpdateIR],
    /* PauseIR   */ [PauseIR, Exit2IR],
    /* Exit2IR   */ [ShiftIR, UpdateIR],
    /* UpdateIR  */ [Idle, SelectDR],
];

impl JtagState {
    /// State reached after one TCK with the given TMS
    pub fn next(self, tms: bool) -> JtagState {
        EDGES[self as usize][tms as usize]
    }
}

pub struct JtagSM<T> {
    pub cable: T,
    state: JtagState,
    last_bit: bool,
}

impl<T, U> JtagSM<T>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Put `cable` into JTAG mode and reset the TAP
    pub fn new(mut cable: T) -> Result<Self> {
        cable.enter_jtag_mode()?;
        let mut sm = Self {
            cable,
            state: JtagState::Reset,
            last_bit: false,
        };
        sm.reset()?;
        Ok(sm)
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    /// The captured bit that the next `shift` will emit first
    pub fn last_bit(&self) -> bool {
        self.last_bit
    }

    /// Clock the TAP once.  This is the only path to the cable.
    pub fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool> {
        let tdo = self.cable.transact(tms, tdi)?;
        self.state = self.state.next(tms);
        Ok(tdo)
    }

    // TDI is held low during mode changes; returns the TDO of the last clock
    fn change_mode(&mut self, tms: &[u8]) -> Result<bool> {
        let mut tdo = false;
        for &x in tms {
            tdo = self.clock(x != 0, false)?;
        }
        Ok(tdo)
    }

    /// Reset the TAP by driving TMS high for 5 clocks
    pub fn reset(&mut self) -> Result<()> {
        self.change_mode(&[1, 1, 1, 1, 1])?;
        debug_assert_eq!(self.state, Reset);
        Ok(())
    }

    pub fn rti_from_tlr(&mut self) -> Result<()> {
        debug_assert_eq!(self.state, Reset);
        self.change_mode(&[0])?;
        Ok(())
    }

    /// Select-DR, Capture-DR, Shift-DR.  The captured first bit is latched.
    pub fn shift_dr_from_rti(&mut self) -> Result<()> {
        debug_assert_eq!(self.state, Idle);
        self.last_bit = self.change_mode(&[1, 0, 0])?;
        debug_assert_eq!(self.state, ShiftDR);
        Ok(())
    }

    /// Select-DR, Select-IR, Capture-IR, Shift-IR.  The captured first bit is latched.
    pub fn shift_ir_from_rti(&mut self) -> Result<()> {
        debug_assert_eq!(self.state, Idle);
        self.last_bit = self.change_mode(&[1, 1, 0, 0])?;
        debug_assert_eq!(self.state, ShiftIR);
        Ok(())
    }

    /// Update, then straight back into Shift-DR without passing through Run-Test/Idle.  Works
    /// from Exit1-DR and Exit1-IR, so an update and the next capture happen back to back.
    pub fn shift_dr_from_exit1(&mut self) -> Result<()> {
        debug_assert!(self.state == Exit1DR || self.state == Exit1IR);
        self.last_bit = self.change_mode(&[1, 1, 0, 0])?;
        debug_assert_eq!(self.state, ShiftDR);
        Ok(())
    }

    pub fn rti_from_exit1(&mut self) -> Result<()> {
        debug_assert!(self.state == Exit1DR || self.state == Exit1IR);
        self.change_mode(&[1, 0])?;
        debug_assert_eq!(self.state, Idle);
        Ok(())
    }

    /// Pass through Update twice, ending in Run-Test/Idle.  With ISC_INIT loaded this strobes
    /// the device's initialization pulse.
    pub fn init_pulse_from_exit1(&mut self) -> Result<()> {
        debug_assert_eq!(self.state, Exit1IR);
        self.change_mode(&[1, 1, 0, 1, 1, 0])?;
        debug_assert_eq!(self.state, Idle);
        Ok(())
    }

    /// Shift `bits_in` (index 0 first) through the selected register.  Each output bit is the
    /// one captured one clock *before* the matching input bit was driven, so `bits_out[0]` is
    /// the bit latched on entry to the shift state.  With `exit_at_end` TMS goes high on the
    /// last bit and the TAP lands in Exit1.
    pub fn shift(&mut self, bits_in: &[bool], exit_at_end: bool) -> Result<Vec<bool>> {
        debug_assert!(self.state == ShiftDR || self.state == ShiftIR);
        let mut bits_out = Vec::with_capacity(bits_in.len());
        for (i, &tdi) in bits_in.iter().enumerate() {
            bits_out.push(self.last_bit);
            let tms = exit_at_end && i == bits_in.len() - 1;
            self.last_bit = self.clock(tms, tdi)?;
        }
        Ok(bits_out)
    }
}
