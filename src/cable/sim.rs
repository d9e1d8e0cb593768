//! A simulated CoolRunner-II behind a bit probe
//!
//! The TAP is modelled clock by clock (capture and shift on the rising edge, update when
//! entering Update-xR, TDO valid after the edge) so the pipelining of the real probe is
//! reproduced exactly.  On top of it sit just enough of the ISC instructions to erase and
//! program a fuse array and an INTEST boundary register whose watched output is driven by a
//! caller-supplied routing model.
use std::collections::VecDeque;

use tracing::trace;

use crate::cable::Cable;
use crate::error::{Error, Result};
use crate::isc::{self, arr2num, gray_decode};
use crate::profile::{BoundaryLayout, DeviceProfile, Pin};
use crate::statemachine::JtagState;
use crate::zia::RoutingSource;

/// Decides, from the active fuse array, which source reaches the watched output
pub type Router = Box<dyn Fn(&[Vec<bool>]) -> Option<RoutingSource>>;

pub struct SimCpld {
    jtag_mode: bool,
    state: JtagState,
    ir_shift: VecDeque<bool>,
    ir: u8,
    dr: VecDeque<bool>,
    idcode: u32,
    usercode: u32,

    rows: usize,
    width: usize,
    addr_bits: usize,
    isc_enabled: bool,
    fuses: Vec<Vec<bool>>,
    active: Vec<Vec<bool>>,

    layout: BoundaryLayout,
    macrocells_per_block: u32,
    watch: usize,
    clock_pin: usize,
    applied: Vec<bool>,
    latches: Vec<bool>,
    router: Option<Router>,

    clocks: usize,
    fail_at: Option<usize>,
    disconnected: bool,
    erases: usize,
    row_writes: Vec<u32>,
}

impl SimCpld {
    /// An erased part shaped after `profile`, answering with its IDCODE.  The primary
    /// reference pin clocks the macrocell latches.
    pub fn new(profile: &DeviceProfile) -> Self {
        let layout = profile.boundary();
        let index = |p: Pin| profile.pad_index(p) as usize;
        let clock_pin = profile
            .reference_pins
            .first()
            .map(|&p| index(p))
            .unwrap_or(0);
        Self {
            jtag_mode: false,
            state: JtagState::Reset,
            ir_shift: VecDeque::from(vec![false; 8]),
            ir: isc::IDCODE,
            dr: VecDeque::new(),
            idcode: profile.idcode,
            usercode: 0xffff_ffff,
            rows: profile.image_rows,
            width: profile.image_width,
            addr_bits: profile.address_bits(),
            isc_enabled: false,
            fuses: vec![vec![true; profile.image_width]; profile.image_rows],
            active: vec![vec![true; profile.image_width]; profile.image_rows],
            layout,
            macrocells_per_block: profile.macrocells_per_block,
            watch: index(profile.watch_pin),
            clock_pin,
            applied: vec![false; layout.len()],
            latches: vec![false; layout.pins()],
            router: None,
            clocks: 0,
            fail_at: None,
            disconnected: false,
            erases: 0,
            row_writes: Vec::new(),
        }
    }

    pub fn with_router(mut self, router: impl Fn(&[Vec<bool>]) -> Option<RoutingSource> + 'static) -> Self {
        self.router = Some(Box::new(router));
        self
    }

    pub fn with_idcode(mut self, idcode: u32) -> Self {
        self.idcode = idcode;
        self
    }

    /// Make the `n`th clock (zero-based, counted from now) fail like an unplugged probe.  Every
    /// later clock is refused with a different reason.
    pub fn fail_after(&mut self, n: usize) {
        self.fail_at = Some(self.clocks + n);
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    pub fn clocks(&self) -> usize {
        self.clocks
    }

    pub fn erases(&self) -> usize {
        self.erases
    }

    /// Raw (Gray-coded) address of every row write, in order
    pub fn row_writes(&self) -> &[u32] {
        &self.row_writes
    }

    /// The fuse array as programmed (erased fuses read as 1)
    pub fn fuses(&self) -> &[Vec<bool>] {
        &self.fuses
    }

    /// The configuration the logic is currently running from
    pub fn active(&self) -> &[Vec<bool>] {
        &self.active
    }

    fn input(&self, pin: usize) -> bool {
        self.applied[self.layout.input_bit_at(pin)]
    }

    fn watched_signal(&self) -> bool {
        let source = match &self.router {
            Some(router) => router(&self.active),
            None => None,
        };
        match source {
            None => false,
            Some(RoutingSource::DedicatedInput) => match self.layout.dedicated_input_bit() {
                Some(bit) => self.applied[bit],
                None => false,
            },
            Some(RoutingSource::InputBuffer { pad }) => self.input(pad as usize),
            Some(RoutingSource::Macrocell { fb, mc }) => {
                self.latches[(fb * self.macrocells_per_block + mc) as usize]
            }
        }
    }

    fn capture_dr(&mut self) {
        let bits: Vec<bool> = match self.ir {
            isc::IDCODE => isc::num2arr(self.idcode, 32),
            isc::USERCODE => isc::num2arr(self.usercode, 32),
            isc::ISC_PROGRAM => vec![false; self.width + self.addr_bits],
            isc::INTEST | isc::EXTEST | isc::SAMPLE => {
                let mut cells = self.applied.clone();
                for p in 0..self.layout.pins() {
                    cells[self.layout.output_bit_at(p)] = false;
                }
                cells[self.layout.output_bit_at(self.watch)] = self.watched_signal();
                cells
            }
            _ => vec![false],
        };
        self.dr = bits.into();
    }

    fn update_ir(&mut self) {
        let bits: Vec<bool> = self.ir_shift.iter().copied().collect();
        self.ir = arr2num(&bits) as u8;
        trace!("sim: IR <- {:#04x}", self.ir);
        match self.ir {
            isc::ISC_ENABLE => self.isc_enabled = true,
            isc::ISC_ERASE if self.isc_enabled => {
                self.erases += 1;
                for row in &mut self.fuses {
                    row.iter_mut().for_each(|f| *f = true);
                }
            }
            isc::ISC_DISABLE if self.isc_enabled => {
                self.isc_enabled = false;
                // the logic restarts from the new array
                self.active = self.fuses.clone();
                self.applied.iter_mut().for_each(|b| *b = false);
                self.latches.iter_mut().for_each(|b| *b = false);
            }
            _ => {}
        }
    }

    fn update_dr(&mut self) {
        match self.ir {
            isc::ISC_PROGRAM if self.isc_enabled => {
                if self.dr.len() != self.width + self.addr_bits {
                    return;
                }
                let bits: Vec<bool> = self.dr.iter().copied().collect();
                let row: Vec<bool> = bits[..self.width].iter().rev().copied().collect();
                let addr: Vec<bool> = bits[self.width..].iter().rev().copied().collect();
                let raw = arr2num(&addr);
                self.row_writes.push(raw);
                let index = gray_decode(raw) as usize;
                if index < self.rows {
                    self.fuses[index] = row;
                }
            }
            isc::INTEST => {
                if self.dr.len() == self.applied.len() {
                    self.applied = self.dr.iter().copied().collect();
                    if self.input(self.clock_pin) {
                        for p in 0..self.latches.len() {
                            self.latches[p] = self.input(p);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

impl Cable for SimCpld {
    fn enter_jtag_mode(&mut self) -> Result<()> {
        self.jtag_mode = true;
        Ok(())
    }

    fn transact(&mut self, tms: bool, tdi: bool) -> Result<bool> {
        if !self.jtag_mode {
            return Err(Error::transport("probe is not in JTAG mode"));
        }
        if self.disconnected {
            return Err(Error::transport("probe already disconnected"));
        }
        if self.fail_at == Some(self.clocks) {
            self.disconnected = true;
            return Err(Error::transport(format!(
                "simulated probe disconnect at clock {}",
                self.clocks
            )));
        }
        self.clocks += 1;

        // rising edge
        match self.state {
            JtagState::CaptureIR => {
                // CoolRunner-II captures status with the mandatory 01 in the low bits
                self.ir_shift = isc::num2arr(0b0000_0001, 8).into();
            }
            JtagState::ShiftIR => {
                self.ir_shift.pop_front();
                self.ir_shift.push_back(tdi);
            }
            JtagState::CaptureDR => self.capture_dr(),
            JtagState::ShiftDR => {
                self.dr.pop_front();
                self.dr.push_back(tdi);
            }
            _ => {}
        }

        self.state = self.state.next(tms);
        match self.state {
            JtagState::Reset => self.ir = isc::IDCODE,
            JtagState::UpdateIR => self.update_ir(),
            JtagState::UpdateDR => self.update_dr(),
            _ => {}
        }

        let tdo = match self.state {
            JtagState::ShiftIR => self.ir_shift.front().copied().unwrap_or(false),
            JtagState::ShiftDR => self.dr.front().copied().unwrap_or(false),
            _ => false,
        };
        Ok(tdo)
    }
}
