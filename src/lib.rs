//! This crate drives a CoolRunner-II CPLD through its JTAG port, one TCK at a time, and uses
//! that to reverse-engineer the routing of the part's Zero-power Interconnect Array.
//!
//! At the lowest level is the `Cable` trait.  A cable moves one TMS/TDI pair in and one TDO
//! bit out per call.  There is a USB control-transfer probe, a bit-banged GPIO cable built on
//! embedded-hal pins, and a simulated CPLD that models the TAP, the programming instructions
//! and the boundary register closely enough to test everything above it.
//!
//! The next level is the JtagSM, which tracks the TAP state on every clock and provides the
//! fixed navigation sequences the configuration protocol uses.  The probe's TDO lags by one
//! clock, and `JtagSM::shift` hides that pipeline.
//!
//! `Cpld` (in `isc`) speaks the in-system configuration protocol: IDCODE, bulk erase, row by
//! row programming with Gray-coded addresses, and entering INTEST.
//!
//! On top of that, `discovery` programs a synthetic image per ZIA cell (built by `synth`
//! through an external bitstream compiler), wiggles every candidate source through the
//! boundary register and records which one reaches the watched output.  Progress is
//! checkpointed through a `CheckpointStore` so a long run can be resumed.
//!
//! # Example
//! ```
//! use zia_probe::cable::sim::SimCpld;
//! use zia_probe::isc::{Cpld, StdDelay};
//! use zia_probe::profile::DeviceProfile;
//! use zia_probe::statemachine::JtagSM;
//!
//! let profile = DeviceProfile::xc2c32a();
//! let mut cable = SimCpld::new(&profile);
//! let jtag = JtagSM::new(&mut cable).unwrap();
//! let mut cpld = Cpld::new(jtag, StdDelay, &profile);
//! let idcode = cpld.verify_idcode(profile.idcode, profile.idcode_mask).unwrap();
//! assert_eq!(idcode, 0x06e1c093);
//! ```

pub mod cable;
pub mod discovery;
pub mod error;
pub mod image;
pub mod isc;
pub mod profile;
pub mod render;
pub mod statemachine;
pub mod store;
pub mod synth;
pub mod zia;

pub use error::{Error, Result};
