//! Implementations for different JTAG probes live here.  Probes should implement the `Cable`
//! trait.
//!
//! Unlike a shifting cable, every probe here is a single-bit channel: one call drives TMS and
//! TDI, pulses TCK once and hands back the TDO value seen after the edge.  There is exactly one
//! request in flight at any time.
use crate::error::{Error, Result};
use crate::profile::DeviceProfile;

pub mod gpio;
pub mod sim;
#[cfg(feature = "usb")]
pub mod usb;

pub trait Cable {
    /// Put the probe into JTAG mode.  Issued once per session, before any TAP navigation.
    fn enter_jtag_mode(&mut self) -> Result<()>;
    /// Drive `tms` and `tdi`, clock TCK once and return TDO as sampled after the clock edge.
    fn transact(&mut self, tms: bool, tdi: bool) -> Result<bool>;
}

/// Open a cable by name.  `sim` is a simulated device shaped after `profile`.
pub fn new_from_string(name: &str, profile: &DeviceProfile) -> Result<Box<dyn Cable>> {
    match name {
        #[cfg(feature = "usb")]
        "usb" => Ok(Box::new(usb::UsbControl::open()?)),
        "sim" => Ok(Box::new(sim::SimCpld::new(profile))),
        _ => Err(Error::UnknownCable {
            name: name.to_string(),
        }),
    }
}
