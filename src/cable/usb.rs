//! Implement the `Cable` trait for the vendor-request bit probe
//!
//! The probe has no bulk endpoints.  Each TCK cycle is one IN control transfer whose `wValue`
//! carries TDI in bit 0 and TMS in bit 1; the single byte returned is TDO.
use crate::cable::Cable;
use crate::error::{Error, Result};

use std::time::Duration;

use rusb::{DeviceHandle, Direction, GlobalContext, Recipient, RequestType};

pub const VID: u16 = 0xf055;
pub const PID: u16 = 0x0000;

const REQ_JTAG_MODE: u8 = 1;
const REQ_CLOCK: u8 = 3;

const TIMEOUT: Duration = Duration::from_millis(1000);

pub struct UsbControl {
    device: DeviceHandle<GlobalContext>,
}

impl UsbControl {
    /// Open the first attached probe
    pub fn open() -> Result<Self> {
        Self::open_with_vid_pid(VID, PID)
    }

    pub fn open_with_vid_pid(vid: u16, pid: u16) -> Result<Self> {
        let device =
            rusb::open_device_with_vid_pid(vid, pid).ok_or(Error::DeviceNotFound { vid, pid })?;
        tracing::info!("Opened bit probe {vid:04x}:{pid:04x}");
        Ok(Self { device })
    }
}

fn clock_value(tms: bool, tdi: bool) -> u16 {
    let mut val = 0;
    if tdi {
        val |= 0b01;
    }
    if tms {
        val |= 0b10;
    }
    val
}

impl Cable for UsbControl {
    fn enter_jtag_mode(&mut self) -> Result<()> {
        let request_type = rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        self.device
            .write_control(request_type, REQ_JTAG_MODE, 0, 0, &[], TIMEOUT)?;
        Ok(())
    }

    fn transact(&mut self, tms: bool, tdi: bool) -> Result<bool> {
        let request_type = rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device);
        let mut buf = [0u8; 1];
        let len = self.device.read_control(
            request_type,
            REQ_CLOCK,
            clock_value(tms, tdi),
            0,
            &mut buf,
            TIMEOUT,
        )?;
        if len != 1 {
            return Err(Error::transport(format!("short clock response ({len} bytes)")));
        }
        Ok(buf[0] != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_request_packs_tdi_low_tms_high() {
        assert_eq!(clock_value(false, false), 0);
        assert_eq!(clock_value(false, true), 1);
        assert_eq!(clock_value(true, false), 2);
        assert_eq!(clock_value(true, true), 3);
    }

    #[test]
    #[ignore] // Requires the bit probe attached with a target powered
    fn probe_reaches_reset() {
        let mut probe = UsbControl::open().expect("probe attached");
        probe.enter_jtag_mode().expect("jtag mode");
        for _ in 0..5 {
            probe.transact(true, false).expect("clock");
        }
    }
}
