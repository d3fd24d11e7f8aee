//! USB front-end transport.
//!
//! Thin wrapper over libusb: opens an SDR front-end by bus/port with a
//! vendor/product-id allow-list, exposes vendor control transfers and turns
//! the bulk sample endpoint into an [`IfInput`] feeding the same decoder as
//! file input. The receiver core itself never touches USB.

use std::io::{self, Read};
use std::time::Duration;

use rusb::{Context, DeviceHandle, UsbContext};

use crate::source::{IfInput, ThreadedReader};
use crate::{Error, Result};

/// Claimed device interface.
pub const SDR_DEV_IF: u8 = 0;

/// Vendor request and bulk transfer timeout.
const TO_TRANSFER: Duration = Duration::from_secs(15);

/// Maximum vendor request payload (bytes).
const MAX_REQ: usize = 64;

/// Vendor request direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    In,
    Out,
}

/// An open SDR front-end device.
pub struct UsbDevice {
    handle: DeviceHandle<Context>,
}

impl UsbDevice {
    /// Open the first device matching `bus`/`port` (negative = any) and the
    /// (vendor id, product id) allow-list, and claim the SDR interface.
    pub fn open(bus: i32, port: i32, ids: &[(u16, u16)]) -> Result<Self> {
        let ctx = Context::new()?;
        for dev in ctx.devices()?.iter() {
            if (bus >= 0 && dev.bus_number() as i32 != bus)
                || (port >= 0 && dev.port_number() as i32 != port)
            {
                continue;
            }
            let desc = match dev.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };
            if !ids
                .iter()
                .any(|&(vid, pid)| vid == desc.vendor_id() && pid == desc.product_id())
            {
                continue;
            }
            let handle = dev.open()?;
            handle.claim_interface(SDR_DEV_IF)?;
            return Ok(Self { handle });
        }
        Err(Error::UsbOpen)
    }

    /// Send a vendor request with up to a 64-byte payload. `data` is read
    /// for OUT requests and filled for IN requests; a short transfer is an
    /// error.
    pub fn req(&self, dir: Dir, req: u8, val: u16, data: &mut [u8]) -> Result<()> {
        if data.len() > MAX_REQ {
            return Err(Error::UsbPayload);
        }
        let n = match dir {
            Dir::In => {
                let rt = rusb::request_type(
                    rusb::Direction::In,
                    rusb::RequestType::Vendor,
                    rusb::Recipient::Device,
                );
                self.handle.read_control(rt, req, val, 0, data, TO_TRANSFER)?
            }
            Dir::Out => {
                let rt = rusb::request_type(
                    rusb::Direction::Out,
                    rusb::RequestType::Vendor,
                    rusb::Recipient::Device,
                );
                self.handle.write_control(rt, req, val, 0, data, TO_TRANSFER)?
            }
        };
        if n < data.len() {
            return Err(Error::Usb(rusb::Error::Io));
        }
        Ok(())
    }

    /// Turn the bulk sample endpoint into a live IF input. A reader thread
    /// drains the endpoint into a byte ring of `capacity` bytes.
    pub fn into_source(self, ep: u8, capacity: usize) -> Result<IfInput> {
        let reader = ThreadedReader::spawn(BulkReader { dev: self, ep }, capacity)?;
        Ok(IfInput::from_reader(Box::new(reader), true))
    }
}

impl Drop for UsbDevice {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(SDR_DEV_IF);
    }
}

/// Blocking `Read` view of the bulk sample endpoint.
struct BulkReader {
    dev: UsbDevice,
    ep: u8,
}

impl Read for BulkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.dev.handle.read_bulk(self.ep, buf, TO_TRANSFER) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Err(io::Error::from(io::ErrorKind::TimedOut)),
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }
}
