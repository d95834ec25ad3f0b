use crate::protocol::{PID_LEFT, PID_RIGHT, VID};
use crate::transport::Transport;
use crate::types::{DeviceInfo, Handedness};
use crate::{JoyConError, Result};
use hidapi::{HidApi, HidDevice};
use std::ffi::CStr;

/// HID transport layer using hidapi.
///
/// Output reports go through `write()` with byte[0] = 0x01 doubling as the
/// report id; input reports come back through `read_timeout()`.
pub struct HidTransport {
    device: Option<HidDevice>,
}

impl HidTransport {
    pub fn new(device: HidDevice) -> Self {
        Self {
            device: Some(device),
        }
    }

    /// Open a Joy-Con by its hidapi path.
    pub fn open(path: &CStr) -> Result<Self> {
        let api = HidApi::new()?;
        let device = api
            .open_path(path)
            .map_err(|e| JoyConError::TransportOpen(format!("{:?}: {}", path, e)))?;
        Ok(Self::new(device))
    }

    fn device(&self) -> Result<&HidDevice> {
        self.device.as_ref().ok_or(JoyConError::TransportClosed)
    }
}

impl Transport for HidTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.device()?
            .write(data)
            .map_err(|e| JoyConError::Transport(format!("write failed: {}", e)))
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        self.device()?
            .read_timeout(buf, timeout_ms)
            .map_err(|e| JoyConError::Transport(format!("read failed: {}", e)))
    }

    fn set_blocking(&mut self, blocking: bool) -> Result<()> {
        self.device()?.set_blocking_mode(blocking)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // hidapi closes the handle on drop.
        self.device.take();
        Ok(())
    }
}

/// Check if a hidapi DeviceInfo is a Joy-Con half.
fn is_joycon(d: &hidapi::DeviceInfo) -> bool {
    d.vendor_id() == VID && (d.product_id() == PID_LEFT || d.product_id() == PID_RIGHT)
}

/// List all connected Joy-Con halves.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let api = HidApi::new()?;
    let devices = api
        .device_list()
        .filter(|d| is_joycon(d))
        .filter_map(|d| {
            let handedness = Handedness::from_product_id(d.product_id())?;
            Some(DeviceInfo {
                path: d.path().to_owned(),
                serial: d.serial_number().unwrap_or("").to_string(),
                product_id: d.product_id(),
                handedness,
            })
        })
        .collect::<Vec<_>>();

    log::debug!("Found {} Joy-Con interface(s)", devices.len());
    Ok(devices)
}

/// Find the first connected Joy-Con, optionally of a given half.
pub fn find_first(handedness: Option<Handedness>) -> Result<DeviceInfo> {
    list_devices()?
        .into_iter()
        .find(|d| handedness.map_or(true, |h| d.handedness == h))
        .ok_or(JoyConError::DeviceNotFound)
}
