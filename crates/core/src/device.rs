//! Device model: discovery of attached hubs.

use crate::error::{Error, Result};
use crate::{CORSAIR_VID, ICUE_LINK_HUB_PID};
use std::ffi::CString;
use tracing::{debug, info};

/// Information about a discovered iCUE LINK System Hub.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub vid: u16,
    pub pid: u16,
    pub path: CString,
    pub serial: Option<String>,
    pub product: Option<String>,
    pub interface_number: i32,
}

impl DeviceInfo {
    /// Device path as a printable string.
    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Whether a vendor/product pair identifies the hub.
pub fn is_supported(vid: u16, pid: u16) -> bool {
    vid == CORSAIR_VID && pid == ICUE_LINK_HUB_PID
}

/// List every hub visible through `api`, in enumeration order.
pub fn enumerate(api: &hidapi::HidApi) -> Vec<DeviceInfo> {
    let mut devices = Vec::new();
    for info in api.device_list() {
        if !is_supported(info.vendor_id(), info.product_id()) {
            continue;
        }

        info!(
            vid = format_args!("0x{:04X}", info.vendor_id()),
            pid = format_args!("0x{:04X}", info.product_id()),
            path = %info.path().to_string_lossy(),
            interface = info.interface_number(),
            "Found iCUE LINK hub"
        );
        devices.push(DeviceInfo {
            vid: info.vendor_id(),
            pid: info.product_id(),
            path: info.path().to_owned(),
            serial: info.serial_number().map(|s| s.to_string()),
            product: info.product_string().map(|s| s.to_string()),
            interface_number: info.interface_number(),
        });
    }

    debug!(count = devices.len(), "Device enumeration complete");
    devices
}

/// Discover all connected hubs.
pub fn discover_devices() -> Result<Vec<DeviceInfo>> {
    debug!(
        vid = format_args!("0x{:04X}", CORSAIR_VID),
        pid = format_args!("0x{:04X}", ICUE_LINK_HUB_PID),
        "Starting HID device enumeration"
    );
    let api = hidapi::HidApi::new().map_err(|e| Error::Hid(e.to_string()))?;
    Ok(enumerate(&api))
}
