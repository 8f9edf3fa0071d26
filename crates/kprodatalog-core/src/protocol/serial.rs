//! Serial port handling
//!
//! Locates the KPro USB interface (an FTDI bridge with a Hondata product
//! id) and opens it with the link settings the device expects.

use serialport::{DataBits, FlowControl, Parity, SerialPortInfo, SerialPortType, StopBits};
use std::time::Duration;
use tracing::{debug, info};

use super::{ProtocolError, SerialTransport, KPRO_PID, KPRO_VID};
use crate::config::SerialConfig;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    /// USB ids match the KPro interface
    pub fn is_kpro(&self) -> bool {
        self.vid == Some(KPRO_VID) && self.pid == Some(KPRO_PID)
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, manufacturer, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => (
                Some(usb_info.vid),
                Some(usb_info.pid),
                usb_info.manufacturer,
                usb_info.product,
            ),
            _ => (None, None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            manufacturer,
            product,
        }
    }
}

/// Sort key putting ttyUSB* ports first (numerically), then everything else
/// by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    (1, 0, basename.to_string())
}

/// List all available serial ports in a deterministic order
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// First port whose USB ids match the KPro interface
pub fn find_device() -> Option<PortInfo> {
    pick_device(list_ports())
}

fn pick_device(ports: Vec<PortInfo>) -> Option<PortInfo> {
    ports.into_iter().find(PortInfo::is_kpro)
}

/// Open the configured port, or the first KPro found, at 8N1 without flow
/// control
pub fn open_port(config: &SerialConfig) -> Result<SerialTransport, ProtocolError> {
    let name = match &config.port {
        Some(name) => name.clone(),
        None => {
            let device = find_device().ok_or_else(|| {
                ProtocolError::PortNotFound(format!(
                    "no device with USB id {:04x}:{:04x}",
                    KPRO_VID, KPRO_PID
                ))
            })?;
            info!(
                "Found {} on {}",
                device.product.as_deref().unwrap_or("KPro"),
                device.name
            );
            device.name
        }
    };

    debug!("Opening {} at {} baud", name, config.baud_rate);
    let port = serialport::new(&name, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(config.timeout_ms))
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(name.clone()),
            _ => ProtocolError::Serial(e.to_string()),
        })?;

    Ok(SerialTransport::new(port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, ids: Option<(u16, u16)>) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            vid: ids.map(|(vid, _)| vid),
            pid: ids.map(|(_, pid)| pid),
            manufacturer: None,
            product: None,
        }
    }

    #[test]
    fn test_port_sorting() {
        let mut ports = vec![
            port("/dev/ttyUSB10", None),
            port("/dev/ttyS0", None),
            port("/dev/ttyUSB2", None),
        ];
        ports.sort_by_key(|p| port_sort_key(&p.name));
        let ordered: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(ordered, vec!["/dev/ttyUSB2", "/dev/ttyUSB10", "/dev/ttyS0"]);
    }

    #[test]
    fn test_pick_device_by_usb_id() {
        let ports = vec![
            port("/dev/ttyUSB0", Some((0x0403, 0x6001))),
            port("/dev/ttyUSB1", Some((0x0403, 0xF5F8))),
        ];
        assert_eq!(pick_device(ports).map(|p| p.name), Some("/dev/ttyUSB1".to_string()));
        assert_eq!(pick_device(vec![port("/dev/ttyS0", None)]), None);
    }
}
