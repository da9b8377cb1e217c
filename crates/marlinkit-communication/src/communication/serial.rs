//! Serial port transport
//!
//! Direct USB/RS-232 link to a printer board via the `serialport` crate.
//!
//! Supports:
//! - Port enumeration and discovery
//! - Fixed 8-N-1 framing with RTS and DTR asserted at open
//! - Non-blocking snapshot reads and bounded line reads

use super::{ConnectionParams, Transport};
use async_trait::async_trait;
use marlinkit_core::{ConnectionError, Error, Result, TransportError};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Per-call timeout handed to the OS driver; keeps reads from stalling the runtime
const DRIVER_TIMEOUT: Duration = Duration::from_millis(10);

/// Pause between empty reads while waiting for a line
const LINE_POLL_DELAY: Duration = Duration::from_millis(5);

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// List serial ports that look like printer boards
///
/// - Windows: COM*
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => {
            let port_infos: Vec<SerialPortInfo> = ports
                .iter()
                .filter(|port| is_valid_printer_port(&port.port_name))
                .map(|port| {
                    let info = SerialPortInfo::new(&port.port_name, get_port_description(port));

                    match &port.port_type {
                        serialport::SerialPortType::UsbPort(usb_info) => {
                            let mut info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                            if let Some(ref mfg) = usb_info.manufacturer {
                                info = info.with_manufacturer(mfg);
                            }
                            if let Some(ref serial) = usb_info.serial_number {
                                info = info.with_serial_number(serial);
                            }
                            info
                        }
                        _ => info,
                    }
                })
                .collect();

            Ok(port_infos)
        }
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(Error::other(format!("Failed to enumerate ports: {}", e)))
        }
    }
}

/// List port names only
pub fn list_port_names() -> Result<Vec<String>> {
    Ok(list_ports()?.into_iter().map(|p| p.port_name).collect())
}

/// Check if a port name matches printer board patterns
pub fn is_valid_printer_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

/// Get a user-friendly description for a port
fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Map a `serialport` open failure onto the connection taxonomy
fn connect_error(port: &str, err: serialport::Error) -> ConnectionError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => ConnectionError::PortNotFound {
            port: port.to_string(),
        },
        serialport::ErrorKind::Io(io::ErrorKind::NotFound) => ConnectionError::PortNotFound {
            port: port.to_string(),
        },
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
            ConnectionError::PermissionDenied {
                port: port.to_string(),
            }
        }
        serialport::ErrorKind::InvalidInput => ConnectionError::InvalidParameters {
            reason: err.to_string(),
        },
        _ => ConnectionError::FailedToOpen {
            port: port.to_string(),
            reason: err.to_string(),
        },
    }
}

/// Serial link to a printer board
pub struct SerialTransport {
    port_name: String,
    port: Option<Box<dyn serialport::SerialPort>>,
    /// Bytes read but not yet handed out as a line
    pending: String,
}

impl SerialTransport {
    /// Create a closed transport for the given port
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            port: None,
            pending: String::new(),
        }
    }

    fn io_error(&self, err: impl std::fmt::Display) -> TransportError {
        TransportError::Io {
            port: self.port_name.clone(),
            reason: err.to_string(),
        }
    }

    /// Pull whatever the driver has buffered into `pending`
    fn fill_pending(&mut self) -> std::result::Result<usize, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        let waiting = port.bytes_to_read().map_err(|e| TransportError::Io {
            port: self.port_name.clone(),
            reason: e.to_string(),
        })? as usize;
        if waiting == 0 {
            return Ok(0);
        }

        let mut buf = vec![0u8; waiting];
        match port.read(&mut buf) {
            Ok(n) => {
                self.pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    async fn open(
        &mut self,
        params: &ConnectionParams,
    ) -> std::result::Result<(), ConnectionError> {
        params.validate()?;
        if self.port.is_some() {
            return Err(ConnectionError::PortInUse {
                port: self.port_name.clone(),
            });
        }

        let builder = serialport::new(&params.port, params.baud_rate)
            .timeout(DRIVER_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None);

        let mut port = builder.open().map_err(|e| {
            tracing::warn!("Failed to open serial port {}: {}", params.port, e);
            connect_error(&params.port, e)
        })?;

        port.write_request_to_send(true)
            .and_then(|_| port.write_data_terminal_ready(true))
            .map_err(|e| ConnectionError::FailedToOpen {
                port: params.port.clone(),
                reason: format!("failed to assert RTS/DTR: {}", e),
            })?;

        tracing::info!("Opened {} at {} baud", params.port, params.baud_rate);
        self.port_name = params.port.clone();
        self.port = Some(port);
        self.pending.clear();
        Ok(())
    }

    async fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::info!("Closed {}", self.port_name);
        }
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn is_readable(&mut self) -> std::result::Result<bool, TransportError> {
        if !self.pending.is_empty() {
            return Ok(true);
        }
        let port = self.port.as_ref().ok_or(TransportError::Closed)?;
        port.bytes_to_read()
            .map(|n| n > 0)
            .map_err(|e| self.io_error(e))
    }

    async fn write_line(&mut self, line: &str) -> std::result::Result<(), TransportError> {
        let port_name = self.port_name.clone();
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');

        port.write_all(&data)
            .and_then(|_| port.flush())
            .map_err(|e| TransportError::Io {
                port: port_name,
                reason: e.to_string(),
            })
    }

    async fn read_available(&mut self) -> std::result::Result<String, TransportError> {
        self.fill_pending()?;
        Ok(std::mem::take(&mut self.pending))
    }

    async fn read_line(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<String, TransportError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(pos) = self.pending.find('\n') {
                let line = self.pending[..pos].trim_end_matches('\r').to_string();
                self.pending.drain(..=pos);
                return Ok(line);
            }

            if self.fill_pending()? == 0 {
                if tokio::time::Instant::now() >= deadline {
                    return Err(TransportError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                tokio::time::sleep(LINE_POLL_DELAY).await;
            }
        }
    }
}
