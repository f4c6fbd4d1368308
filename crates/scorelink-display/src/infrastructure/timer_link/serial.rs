//! Native serial implementations of the port seam, backed by `serialport`.

use std::time::Duration;

use serialport::{ClearBuffer, DataBits, SerialPort};
use tracing::debug;

use super::{LinkError, PortScanner, TimerPort};

/// Read timeout on the open port: short enough that the receive loop can
/// notice the shutdown flag promptly, long enough not to spin.
const READ_TICK: Duration = Duration::from_millis(50);

/// Substring a port name must contain to be a candidate on this platform.
fn platform_patterns() -> &'static [&'static str] {
    #[cfg(target_os = "linux")]
    {
        &["ttyUSB", "ttyACM"]
    }
    #[cfg(target_os = "windows")]
    {
        &["COM"]
    }
    #[cfg(target_os = "macos")]
    {
        &["cu."]
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        &["tty"]
    }
}

/// Scans the system serial ports for timer candidates.
pub struct SerialScanner {
    /// Optional override of the platform name pattern (config `[timer]`).
    pattern: Option<String>,
}

impl SerialScanner {
    pub fn new(pattern: Option<String>) -> Self {
        Self { pattern }
    }

    fn matches(&self, name: &str) -> bool {
        match &self.pattern {
            Some(pattern) => name.contains(pattern.as_str()),
            None => platform_patterns().iter().any(|p| name.contains(p)),
        }
    }
}

impl PortScanner for SerialScanner {
    fn candidate_ports(&self, exclude: Option<&str>) -> Vec<String> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                debug!("serial enumeration failed: {e}");
                return Vec::new();
            }
        };
        ports
            .into_iter()
            .map(|info| info.port_name)
            .filter(|name| self.matches(name))
            .filter(|name| Some(name.as_str()) != exclude)
            .collect()
    }

    fn open(&self, name: &str, baud: u32) -> Result<Box<dyn TimerPort>, LinkError> {
        let port = serialport::new(name, baud)
            .data_bits(DataBits::Eight)
            .timeout(READ_TICK)
            .open()
            .map_err(|e| LinkError::Open {
                port: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(Box::new(SerialTimerPort { port }))
    }
}

/// A [`TimerPort`] over an open system serial port.
struct SerialTimerPort {
    port: Box<dyn SerialPort>,
}

impl TimerPort for SerialTimerPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match std::io::Read::read(&mut self.port, buf) {
            Ok(n) => Ok(n),
            // The configured timeout elapsed with nothing to read; callers
            // treat 0 as "try again".
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        std::io::Write::write_all(&mut self.port, bytes)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::Write::flush(&mut self.port)
    }

    fn clear_input(&mut self) -> std::io::Result<()> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_override_takes_precedence() {
        let scanner = SerialScanner::new(Some("rfcomm".to_string()));
        assert!(scanner.matches("/dev/rfcomm0"));
        assert!(!scanner.matches("/dev/ttyUSB0"));
    }

    #[test]
    fn test_platform_pattern_accepts_expected_names() {
        let scanner = SerialScanner::new(None);
        #[cfg(target_os = "linux")]
        {
            assert!(scanner.matches("/dev/ttyUSB0"));
            assert!(scanner.matches("/dev/ttyACM1"));
            assert!(!scanner.matches("/dev/video0"));
        }
        #[cfg(target_os = "windows")]
        {
            assert!(scanner.matches("COM3"));
        }
        #[cfg(target_os = "macos")]
        {
            assert!(scanner.matches("/dev/cu.usbserial-1410"));
        }
    }

    #[test]
    fn test_candidate_ports_never_panics() {
        // Enumeration must degrade to an empty list on hosts without serial
        // subsystems (CI containers).
        let scanner = SerialScanner::new(None);
        let _ = scanner.candidate_ports(None);
    }
}
