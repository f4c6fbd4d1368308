//! Mock port and scanner for exercising the link without hardware.
//!
//! Always compiled (not test-gated) so integration tests and examples on any
//! platform can drive the full handshake and dispatch logic.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{LinkError, PortScanner, TimerPort};

/// Scripted behavior for one mock port.
#[derive(Clone)]
pub struct MockPortPlan {
    /// Byte slices delivered one per `read()` call, in order.
    reads: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Everything written to the port, in write order.
    written: Arc<Mutex<Vec<u8>>>,
    /// When true, `open` fails for this port.
    unopenable: bool,
}

impl MockPortPlan {
    /// A port that answers with the given frames and then goes quiet.
    pub fn replies(frames: Vec<Vec<u8>>) -> Self {
        Self {
            reads: Arc::new(Mutex::new(frames.into())),
            written: Arc::new(Mutex::new(Vec::new())),
            unopenable: false,
        }
    }

    /// A port that opens fine but never sends a byte.
    pub fn silent() -> Self {
        Self::replies(Vec::new())
    }

    /// A port whose open call fails outright.
    pub fn unopenable() -> Self {
        Self {
            reads: Arc::new(Mutex::new(VecDeque::new())),
            written: Arc::new(Mutex::new(Vec::new())),
            unopenable: true,
        }
    }

    /// Shared record of every byte written to this port.
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }
}

/// A [`TimerPort`] following a [`MockPortPlan`].
pub struct MockTimerPort {
    plan: MockPortPlan,
}

impl TimerPort for MockTimerPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let next = self.plan.reads.lock().expect("mock reads lock").pop_front();
        match next {
            Some(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            None => {
                // Emulate a blocking read timeout so callers do not spin hot.
                std::thread::sleep(Duration::from_millis(1));
                Ok(0)
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.plan
            .written
            .lock()
            .expect("mock written lock")
            .extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn clear_input(&mut self) -> std::io::Result<()> {
        // A real clear drops bytes already received, not scripted future
        // replies, so this is a no-op.
        Ok(())
    }
}

/// A [`PortScanner`] over a fixed candidate list.
pub struct MockScanner {
    ports: Vec<(String, MockPortPlan)>,
}

impl MockScanner {
    pub fn new(ports: Vec<(String, MockPortPlan)>) -> Self {
        Self { ports }
    }
}

impl PortScanner for MockScanner {
    fn candidate_ports(&self, exclude: Option<&str>) -> Vec<String> {
        self.ports
            .iter()
            .map(|(name, _)| name.clone())
            .filter(|name| Some(name.as_str()) != exclude)
            .collect()
    }

    fn open(&self, name: &str, _baud: u32) -> Result<Box<dyn TimerPort>, LinkError> {
        let (_, plan) = self
            .ports
            .iter()
            .find(|(port, _)| port == name)
            .ok_or_else(|| LinkError::Open {
                port: name.to_string(),
                message: "unknown mock port".to_string(),
            })?;
        if plan.unopenable {
            return Err(LinkError::Open {
                port: name.to_string(),
                message: "mock port configured unopenable".to_string(),
            });
        }
        Ok(Box::new(MockTimerPort { plan: plan.clone() }))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_port_delivers_scripted_reads_in_order() {
        let plan = MockPortPlan::replies(vec![vec![1, 2], vec![3]]);
        let mut port = MockTimerPort { plan };
        let mut buf = [0u8; 8];

        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[1, 2]);
        assert_eq!(port.read(&mut buf).unwrap(), 1);
        assert_eq!(&buf[..1], &[3]);
        assert_eq!(port.read(&mut buf).unwrap(), 0, "exhausted script times out");
    }

    #[test]
    fn test_mock_port_records_writes() {
        let plan = MockPortPlan::silent();
        let written = plan.written();
        let mut port = MockTimerPort { plan };

        port.write_all(&[0xAA, 0xBB]).unwrap();
        port.write_all(&[0xCC]).unwrap();

        assert_eq!(*written.lock().unwrap(), vec![0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_mock_scanner_excludes_named_port() {
        let scanner = MockScanner::new(vec![
            ("a".to_string(), MockPortPlan::silent()),
            ("b".to_string(), MockPortPlan::silent()),
        ]);

        assert_eq!(scanner.candidate_ports(None), vec!["a", "b"]);
        assert_eq!(scanner.candidate_ports(Some("a")), vec!["b"]);
    }

    #[test]
    fn test_mock_scanner_open_unknown_port_fails() {
        let scanner = MockScanner::new(vec![]);
        assert!(scanner.open("ghost", 115_200).is_err());
    }
}
