//! Serial-port actuator channel.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serialport::{DataBits, Parity, SerialPort, StopBits};
use tracing::{debug, info, trace};

use super::channel::{ActuatorChannel, ChannelError, ChannelResult};

/// Baud rate the servo boards ship with.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Port read timeout. `read_ack` polls in slices of this length so it can
/// notice cancellation and its own overall deadline.
const POLL_SLICE: Duration = Duration::from_millis(10);

/// Servo board on a serial port, 8N1.
pub struct SerialChannel {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn port(&mut self) -> ChannelResult<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(ChannelError::NotOpen)
    }
}

impl ActuatorChannel for SerialChannel {
    fn name(&self) -> &str {
        &self.path
    }

    fn open(&mut self) -> ChannelResult<()> {
        self.close();
        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(POLL_SLICE)
            .open()
            .map_err(|e| ChannelError::OpenFailed {
                port: self.path.clone(),
                reason: e.to_string(),
            })?;

        info!("Opened {} at {} baud", self.path, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, command: &str) -> ChannelResult<()> {
        debug!("Servo send on {}: {:?}", self.path, command);
        let port = self.port()?;
        port.write_all(command.as_bytes())?;
        port.flush()?;
        Ok(())
    }

    fn read_ack(&mut self, timeout: Duration, cancel: &AtomicBool) -> ChannelResult<u8> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 1];

        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(ChannelError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(ChannelError::Timeout);
            }

            match self.port()?.read(&mut buf) {
                Ok(1) => {
                    trace!("Servo ack on {}: {:#04x}", self.path, buf[0]);
                    return Ok(buf[0]);
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closed {}", self.path);
        }
    }
}

/// Paths of every serial port on the machine.
pub fn available_ports() -> ChannelResult<Vec<String>> {
    let ports = serialport::available_ports().map_err(std::io::Error::from)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unopened_channel() {
        let mut channel = SerialChannel::new("/dev/does-not-exist", DEFAULT_BAUD_RATE);
        assert!(!channel.is_open());
        assert!(matches!(channel.write("X90"), Err(ChannelError::NotOpen)));
        let cancel = AtomicBool::new(false);
        assert!(matches!(
            channel.read_ack(Duration::from_millis(50), &cancel),
            Err(ChannelError::NotOpen)
        ));
    }

    #[test]
    fn test_open_missing_port_fails() {
        let mut channel = SerialChannel::new("/dev/does-not-exist", DEFAULT_BAUD_RATE);
        assert!(matches!(
            channel.open(),
            Err(ChannelError::OpenFailed { .. })
        ));
    }
}
