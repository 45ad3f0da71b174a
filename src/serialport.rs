//! Blocking serial transport for the nRF24 AT-command adapter.

use crate::session::Transport;
use crate::Error;
use std::io::{Read, Write};
use std::time::Duration;

/// Serial connection to the radio adapter, 115200 8N1.
pub struct SerialTransport {
    serial: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    pub fn open(port: &str, timeout: Duration) -> Result<Self, Error> {
        let serial = serialport::new(port, 115_200)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|err| Error::Io(err.into()))?;
        Ok(Self { serial })
    }

    /// Drains the adapter's boot banner, if any. A fresh adapter prints
    /// `Ready` once after power-up; an already-running one stays silent, so
    /// a timeout here is not an error.
    pub fn wait_ready(&mut self) {
        if let Err(err) = self.read_until(b"Ready\r\n") {
            log::debug!("no adapter boot banner: {}", err);
        }
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.serial.write_all(data)
    }

    /// Reads byte-by-byte until `marker` or the port timeout, returning
    /// whatever accumulated. Partial lines are left for the session's retry
    /// loop to reject.
    fn read_until(&mut self, marker: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.serial.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    buffer.push(byte[0]);
                    if buffer.ends_with(marker) {
                        break;
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::TimedOut => break,
                Err(err) => return Err(err),
            }
        }
        Ok(buffer)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.serial.flush()
    }
}
