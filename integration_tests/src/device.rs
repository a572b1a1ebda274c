//! Device communication client.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use serialport::SerialPort;

use crate::protocol::{build_command, build_frame, parse_frame, CommandId, Frame, START_MARK};

/// Find a gateway by probing every serial port with a spread factor query.
pub fn find_gateway_port(baud_rate: u32) -> Result<String> {
    for port_info in serialport::available_ports()? {
        if let Ok(mut client) = DeviceClient::new(&port_info.port_name, baud_rate) {
            // Set short timeout for probing
            client.set_timeout(Duration::from_millis(500));
            if let Ok(reply) = client.send_command(CommandId::QuerySpreadFactor, &[]) {
                if reply.cmd_id == CommandId::QuerySpreadFactor as u8 {
                    return Ok(port_info.port_name);
                }
            }
        }
    }
    anyhow::bail!("No gateway found - ensure the RS-485 adapter is connected")
}

/// Resolve a port argument - returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str, baud_rate: u32) -> Result<String> {
    if port_arg == "auto" {
        find_gateway_port(baud_rate)
    } else {
        Ok(port_arg.to_string())
    }
}

/// Client for talking to the gateway's wired side.
pub struct DeviceClient {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl DeviceClient {
    /// Create a new device client.
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(50))
            .open()?;

        Ok(Self {
            port,
            timeout: Duration::from_secs(2),
        })
    }

    /// Set the reply timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Discard anything the device sent so far.
    pub fn clear_buffer(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    /// Send a command and wait for the reply carrying the same command ID.
    ///
    /// Unrelated frames (forwarded radio traffic, simulated reports) are skipped.
    pub fn send_command(&mut self, cmd_id: CommandId, payload: &[u8]) -> Result<Frame> {
        self.write(&build_command(cmd_id, payload))?;

        let deadline = Instant::now() + self.timeout;
        while let Some(frame) = self.read_frame_until(deadline)? {
            if frame.cmd_id == cmd_id as u8 {
                return Ok(frame);
            }
        }
        anyhow::bail!("Timeout waiting for reply to {:?}", cmd_id)
    }

    /// Send a command that is not expected to produce a reply.
    pub fn send_silent(&mut self, cmd_id: CommandId, payload: &[u8]) -> Result<()> {
        self.write(&build_command(cmd_id, payload))
    }

    /// Send a raw frame to any address.
    pub fn send_raw(&mut self, address: (u8, u8), cmd_id: u8, payload: &[u8]) -> Result<()> {
        self.write(&build_frame(address, cmd_id, payload))
    }

    /// Read the next frame, or None if nothing arrives within `timeout`.
    pub fn try_read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        self.read_frame_until(Instant::now() + timeout)
    }

    fn write(&mut self, frame: &[u8]) -> Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read one frame. The declared length decides where it ends, since the
    /// CRC bytes may equal the end marker.
    fn read_frame_until(&mut self, deadline: Instant) -> Result<Option<Frame>> {
        let mut data = Vec::new();

        while Instant::now() < deadline {
            let Some(byte) = self.read_byte()? else {
                continue;
            };
            if data.is_empty() && byte != START_MARK {
                continue;
            }
            data.push(byte);

            if data.len() > 5 && data.len() == 9 + data[5] as usize {
                return parse_frame(&data).map(Some);
            }
        }

        if data.is_empty() {
            Ok(None)
        } else {
            anyhow::bail!("Timeout mid-frame, got {} bytes: {:02x?}", data.len(), data)
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
