//! Frame protocol definitions matching the firmware.

#![allow(dead_code)]

use crc::{Crc, CRC_16_XMODEM};

pub const START_MARK: u8 = 0x7E;
pub const END_MARK: u8 = 0x7F;

/// Header (6) + CRC (2) + END
pub const FRAME_OVERHEAD: usize = 9;

/// Address of the gateway's wired side
pub const GATEWAY_ADDRESS: (u8, u8) = (0x00, 0x00);

/// Command IDs matching the firmware protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    QueryTxFrequency = 0x20,
    QueryRxFrequency = 0x21,
    QueryBandwidth = 0x23,
    QuerySpreadFactor = 0x24,
    QueryCodingRate = 0x25,
    TriggerSimulation = 0x30,
    SetOperationMode = 0x40,
    SetTxFrequency = 0xB0,
    SetRxFrequency = 0xB1,
    ResetRadioDefaults = 0xB2,
    SetBandwidth = 0xB3,
    SetSpreadFactor = 0xB4,
    SetCodingRate = 0xB5,
}

const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Build a frame.
/// Format: [0x7E][module_function][module_id][cmd_id][0x00][len][payload][crc lo][crc hi][0x7F]
pub fn build_frame(address: (u8, u8), cmd_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload.len());

    frame.push(START_MARK);
    frame.extend_from_slice(&[address.0, address.1, cmd_id, 0x00, payload.len() as u8]);
    frame.extend_from_slice(payload);

    let checksum = CRC.checksum(&frame[1..]);
    frame.extend_from_slice(&checksum.to_le_bytes());
    frame.push(END_MARK);

    frame
}

/// Build a command addressed to the gateway.
pub fn build_command(cmd_id: CommandId, payload: &[u8]) -> Vec<u8> {
    build_frame(GATEWAY_ADDRESS, cmd_id as u8, payload)
}

/// Parsed frame from the device.
#[derive(Debug)]
pub struct Frame {
    pub module_function: u8,
    pub module_id: u8,
    pub cmd_id: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Payload as a little-endian `f32` (frequency replies, in MHz)
    pub fn as_f32(&self) -> anyhow::Result<f32> {
        let bytes: [u8; 4] = self
            .payload
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("Expected 4 payload bytes, got {}", self.payload.len()))?;
        Ok(f32::from_le_bytes(bytes))
    }

    /// Single-byte payload
    pub fn as_u8(&self) -> anyhow::Result<u8> {
        match self.payload.as_slice() {
            [value] => Ok(*value),
            other => anyhow::bail!("Expected 1 payload byte, got {}", other.len()),
        }
    }
}

/// Parse a complete frame, markers included.
pub fn parse_frame(data: &[u8]) -> anyhow::Result<Frame> {
    if data.len() < FRAME_OVERHEAD {
        anyhow::bail!("Frame too short: {} bytes", data.len());
    }
    if data[0] != START_MARK || data[data.len() - 1] != END_MARK {
        anyhow::bail!("Frame markers missing: {:02x?}", data);
    }

    let length = data[5] as usize;
    if data.len() != FRAME_OVERHEAD + length {
        anyhow::bail!(
            "Frame length mismatch: declared {}, frame holds {}",
            length,
            data.len() - FRAME_OVERHEAD
        );
    }

    let crc_at = data.len() - 3;
    let received_crc = u16::from_le_bytes([data[crc_at], data[crc_at + 1]]);
    let calculated_crc = CRC.checksum(&data[1..crc_at]);
    if calculated_crc != received_crc {
        anyhow::bail!(
            "CRC mismatch: expected {:04x}, got {:04x}",
            calculated_crc,
            received_crc
        );
    }

    Ok(Frame {
        module_function: data[1],
        module_id: data[2],
        cmd_id: data[3],
        payload: data[6..6 + length].to_vec(),
    })
}
