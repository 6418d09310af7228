//! The underlying 7-byte frame format of the FPGA command link.
//!
//! Bit 7 of every byte is a sequence marker. Starting from an implied marker
//! of 1 before the first byte, markers alternate from byte to byte, so a lost
//! or duplicated byte shows up as two adjacent bytes with the same marker.

use std::fmt;

use bitfield::BitRange;

use crate::constants::{FRAME_LEN, INITIAL_SEQ, PAYLOAD_MASK, SEQ_BIT_MASK, WRITE_BIT_MASK};
use crate::error::{Error, Result};

/// Extract the inclusive bit range `msb..=lsb` of `value`, right-justified.
pub fn slice_bits<T: BitRange<u8>>(value: T, msb: usize, lsb: usize) -> u8 {
    value.bit_range(msb, lsb)
}

/// Host to device command.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame([u8; FRAME_LEN]);

/// Device to host reply, only constructed once its sequence markers check out.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplyFrame([u8; FRAME_LEN]);

/// Pack a register command.
///
/// Only bits 15:0 of `address` are carried, wider addresses are truncated.
/// Command markers alternate 0,1,0,1,0,1,0 like replies do. This differs
/// from the older host layout, which sent 0,1,1,0,1,0,1.
pub fn pack(address: u32, write: bool, data: u32) -> CommandFrame {
    let flag = if write { WRITE_BIT_MASK } else { 0 };

    CommandFrame([
        flag | slice_bits(address, 15, 10),
        SEQ_BIT_MASK | slice_bits(address, 9, 3),
        (slice_bits(address, 2, 0) << 4) | slice_bits(data, 31, 28),
        SEQ_BIT_MASK | slice_bits(data, 27, 21),
        slice_bits(data, 20, 14),
        SEQ_BIT_MASK | slice_bits(data, 13, 7),
        slice_bits(data, 6, 0),
    ])
}

pub fn pack_write(address: u32, data: u32) -> CommandFrame {
    pack(address, true, data)
}

pub fn pack_read(address: u32) -> CommandFrame {
    pack(address, false, 0)
}

/// Decode the data word of a reply.
pub fn unpack(raw: &[u8]) -> Result<u32> {
    ReplyFrame::from_raw(raw).map(|reply| reply.data())
}

/// Length and sequence checks shared by both frame directions.
fn check_frame(raw: &[u8]) -> Result<[u8; FRAME_LEN]> {
    let bytes: [u8; FRAME_LEN] = raw.try_into().map_err(|_| Error::FrameLength {
        expected: FRAME_LEN,
        actual: raw.len(),
    })?;

    let mut previous = INITIAL_SEQ;
    for (index, &byte) in bytes.iter().enumerate() {
        let seq = byte & SEQ_BIT_MASK;
        if seq == previous {
            return Err(Error::Sequence { index, byte });
        }
        previous = seq;
    }
    Ok(bytes)
}

fn payload_of(bytes: &[u8; FRAME_LEN]) -> u32 {
    (u32::from(slice_bits(bytes[2], 3, 0)) << 28)
        | (u32::from(slice_bits(bytes[3], 6, 0)) << 21)
        | (u32::from(slice_bits(bytes[4], 6, 0)) << 14)
        | (u32::from(slice_bits(bytes[5], 6, 0)) << 7)
        | u32::from(slice_bits(bytes[6], 6, 0))
}

impl CommandFrame {
    /// Parse a command as the device sees it.
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        check_frame(raw).map(CommandFrame)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_write(&self) -> bool {
        self.0[0] & WRITE_BIT_MASK != 0
    }

    pub fn address(&self) -> u16 {
        (u16::from(slice_bits(self.0[0], 5, 0)) << 10)
            | (u16::from(self.0[1] & PAYLOAD_MASK) << 3)
            | u16::from(slice_bits(self.0[2], 6, 4))
    }

    pub fn data(&self) -> u32 {
        payload_of(&self.0)
    }
}

impl ReplyFrame {
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        check_frame(raw).map(ReplyFrame)
    }

    /// Build the reply a device sends for `data`. Bytes 0 and 1 carry no payload.
    pub fn encode(data: u32) -> Self {
        ReplyFrame(pack(0, false, data).0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn data(&self) -> u32 {
        payload_of(&self.0)
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for ReplyFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_write() { "WR" } else { "RD" };
        write!(f, "{}[{}]", kind, hex::encode(self.0))
    }
}

impl fmt::Debug for ReplyFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "REPLY[{}]", hex::encode(self.0))
    }
}
