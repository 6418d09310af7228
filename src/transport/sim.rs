//! In-memory device, answering commands from a register file.
use std::collections::{HashMap, HashSet, VecDeque};

use super::Transport;
use crate::error::Result;
use crate::protocol::{CommandFrame, ReplyFrame};

/// Simulated FPGA register file.
///
/// Writes are acknowledged by echoing the written value, reads return the
/// stored value (0 for untouched registers). Writes to read-only registers
/// are acknowledged but not stored. Malformed commands get no reply.
#[derive(Debug, Default)]
pub struct SimDevice {
    registers: HashMap<u16, u32>,
    read_only: HashSet<u16>,
    /// `bytes_available` polls before a reply becomes visible.
    latency: u32,
    /// Delayed replies in send order, with the polls each still waits.
    in_flight: VecDeque<(ReplyFrame, u32)>,
    rx: VecDeque<u8>,
    commands: Vec<CommandFrame>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_register(mut self, address: u16, value: u32) -> Self {
        self.registers.insert(address, value);
        self
    }

    pub fn with_read_only(mut self, address: u16) -> Self {
        self.read_only.insert(address);
        self
    }

    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency = polls;
        self
    }

    pub fn register(&self, address: u16) -> Option<u32> {
        self.registers.get(&address).copied()
    }

    /// Every well-formed command received so far.
    pub fn commands(&self) -> &[CommandFrame] {
        &self.commands
    }

    /// Queue raw bytes as if the device had sent them unprompted.
    pub fn inject(&mut self, raw: &[u8]) {
        self.rx.extend(raw);
    }

    fn execute(&mut self, cmd: CommandFrame) -> ReplyFrame {
        let address = cmd.address();
        let value = if cmd.is_write() {
            if self.read_only.contains(&address) {
                log::debug!("sim: ignoring write to read-only 0x{:04x}", address);
            } else {
                self.registers.insert(address, cmd.data());
            }
            cmd.data()
        } else {
            self.register(address).unwrap_or(0)
        };
        self.commands.push(cmd);
        ReplyFrame::encode(value)
    }
}

impl Transport for SimDevice {
    fn send(&mut self, raw: &[u8]) -> Result<()> {
        match CommandFrame::from_raw(raw) {
            Ok(cmd) => {
                let reply = self.execute(cmd);
                if self.latency == 0 {
                    self.rx.extend(reply.as_bytes());
                } else {
                    self.in_flight.push_back((reply, self.latency));
                }
            }
            Err(e) => log::warn!("sim: dropping malformed command: {}", e),
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        for (_, remaining) in self.in_flight.iter_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        while let Some((reply, 0)) = self.in_flight.front() {
            self.rx.extend(reply.as_bytes());
            self.in_flight.pop_front();
        }
        Ok(self.rx.len())
    }

    fn receive(&mut self, n: usize) -> Result<Vec<u8>> {
        let n = n.min(self.rx.len());
        Ok(self.rx.drain(..n).collect())
    }
}
