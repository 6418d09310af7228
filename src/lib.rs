//! Register read/write protocol for FPGAs attached over a serial link.
//!
//! Each transaction sends one 7-byte command frame (16-bit address, 32-bit
//! data, write flag) and waits for one 7-byte reply. Bit 7 of every byte
//! alternates across the frame so a slipped byte is detected on decode.

pub mod config;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use self::config::{LinkConfig, PollPolicy};
pub use self::error::{Error, Operation, Result};
pub use self::protocol::{CommandFrame, ReplyFrame, pack, unpack};
pub use self::session::{Session, TransactionState};
pub use self::transport::Transport;
