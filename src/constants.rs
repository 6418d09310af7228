
/// Every command and reply frame is exactly this many bytes.
pub const FRAME_LEN: usize = 7;

/// Sequence marker, bit 7 of every frame byte.
pub const SEQ_BIT_MASK: u8 = 0x80;
/// Write flag, bit 6 of byte 0 of a command frame.
pub const WRITE_BIT_MASK: u8 = 0x40;
/// Payload bits of a frame byte.
pub const PAYLOAD_MASK: u8 = 0x7f;

/// Marker value assumed for the byte before the first one of a frame.
pub const INITIAL_SEQ: u8 = SEQ_BIT_MASK;

/// Number of `bytes_available` polls before a transaction times out.
pub const DEFAULT_POLL_COUNT: u32 = 10;

pub const SERIAL_TIMEOUT_MS: u64 = 1000;
pub const POLL_INTERVAL_MS: u64 = 1;
