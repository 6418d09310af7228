//! Register transactions over a link.

use std::{
    thread::sleep,
    time::{Duration, Instant},
};

use crate::config::PollPolicy;
use crate::constants::{FRAME_LEN, POLL_INTERVAL_MS};
use crate::error::{Error, Operation, Result};
use crate::protocol::{self, CommandFrame};
use crate::transport::Transport;

/// Progress of the most recent transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    Sent,
    AwaitingReply,
    Completed,
    TimedOut,
    Failed,
}

/// A link with at most one transaction outstanding.
pub struct Session<T: Transport> {
    transport: T,
    poll: PollPolicy,
    state: TransactionState,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self::with_poll_policy(transport, PollPolicy::default())
    }

    pub fn with_poll_policy(transport: T, poll: PollPolicy) -> Self {
        Session {
            transport,
            poll,
            state: TransactionState::Idle,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Write a register.
    ///
    /// The acknowledgment carries no meaningful value, but it is still decoded:
    /// that is the only sequence check a write gets, and it drains the reply.
    pub fn write(&mut self, address: u16, data: u32) -> Result<()> {
        let ack = self.transact(Operation::Write, protocol::pack_write(address.into(), data))?;
        log::trace!("write 0x{:04x} acked with 0x{:08x}", address, ack);
        Ok(())
    }

    pub fn read(&mut self, address: u16) -> Result<u32> {
        self.transact(Operation::Read, protocol::pack_read(address.into()))
    }

    /// Write a register, then read it back and compare.
    pub fn write_verify(&mut self, address: u16, data: u32) -> Result<()> {
        self.write(address, data)?;
        let read = self.read(address)?;
        if read != data {
            return Err(Error::VerifyMismatch {
                address,
                written: data,
                read,
            });
        }
        Ok(())
    }

    /// Read `count` consecutive registers starting at `start`, stopping at the
    /// first failure. Addresses wrap around at 0xffff.
    pub fn read_many(&mut self, start: u16, count: usize) -> Result<Vec<u32>> {
        let mut values = Vec::with_capacity(count);
        let mut address = start;
        for _ in 0..count {
            values.push(self.read(address)?);
            address = address.wrapping_add(1);
        }
        Ok(values)
    }

    fn set_state(&mut self, state: TransactionState) {
        log::trace!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn transact(&mut self, operation: Operation, cmd: CommandFrame) -> Result<u32> {
        self.set_state(TransactionState::Idle);
        let result = self.run(operation, cmd);
        let end = match &result {
            Ok(_) => TransactionState::Completed,
            Err(Error::Timeout { .. }) => TransactionState::TimedOut,
            Err(_) => TransactionState::Failed,
        };
        self.set_state(end);
        result
    }

    fn run(&mut self, operation: Operation, cmd: CommandFrame) -> Result<u32> {
        log::debug!("=> {}", hex::encode(cmd.as_bytes()));
        self.transport.send(cmd.as_bytes())?;
        self.set_state(TransactionState::Sent);

        self.set_state(TransactionState::AwaitingReply);
        let available = self.wait_for_reply(operation)?;
        if available > FRAME_LEN {
            log::warn!(
                "{} bytes buffered after {}, leaving {} in the stream",
                available,
                operation,
                available - FRAME_LEN
            );
        }

        let resp = self.transport.receive(FRAME_LEN)?;
        log::debug!("<= {}", hex::encode(&resp));
        protocol::unpack(&resp)
    }

    /// Poll the receive buffer until a whole reply is there, returning the
    /// number of buffered bytes.
    fn wait_for_reply(&mut self, operation: Operation) -> Result<usize> {
        match self.poll {
            PollPolicy::Iterations { count } => {
                // a zero budget still looks once
                for _ in 0..count.max(1) {
                    let available = self.transport.bytes_available()?;
                    if available >= FRAME_LEN {
                        return Ok(available);
                    }
                }
                Err(Error::Timeout {
                    operation,
                    waited: self.poll.to_string(),
                })
            }
            PollPolicy::Deadline { timeout_ms } => {
                let deadline = Instant::now() + Duration::from_millis(timeout_ms);
                loop {
                    let available = self.transport.bytes_available()?;
                    if available >= FRAME_LEN {
                        return Ok(available);
                    }
                    if Instant::now() >= deadline {
                        return Err(Error::Timeout {
                            operation,
                            waited: self.poll.to_string(),
                        });
                    }
                    sleep(Duration::from_millis(POLL_INTERVAL_MS));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ReplyFrame;
    use crate::transport::SimDevice;

    /// Never has a reply ready.
    #[derive(Default)]
    struct Silent {
        sent: Vec<Vec<u8>>,
        polls: u32,
    }

    impl Transport for Silent {
        fn send(&mut self, raw: &[u8]) -> Result<()> {
            self.sent.push(raw.to_vec());
            Ok(())
        }

        fn bytes_available(&mut self) -> Result<usize> {
            self.polls += 1;
            Ok(FRAME_LEN - 1)
        }

        fn receive(&mut self, _n: usize) -> Result<Vec<u8>> {
            panic!("receive called without a full reply");
        }
    }

    /// Replies with a fixed byte sequence to every command.
    struct Scripted {
        reply: Vec<u8>,
        rx: Vec<u8>,
    }

    impl Scripted {
        fn new(reply: &[u8]) -> Self {
            Scripted {
                reply: reply.to_vec(),
                rx: Vec::new(),
            }
        }
    }

    impl Transport for Scripted {
        fn send(&mut self, _raw: &[u8]) -> Result<()> {
            self.rx.extend_from_slice(&self.reply);
            Ok(())
        }

        fn bytes_available(&mut self) -> Result<usize> {
            Ok(self.rx.len())
        }

        fn receive(&mut self, n: usize) -> Result<Vec<u8>> {
            Ok(self.rx.drain(..n.min(self.rx.len())).collect())
        }
    }

    #[test]
    fn read_returns_register_value() {
        let mut session = Session::new(SimDevice::new().with_register(0x10, 0xdead_beef));
        assert_eq!(session.read(0x10).unwrap(), 0xdead_beef);
        assert_eq!(session.state(), TransactionState::Completed);

        let cmd = session.transport().commands()[0];
        assert!(!cmd.is_write());
        assert_eq!(cmd.address(), 0x10);
    }

    #[test]
    fn write_stores_value() {
        let mut session = Session::new(SimDevice::new());
        session.write(0xfffe, 0x0102_0304).unwrap();
        assert_eq!(session.transport().register(0xfffe), Some(0x0102_0304));
        assert_eq!(session.transport_mut().bytes_available().unwrap(), 0);
    }

    #[test]
    fn write_verify_succeeds_on_echo() {
        let mut session = Session::new(SimDevice::new());
        session.write_verify(0x1234, 0xdead_beef).unwrap();
        assert_eq!(session.state(), TransactionState::Completed);
        assert_eq!(session.into_inner().commands().len(), 2);
    }

    #[test]
    fn write_verify_detects_mismatch() {
        let dev = SimDevice::new().with_register(0x1234, 0x1111_1111).with_read_only(0x1234);
        let mut session = Session::new(dev);
        match session.write_verify(0x1234, 0xdead_beef) {
            Err(Error::VerifyMismatch {
                address,
                written,
                read,
            }) => {
                assert_eq!(address, 0x1234);
                assert_eq!(written, 0xdead_beef);
                assert_eq!(read, 0x1111_1111);
            }
            other => panic!("unexpected: {:?}", other),
        }

        // a link that echoes something else entirely
        let mut session = Session::new(Scripted::new(ReplyFrame::encode(7).as_bytes()));
        assert!(matches!(
            session.write_verify(0x1234, 0xdead_beef),
            Err(Error::VerifyMismatch { read: 7, .. })
        ));
    }

    #[test]
    fn timeout_after_exact_poll_budget() {
        let mut session = Session::new(Silent::default());
        match session.read(0x20) {
            Err(Error::Timeout { operation, .. }) => assert_eq!(operation, Operation::Read),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(session.transport().polls, 10);
        assert_eq!(session.state(), TransactionState::TimedOut);

        let mut session = Session::with_poll_policy(Silent::default(), PollPolicy::iterations(3));
        assert!(matches!(
            session.write(0x20, 1),
            Err(Error::Timeout {
                operation: Operation::Write,
                ..
            })
        ));
        assert_eq!(session.transport().polls, 3);
        assert_eq!(session.transport().sent.len(), 1);
    }

    #[test]
    fn zero_budget_polls_once() {
        let mut session = Session::with_poll_policy(Silent::default(), PollPolicy::iterations(0));
        assert!(matches!(session.read(0), Err(Error::Timeout { .. })));
        assert_eq!(session.transport().polls, 1);
    }

    #[test]
    fn slow_reply_within_budget() {
        let mut session = Session::new(SimDevice::new().with_register(1, 99).with_latency(10));
        assert_eq!(session.read(1).unwrap(), 99);

        let mut session = Session::new(SimDevice::new().with_latency(11));
        assert!(matches!(session.read(1), Err(Error::Timeout { .. })));
    }

    #[test]
    fn deadline_timeout() {
        let timeout = Duration::from_millis(20);
        let mut session = Session::with_poll_policy(Silent::default(), PollPolicy::deadline(timeout));
        let started = Instant::now();
        assert!(matches!(session.read(0), Err(Error::Timeout { .. })));
        assert!(started.elapsed() >= timeout);
        assert!(session.transport().polls > 1);
    }

    #[test]
    fn deadline_reply() {
        let policy = PollPolicy::deadline(Duration::from_secs(5));
        let mut session =
            Session::with_poll_policy(SimDevice::new().with_register(3, 0x33).with_latency(4), policy);
        assert_eq!(session.read(3).unwrap(), 0x33);
    }

    #[test]
    fn corrupted_reply_fails() {
        let mut raw = ReplyFrame::encode(0x1234_5678).as_bytes().to_vec();
        raw[5] &= 0x7f;
        let mut session = Session::new(Scripted::new(&raw));
        assert!(matches!(session.read(0), Err(Error::Sequence { index: 5, .. })));
        assert_eq!(session.state(), TransactionState::Failed);

        // writes check the acknowledgment too
        assert!(matches!(session.write(0, 1), Err(Error::Sequence { index: 5, .. })));
    }

    #[test]
    fn short_receive_is_frame_error() {
        struct Short;
        impl Transport for Short {
            fn send(&mut self, _raw: &[u8]) -> Result<()> {
                Ok(())
            }
            fn bytes_available(&mut self) -> Result<usize> {
                Ok(FRAME_LEN)
            }
            fn receive(&mut self, _n: usize) -> Result<Vec<u8>> {
                Ok(vec![0x00, 0x80, 0x00])
            }
        }

        let mut session = Session::new(Short);
        assert!(matches!(
            session.read(0),
            Err(Error::FrameLength {
                expected: FRAME_LEN,
                actual: 3
            })
        ));
    }

    #[test]
    fn excess_bytes_stay_buffered() {
        let mut dev = SimDevice::new().with_register(5, 0x55);
        dev.inject(ReplyFrame::encode(0xaa).as_bytes());
        let mut session = Session::new(dev);
        // the stale reply is consumed first
        assert_eq!(session.read(5).unwrap(), 0xaa);
        assert_eq!(session.transport_mut().bytes_available().unwrap(), FRAME_LEN);
    }

    #[test]
    fn read_many_consecutive() {
        let dev = SimDevice::new().with_register(0xffff, 1).with_register(0, 2);
        let mut session = Session::new(dev);
        assert_eq!(session.read_many(0xffff, 3).unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn borrowed_transport() {
        let mut dev = SimDevice::new();
        Session::new(&mut dev).write(9, 9).unwrap();
        assert_eq!(dev.register(9), Some(9));
    }
}
