//! Link configuration, loaded from YAML and overridden from the command line.
use std::{fmt, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_POLL_COUNT;
use crate::error::{Error, Result};
use crate::transport::Baudrate;

/// How long a transaction waits for its 7 reply bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PollPolicy {
    /// Give up after `count` checks of the receive buffer. The wall-clock
    /// duration depends entirely on how fast the loop spins.
    Iterations { count: u32 },
    /// Give up once `timeout_ms` milliseconds have passed.
    Deadline { timeout_ms: u64 },
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy::Iterations {
            count: DEFAULT_POLL_COUNT,
        }
    }
}

impl PollPolicy {
    pub fn iterations(count: u32) -> Self {
        PollPolicy::Iterations { count }
    }

    pub fn deadline(timeout: Duration) -> Self {
        PollPolicy::Deadline {
            timeout_ms: timeout.as_millis().try_into().unwrap_or(u64::MAX),
        }
    }
}

impl fmt::Display for PollPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollPolicy::Iterations { count } => write!(f, "{} polls", count),
            PollPolicy::Deadline { timeout_ms } => write!(f, "{}ms", timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Serial port name; the first available port is used when unset.
    pub port: Option<String>,
    pub baudrate: Baudrate,
    pub poll: PollPolicy,
}

impl LinkConfig {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: LinkConfig =
            serde_yaml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let raw = std::fs::read_to_string(p)?;
        log::debug!("Loaded link config from {}", p.display());
        Self::from_yaml(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if let PollPolicy::Deadline { timeout_ms: 0 } = self.poll {
            return Err(Error::Config("deadline timeout must be non-zero".into()));
        }
        if matches!(&self.port, Some(port) if port.is_empty()) {
            return Err(Error::Config("empty port name".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = LinkConfig::from_yaml("{}").unwrap();
        assert_eq!(config, LinkConfig::default());
        assert_eq!(config.poll, PollPolicy::iterations(10));
        assert_eq!(u32::from(config.baudrate), 115200);
    }

    #[test]
    fn parse_iterations_policy() {
        let config = LinkConfig::from_yaml(
            "port: /dev/ttyUSB1\nbaudrate: 921600\npoll:\n  mode: iterations\n  count: 25\n",
        )
        .unwrap();
        assert_eq!(config.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.baudrate, Baudrate::Baud921600);
        assert_eq!(config.poll, PollPolicy::Iterations { count: 25 });
    }

    #[test]
    fn parse_deadline_policy() {
        let config = LinkConfig::from_yaml("poll:\n  mode: deadline\n  timeout_ms: 50\n").unwrap();
        assert_eq!(config.poll, PollPolicy::deadline(Duration::from_millis(50)));
        assert_eq!(config.poll.to_string(), "50ms");
    }

    #[test]
    fn reject_bad_values() {
        for raw in [
            "baudrate: 12345\n",
            "poll:\n  mode: deadline\n  timeout_ms: 0\n",
            "poll:\n  mode: forever\n",
            "port: ''\n",
            "parity: even\n",
        ] {
            assert!(
                matches!(LinkConfig::from_yaml(raw), Err(Error::Config(_))),
                "accepted {:?}",
                raw
            );
        }
    }
}
