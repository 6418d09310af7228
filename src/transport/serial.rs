//! Serial Transportation.
use std::{
    fmt::Display,
    io::{Read, Write},
    time::Duration,
};

use clap::{ValueEnum, builder::PossibleValue};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;

use super::Transport;
use crate::config::LinkConfig;
use crate::constants::SERIAL_TIMEOUT_MS;
use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Baudrate {
    Baud9600,
    #[default]
    Baud115200,
    Baud921600,
    Baud1m,
    Baud2m,
    Baud3m,
}

impl From<Baudrate> for u32 {
    fn from(value: Baudrate) -> Self {
        match value {
            Baudrate::Baud9600 => 9600,
            Baudrate::Baud115200 => 115200,
            Baudrate::Baud921600 => 921600,
            Baudrate::Baud1m => 1000000,
            Baudrate::Baud2m => 2000000,
            Baudrate::Baud3m => 3000000,
        }
    }
}

impl TryFrom<u32> for Baudrate {
    type Error = String;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        Baudrate::value_variants()
            .iter()
            .copied()
            .find(|b| u32::from(*b) == value)
            .ok_or_else(|| format!("unsupported baudrate {}", value))
    }
}

impl Display for Baudrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u32::from(*self))
    }
}

impl ValueEnum for Baudrate {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Baudrate::Baud9600,
            Baudrate::Baud115200,
            Baudrate::Baud921600,
            Baudrate::Baud1m,
            Baudrate::Baud2m,
            Baudrate::Baud3m,
        ]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        match self {
            Baudrate::Baud9600 => Some(PossibleValue::new("Baud9600").aliases(["9600"])),
            Baudrate::Baud115200 => Some(PossibleValue::new("Baud115200").aliases(["115200"])),
            Baudrate::Baud921600 => Some(PossibleValue::new("Baud921600").aliases(["921600"])),
            Baudrate::Baud1m => {
                Some(PossibleValue::new("Baud1m").aliases(["1000000", "1_000_000", "1m"]))
            }
            Baudrate::Baud2m => {
                Some(PossibleValue::new("Baud2m").aliases(["2000000", "2_000_000", "2m"]))
            }
            Baudrate::Baud3m => {
                Some(PossibleValue::new("Baud3m").aliases(["3000000", "3_000_000", "3m"]))
            }
        }
    }
}

pub struct SerialTransport {
    serial_port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn scan_ports() -> Result<Vec<String>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    pub fn open(port: &str, baudrate: Baudrate) -> Result<Self> {
        log::info!("Opening serial port: \"{}\" @ {} baud", port, baudrate);
        let port = serialport::new(port, baudrate.into())
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
            .open()?;
        Ok(SerialTransport { serial_port: port })
    }

    pub fn open_nth(nth: usize, baudrate: Baudrate) -> Result<Self> {
        let ports = serialport::available_ports()?;

        match ports.get(nth) {
            Some(port) => Self::open(&port.port_name, baudrate),
            None => Err(Error::Serial(serialport::Error::new(
                serialport::ErrorKind::NoDevice,
                format!("no serial port found at index #{}", nth),
            ))),
        }
    }

    pub fn open_any(baudrate: Baudrate) -> Result<Self> {
        Self::open_nth(0, baudrate)
    }

    /// Open the configured port, or the first one found when none is named.
    pub fn from_config(config: &LinkConfig) -> Result<Self> {
        config.validate()?;
        match &config.port {
            Some(port) => Self::open(port, config.baudrate),
            None => Self::open_any(config.baudrate),
        }
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, raw: &[u8]) -> Result<()> {
        self.serial_port.write_all(raw)?;
        self.serial_port.flush()?;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.serial_port.bytes_to_read()? as usize)
    }

    fn receive(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.serial_port.read_exact(&mut buf)?;
        Ok(buf)
    }
}
