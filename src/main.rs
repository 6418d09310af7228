use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use fpgacmd::{
    LinkConfig, PollPolicy, Session, Transport,
    transport::{Baudrate, SerialTransport, SimDevice},
};

const DUMP_CHUNK: usize = 16;

#[derive(Parser)]
#[command(
    name = "fpgacmd",
    version,
    about = "Read and write FPGA registers over a serial link"
)]
struct Cli {
    /// YAML link configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
    /// Serial port, defaults to the first one found
    #[arg(long, short, global = true)]
    port: Option<String>,
    #[arg(long, short, global = true, value_enum)]
    baud: Option<Baudrate>,
    /// Reply poll budget, in iterations
    #[arg(long, global = true, conflicts_with = "timeout_ms")]
    polls: Option<u32>,
    /// Reply timeout in milliseconds, instead of a poll budget
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    /// Talk to an in-memory register file instead of a serial port
    #[arg(long, global = true)]
    simulate: bool,
    /// More logging, repeat for trace
    #[arg(long, short, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available serial ports
    List,
    /// Read a register
    Read {
        #[arg(value_parser = parse_address)]
        address: u16,
    },
    /// Write a register
    Write {
        #[arg(value_parser = parse_address)]
        address: u16,
        #[arg(value_parser = parse_u32)]
        data: u32,
        /// Read the register back and compare
        #[arg(long)]
        verify: bool,
    },
    /// Read a range of consecutive registers
    Dump {
        #[arg(value_parser = parse_address)]
        start: u16,
        #[arg(value_parser = parse_u32)]
        count: u32,
    },
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim().replace('_', "");
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {:?}: {}", s, e))
}

fn parse_address(s: &str) -> Result<u16, String> {
    let value = parse_u32(s)?;
    u16::try_from(value).map_err(|_| format!("address 0x{:x} exceeds 16 bits", value))
}

impl Cli {
    fn link_config(&self) -> Result<LinkConfig> {
        let mut config = match &self.config {
            Some(path) => LinkConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => LinkConfig::default(),
        };
        if let Some(port) = &self.port {
            config.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.baudrate = baud;
        }
        if let Some(count) = self.polls {
            config.poll = PollPolicy::iterations(count);
        }
        if let Some(ms) = self.timeout_ms {
            config.poll = PollPolicy::deadline(Duration::from_millis(ms));
        }
        config.validate()?;
        Ok(config)
    }

    fn session(&self) -> Result<Session<Box<dyn Transport>>> {
        let config = self.link_config()?;
        open_session(&config, self.simulate)
    }

    fn log_level(&self) -> simplelog::LevelFilter {
        match (self.quiet, self.verbose) {
            (true, _) => simplelog::LevelFilter::Warn,
            (false, 0) => simplelog::LevelFilter::Info,
            (false, 1) => simplelog::LevelFilter::Debug,
            _ => simplelog::LevelFilter::Trace,
        }
    }
}

fn open_session(config: &LinkConfig, simulate: bool) -> Result<Session<Box<dyn Transport>>> {
    let transport: Box<dyn Transport> = if simulate {
        log::info!("Using simulated device");
        Box::new(SimDevice::new())
    } else {
        Box::new(SerialTransport::from_config(config).context("opening serial port")?)
    };
    log::debug!("Reply timeout: {}", config.poll);
    Ok(Session::with_poll_policy(transport, config.poll))
}

fn dump<T: Transport>(session: &mut Session<T>, start: u16, count: usize) -> Result<()> {
    let pb = ProgressBar::new(count as u64);
    pb.set_style(ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} registers",
    )?);

    let mut values = Vec::with_capacity(count);
    let mut address = start;
    while values.len() < count {
        let n = DUMP_CHUNK.min(count - values.len());
        let chunk = session
            .read_many(address, n)
            .with_context(|| format!("reading from 0x{:04x}", address))?;
        values.extend(chunk);
        address = address.wrapping_add(n as u16);
        pb.inc(n as u64);
    }
    pb.finish_and_clear();

    for (i, row) in values.chunks(4).enumerate() {
        let base = start.wrapping_add((i * 4) as u16);
        let words: Vec<String> = row.iter().map(|v| format!("{:08x}", v)).collect();
        println!("{:04x}: {}", base, words.join(" "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = simplelog::TermLogger::init(
        cli.log_level(),
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    match &cli.command {
        Command::List => {
            let ports = SerialTransport::scan_ports()?;
            if ports.is_empty() {
                log::warn!("No serial ports found");
            }
            for port in ports {
                println!("{}", port);
            }
        }
        Command::Read { address } => {
            let mut session = cli.session()?;
            let value = session.read(*address)?;
            println!("0x{:04x} = 0x{:08x}", address, value);
        }
        Command::Write {
            address,
            data,
            verify,
        } => {
            let mut session = cli.session()?;
            if *verify {
                session.write_verify(*address, *data)?;
                log::info!("Verified 0x{:04x} = 0x{:08x}", address, data);
            } else {
                session.write(*address, *data)?;
                log::info!("Wrote 0x{:04x} = 0x{:08x}", address, data);
            }
        }
        Command::Dump { start, count } => {
            let mut session = cli.session()?;
            dump(&mut session, *start, *count as usize)?;
        }
    }

    Ok(())
}
