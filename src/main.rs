use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use mdp_p906_lib::serialport::SerialTransport;
use mdp_p906_lib::session::{P906, DEFAULT_MATCH_RETRIES};
use std::{ops::Deref, panic, time::Duration};

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Discover an un-dispatched P906 on the broadcast channel and assign it
    /// this address/channel
    Match,
    /// Connect and show device status plus recent corrected ADC readings
    Get {
        /// The P906's identity code, 8 hex digits (learned via 'match')
        #[arg(short = 'I', long)]
        idcode: String,
    },
    /// Set the output voltage in volts (0.0 - 30.0)
    SetVoltage {
        /// The P906's identity code, 8 hex digits
        #[arg(short = 'I', long)]
        idcode: String,
        volts: f64,
    },
    /// Set the output current limit in amps (0.0 - 10.0, exclusive)
    SetCurrent {
        /// The P906's identity code, 8 hex digits
        #[arg(short = 'I', long)]
        idcode: String,
        amps: f64,
    },
    /// Switch the output on or off
    Switch {
        /// The P906's identity code, 8 hex digits
        #[arg(short = 'I', long)]
        idcode: String,
        /// Turn the output on. If this flag is not present, it will be turned off.
        #[clap(long, short, action)]
        enable: bool,
    },
}

const fn about_text() -> &'static str {
    "MDP-P906 power module command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
struct CliArgs {
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// Serial port of the nRF24 AT adapter (e.g., /dev/ttyUSB0 on Linux, COM1 on Windows)
    #[arg(short, long, default_value_t = default_device_name())]
    device: String,

    /// 5-byte radio rx/tx address, 10 hex digits
    #[arg(short, long, default_value = "153614fae1")]
    addr: String,

    /// Radio channel (0-78)
    #[arg(short, long, default_value_t = 50)]
    channel: u8,

    #[command(subcommand)]
    command: CliCommands,

    /// Timeout for serial I/O operations (e.g., "500ms", "1s")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "500ms")]
    timeout: Duration,

    /// Number of reply lines to read before giving up on an exchange
    #[arg(long, default_value = "3")]
    retries: usize,
}

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

fn connected_session(
    args: &CliArgs,
    idcode: &str,
) -> Result<P906<SerialTransport>> {
    let mut transport = SerialTransport::open(&args.device, args.timeout)
        .with_context(|| format!("Cannot open serial port '{}'", args.device))?;
    transport.wait_ready();
    let mut p906 = P906::new(transport, &args.addr, args.channel, Some(idcode))?;
    p906.set_retries(args.retries);
    p906.connect().with_context(|| "Cannot connect to device")?;
    Ok(p906)
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());

    match &args.command {
        CliCommands::Match => {
            let mut transport = SerialTransport::open(&args.device, args.timeout)
                .with_context(|| format!("Cannot open serial port '{}'", args.device))?;
            transport.wait_ready();
            let mut p906 = P906::new(transport, &args.addr, args.channel, None)?;
            p906.set_retries(args.retries);
            match p906.auto_match(DEFAULT_MATCH_RETRIES)? {
                Some(idcode) => println!(
                    "Matched P906 {} on channel {}, set addr to {}",
                    idcode, args.channel, args.addr
                ),
                None => bail!("No device answered the broadcast call"),
            }
        }
        CliCommands::Get { idcode } => {
            let mut p906 = connected_session(&args, idcode)?;
            let readings = p906.get_realtime()?;
            println!("Status: {:?}", p906.status());
            match readings {
                Some(readings) => println!("Recent ADC readings (mV/mA): {:?}", readings),
                None => println!("Device temporarily unreachable, no realtime data"),
            }
        }
        CliCommands::SetVoltage { idcode, volts } => {
            let mut p906 = connected_session(&args, idcode)?;
            match p906.set_voltage(*volts)? {
                Some(telemetry) => println!("Voltage set: {:?}", telemetry),
                None => bail!("Device temporarily unreachable"),
            }
        }
        CliCommands::SetCurrent { idcode, amps } => {
            let mut p906 = connected_session(&args, idcode)?;
            match p906.set_current(*amps)? {
                Some(telemetry) => println!("Current set: {:?}", telemetry),
                None => bail!("Device temporarily unreachable"),
            }
        }
        CliCommands::Switch { idcode, enable } => {
            let mut p906 = connected_session(&args, idcode)?;
            match p906.set_switch(*enable)? {
                Some(telemetry) => println!(
                    "Output switched {}: {:?}",
                    if *enable { "on" } else { "off" },
                    telemetry
                ),
                None => bail!("Device temporarily unreachable"),
            }
        }
    }

    Ok(())
}
