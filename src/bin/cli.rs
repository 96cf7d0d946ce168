//! Busview CLI - drive a simulated Modbus bus from the command line
//!
//! Runs an in-process bus, so no server is needed. Useful for scripting and
//! for reproducing a trace with a fixed seed.

use busview_core::cli::{
    format_function_table, format_outcome, format_packets, print_exit_codes, CliResult, ExitCodes,
    OutputFormat,
};
use busview_core::config::AppConfig;
use busview_core::core::logger::export_jsonl;
use busview_core::core::serial::mock_port_names;
use busview_core::{BusConfig, ModbusBus, Packet, SerialParams};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Busview CLI
#[derive(Parser, Debug)]
#[command(
    name = "busview-cli",
    author,
    version,
    about = "Simulated Modbus RTU bus with packet trace",
    long_about = None
)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Configuration file (TOML); bus settings are taken from it
    #[arg(short, long, env = "BUSVIEW_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Fixed random seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Skip simulated latency and delays
    #[arg(long, global = true)]
    fast: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List mock serial ports for this platform
    Scan,

    /// List Modbus function codes
    Functions,

    /// Connect and run repeated reads
    Simulate {
        /// Serial port name
        #[arg(short, long, default_value = "/dev/ttyUSB0")]
        port: String,

        /// Baud rate
        #[arg(short, long, default_value = "9600")]
        baud: u32,

        /// Device (slave) address
        #[arg(short, long, default_value = "1")]
        device: u8,

        /// Start address
        #[arg(short, long, default_value = "0")]
        address: u16,

        /// Number of values to read
        #[arg(short, long, default_value = "4")]
        length: u16,

        /// Function code (1-4)
        #[arg(long, default_value = "3")]
        function: u8,

        /// Number of reads
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,

        /// Also write the trace to this file as JSON lines
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Write one holding register and read it back
    Write {
        /// Serial port name
        #[arg(short, long, default_value = "/dev/ttyUSB0")]
        port: String,

        /// Device (slave) address
        #[arg(short, long, default_value = "1")]
        device: u8,

        /// Register address
        #[arg(short, long)]
        address: u16,

        /// Value to write
        #[arg(short, long)]
        value: u16,
    },

    /// Show exit codes
    ExitCodes,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(&cli).await;
    match result.message() {
        Some(msg) if result.is_success() => println!("{msg}"),
        Some(msg) => eprintln!("error: {msg}"),
        None => {}
    }
    result.to_exit_code()
}

async fn run(cli: &Cli) -> CliResult {
    match &cli.command {
        Commands::Scan => scan(cli),
        Commands::Functions => CliResult::success_with_message(format_function_table(cli.format)),
        Commands::ExitCodes => {
            print_exit_codes();
            CliResult::success()
        }
        Commands::Simulate {
            port,
            baud,
            device,
            address,
            length,
            function,
            count,
            export,
        } => {
            let bus = match build_bus(cli) {
                Ok(bus) => bus,
                Err(result) => return result,
            };
            let result = simulate(
                cli, &bus, port, *baud, *device, *address, *length, *function, *count,
            )
            .await;
            match export {
                Some(path) if result.is_success() => export_trace(&bus, path),
                _ => result,
            }
        }
        Commands::Write {
            port,
            device,
            address,
            value,
        } => {
            let bus = match build_bus(cli) {
                Ok(bus) => bus,
                Err(result) => return result,
            };
            write(cli, &bus, port, *device, *address, *value).await
        }
    }
}

fn build_bus(cli: &Cli) -> Result<ModbusBus, CliResult> {
    let mut config: BusConfig = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config.bus,
        Err(e) => return Err(CliResult::error(ExitCodes::CONFIG_ERROR, e.to_string())),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if cli.fast {
        config.latency.base_ms = 0;
        config.latency.max_ms = 0;
        config.connect_delay_ms = 0;
        config.disconnect_delay_ms = 0;
    }
    ModbusBus::with_mirror(config).map_err(CliResult::from)
}

fn scan(cli: &Cli) -> CliResult {
    let platform = std::env::consts::OS;
    let ports = mock_port_names(platform);
    match cli.format {
        OutputFormat::Text => CliResult::success_with_message(ports.join("\n")),
        OutputFormat::Json => CliResult::success_with_message(
            serde_json::json!({ "success": true, "ports": ports, "platform": platform })
                .to_string(),
        ),
    }
}

#[allow(clippy::too_many_arguments)]
async fn simulate(
    cli: &Cli,
    bus: &ModbusBus,
    port: &str,
    baud: u32,
    device: u8,
    address: u16,
    length: u16,
    function: u8,
    count: u32,
) -> CliResult {
    if let Err(e) = bus.connect(port, SerialParams::new(baud)).await {
        return e.into();
    }

    for _ in 0..count {
        match bus.read(device, function, address, length).await {
            Ok(outcome) => println!("{}", format_outcome(&outcome, cli.format)),
            Err(e) => return e.into(),
        }
    }

    println!("{}", format_packets(&oldest_first(bus), cli.format));

    bus.disconnect().await;
    CliResult::success()
}

// Oldest first reads more naturally in a terminal and in a file
fn oldest_first(bus: &ModbusBus) -> Vec<Packet> {
    let mut packets = bus.logs();
    packets.reverse();
    packets
}

fn export_trace(bus: &ModbusBus, path: &Path) -> CliResult {
    let packets = oldest_first(bus);
    match std::fs::write(path, export_jsonl(&packets)) {
        Ok(()) => CliResult::success_with_message(format!(
            "Exported {} packets to {}",
            packets.len(),
            path.display()
        )),
        Err(e) => e.into(),
    }
}

async fn write(
    cli: &Cli,
    bus: &ModbusBus,
    port: &str,
    device: u8,
    address: u16,
    value: u16,
) -> CliResult {
    if let Err(e) = bus.connect(port, SerialParams::default()).await {
        return e.into();
    }

    let written = match bus.write(device, address, value).await {
        Ok(outcome) => outcome,
        Err(e) => return e.into(),
    };
    if let Some(error) = &written.error {
        bus.disconnect().await;
        return CliResult::error(ExitCodes::BUS_FAULT, format!("write not applied: {error}"));
    }

    let readback = match bus.read(device, 3, address, 1).await {
        Ok(outcome) => outcome,
        Err(e) => return e.into(),
    };
    println!("{}", format_outcome(&readback, cli.format));

    bus.disconnect().await;
    CliResult::success()
}
