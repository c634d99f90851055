use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mihome_rs::logging::{log_debug, log_error, log_warn};
use mihome_rs::radio::hal::{RaspberryPiGpio, RaspberryPiSpi};
use mihome_rs::{
    init_logger, log_info, open_gateway, ActivityLed, GatewayConfig, MiHome, Product, RadioMode,
    ResetPin,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "mihome-cli")]
#[command(about = "Energenie MiHome gateway on an RFM69")]
struct Cli {
    /// JSON gateway configuration; built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print decoded messages as JSON lines
    Listen {
        #[arg(short, long, default_value = "monitor")]
        mode: String,
        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,
    },
    On {
        product: String,
        /// Sensor id or OOK house address, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_id)]
        sensor: u32,
    },
    Off {
        product: String,
        #[arg(value_parser = parse_id)]
        sensor: u32,
    },
    /// Read the RFM69 die temperature
    Temperature,
}

fn parse_id(s: &str) -> std::result::Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid id '{}': {}", s, e))
}

fn parse_mode(s: &str) -> Result<RadioMode> {
    match s.to_ascii_lowercase().as_str() {
        "monitor" => Ok(RadioMode::Monitor),
        "control" => Ok(RadioMode::Control),
        other => bail!("unknown mode '{}', expected monitor or control", other),
    }
}

async fn open(config: &GatewayConfig) -> Result<MiHome<RaspberryPiSpi>> {
    let spi = RaspberryPiSpi::new(config.spi_bus, config.spi_slave, config.spi_speed_hz)
        .context("opening SPI")?;
    let reset = match config.reset_pin {
        Some(pin) => Some(ResetPin::new(
            Box::new(RaspberryPiGpio::new().context("opening GPIO")?),
            pin,
        )),
        None => None,
    };
    let led = match config.tx_led_pin {
        Some(pin) => Some(ActivityLed::new(
            Box::new(RaspberryPiGpio::new().context("opening GPIO")?),
            pin,
        )?),
        None => None,
    };
    open_gateway(spi, reset, config, led)
        .await
        .context("starting gateway")
}

async fn listen(gateway: &MiHome<RaspberryPiSpi>, seconds: Option<u64>) -> Result<()> {
    let mut events = gateway.subscribe();
    let deadline = seconds.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));
    loop {
        let next = match deadline {
            Some(at) => match tokio::time::timeout_at(at, events.recv()).await {
                Ok(next) => next,
                Err(_) => return Ok(()),
            },
            None => tokio::select! {
                next = events.recv() => next,
                _ = tokio::signal::ctrl_c() => return Ok(()),
            },
        };
        match next {
            Ok(message) => println!("{}", serde_json::to_string(&message)?),
            Err(RecvError::Lagged(n)) => log_warn(&format!("Dropped {} messages", n)),
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        log_error(&format!("{:#}", e));
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::default(),
    };
    log_debug(&format!("Gateway configuration: {:?}", config));

    match cli.command {
        Commands::Listen { mode, seconds } => {
            config.initial_mode = parse_mode(&mode)?;
            let gateway = open(&config).await?;
            listen(&gateway, seconds).await?;
            gateway.close().await?;
        }
        Commands::On { product, sensor } => {
            let product: Product = product.parse()?;
            config.initial_mode = RadioMode::None;
            let gateway = open(&config).await?;
            gateway.request_switch_on(product, sensor).await?;
            log_info(&format!("{} 0x{:X} switched on", product, sensor));
        }
        Commands::Off { product, sensor } => {
            let product: Product = product.parse()?;
            config.initial_mode = RadioMode::None;
            let gateway = open(&config).await?;
            gateway.request_switch_off(product, sensor).await?;
            log_info(&format!("{} 0x{:X} switched off", product, sensor));
        }
        Commands::Temperature => {
            config.initial_mode = RadioMode::None;
            let gateway = open(&config).await?;
            let celsius = gateway.measure_temperature().await?;
            println!("{} °C", celsius);
        }
    }

    Ok(())
}
