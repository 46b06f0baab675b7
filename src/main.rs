use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use tokio::time::Duration;
use tracing::{debug, error, info, instrument, trace};
use tracing_subscriber::EnvFilter;
use zerproc_light::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address (or platform id) of the light; discovered when omitted
    #[arg(short, long, global = true)]
    address: Option<String>,

    /// Firmware family of the light
    #[arg(short, long, value_enum, global = true, default_value_t = Family::Kulersky)]
    protocol: Family,

    /// Re-establish a dropped link before each command
    #[arg(long, global = true)]
    auto_reconnect: bool,

    /// How long to wait for a state notification, in milliseconds
    #[arg(long, global = true, default_value_t = 5000)]
    timeout_ms: u64,

    /// How long to scan when discovering, in seconds
    #[arg(long, global = true, default_value_t = 10)]
    scan_secs: u64,

    /// Advertised name prefix used when discovering
    #[arg(long, global = true)]
    prefix: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum Family {
    /// KulerSky lights (state read directly)
    Kulersky,
    /// Zerproc / LEDBlue lights (state via notification)
    Zerproc,
}

impl From<Family> for Protocol {
    fn from(family: Family) -> Self {
        match family {
            Family::Kulersky => Protocol::KulerSky,
            Family::Zerproc => Protocol::Zerproc,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List nearby lights
    Discover,
    /// Turn the light on
    On,
    /// Turn the light off
    Off,
    /// Set custom RGB color
    Color {
        /// Red value (0-255)
        #[arg(short, long, default_value_t = 255, allow_negative_numbers = true)]
        red: i32,
        /// Green value (0-255)
        #[arg(short, long, default_value_t = 255, allow_negative_numbers = true)]
        green: i32,
        /// Blue value (0-255)
        #[arg(short, long, default_value_t = 255, allow_negative_numbers = true)]
        blue: i32,
    },
    /// Print the current state
    State,
    /// Demonstration of light features
    Demo {
        /// Duration of each demo step in seconds
        #[arg(short, long, default_value_t = 3)]
        duration: u64,
    },
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    // Initialize tracing with pretty colors
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("zerproc_light=info")),
        )
        .compact()
        .init();

    // Initialize color-eyre for pretty error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let transport = match BtleplugTransport::new().await {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!("Failed to initialize Bluetooth: {}", e);
            return Err(e.into());
        }
    };

    let protocol = Protocol::from(cli.protocol);
    let mut options = DiscoveryOptions::for_protocol(protocol)
        .with_scan_duration(Duration::from_secs(cli.scan_secs));
    if let Some(prefix) = &cli.prefix {
        options = options.with_name_prefix(prefix.as_str());
    }

    let command = cli.command.unwrap_or(Commands::State);
    if let Commands::Discover = command {
        let lights = discover(transport, &options).await?;
        for light in &lights {
            println!(
                "{} {} ({})",
                light.address(),
                light.name().unwrap_or("<unnamed>"),
                light.protocol()
            );
        }
        return Ok(());
    }

    let mut light = match &cli.address {
        Some(address) => Light::new(transport, address.as_str(), protocol),
        None => discover(transport, &options)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("No {} light found nearby", protocol))?,
    }
    .with_response_timeout(Duration::from_millis(cli.timeout_ms));

    light.connect(cli.auto_reconnect).await?;
    let result = run_command(&mut light, command).await;
    light.disconnect().await?;
    result
}

/// Executes one command against a connected light
#[instrument(skip(light))]
async fn run_command<T: Transport>(light: &mut Light<T>, command: Commands) -> Result<()> {
    match command {
        Commands::Discover => {}
        Commands::On => light.turn_on().await?,
        Commands::Off => light.turn_off().await?,
        Commands::Color { red, green, blue } => light.set_color(red, green, blue).await?,
        Commands::State => println!("{}", light.get_state().await?),
        Commands::Demo { duration } => run_demo(light, duration).await?,
    }
    Ok(())
}

/// Sleep for specified number of seconds
#[instrument]
async fn sleep(seconds: u64) {
    trace!("Sleeping for {}s", seconds);
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    trace!("Sleep completed");
}

/// Run a demonstration of the light's features
#[instrument(skip(light))]
async fn run_demo<T: Transport>(light: &mut Light<T>, duration: u64) -> Result<()> {
    info!("Running light demo with {}s intervals", duration);

    info!("Turning light off");
    light.turn_off().await?;
    sleep(duration).await;

    info!("Turning light on");
    light.turn_on().await?;
    sleep(duration).await;

    for (label, (r, g, b)) in [
        ("red", (255, 0, 0)),
        ("green", (0, 255, 0)),
        ("blue", (0, 0, 255)),
        ("white", (255, 255, 255)),
    ] {
        info!("Setting color to {}", label);
        light.set_color(r, g, b).await?;
        info!("Light reports {}", light.get_state().await?);
        sleep(duration).await;
    }

    info!("Turning light off to end demo");
    light.turn_off().await?;

    info!("Demo completed!");
    Ok(())
}
