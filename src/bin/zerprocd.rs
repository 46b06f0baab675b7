use std::sync::Arc;
use std::{env, io};

use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;
use zerproc_light::{BtleplugTransport, Light, Protocol, Transport};

const USAGE: &str = "Usage: zerprocd <id/mac address> [kulersky|zerproc]";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .compact()
        .init();
    color_eyre::install()?;

    // Get a target id/mac address from command line arguments.
    // If not provided, exit.
    let args: Vec<_> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    if args[1] == "-h" || args[1] == "--help" {
        eprintln!("{USAGE}");
        std::process::exit(0);
    }
    let protocol = match args.get(2).map(String::as_str) {
        None | Some("kulersky") => Protocol::KulerSky,
        Some("zerproc") => Protocol::Zerproc,
        Some(other) => {
            eprintln!("ERR Unknown protocol: {other}\n{USAGE}");
            std::process::exit(1);
        }
    };

    let transport = Arc::new(BtleplugTransport::new().await?);
    let mut light = Light::new(transport, args[1].as_str(), protocol);
    light.connect(true).await?;

    // Inform about successful initialization
    println!("OK");

    // Mainloop: wait for user input, line by line, until stdin closes or Ctrl-C
    let (lines_tx, mut lines_rx) = tokio::sync::mpsc::channel::<String>(1);
    std::thread::spawn(move || {
        for line in io::stdin().lines().map_while(std::result::Result::ok) {
            if lines_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    loop {
        let line = tokio::select! {
            line = lines_rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        match handle_line(&mut light, line.trim()).await {
            Ok(Some(reply)) => println!("OK {reply}"),
            Ok(None) => println!("OK"),
            Err(message) => eprintln!("ERR {message}"),
        }
    }

    light.disconnect().await?;
    Ok(())
}

/// Runs one `command[:args]` line, returning an optional reply
async fn handle_line<T: Transport>(
    light: &mut Light<T>,
    line: &str,
) -> std::result::Result<Option<String>, String> {
    let mut cmd = line.split(':');
    match cmd.next() {
        Some("turn_on") => light.turn_on().await.map(|_| None).map_err(|e| e.to_string()),
        Some("turn_off") => light.turn_off().await.map(|_| None).map_err(|e| e.to_string()),
        Some("set_color") => {
            let rgb = cmd
                .next()
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().parse::<i32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| "Invalid color format. Use R,G,B (e.g., 255,0,0 for red)".to_string())?;
            let [r, g, b] = rgb[..] else {
                return Err("Invalid color format. Use R,G,B (e.g., 255,0,0 for red)".to_string());
            };
            light
                .set_color(r, g, b)
                .await
                .map(|_| None)
                .map_err(|e| e.to_string())
        }
        Some("get_state") => light
            .get_state()
            .await
            .map(|state| Some(state.to_string()))
            .map_err(|e| e.to_string()),
        Some("") | None => Err("No command given".to_string()),
        Some(other) => Err(format!("Unknown command: {other}")),
    }
}
