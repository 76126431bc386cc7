//! Colour cycle example
//!
//! Steps the strip through a few colours until Ctrl+C, reading the raw
//! device state every 30 seconds.
//!
//! Run with: cargo run --example colour_cycle
//!
//! Colours can be given as hex:
//!   cargo run --example colour_cycle -- ff0000 00ff00 #0000ff

use bledom_rust_ble::{ColourCommand, Result, Session, SessionConfig};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,bledom_rust_ble=info")
        .init();

    println!("Colour Cycle");
    println!("============\n");

    let mut colours = std::env::args()
        .skip(1)
        .map(|arg| arg.parse::<ColourCommand>())
        .collect::<Result<Vec<_>>>()?;
    if colours.is_empty() {
        colours = vec![
            ColourCommand::new(0xFF, 0x00, 0x00),
            ColourCommand::new(0x00, 0xFF, 0x00),
            ColourCommand::new(0x00, 0x00, 0xFF),
        ];
    }

    println!("Looking for a controller...\n");

    let session = Session::new(SessionConfig::default()).await?;
    session.connect_default().await?;

    println!("Connected! Cycling colours.");
    println!("Press Ctrl+C to exit.\n");

    let _poller = session.register_poller(Duration::from_secs(30), |state: &[u8]| {
        println!("Device state: {:02X?}", state);
    })?;

    for colour in colours.iter().cycle() {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting...");
                break;
            }
            result = session.submit_command(*colour) => {
                result?;
                println!("Colour: {}", colour);
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting...");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }

    session.stop();
    session.wait_for_termination().await;
    println!("Session {}", session.state());

    Ok(())
}
