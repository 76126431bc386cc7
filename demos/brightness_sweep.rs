//! Brightness sweep example
//!
//! Sets a colour, then ramps brightness from 0 to 100 and back once.
//!
//! Run with: cargo run --example brightness_sweep

use bledom_rust_ble::{BrightnessCommand, ColourCommand, Result, Session, SessionConfig};
use std::io::Write;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (minimal)
    tracing_subscriber::fmt().with_env_filter("warn").init();

    println!("Brightness Sweep");
    println!("================\n");

    let config = SessionConfig::default()
        .with_scan_timeout(Duration::from_secs(20))
        .with_write_error_limit(10);
    let session = Session::new(config).await?;

    let mut errors = session.subscribe_errors();
    tokio::spawn(async move {
        while let Ok(error) = errors.recv().await {
            eprintln!("{:?} failed: {}", error.kind, error.message);
        }
    });

    session.connect_default().await?;
    println!("Connected!\n");

    session
        .submit_command(ColourCommand::new(0xFF, 0xFF, 0xFF))
        .await?;

    let up = (0..=100u8).step_by(5);
    let down = (0..100u8).step_by(5).rev();
    for level in up.chain(down) {
        session.submit_command(BrightnessCommand::new(level)).await?;
        print!("\rBrightness: {:3}%", level);
        let _ = std::io::stdout().flush();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    println!();

    session.stop();
    session.wait_for_termination().await;

    Ok(())
}
