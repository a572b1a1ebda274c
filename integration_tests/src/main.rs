//! End-to-end checks of a flashed LoRa gateway over its RS-485 link.
//!
//! The harness speaks the gateway's own frame format: every command goes to
//! the wired-side address and replies are matched by command ID, so forwarded
//! radio traffic and simulated reports on the same line are skipped.

mod device;
mod protocol;

use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use device::{resolve_port, DeviceClient};
use protocol::{CommandId, GATEWAY_ADDRESS};
use tests::{print_results, run_all_tests};

/// Mode code for relaying in both directions
const MODE_TX_RX: u8 = 0x03;

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Exercise the LoRa gateway command set over RS-485")]
struct Args {
    /// RS-485 adapter port ("auto" asks every port for its spread factor)
    #[arg(short, long, default_value = "auto")]
    port: String,

    /// Link baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,

    /// Quiet period before the first command, milliseconds
    #[arg(long, default_value = "1000")]
    settle_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let port = resolve_port(&args.port, args.baud)?;

    println!("{}", "LoRa Gateway Integration Tests".bold());
    println!("Port:    {} @ {} baud", port, args.baud);
    println!("Address: {:02X}/{:02X}", GATEWAY_ADDRESS.0, GATEWAY_ADDRESS.1);
    println!();

    let mut device = DeviceClient::new(&port, args.baud)?;

    // A relayed or simulated frame may be mid-flight on the bus
    std::thread::sleep(Duration::from_millis(args.settle_ms));
    device.clear_buffer()?;

    prepare(&mut device)?;
    println!("{}", "Gateway ready".green());

    println!("\nRunning tests...\n");
    let results = run_all_tests(&mut device);
    print_results(&results);

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }
    Ok(())
}

/// Stop any running simulation, restore two-way relaying and show the radio setup
fn prepare(device: &mut DeviceClient) -> anyhow::Result<()> {
    device.send_command(CommandId::TriggerSimulation, &[0x00])?;
    device.send_command(CommandId::SetOperationMode, &[MODE_TX_RX])?;

    let rx = device.send_command(CommandId::QueryRxFrequency, &[])?.as_f32()?;
    let tx = device.send_command(CommandId::QueryTxFrequency, &[])?.as_f32()?;
    let sf = device.send_command(CommandId::QuerySpreadFactor, &[])?.as_u8()?;
    let bw = device.send_command(CommandId::QueryBandwidth, &[])?.as_u8()?;
    let cr = device.send_command(CommandId::QueryCodingRate, &[])?.as_u8()?;
    println!(
        "Radio:   rx {} MHz, tx {} MHz, SF{}, bandwidth index {}, CR 4/{}",
        rx,
        tx,
        sf,
        bw,
        cr + 4
    );
    Ok(())
}
