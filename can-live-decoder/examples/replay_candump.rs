//! Standalone candump replay tool
//!
//! Replays a candump log through the listener and prints every decoded
//! result as it is delivered on the main thread.
//!
//! Usage:
//!   replay_candump <trace.log> [--realtime]
//!
//! Example:
//!   candump -L vcan0 > drive.log
//!   replay_candump drive.log --realtime

use can_live_decoder::{CandumpReplay, Listener, ListenerConfig, ResultChannel, ResultCode};
use std::env;
use std::path::PathBuf;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1).map(PathBuf::from) else {
        eprintln!("Usage: {} <trace.log> [--realtime]", args[0]);
        std::process::exit(1);
    };
    let realtime = args.iter().any(|a| a == "--realtime");

    let channel = ResultChannel::new();
    let receiver = channel.subscribe();

    let transport = CandumpReplay::from_path(&path).with_realtime(realtime);
    let mut listener = Listener::new(transport, channel).with_config(ListenerConfig::new());

    if let Err(e) = listener.start() {
        eprintln!("Failed to start listener: {}", e);
        std::process::exit(1);
    }

    // The replay closes at end of file; keep draining until the loop has exited
    loop {
        match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(delivery) => match delivery.code {
                ResultCode::Success => println!(
                    "{} {:<20} {:>8} {}",
                    delivery.response.timestamp().format("%H:%M:%S%.3f"),
                    delivery
                        .response
                        .frame_id()
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                    delivery.response.value().unwrap_or_default(),
                    delivery
                        .response
                        .indicators()
                        .map(|m| format!("{:?}", m))
                        .unwrap_or_default()
                ),
                ResultCode::Error => {
                    eprintln!("ERROR {}", delivery.response.error().unwrap_or("unknown"))
                }
            },
            Err(_) if listener.is_finished() => break,
            Err(_) => continue,
        }
    }

    let stats = listener.wait();
    println!("\n=== REPLAY SUMMARY ===");
    println!("Frames received:    {}", stats.frames_received);
    println!("Frames decoded:     {}", stats.frames_decoded);
    println!("Unsupported frames: {}", stats.frames_unsupported);
    println!("Malformed frames:   {}", stats.frames_malformed);
    println!("Transport errors:   {}", stats.transport_errors);
}
