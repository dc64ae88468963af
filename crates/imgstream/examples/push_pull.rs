//! Push a tiled volume to a listening receiver, then pull it back from a server.
//!
//! Run with:
//!   cargo run -p imgstream --example push-pull
//!
//! Set `IMGSTREAM_LOG=debug` to see per-message transport events.

use std::thread;
use std::time::Duration;

use imgstream::codec::{
    ArrayDescriptor, ElementType, Image, Layout, Metadata, RawArray, TracingProgress,
};
use imgstream::TransferOptions;
use tracing::level_filters::LevelFilter;

const PUSH_PORT: u16 = 47017;
const PULL_PORT: u16 = 47018;

fn init_logging() {
    let level = match std::env::var("IMGSTREAM_LOG").as_deref() {
        Ok("trace") => LevelFilter::TRACE,
        Ok("debug") => LevelFilter::DEBUG,
        Ok("warn") => LevelFilter::WARN,
        Ok("error") => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let desc = ArrayDescriptor::new(
        vec![256, 128, 8],
        ElementType::UInt16,
        Layout::Tiled(vec![64, 64, 8]),
    );
    let volume = Image::from_fn(desc, |p| ((p[0] ^ p[1]) + 16 * p[2]) as f64)?
        .with_metadata(Metadata::new("xor-phantom", "push-pull example", 12));

    let options = TransferOptions::default()
        .with_timeout_secs(10)
        .with_progress(TracingProgress);

    // Push: receiver listens, sender dials.
    let recv_options = options.clone();
    let receiver = thread::spawn(move || imgstream::receive(PUSH_PORT, &recv_options));
    let sent = imgstream::send(&volume, &format!("localhost:{PUSH_PORT}"), &options)?;
    let pushed = receiver.join().map_err(|_| "receiver thread panicked")??;
    eprintln!("pushed {sent} bytes, identical: {}", pushed == volume);

    // Pull: sender listens, receiver dials.
    let served = volume.clone();
    let serve_options = options.clone();
    let server = thread::spawn(move || imgstream::serve(&served, PULL_PORT, &serve_options));
    thread::sleep(Duration::from_millis(100));
    let pulled = imgstream::request(&format!("tcp://localhost:{PULL_PORT}"), &options)?;
    server.join().map_err(|_| "server thread panicked")??;
    eprintln!("pulled {}, identical: {}", pulled.descriptor(), pulled == volume);

    Ok(())
}
