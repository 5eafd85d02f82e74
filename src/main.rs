//! ascii-reel: streams looping text-art animations over raw TCP.
//!
//! Point a telnet client at the server and it plays the frames found in
//! the configured directory, in file name order, until the client
//! disconnects.
//!
//! Features:
//! - Eager (in-memory) or lazy (read per tick) frame loading
//! - Independent playback cursor per connection
//! - Configuration via CLI arguments, environment or TOML file

mod config;
mod frames;
mod server;
mod session;

use config::Config;
use frames::FrameSource;
use server::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        frame_dir = %config.frame_dir.display(),
        load_mode = ?config.load_mode,
        tick_ms = config.tick_ms,
        "Starting ascii-reel server"
    );

    // An unreadable frame directory is fatal in both modes
    let source = FrameSource::load(&config.frame_dir, config.frame_extension(), config.load_mode)?;
    if source.is_empty() {
        warn!(
            dir = %config.frame_dir.display(),
            extension = config.frame_extension(),
            "No frames found, clients will see the placeholder"
        );
    }

    let runtime = build_runtime(config.workers)?;
    let server = Server::new(config, source);
    runtime.block_on(server.run())?;
    Ok(())
}

/// Multi-threaded runtime; `workers` defaults to the number of CPU cores.
fn build_runtime(workers: Option<usize>) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("ascii-reel-worker");
    if let Some(workers) = workers {
        builder.worker_threads(workers.max(1));
    }
    builder.build()
}
