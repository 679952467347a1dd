//! Demo binary driving one [`Session`] over a UDP socket.
//!
//! The real encoder and signaling transport are external collaborators
//! specified only by interface; this binary stands in for both with a
//! synthetic frame source so the interceptor chain can be exercised
//! end-to-end against a real socket.

mod config;
mod diagnostics;
mod session;

use clap::Parser;
use config::{ClientConfig, CodecConfig};
use rand::Rng;
use session::{PacingMode, Session};
use shared::error::{Error, Result};
use std::net::UdpSocket;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "session")]
#[command(author = "Rusty Rain <y@ngr.tc>")]
#[command(version = "0.1.0")]
#[command(about = "Sender-side media transport session runtime", long_about = None)]
struct Cli {
    /// Path to the client config JSON; created with defaults if absent.
    #[arg(long, default_value = "client.json")]
    config: PathBuf,

    /// Local address to bind the UDP socket to.
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: String,

    /// Disable the leaky-bucket pacer and send packets immediately.
    #[arg(long)]
    no_pacing: bool,

    /// Directory to write the optional diagnostic CSV traces into.
    #[arg(long)]
    diagnostics_dir: Option<PathBuf>,
}

/// Synthetic stand-in for the encoder: fills a payload of a size consistent
/// with the codec's target bitrate and frame rate with random bytes.
struct FrameSource {
    rng: rand::rngs::ThreadRng,
    bytes_per_frame: usize,
    timestamp: u32,
    ticks_per_frame: u32,
}

impl FrameSource {
    fn new(codec: &CodecConfig) -> Self {
        let bytes_per_frame =
            (codec.initial_bitrate as f64 / 8.0 / codec.frame_rate as f64).max(1.0) as usize;
        let ticks_per_frame =
            (config::Codec::CLOCK_RATE as f64 / codec.frame_rate as f64).max(1.0) as u32;
        Self {
            rng: rand::rng(),
            bytes_per_frame,
            timestamp: 0,
            ticks_per_frame,
        }
    }

    fn next_frame(&mut self) -> (Vec<u8>, u32) {
        let mut payload = vec![0u8; self.bytes_per_frame];
        self.rng.fill(payload.as_mut_slice());
        let ts = self.timestamp;
        self.timestamp = self.timestamp.wrapping_add(self.ticks_per_frame);
        (payload, ts)
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let client_config: ClientConfig = config::load(&cli.config)?;
    config::save(&cli.config, &client_config)?;

    let socket = UdpSocket::bind(&cli.bind)?;
    let local_addr = socket.local_addr()?;
    let peer_addr = client_config
        .addr
        .parse()
        .map_err(|_| Error::ErrInvalidAddr(client_config.addr.clone()))?;
    socket.connect(peer_addr)?;

    log::info!("bound {local_addr}, sending to {peer_addr}");

    let pacing_mode = if cli.no_pacing {
        PacingMode::Disabled
    } else {
        PacingMode::LeakyBucket
    };

    let local_ssrc = rand::random::<u32>();
    let codec = client_config.session_config.codec_config;
    let mut session = Session::new(
        socket,
        local_addr,
        peer_addr,
        local_ssrc,
        codec,
        pacing_mode,
        cli.diagnostics_dir.as_deref(),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })
    .map_err(|e| Error::Other(e.to_string()))?;

    let mut frame_source = FrameSource::new(&codec);
    let frame_interval = Duration::from_secs_f32(1.0 / codec.frame_rate.max(1.0));
    let mut next_frame_at = Instant::now();

    log::info!("streaming at {} fps, press ctrl-c to stop", codec.frame_rate);

    while running.load(Ordering::SeqCst) {
        while session.poll_rtcp_socket()? {}

        let now = Instant::now();
        if now >= next_frame_at {
            next_frame_at = now + frame_interval;
            let (payload, timestamp) = frame_source.next_frame();
            session.send_packet(payload.into(), true, timestamp)?;
        }

        session.tick(now)?;

        let deadline = session
            .poll_timeout()
            .unwrap_or(now + Duration::from_millis(5))
            .min(next_frame_at);
        let sleep_for = deadline.saturating_duration_since(Instant::now());
        if sleep_for > Duration::ZERO {
            std::thread::sleep(sleep_for.min(Duration::from_millis(20)));
        }
    }

    session.close()
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        log::error!("session exited: {e}");
        std::process::exit(1);
    }
}
