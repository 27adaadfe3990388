//! Relay server demo with a synthetic camera and a mock AI engine
//!
//! Run with: cargo run --example relay_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example relay_server                    # binds to 0.0.0.0:8800
//!   cargo run --example relay_server 127.0.0.1:9000     # binds to 127.0.0.1:9000
//!
//! ## Reading frames
//!
//!   curl -i http://localhost:8800/synthetic             # latest annotated frame
//!   curl http://localhost:8800/synthetic/annotation     # its annotation
//!   curl http://localhost:8800/_status                  # channel statistics
//!
//! ## Publishing frames
//!
//!   curl -X POST -H 'Content-Type: image/jpeg' --data-binary @photo.jpg \
//!        http://localhost:8800/cam1
//!
//! The synthetic camera produces 10 fps while the mock engine takes 250ms per
//! frame, so most captures are dropped while inference is busy. Every 100
//! frames the camera reports end-of-stream and the pipeline reconnects it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use frame_broker::pipeline::{EngineError, FrameSink, SourceParams, VideoSource};
use frame_broker::{Broker, BrokerServer, Encoding, ServerConfig};

/// Minimal JPEG header (SOI, SOF0 for 320x240, SOS) the demo frames start with
const FRAME_HEADER: [u8; 25] = [
    0xFF, 0xD8, // SOI
    0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0xF0, 0x01, 0x40, 0x01, 0x01, 0x11, 0x00, // SOF0
    0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, // SOS
];

/// Emits numbered frames from its own thread
struct SyntheticCamera {
    sink: Option<FrameSink>,
    playing: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    interval: Duration,
}

impl SyntheticCamera {
    fn new() -> Self {
        Self {
            sink: None,
            playing: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            thread: None,
            interval: Duration::from_millis(100),
        }
    }
}

impl VideoSource for SyntheticCamera {
    fn init(&mut self, params: &SourceParams, sink: FrameSink) -> frame_broker::Result<()> {
        let fps = params.framerate.num.max(1) / params.framerate.den.max(1);
        self.interval = Duration::from_millis(1000 / u64::from(fps.max(1)));
        self.sink = Some(sink);
        self.stopped.store(false, Ordering::Release);
        Ok(())
    }

    fn play(&mut self) -> frame_broker::Result<()> {
        self.playing.store(true, Ordering::Release);
        if self.thread.is_some() {
            return Ok(());
        }

        let sink = self
            .sink
            .clone()
            .ok_or_else(|| frame_broker::Error::InvalidArgument("camera not initialized".into()))?;
        let playing = Arc::clone(&self.playing);
        let stopped = Arc::clone(&self.stopped);
        let interval = self.interval;

        self.thread = Some(std::thread::spawn(move || {
            let mut counter: u64 = 0;
            while !stopped.load(Ordering::Acquire) {
                std::thread::sleep(interval);
                if !playing.load(Ordering::Acquire) {
                    continue;
                }

                counter += 1;
                if counter % 100 == 0 {
                    sink.on_end_of_stream();
                    return;
                }

                let mut frame = FRAME_HEADER.to_vec();
                frame.extend_from_slice(&counter.to_be_bytes());
                frame.extend_from_slice(&[0xFF, 0xD9]);
                sink.on_new_frame(&frame, 320, 240);
            }
        }));
        Ok(())
    }

    fn pause(&mut self) -> frame_broker::Result<()> {
        self.playing.store(false, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn print_usage() {
    println!("Usage: relay_server [BIND_ADDR]");
    println!();
    println!("Arguments:");
    println!("  BIND_ADDR  Address to bind to (default: 0.0.0.0:8800)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("frame_broker=debug".parse()?)
                .add_directive("relay_server=debug".parse()?),
        )
        .init();

    let mut config = ServerConfig::default();
    if let Some(addr) = args.get(1) {
        let addr: SocketAddr = addr.parse()?;
        config = config.bind(addr);
    }

    let broker = Arc::new(Broker::new());

    let mut frames_seen: u64 = 0;
    let engine = move |frame: &[u8], encoding: Encoding| {
        std::thread::sleep(Duration::from_millis(250));
        frames_seen += 1;
        if frames_seen % 20 == 0 {
            return Err(EngineError::Unavailable("simulated outage".into()));
        }
        Ok(serde_json::json!({
            "objects": [{ "label": "person", "score": 0.9 }],
            "bytes": frame.len(),
            "encoding": encoding.content_type(),
        }))
    };

    broker.attach_pipeline(
        "synthetic",
        Box::new(SyntheticCamera::new()),
        Some(Box::new(engine)),
        SourceParams::new("synthetic://counter").size(320, 240).framerate(10, 1),
    )?;

    let server = BrokerServer::new(config, Arc::clone(&broker));
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if let Some(stats) = broker.pipeline_stats("synthetic") {
        tracing::info!(
            captured = stats.frames_captured,
            dropped = stats.frames_dropped,
            annotated = stats.frames_annotated,
            reconnects = stats.reconnects,
            "Final pipeline stats"
        );
    }
    broker.shutdown();
    Ok(())
}
