//! Minimal collector for one neji-stream stream kind
//!
//! Accepts connections, decodes every payload and logs a one-line summary.
//!
//! Usage:
//!   neji-collector --listen 0.0.0.0:8989 --kind mesh
//!   RUST_LOG=debug neji-collector --listen 0.0.0.0:8990 --kind frame

use clap::Parser;
use neji_stream::codec::Compressor;
use neji_stream::collector::{CollectorReader, DEFAULT_MAX_FRAME_BYTES, StreamKind};
use neji_stream::config::CompressionFormat;
use neji_stream::{Error, Result};
use std::net::{TcpListener, TcpStream};
use std::thread;

/// Collector for neji-stream payloads
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:8989")]
    listen: String,

    /// Which stream kind this port carries
    #[arg(short, long, value_enum, default_value = "mesh")]
    kind: StreamKind,

    /// Compression used by the sender
    #[arg(short, long, value_enum, default_value = "gzip")]
    format: Format,

    /// Largest accepted payload in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    max_frame_bytes: usize,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Format {
    Gzip,
    Zlib,
    Deflate,
}

impl From<Format> for CompressionFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Gzip => CompressionFormat::Gzip,
            Format::Zlib => CompressionFormat::Zlib,
            Format::Deflate => CompressionFormat::Deflate,
        }
    }
}

fn serve(stream: TcpStream, args: &Args) -> Result<()> {
    let peer = stream.peer_addr()?;
    let compressor = Compressor::new(args.format.into(), 6);
    let mut reader =
        CollectorReader::new(stream, args.kind, compressor).with_max_frame_bytes(args.max_frame_bytes);

    log::info!("{} connected", peer);
    loop {
        match reader.next_record() {
            Ok(Some(record)) => log::info!("{}: {}", peer, record),
            Ok(None) => break,
            // A bad payload does not desynchronise framing; keep reading
            Err(e @ (Error::Encode(_) | Error::FrameLayout(_) | Error::Compression(_))) => {
                log::warn!("{}: undecodable payload: {}", peer, e);
            }
            Err(e) => return Err(e),
        }
    }
    log::info!(
        "{} disconnected after {} payloads ({} KiB)",
        peer,
        reader.frames(),
        reader.bytes() / 1024
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let listener = TcpListener::bind(&args.listen)?;
    log::info!("Collecting {:?} stream on {}", args.kind, args.listen);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Accept error: {}", e);
                continue;
            }
        };

        let args = args.clone();
        let spawned = thread::Builder::new()
            .name("collector-conn".to_string())
            .spawn(move || {
                if let Err(e) = serve(stream, &args) {
                    log::error!("Connection error: {}", e);
                }
            });
        if let Err(e) = spawned {
            log::error!("Failed to spawn connection thread: {}", e);
        }
    }
    Ok(())
}
