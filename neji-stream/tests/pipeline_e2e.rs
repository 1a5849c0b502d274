//! End-to-end tests: capture items in, decoded records out.
//!
//! Everything runs on loopback or the in-memory transport; no external
//! collector is needed.

use neji_stream::app::NejiApp;
use neji_stream::capture::SceneMeshes;
use neji_stream::codec::{Compressor, Encoder, FrameEncoder, MeshEncoder, decode_mesh};
use neji_stream::collector::{CollectorReader, Record, StreamKind};
use neji_stream::config::{CompressionFormat, Config, NetworkConfig, SupervisorConfig};
use neji_stream::transport::{MockTransport, TcpTransport};
use neji_stream::{HealthEvent, MeshEvent, MeshId, Pipeline, PipelineOptions, Plane, RawFrameItem, Result};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

fn options(ingest: usize, egress: usize, workers: usize) -> PipelineOptions {
    PipelineOptions {
        ingest_capacity: ingest,
        egress_capacity: egress,
        workers,
        compressor: Compressor::default(),
        supervisor: SupervisorConfig {
            poll_interval_ms: 5,
            ..SupervisorConfig::default()
        },
    }
}

fn scene_with(ids: &[&str]) -> Arc<SceneMeshes> {
    let scene = Arc::new(SceneMeshes::new());
    for (n, id) in ids.iter().enumerate() {
        scene.upsert(MeshId::new(*id), vec![[n as f32, 0.0, 1.0]; n + 1]);
    }
    scene
}

fn mesh_ids(transport: &MockTransport) -> Vec<String> {
    let compressor = Compressor::default();
    transport
        .frames()
        .iter()
        .map(|f| decode_mesh(&compressor.decompress(f).unwrap()).unwrap().id)
        .collect()
}

/// Wait for a health event matching `pred`, skipping others
fn wait_for_event<E: Encoder>(
    pipeline: &Pipeline<E>,
    pred: impl Fn(&HealthEvent) -> bool,
) -> Option<HealthEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match pipeline.health().recv_timeout(left) {
            Ok(event) if pred(&event) => return Some(event),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
    None
}

fn yuv_frame(width: u32, height: u32, padding: u32) -> RawFrameItem {
    let plane = |w: u32, h: u32| {
        let stride = w + padding;
        Plane::new(w, h, stride, (0..stride * h).map(|i| i as u8).collect())
    };
    RawFrameItem {
        y: plane(width, height),
        u: plane(width / 2, height / 2),
        v: plane(width / 2, height / 2),
    }
}

#[test]
fn test_overflow_delivers_newest_in_order() {
    let scene = scene_with(&["A", "B", "C"]);
    let mut pipeline = Pipeline::new(MeshEncoder::new(scene), options(2, 8, 1)).unwrap();

    for id in ["A", "B", "C"] {
        pipeline.submit(MeshEvent::Added(MeshId::new(id)));
    }

    let transport = MockTransport::new();
    pipeline.start(transport.clone()).unwrap();
    pipeline.shutdown().unwrap();

    assert_eq!(mesh_ids(&transport), vec!["B", "C"]);
    let stats = pipeline.stats();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.ingest_dropped, 1);
    assert_eq!(stats.sent, 2);
}

#[test]
fn test_graceful_shutdown_drains_to_tcp_collector() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let address = listener.local_addr()?.to_string();

    let collector = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = CollectorReader::new(stream, StreamKind::Frame, Compressor::default());
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            records.push(record);
        }
        records
    });

    let network = NetworkConfig::default();
    let mut pipeline = Pipeline::new(FrameEncoder::new(2)?, options(16, 16, 1))?;
    pipeline.start(TcpTransport::connect(&address, &network)?)?;

    for _ in 0..5 {
        pipeline.submit(yuv_frame(8, 4, 8));
    }
    pipeline.shutdown().unwrap();

    let records = collector.join().unwrap();
    assert_eq!(records.len(), 5);
    for record in records {
        match record {
            Record::Frame(frame) => {
                assert_eq!((frame.width, frame.height), (4, 2));
                // Y 4x2 + U 2x1 + V 2x1
                assert_eq!(frame.samples.len(), 8 + 2 + 2);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }
    Ok(())
}

#[test]
fn test_transport_failure_stops_sender_and_reports() {
    let scene = scene_with(&["m0", "m1", "m2"]);
    let transport = MockTransport::new();
    transport.fail_after(1);
    let mut pipeline =
        Pipeline::launch(MeshEncoder::new(scene), transport.clone(), options(8, 8, 1)).unwrap();

    for id in ["m0", "m1", "m2"] {
        pipeline.submit(MeshEvent::Updated(MeshId::new(id)));
    }

    let event = wait_for_event(&pipeline, |e| matches!(e, HealthEvent::SenderStopped { .. }));
    assert!(matches!(
        event,
        Some(HealthEvent::SenderStopped { stream: "mesh", .. })
    ));

    pipeline.shutdown().unwrap();
    assert!(!pipeline.is_running());
    assert!(transport.is_closed());
    assert_eq!(mesh_ids(&transport), vec!["m0"]);
}

#[test]
fn test_unresolvable_mesh_is_skipped() {
    let scene = scene_with(&["real"]);
    let transport = MockTransport::new();
    let mut pipeline =
        Pipeline::launch(MeshEncoder::new(scene), transport.clone(), options(8, 8, 1)).unwrap();

    pipeline.submit(MeshEvent::Added(MeshId::new("ghost")));
    pipeline.submit(MeshEvent::Added(MeshId::new("real")));
    pipeline.submit(MeshEvent::Removed(MeshId::new("gone")));

    let event = wait_for_event(&pipeline, |e| matches!(e, HealthEvent::EncodeFailed { .. }));
    assert!(event.is_some());
    pipeline.shutdown().unwrap();

    let compressor = Compressor::default();
    let records: Vec<_> = transport
        .frames()
        .iter()
        .map(|f| decode_mesh(&compressor.decompress(f).unwrap()).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "real");
    assert_eq!(records[0].vertices.len(), 1);
    assert!(records[1].is_tombstone());
    assert_eq!(pipeline.stats().encode_failures, 1);
}

/// Echoes its input, panicking on `b"panic"`
struct Fragile;

impl Encoder for Fragile {
    type Item = Vec<u8>;

    fn name(&self) -> &'static str {
        "fragile"
    }

    fn encode(&self, item: Vec<u8>) -> Result<Vec<u8>> {
        if item == b"panic" {
            panic!("encoder blew up");
        }
        Ok(item)
    }
}

#[test]
fn test_panicked_worker_is_restarted() {
    let transport = MockTransport::new();
    let mut pipeline = Pipeline::launch(Fragile, transport.clone(), options(8, 8, 1)).unwrap();

    pipeline.submit(b"before".to_vec());
    pipeline.submit(b"panic".to_vec());
    let restarted = wait_for_event(&pipeline, |e| matches!(e, HealthEvent::WorkerRestarted { .. }));
    assert_eq!(
        restarted,
        Some(HealthEvent::WorkerRestarted {
            stream: "fragile",
            worker: 0
        })
    );

    pipeline.submit(b"after".to_vec());
    pipeline.shutdown().unwrap();

    let compressor = Compressor::default();
    let payloads: Vec<Vec<u8>> = transport
        .frames()
        .iter()
        .map(|f| compressor.decompress(f).unwrap())
        .collect();
    assert_eq!(payloads, vec![b"before".to_vec(), b"after".to_vec()]);
    assert_eq!(pipeline.stats().worker_restarts, 1);
}

#[test]
fn test_stalled_collector_cannot_block_shutdown() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let address = listener.local_addr()?.to_string();

    // Accepts, then never reads until released
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let peer = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let _ = release_rx.recv_timeout(Duration::from_secs(30));
        drop(stream);
    });

    let network = NetworkConfig {
        write_timeout_ms: 20,
        ..NetworkConfig::default()
    };
    let mut options = options(8, 8, 1);
    // Stored blocks keep payloads large enough to fill the socket buffers
    options.compressor = Compressor::new(CompressionFormat::Gzip, 0);
    let mut pipeline = Pipeline::launch(Fragile, TcpTransport::connect(&address, &network)?, options)?;

    for n in 0..6u8 {
        pipeline.submit(vec![n; 4 << 20]);
    }
    thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    pipeline.shutdown_within(Duration::from_millis(100))?;
    let elapsed = started.elapsed();

    let _ = release_tx.send(());
    peer.join().unwrap();
    assert!(elapsed < Duration::from_secs(2), "shutdown took {:?}", elapsed);
    assert!(!pipeline.is_running());
    Ok(())
}

#[test]
fn test_app_streams_synthetic_meshes() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = Config::default();
    config.mesh.address = listener.local_addr().unwrap().to_string();
    config.mesh.workers = 2;
    config.frame.stream.enabled = false;
    config.capture.mesh_rate_hz = 200.0;
    config.capture.vertices_per_mesh = 16;

    let collector = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = CollectorReader::new(stream, StreamKind::Mesh, Compressor::default());
        let mut count = 0;
        while let Some(record) = reader.next_record().unwrap() {
            assert!(matches!(record, Record::Mesh(_)));
            count += 1;
        }
        count
    });

    let (handle_tx, handle_rx) = std::sync::mpsc::channel();
    let app = thread::spawn(move || {
        let mut app = NejiApp::new(config)?;
        handle_tx.send(app.shutdown_handle()).unwrap();
        app.run()
    });

    let shutdown = handle_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    thread::sleep(Duration::from_millis(300));
    shutdown.store(true, Ordering::Relaxed);

    app.join().unwrap().unwrap();
    assert!(collector.join().unwrap() > 0);
}

#[test]
fn test_app_fails_without_any_collector() {
    // Bind then drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let mut config = Config::default();
    config.mesh.address = format!("127.0.0.1:{port}");
    config.frame.stream.enabled = false;

    assert!(NejiApp::new(config).is_err());
}
