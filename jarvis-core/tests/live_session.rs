use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use jarvis_core::buffering::{create_audio_ring, Producer};
use jarvis_core::capture::CaptureStats;
use jarvis_core::codec::pcm16_to_samples;
use jarvis_core::engine::{capture_loop, playback_loop, SessionDiagnostics};
use jarvis_core::ipc::events::SpeakingEvent;
use jarvis_core::playback::{PlaybackScheduler, SimulatedClock, SimulatedOutput};
use jarvis_core::WireChunk;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

const RATE: u32 = 24_000;

fn speech(secs: f64) -> WireChunk {
    let samples: Vec<f32> = (0..(secs * RATE as f64) as usize)
        .map(|i| 0.25 * (i as f32 * 0.05).sin())
        .collect();
    WireChunk::from_samples(&samples, RATE)
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        if start.elapsed() >= timeout {
            panic!("timed out waiting for condition");
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn recv_speaking(rx: &mut broadcast::Receiver<SpeakingEvent>, timeout: Duration) -> SpeakingEvent {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= timeout {
                    panic!("timed out waiting for speaking event");
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("speaking channel closed unexpectedly"),
        }
    }
}

#[test]
fn playback_loop_queues_burst_gaplessly_and_skips_bad_chunks() {
    let output = SimulatedOutput::new();
    let clock = output.clock();

    let (inbound_tx, inbound_rx) = bounded(16);
    inbound_tx.send(speech(1.0)).unwrap();
    inbound_tx
        .send(WireChunk {
            data: "not base64!".into(),
            mime_type: "audio/pcm;rate=24000".into(),
        })
        .unwrap();
    inbound_tx.send(speech(0.5)).unwrap();
    inbound_tx
        .send(WireChunk::from_pcm16(&[1, 2, 3], RATE))
        .unwrap();
    inbound_tx
        .send(WireChunk {
            data: speech(0.25).data,
            mime_type: "audio/ogg".into(),
        })
        .unwrap();
    inbound_tx.send(speech(2.0)).unwrap();
    drop(inbound_tx);

    let (speaking_tx, mut speaking_rx) = broadcast::channel(16);
    let diagnostics = Arc::new(SessionDiagnostics::default());
    let ctx = playback_loop::PlaybackContext {
        scheduler: PlaybackScheduler::new(output, RATE),
        inbound: inbound_rx,
        running: Arc::new(AtomicBool::new(true)),
        speaking_tx,
        seq: Arc::new(AtomicU64::new(0)),
        diagnostics: Arc::clone(&diagnostics),
    };

    let handle = thread::spawn(move || playback_loop::run(ctx));

    wait_until(Duration::from_secs(2), || {
        let snapshot = diagnostics.snapshot();
        snapshot.segments_scheduled + snapshot.chunks_rejected == 6
    });
    let started = recv_speaking(&mut speaking_rx, Duration::from_secs(1));
    assert_eq!(started, SpeakingEvent { seq: 0, speaking: true });

    // Past the last segment plus the grace period.
    clock.set(10.0);
    let scheduler = handle.join().expect("playback thread panicked");

    let stopped = recv_speaking(&mut speaking_rx, Duration::from_secs(1));
    assert_eq!(stopped, SpeakingEvent { seq: 1, speaking: false });

    let starts: Vec<f64> = scheduler
        .output()
        .scheduled()
        .iter()
        .map(|s| s.start_at)
        .collect();
    assert_eq!(starts, vec![0.0, 1.0, 1.5]);
    assert!((scheduler.next_start_time() - 3.5).abs() < 1e-9);
    assert!(!scheduler.is_speaking());

    let snapshot = diagnostics.snapshot();
    assert_eq!(snapshot.segments_scheduled, 3);
    assert_eq!(snapshot.chunks_rejected, 3);
}

#[test]
fn playback_loop_stop_resets_cursor_and_clears_speaking() {
    let clock = SimulatedClock::default();
    clock.set(4.0);
    let output = SimulatedOutput::with_clock(clock);
    let (inbound_tx, inbound_rx) = bounded(4);
    inbound_tx.send(speech(1.0)).unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let (speaking_tx, mut speaking_rx) = broadcast::channel(16);
    let diagnostics = Arc::new(SessionDiagnostics::default());
    let ctx = playback_loop::PlaybackContext {
        scheduler: PlaybackScheduler::new(output, RATE),
        inbound: inbound_rx,
        running: Arc::clone(&running),
        speaking_tx,
        seq: Arc::new(AtomicU64::new(0)),
        diagnostics: Arc::clone(&diagnostics),
    };

    let handle = thread::spawn(move || playback_loop::run(ctx));
    assert!(recv_speaking(&mut speaking_rx, Duration::from_secs(2)).speaking);

    running.store(false, Ordering::SeqCst);
    let scheduler = handle.join().expect("playback thread panicked");

    assert!(!recv_speaking(&mut speaking_rx, Duration::from_secs(1)).speaking);
    assert_eq!(scheduler.next_start_time(), 0.0);
    let scheduled = scheduler.output().scheduled();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].start_at, 4.0);
    drop(inbound_tx);
}

#[test]
fn capture_loop_frames_blocks_and_encodes_within_one_lsb() {
    const BLOCK: usize = 4096;
    let source: Vec<f32> = (0..BLOCK * 2 + 100)
        .map(|i| 0.5 * (i as f32 * 0.01).sin())
        .collect();

    let (mut producer, consumer) = create_audio_ring();
    producer.push_slice(&source);

    let running = Arc::new(AtomicBool::new(true));
    let (outbound_tx, outbound_rx) = bounded(8);
    let stats = Arc::new(CaptureStats::default());

    let ctx = capture_loop::CaptureContext {
        consumer,
        running: Arc::clone(&running),
        device_fault: Arc::new(AtomicBool::new(false)),
        device_rate: 16_000,
        wire_rate: 16_000,
        block_size: BLOCK,
        outbound: outbound_tx,
        stats: Arc::clone(&stats),
    };
    let handle = thread::spawn(move || capture_loop::run(ctx));

    let mut chunks = Vec::new();
    for _ in 0..2 {
        chunks.push(
            outbound_rx
                .recv_timeout(Duration::from_secs(2))
                .expect("capture chunk"),
        );
    }

    running.store(false, Ordering::SeqCst);
    let exit = handle.join().expect("capture thread panicked");
    assert_eq!(exit, capture_loop::CaptureExit::Stopped);

    // The trailing partial block is never sent.
    assert!(outbound_rx.try_recv().is_err());
    assert_eq!(stats.chunks_sent.load(Ordering::Relaxed), 2);

    for (n, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
        let decoded = pcm16_to_samples(&chunk.pcm16().unwrap()).unwrap();
        assert_eq!(decoded.len(), BLOCK);

        let expected = &source[n * BLOCK..(n + 1) * BLOCK];
        for (got, want) in decoded.iter().zip(expected) {
            assert!((got - want).abs() <= 1.0 / 32768.0);
        }
    }
}

#[test]
fn capture_loop_reports_device_fault() {
    let (_producer, consumer) = create_audio_ring();
    let (outbound_tx, _outbound_rx) = bounded(1);

    let exit = capture_loop::run(capture_loop::CaptureContext {
        consumer,
        running: Arc::new(AtomicBool::new(true)),
        device_fault: Arc::new(AtomicBool::new(true)),
        device_rate: 48_000,
        wire_rate: 16_000,
        block_size: 4096,
        outbound: outbound_tx,
        stats: Arc::new(CaptureStats::default()),
    });

    assert!(matches!(exit, capture_loop::CaptureExit::Failed(_)));
}
