//! Jarvis command-line host.
//!
//! Wires the voice core to real audio devices without the remote model:
//! list devices, export base64 PCM as a WAV file, play streamed chunks
//! gaplessly, or loop the microphone back into the speaker.

mod settings;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use jarvis_core::{
    audio::{device, resample::convert_segment},
    codec::{
        pcm16::pcm16_to_samples,
        text,
        wav::{write_wav_file, WavFormat, WavHeader, DEFAULT_DOWNLOAD_NAME},
    },
    wire::PLAYBACK_SAMPLE_RATE,
    EngineStatus, LiveSession, SpeakingEvent, VoiceEngine, WireChunk,
};
use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "jarvis", version, about)]
struct Cli {
    /// Settings file (defaults to the user data directory)
    #[arg(long, env = "JARVIS_SETTINGS")]
    settings: Option<PathBuf>,

    /// Microphone name, overrides the settings file
    #[arg(long, env = "JARVIS_INPUT_DEVICE")]
    input_device: Option<String>,

    /// Speaker name, overrides the settings file
    #[arg(long, env = "JARVIS_OUTPUT_DEVICE")]
    output_device: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print input and output devices as JSON
    Devices,

    /// Print the effective settings, optionally writing them back
    Settings {
        #[arg(long)]
        save: bool,
    },

    /// Decode base64 PCM16 from a file and write it as a WAV file
    Wav {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, default_value_t = PLAYBACK_SAMPLE_RATE)]
        rate: u32,
    },

    /// Play base64 PCM16 chunks (one per line) back to back
    Play {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, default_value_t = PLAYBACK_SAMPLE_RATE)]
        rate: u32,
    },

    /// Feed the microphone back into the speaker through the full wire path
    Loopback {
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("jarvis=info")),
        )
        .init();

    let cli = Cli::parse();
    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    if cli.input_device.is_some() {
        settings.preferred_input_device = cli.input_device.clone();
    }
    if cli.output_device.is_some() {
        settings.preferred_output_device = cli.output_device.clone();
    }
    settings.normalize();

    match cli.command {
        Command::Devices => print_devices(),
        Command::Settings { save } => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            if save {
                save_settings(&settings_path, &settings)
                    .with_context(|| format!("writing {}", settings_path.display()))?;
                info!(path = %settings_path.display(), "settings saved");
            }
            Ok(())
        }
        Command::Wav {
            input,
            output,
            rate,
        } => export_wav(&settings, input, output, rate),
        Command::Play { input, rate } => play(&settings, input, rate).await,
        Command::Loopback { seconds } => loopback(&settings, seconds).await,
    }
}

fn print_devices() -> Result<()> {
    let devices = serde_json::json!({
        "input": device::list_input_devices(),
        "output": device::list_output_devices(),
    });
    println!("{}", serde_json::to_string_pretty(&devices)?);
    Ok(())
}

fn export_wav(
    settings: &AppSettings,
    input: PathBuf,
    output: Option<PathBuf>,
    rate: u32,
) -> Result<()> {
    let encoded = std::fs::read_to_string(&input)
        .with_context(|| format!("reading {}", input.display()))?;

    let output = output.unwrap_or_else(|| {
        settings
            .download_dir
            .clone()
            .unwrap_or_default()
            .join(DEFAULT_DOWNLOAD_NAME)
    });
    write_download(&encoded, &output, rate)?;
    println!("{}", output.display());
    Ok(())
}

/// Decode a base64 PCM16 payload, write it as WAV and read the header back.
fn write_download(encoded: &str, output: &Path, rate: u32) -> Result<()> {
    let pcm = text::decode(encoded)?;
    write_wav_file(output, &pcm, WavFormat::pcm16_mono(rate))
        .with_context(|| format!("exporting {}", output.display()))?;

    let written = std::fs::read(output)?;
    let header = WavHeader::parse(&written)?;
    if !header.is_consistent(written.len()) {
        bail!("{} has an inconsistent header", output.display());
    }
    Ok(())
}

async fn play(settings: &AppSettings, input: PathBuf, rate: u32) -> Result<()> {
    let lines = std::fs::read_to_string(&input)
        .with_context(|| format!("reading {}", input.display()))?;
    let mime_type = jarvis_core::PcmDescriptor::with_rate(rate).to_string();

    let engine = VoiceEngine::new(settings.engine_config());
    let mut speaking = engine.subscribe_speaking();
    spawn_status_logger(&engine);

    let session = engine.start()?;
    let mut sent = 0usize;
    for line in lines.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let chunk = WireChunk {
            data: line.to_string(),
            mime_type: mime_type.clone(),
        };
        let inbound = session.inbound.clone();
        tokio::task::spawn_blocking(move || inbound.send(chunk)).await??;
        sent += 1;
    }
    info!(sent, "all chunks queued");

    // Every chunk scheduled or rejected, so the speaking state below is final.
    while {
        let snapshot = engine.diagnostics_snapshot();
        snapshot.segments_scheduled + snapshot.chunks_rejected < sent
    } {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    wait_until_silent(&mut speaking).await;

    if engine.is_running() {
        engine.stop()?;
    }
    info!(snapshot = ?engine.diagnostics_snapshot(), "playback finished");
    Ok(())
}

/// Return once the latest speaking transition is `false`.
///
/// Earlier pauses may have left stale transitions in the buffer; only the
/// last one counts.
async fn wait_until_silent(speaking: &mut broadcast::Receiver<SpeakingEvent>) {
    let mut speaking_now = false;
    loop {
        match speaking.try_recv() {
            Ok(ev) => speaking_now = ev.speaking,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    while speaking_now {
        match speaking.recv().await {
            Ok(ev) => speaking_now = ev.speaking,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

async fn loopback(settings: &AppSettings, seconds: u64) -> Result<()> {
    let engine = VoiceEngine::new(settings.engine_config());
    spawn_status_logger(&engine);
    let rates = (
        engine.config().capture_sample_rate,
        engine.config().playback_sample_rate,
    );

    let session = engine.start()?;
    let relay = tokio::task::spawn_blocking(move || relay_capture(session, rates));

    tokio::time::sleep(Duration::from_secs(seconds)).await;
    if engine.is_running() {
        engine.stop()?;
    }
    let relayed = relay.await?;

    info!(relayed, snapshot = ?engine.diagnostics_snapshot(), "loopback finished");
    Ok(())
}

/// Move captured chunks to the playback side at the playback rate.
fn relay_capture(session: LiveSession, (capture_rate, playback_rate): (u32, u32)) -> usize {
    let mut relayed = 0;
    loop {
        let chunk = match session.outbound.recv_timeout(Duration::from_millis(200)) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let samples = match chunk.pcm16().and_then(|pcm| pcm16_to_samples(&pcm)) {
            Ok(s) => s,
            Err(e) => {
                warn!("skipping captured chunk: {e}");
                continue;
            }
        };
        let converted = match convert_segment(&samples, capture_rate, playback_rate) {
            Ok(c) => c,
            Err(e) => {
                warn!("skipping captured chunk: {e}");
                continue;
            }
        };

        if session
            .inbound
            .try_send(WireChunk::from_samples(&converted, playback_rate))
            .is_err()
        {
            debug!("playback queue full, dropping looped chunk");
            continue;
        }
        relayed += 1;
    }
    relayed
}

fn spawn_status_logger(engine: &VoiceEngine) {
    let mut status_rx = engine.subscribe_status();
    tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(ev) if ev.status == EngineStatus::CaptureLost => {
                    warn!(detail = ?ev.detail, "microphone lost, playback continues");
                }
                Ok(ev) => info!(status = ?ev.status, detail = ?ev.detail, "engine status"),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}
