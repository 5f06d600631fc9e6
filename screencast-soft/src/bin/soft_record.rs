// Records synthetic screen, camera and microphone sources with the software
// encoder and writes the artifact plus its metadata sidecar.
//
// Usage: soft-record --duration 5 --camera --mic --output ./recordings

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use screencast_core::{
    storage, Anchor, CaptureError, CaptureSource, Layout, RecorderConfiguration, ScreenRecorder, Visibility,
};
use screencast_soft::{read_records, Pattern, Record, SoftAudioSource, SoftEncoder, SoftVideoSource, Tone};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LayoutArg {
    Pip,
    Circle,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AnchorArg {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Parser)]
#[command(name = "soft-record")]
#[command(about = "Record synthetic screen and camera sources")]
struct Args {
    /// Recording length in seconds
    #[arg(short, long, default_value = "5")]
    duration: u64,

    /// Output directory
    #[arg(short, long, default_value = "recordings")]
    output: PathBuf,

    /// Screen size as WIDTHxHEIGHT
    #[arg(long, default_value = "1280x720", value_parser = parse_size)]
    screen: (u32, u32),

    /// Add a camera overlay
    #[arg(long)]
    camera: bool,

    /// Add a microphone tone
    #[arg(long)]
    mic: bool,

    #[arg(long, value_enum, default_value = "pip")]
    layout: LayoutArg,

    #[arg(long, value_enum, default_value = "bottom-right")]
    anchor: AnchorArg,

    /// Frames per second
    #[arg(long, default_value = "30")]
    fps: u32,

    /// Simulate a hidden window for the second half of the recording
    #[arg(long)]
    hide_midway: bool,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value}"))?;
    let w = w.parse().map_err(|e| format!("bad width: {e}"))?;
    let h = h.parse().map_err(|e| format!("bad height: {e}"))?;
    Ok((w, h))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match record(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("recording failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn record(args: &Args) -> Result<(), CaptureError> {
    let (width, height) = args.screen;
    let screen = SoftVideoSource::spawn("screen", width, height, args.fps, Pattern::Bars)?;
    let camera = args
        .camera
        .then(|| SoftVideoSource::spawn("camera", 640, 480, args.fps, Pattern::Solid([40, 120, 220, 255])))
        .transpose()?;
    let mic = args
        .mic
        .then(|| SoftAudioSource::spawn("mic", Tone::default(), Duration::from_millis(20)))
        .transpose()?;

    let mut sources = vec![CaptureSource::screen(screen.track(), None)];
    if let Some(camera) = &camera {
        sources.push(CaptureSource::camera(camera.track()));
    }
    if let Some(mic) = &mic {
        sources.push(CaptureSource::microphone(mic.track()));
    }

    let config = RecorderConfiguration {
        layout: match args.layout {
            LayoutArg::Pip => Layout::PictureInPicture,
            LayoutArg::Circle => Layout::Circle,
        },
        anchor: match args.anchor {
            AnchorArg::TopLeft => Anchor::TopLeft,
            AnchorArg::TopRight => Anchor::TopRight,
            AnchorArg::BottomLeft => Anchor::BottomLeft,
            AnchorArg::BottomRight => Anchor::BottomRight,
        },
        target_fps: args.fps,
        codec_preferences: SoftEncoder::codec_preferences(),
        ..Default::default()
    };

    let recorder = ScreenRecorder::new(SoftEncoder::new(), config)?;
    recorder.start(&sources)?;
    log::info!("recording for {}s ({:?})", args.duration, recorder.render_strategy());

    let total = Duration::from_secs(args.duration);
    if args.hide_midway {
        thread::sleep(total / 2);
        recorder.set_visibility(Visibility::Hidden)?;
        log::info!("window hidden; strategy now {:?}", recorder.render_strategy());
        thread::sleep(total - total / 2);
    } else {
        thread::sleep(total);
    }

    let Some(result) = recorder.stop()? else {
        log::warn!("recorder was not capturing");
        return Ok(());
    };

    let written = storage::artifact_writer::write_artifact(&result, &args.output)?;
    let diagnostics = recorder.diagnostics();
    log::info!("artifact: {}", written.artifact_path.display());
    log::info!("metadata: {}", written.metadata_path.display());
    log::info!(
        "composited {} frames ({} pushes), {} mix cycles, {} chunks",
        diagnostics.frames_composited,
        diagnostics.frame_pushes,
        diagnostics.audio_mix_cycles,
        diagnostics.chunks_received
    );

    if let Ok(records) = read_records(&result.artifact.bytes) {
        let frames = records.iter().filter(|r| matches!(r, Record::Video { .. })).count();
        log::info!(
            "{} video records, {} audio records",
            frames,
            records.len() - frames
        );
    }
    Ok(())
}
