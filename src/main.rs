use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clipdozer::audio::AudioOutput;
use clipdozer::core::{format_time, ClipDescriptor, Clock, EditorConfig, MarkerPair, Project, SystemClock};
use clipdozer::gui::EditorSession;
use clipdozer::video::{
    generate_thumbnails, generate_waveform, CancelToken, ClipSource, FfmpegTools, TestPatternDecoder,
    ThumbnailRequest,
};

/// Headless front end for the clip editor core
#[derive(Parser, Debug)]
#[command(name = "clipdozer", version, about, long_about = None)]
struct Cli {
    /// Use a synthetic test pattern instead of decoding FILE
    #[arg(long, global = true)]
    pattern: bool,

    /// Length of the test pattern in seconds
    #[arg(long, global = true, default_value_t = 5.0)]
    pattern_duration: f64,

    /// Config file to use instead of the platform default
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print stream properties
    Probe {
        file: Option<PathBuf>,
    },

    /// Write a thumbnail strip as PNG files
    Thumbnails {
        file: Option<PathBuf>,
        #[arg(short, long, default_value = "thumbnails")]
        out: PathBuf,
        /// Strip width in pixels (0 = default count)
        #[arg(short, long, default_value_t = 0)]
        width: u32,
    },

    /// Print the waveform envelope
    Waveform {
        file: Option<PathBuf>,
        #[arg(short, long, default_value_t = 0)]
        width: u32,
    },

    /// Play through an editor session and log positions
    Play {
        file: Option<PathBuf>,
        /// How long to run
        #[arg(short, long, default_value_t = 3.0)]
        seconds: f64,
        /// Start position in seconds
        #[arg(long, default_value_t = 0.0)]
        from: f64,
        /// Advance one frame per tick instead of skipping to the wall clock
        #[arg(long)]
        frame_exact: bool,
    },

    /// Edit or inspect a project file
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ProjectCommands {
    /// Append a clip, creating the project if needed
    Add {
        project: PathBuf,
        clip: PathBuf,
        #[arg(long = "in")]
        in_point: Option<f64>,
        #[arg(long = "out")]
        out_point: Option<f64>,
        #[arg(long)]
        mute: bool,
    },
    /// List the clips in a project
    Show {
        project: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EditorConfig::load_from(path)?,
        None => EditorConfig::load()?,
    };

    match &cli.command {
        Commands::Probe { file } => probe(&cli, &config, file.as_deref()),
        Commands::Thumbnails { file, out, width } => thumbnails(&cli, &config, file.as_deref(), out, *width),
        Commands::Waveform { file, width } => waveform(&cli, &config, file.as_deref(), *width),
        Commands::Play { file, seconds, from, frame_exact } => {
            play(&cli, config.clone(), file.as_deref(), *seconds, *from, *frame_exact)
        }
        Commands::Project { command } => project(command),
    }
}

fn open_source(cli: &Cli, config: &EditorConfig, file: Option<&Path>) -> anyhow::Result<Arc<ClipSource>> {
    if cli.pattern {
        let decoder = TestPatternDecoder::new(cli.pattern_duration, config.playback.default_fps).with_audio(220.0);
        return Ok(ClipSource::from_decoder(Box::new(decoder), None));
    }
    let file = file.ok_or_else(|| anyhow::anyhow!("No input file given (or pass --pattern)"))?;
    ClipSource::open_with(file, &FfmpegTools::from_config(config))
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", file.display(), e))
}

fn probe(cli: &Cli, config: &EditorConfig, file: Option<&Path>) -> anyhow::Result<()> {
    let source = open_source(cli, config, file)?;
    let info = source.info();
    println!("duration: {} ({:.3}s)", format_time(info.duration), info.duration);
    println!("fps:      {:.3}", info.fps);
    println!("size:     {}x{}", info.width, info.height);
    println!("audio:    {}", if info.has_audio { "yes" } else { "no" });
    Ok(())
}

fn thumbnails(cli: &Cli, config: &EditorConfig, file: Option<&Path>, out: &Path, width: u32) -> anyhow::Result<()> {
    let source = open_source(cli, config, file)?;
    let request = ThumbnailRequest::from_config(&config.scrub, width);

    let set = generate_thumbnails(&source, &request, &CancelToken::new())
        .ok_or_else(|| anyhow::anyhow!("Thumbnail generation was cancelled"))?
        .map_err(|e| anyhow::anyhow!("Failed to generate thumbnails: {}", e))?;

    std::fs::create_dir_all(out)?;
    for (i, thumb) in set.thumbnails.iter().enumerate() {
        let path = out.join(format!("thumb_{:03}.png", i));
        thumb
            .image
            .save(&path)
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))?;
        println!("{}  {}", format_time(thumb.timestamp), path.display());
    }
    Ok(())
}

fn waveform(cli: &Cli, config: &EditorConfig, file: Option<&Path>, width: u32) -> anyhow::Result<()> {
    let source = open_source(cli, config, file)?;
    let envelope = generate_waveform(&source, &config.waveform, width, &CancelToken::new())
        .ok_or_else(|| anyhow::anyhow!("Waveform generation was cancelled"))?
        .map_err(|e| anyhow::anyhow!("Failed to generate waveform: {}", e))?;

    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    let line: String = envelope
        .amplitudes
        .iter()
        .map(|a| BARS[((a * 7.0).round() as usize).min(7)])
        .collect();
    println!("{} points over {}", envelope.len(), format_time(envelope.duration));
    println!("{}", line);
    Ok(())
}

fn audio_output(clock: Arc<dyn Clock>) -> Box<dyn AudioOutput> {
    #[cfg(feature = "audio-device")]
    {
        match clipdozer::audio::RodioAudioOutput::new() {
            Ok(output) => return Box::new(output),
            Err(e) => log::warn!("Falling back to silent audio: {}", e),
        }
    }
    Box::new(clipdozer::audio::ClockedAudioOutput::new(clock))
}

fn play(cli: &Cli, mut config: EditorConfig, file: Option<&Path>, seconds: f64, from: f64, frame_exact: bool) -> anyhow::Result<()> {
    if frame_exact {
        config.playback.frame_skip = false;
    }
    let source = open_source(cli, &config, file)?;
    let clock = SystemClock::shared();
    let mut session = EditorSession::new(config, clock.clone(), audio_output(clock));
    session.open(source)?;

    if from > 0.0 {
        session.seek(from);
    }
    session.play();

    let started = Instant::now();
    let run_for = Duration::from_secs_f64(seconds.max(0.0));
    let mut last_report = Instant::now();
    while started.elapsed() < run_for {
        session.pump();
        if last_report.elapsed() >= Duration::from_millis(250) {
            last_report = Instant::now();
            log::info!(
                "video {}  audio {}ms  {:?}",
                format_time(session.position()),
                session.audio().position_ms(),
                session.controller().state().kind
            );
        }
        if let Some(error) = session.last_error() {
            return Err(anyhow::anyhow!("Playback failed: {}", error));
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    session.pause();

    println!(
        "stopped at {} (frame {}/{}), {} drift corrections",
        format_time(session.position()),
        session.controller().state().current_frame,
        session.controller().state().total_frames,
        session.drift_corrections()
    );
    Ok(())
}

fn project(command: &ProjectCommands) -> anyhow::Result<()> {
    match command {
        ProjectCommands::Add { project, clip, in_point, out_point, mute } => {
            let mut doc = if project.exists() {
                Project::load(project)?
            } else {
                let name = project
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "Untitled".to_string());
                Project::new(name)
            };

            let mut markers = MarkerPair::new();
            if let Some(t) = in_point {
                markers.set_in(*t);
            }
            if let Some(t) = out_point {
                markers.set_out(*t);
            }
            let mut descriptor = ClipDescriptor::from_markers(clip, &markers);
            descriptor.mute = *mute;
            doc.add_clip(descriptor);
            doc.save(project)?;
            println!("{} now has {} clips", project.display(), doc.clips.len());
        }
        ProjectCommands::Show { project } => {
            let doc = Project::load(project)?;
            println!("{} (version {})", doc.name, doc.version);
            for (i, clip) in doc.clips.iter().enumerate() {
                let side = |p: Option<f64>| p.map(format_time).unwrap_or_else(|| "--".to_string());
                let length = clip.duration_range().map(format_time).unwrap_or_else(|| "--".to_string());
                println!(
                    "{:>3}. {}  [{} - {}]  length {}{}",
                    i,
                    clip.path.display(),
                    side(clip.in_point),
                    side(clip.out_point),
                    length,
                    if clip.mute { "  (muted)" } else { "" }
                );
            }
        }
    }
    Ok(())
}
