use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chunkscribe::{Config, LoggingObserver, TranscriptionPipeline};

fn cli() -> Command {
    Command::new("chunkscribe")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Transcribe audio with a remote Whisper API, splitting files over the upload limit")
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .help("Path to input audio file")
                .required(true)
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output text file")
                .default_value("transcript.txt")
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)")
        )
        .arg(
            Arg::new("threshold-mb")
                .long("threshold-mb")
                .value_name("MB")
                .help("Split files larger than this many MiB")
                .value_parser(clap::value_parser!(u64).range(1..))
        )
        .arg(
            Arg::new("model")
                .long("model")
                .value_name("MODEL")
                .help("Transcription model identifier")
        )
        .arg(
            Arg::new("language")
                .long("language")
                .value_name("LANG")
                .help("Language hint (ISO-639-1)")
        )
        .arg(
            Arg::new("temp-dir")
                .long("temp-dir")
                .value_name("DIR")
                .help("Directory for temporary chunk files")
        )
        .arg(
            Arg::new("max-retries")
                .long("max-retries")
                .value_name("NUM")
                .help("Retry rate-limited or failed network requests this many times")
                .value_parser(clap::value_parser!(u32))
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue)
        )
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "chunkscribe=debug,warn" } else { "chunkscribe=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_target(verbose)
        .with_env_filter(filter)
        .init();
}

fn mebibytes(mb: u64) -> Result<u64> {
    mb.checked_mul(1024 * 1024)
        .with_context(|| format!("--threshold-mb {} is too large", mb))
}

/// Write the transcript next to its destination, then move it into place
fn write_output(path: &Path, text: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(text.as_bytes())?;
    file.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let input = PathBuf::from(
        matches
            .get_one::<String>("input")
            .context("missing input path")?,
    );
    let output = PathBuf::from(
        matches
            .get_one::<String>("output")
            .context("missing output path")?,
    );

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(Path::new(path))?,
        None => Config::load()?,
    };

    if let Some(mb) = matches.get_one::<u64>("threshold-mb") {
        config.chunking.threshold_bytes = mebibytes(*mb)?;
    }
    if let Some(model) = matches.get_one::<String>("model") {
        config.transcription.model = model.clone();
    }
    if let Some(language) = matches.get_one::<String>("language") {
        config.transcription.language = Some(language.clone());
    }
    if let Some(dir) = matches.get_one::<String>("temp-dir") {
        config.chunking.temp_dir = Some(PathBuf::from(dir));
    }
    if let Some(retries) = matches.get_one::<u32>("max-retries") {
        config.transcription.max_retries = *retries;
    }

    info!("🚀 Chunkscribe starting...");
    info!("📁 Input: {}", input.display());
    info!("📝 Output: {}", output.display());
    tracing::debug!("{}", config.summary());

    let pipeline = match TranscriptionPipeline::from_config(config) {
        Ok(pipeline) => pipeline.with_observer(Arc::new(LoggingObserver)),
        Err(e) => {
            error!("{}: {}", e.class(), e);
            std::process::exit(1);
        }
    };

    match pipeline.run(&input).await {
        Ok(transcript) => {
            write_output(&output, transcript.text())?;
            info!(
                "🎉 Transcription saved to {} ({} chunk(s), {:.1}s)",
                output.display(),
                transcript.chunk_count(),
                transcript.processing_time().as_secs_f64()
            );
            Ok(())
        }
        Err(e) => {
            error!("{}: {}", e.class(), e);
            std::process::exit(1);
        }
    }
}
