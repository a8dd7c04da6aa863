// snapconvert - batch image converter
// Uploads files, converts them, asks Gemini for captions, writes the downloads

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use snapconvert::caption::{self, CaptionConfig};
use snapconvert::download;
use snapconvert::metrics::Metrics;
use snapconvert::{
    BatchController, Captioner, FilePipeline, FileStore, GeminiCaptioner, NativeCodec, NoCaptions, Quality,
    SourceFile, TargetFormat, ThumbnailPreviews,
};

#[derive(Parser)]
#[command(name = "snapconvert", version, about = "Convert images to PNG/JPEG/WEBP with AI-suggested names")]
struct Args {
    /// Image files to convert
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Target format (png, jpeg, webp)
    #[arg(short, long, default_value = "jpeg")]
    format: TargetFormat,

    /// Quality for lossy formats, 0.0 to 1.0
    #[arg(short, long, default_value = "0.92")]
    quality: Quality,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Skip AI captioning
    #[arg(long, default_value_t = false)]
    no_ai: bool,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini model
    #[arg(long, env = "SNAPCONVERT_MODEL", default_value = caption::DEFAULT_MODEL)]
    model: String,

    /// Gemini API base URL
    #[arg(long, env = "SNAPCONVERT_ENDPOINT", default_value = caption::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Timeout for each captioning request, in seconds
    #[arg(long, default_value_t = caption::DEFAULT_TIMEOUT_SECS)]
    ai_timeout_secs: u64,

    /// Language of the AI description
    #[arg(long, default_value = "Arabic")]
    language: String,

    /// Print a JSON summary to stdout
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    info!("🎬 Starting snapconvert");
    info!("   Target: {} (quality {})", args.format, args.quality.value());

    let captioner = build_captioner(&args)?;

    tokio::fs::create_dir_all(&args.out)
        .await
        .with_context(|| format!("Failed to create output directory {}", args.out.display()))?;

    let metrics = Metrics::new();
    let store = Arc::new(FileStore::new(Arc::new(ThumbnailPreviews::new())));
    let pipeline = FilePipeline::new(Arc::clone(&store), Arc::new(NativeCodec::new()), captioner)
        .with_quality(args.quality)
        .with_metrics(Arc::clone(&metrics));
    let batch = BatchController::new(Arc::new(pipeline));

    // Upload
    let mut sources = Vec::new();
    for path in &args.files {
        let source = SourceFile::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if !source.is_image() {
            warn!("Skipping {}: not an image ({})", path.display(), source.mime_type());
            continue;
        }
        sources.push(source);
    }
    let uploaded = store.add(sources, args.format);
    metrics.record_uploads(uploaded.len());
    info!("📥 Uploaded {} file(s)", uploaded.len());

    let report = batch.process_all().await?;

    // Download
    let mut outputs = Vec::new();
    for record in store.snapshot().iter() {
        let saved = download::save(record, &args.out)
            .await
            .with_context(|| format!("Failed to write output for {}", record.source.name()))?;
        outputs.push(json!({
            "id": record.id,
            "source": record.source.name(),
            "status": record.status,
            "format": record.target_format,
            "description": record.description(),
            "suggested_name": record.suggested_name(),
            "output": saved.map(|p| p.display().to_string()),
        }));
    }

    if args.json {
        let summary = json!({
            "report": report,
            "files": outputs,
            "metrics": metrics.snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    store.clear();

    if report.failed > 0 {
        anyhow::bail!("{} of {} files failed to convert", report.failed, report.attempted);
    }
    Ok(())
}

fn build_captioner(args: &Args) -> Result<Arc<dyn Captioner>> {
    if args.no_ai {
        info!("   AI captioning disabled");
        return Ok(Arc::new(NoCaptions));
    }

    let Some(api_key) = args.api_key.clone().filter(|k| !k.is_empty()) else {
        warn!("GEMINI_API_KEY not set, continuing without AI captions");
        return Ok(Arc::new(NoCaptions));
    };

    let config = CaptionConfig {
        api_key,
        model: args.model.clone(),
        endpoint: args.endpoint.clone(),
        timeout: Duration::from_secs(args.ai_timeout_secs),
        language: args.language.clone(),
    };
    info!("   ✓ Captioning with {}", config.model);

    let captioner = GeminiCaptioner::new(config).context("Failed to create captioning client")?;
    Ok(Arc::new(captioner))
}
