use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Parser;

use image_text_translator::{Config, PipelineOutput, PipelineStatus, extension_for_mime};

#[derive(Parser, Debug)]
#[command(
    name = "image-text-translator",
    version,
    about = "Replace the text in an image with its translation"
)]
struct Cli {
    /// Image to translate
    input: Option<PathBuf>,

    /// Where to write the translated image (default: <input>_translated.<ext>)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Target language (default from settings, usually en)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Source language. Use "auto" to detect per region.
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// Translation provider: openai, baidu or google
    #[arg(short = 'p', long = "provider")]
    provider: Option<String>,

    /// Drop detected regions below this confidence (0.0-1.0)
    #[arg(short = 'c', long = "min-confidence")]
    min_confidence: Option<f32>,

    /// Use regions from a JSON file instead of running OCR
    #[arg(long = "regions")]
    regions: Option<PathBuf>,

    /// Write the per-region results as JSON
    #[arg(long = "results")]
    results: Option<PathBuf>,

    /// Tesseract language list (e.g. eng+jpn)
    #[arg(long = "ocr-langs", default_value = "eng")]
    ocr_langs: String,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<PathBuf>,

    /// Run the HTTP server on this address (e.g. 0.0.0.0:8000)
    #[arg(long = "server")]
    server: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    image_text_translator::logging::init(cli.verbose)?;

    if let Some(addr) = cli.server {
        let settings = image_text_translator::settings::load_settings(cli.read_settings.as_deref())?;
        return image_text_translator::server::run_server(settings, addr, cli.ocr_langs).await;
    }

    let input = cli
        .input
        .ok_or_else(|| anyhow!("an input image is required (or use --server)"))?;
    let config = Config {
        input: input.clone(),
        target_lang: cli.lang,
        source_lang: cli.source_lang,
        provider: cli.provider,
        min_confidence: cli.min_confidence,
        regions_path: cli.regions,
        ocr_langs: cli.ocr_langs,
        settings_path: cli.read_settings,
    };
    let output = image_text_translator::run(config).await?;

    let output_path = cli
        .output
        .unwrap_or_else(|| default_output_path(&input, &output.mime));
    std::fs::write(&output_path, &output.image_bytes)
        .with_context(|| format!("failed to write image: {}", output_path.display()))?;
    if let Some(path) = cli.results {
        let json = serde_json::to_string_pretty(&output)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write results: {}", path.display()))?;
    }
    print_summary(&output, &output_path);
    Ok(())
}

fn default_output_path(input: &Path, mime: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!(
        "{}_translated.{}",
        stem,
        extension_for_mime(mime)
    ))
}

fn print_summary(output: &PipelineOutput, path: &Path) {
    match output.status {
        PipelineStatus::Completed => {
            for result in &output.results {
                let marker = if result.translated { "" } else { " (untranslated)" };
                println!(
                    "{}\t{} -> {}{}",
                    result.index,
                    result.region.text(),
                    result.translated_text.replace('\n', " "),
                    marker
                );
            }
        }
        PipelineStatus::NoTextDetected => println!("no text detected"),
        PipelineStatus::NoTextAfterFilter => println!("no text above the confidence threshold"),
        PipelineStatus::UnreadableImage => println!("input could not be decoded as an image"),
    }
    println!("wrote {}", path.display());
}
