//! CLI binary for pdf-massage.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `MassageConfig`, reads inputs from files or URLs, and writes results to
//! files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_massage::{Document, Massage, MassageConfig};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Page size (inches) and page count
  massage meta document.pdf
  massage meta --json https://example.com/3x4x6.pdf

  # Rotate a quarter turn clockwise
  massage rotate document.pdf 90 -o rotated.pdf

  # Concatenate
  massage merge a.pdf b.pdf c.pdf -o merged.pdf

  # One file per page: pages/page_001.pdf, pages/page_002.pdf, ...
  massage burst document.pdf -o pages/

  # First page thumbnail
  massage thumbnail document.pdf 200x200 -o thumb.png

  # Image to PDF at 300 DPI
  massage image-to-pdf scan.png --dpi 300 -o scan.pdf

REQUIRED TOOLS:
  identify, convert   ImageMagick (with Ghostscript for PDF input)
  pdftk               PDF toolkit
"#;

/// Inspect, rotate, merge, burst and rasterise PDFs via ImageMagick and pdftk.
#[derive(Parser, Debug)]
#[command(
    name = "massage",
    version,
    about = "Inspect, rotate, merge, burst and rasterise PDFs via ImageMagick and pdftk",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory for temporary files.
    #[arg(long, global = true, env = "MASSAGE_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Path to ImageMagick `identify`.
    #[arg(long, global = true, env = "MASSAGE_IDENTIFY", default_value = "identify")]
    identify: PathBuf,

    /// Path to ImageMagick `convert`.
    #[arg(long, global = true, env = "MASSAGE_CONVERT", default_value = "convert")]
    convert: PathBuf,

    /// Path to `pdftk`.
    #[arg(long, global = true, env = "MASSAGE_PDFTK", default_value = "pdftk")]
    pdftk: PathBuf,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "MASSAGE_FETCH_TIMEOUT", default_value_t = 10)]
    fetch_timeout: u64,

    /// Per-tool timeout in seconds (0 = none).
    #[arg(long, global = true, env = "MASSAGE_TOOL_TIMEOUT", default_value_t = 120)]
    tool_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MASSAGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MASSAGE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print file type, size (inches) and page count.
    Meta {
        /// File path or URL.
        input: String,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Rotate every page clockwise.
    Rotate {
        input: String,
        /// 90, 180 or 270.
        #[arg(allow_hyphen_values = true)]
        degrees: i64,
        #[arg(short, long)]
        output: PathBuf,
        /// Rasterisation density.
        #[arg(long, default_value_t = 300)]
        density: u32,
    },
    /// Concatenate documents in order.
    Merge {
        /// Two or more file paths or URLs.
        #[arg(num_args = 2.., required = true)]
        inputs: Vec<String>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Split into one PDF per page.
    Burst {
        input: String,
        /// Output directory.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Render the first page resized to GEOMETRY (e.g. 200x200, 20%).
    Thumbnail {
        input: String,
        geometry: String,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value_t = 72)]
        density: u32,
        /// Image format / extension.
        #[arg(long, default_value = "png")]
        format: String,
    },
    /// Wrap a raster image in a PDF.
    ImageToPdf {
        input: String,
        #[arg(long, default_value_t = 300)]
        dpi: u32,
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Open a CLI input: URLs stay locators, anything else is streamed from disk.
async fn open_input(input: &str) -> Result<Document> {
    if pdf_massage::validate_url(input).is_ok() && !Path::new(input).exists() {
        return Ok(Document::Locator(input.to_string()));
    }
    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("Failed to open '{input}'"))?;
    Ok(Document::from_reader(file))
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write '{}'", path.display()))
}

fn build_config(cli: &Cli) -> Result<MassageConfig> {
    let mut builder = MassageConfig::builder()
        .identify_path(&cli.identify)
        .convert_path(&cli.convert)
        .pdftk_path(&cli.pdftk)
        .fetch_timeout_secs(cli.fetch_timeout)
        .tool_timeout_secs(cli.tool_timeout);
    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    match &cli.command {
        Command::Rotate { density, .. } => builder = builder.rotate_density(*density),
        Command::Thumbnail {
            density, format, ..
        } => {
            builder = builder
                .thumbnail_density(*density)
                .thumbnail_format(format.clone())
        }
        _ => {}
    }
    builder.build().context("Invalid configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let massage = Massage::new(build_config(&cli)?).context("Failed to initialise")?;
    let start = Instant::now();

    let written: Vec<PathBuf> = match &cli.command {
        Command::Meta { input, json } => {
            let meta = massage
                .get_meta_data(open_input(input).await?)
                .await
                .context("Failed to inspect document")?;
            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
                );
            } else {
                println!("File:    {}", input);
                println!("Type:    {}", meta.file_type);
                println!("Size:    {} x {} in", meta.width, meta.length);
                println!("Pages:   {}", meta.page_count);
            }
            Vec::new()
        }
        Command::Rotate {
            input,
            degrees,
            output,
            ..
        } => {
            let pdf = massage
                .rotate_pdf(open_input(input).await?, *degrees)
                .await
                .context("Rotation failed")?;
            write_output(output, &pdf).await?;
            vec![output.clone()]
        }
        Command::Merge { inputs, output } => {
            let mut documents = Vec::with_capacity(inputs.len());
            for input in inputs {
                documents.push(open_input(input).await?);
            }
            let pdf = massage
                .merge_all(documents)
                .await
                .context("Merge failed")?;
            write_output(output, &pdf).await?;
            vec![output.clone()]
        }
        Command::Burst { input, output } => {
            let pages = massage
                .burst_pdf(open_input(input).await?)
                .await
                .context("Burst failed")?;
            let mut written = Vec::with_capacity(pages.len());
            for page in pages {
                let path = output.join(format!("page_{:03}.pdf", page.page));
                write_output(&path, &page.bytes).await?;
                written.push(path);
            }
            written
        }
        Command::Thumbnail {
            input,
            geometry,
            output,
            ..
        } => {
            let image = massage
                .generate_thumbnail(open_input(input).await?, geometry)
                .await
                .context("Thumbnail failed")?;
            write_output(output, &image).await?;
            vec![output.clone()]
        }
        Command::ImageToPdf { input, dpi, output } => {
            let pdf = massage
                .image_to_pdf(open_input(input).await?, *dpi)
                .await
                .context("Image conversion failed")?;
            write_output(output, &pdf).await?;
            vec![output.clone()]
        }
    };

    if !cli.quiet && !written.is_empty() {
        eprintln!(
            "{}  {} file(s) in {}ms",
            green("✔"),
            written.len(),
            start.elapsed().as_millis()
        );
        for path in &written {
            eprintln!("   {}", bold(&path.display().to_string()));
        }
    }

    Ok(())
}
