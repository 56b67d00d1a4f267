//! # pdf-massage
//!
//! Inspect, rotate, merge, split and rasterise PDFs and images by driving
//! ImageMagick (`identify`, `convert`) and `pdftk`.
//!
//! The rendering work belongs to those tools. This crate handles everything
//! around them: accepting documents as buffers, streams or URLs, writing them
//! to a private scratch directory per operation, building argument vectors (never shell
//! strings), turning exit codes and stderr into a small closed error set,
//! parsing tool output, and removing every scratch file on every exit path,
//! including when several operations run at once.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document (bytes | stream | URL)
//!  │
//!  ├─ 1. Input    fetch URLs (10 s timeout), pass bytes/streams through
//!  ├─ 2. Scratch  write to <scratch>/<op>_XXXXXX/<name>
//!  ├─ 3. Process  identify / convert / pdftk from an argument vector
//!  ├─ 4. Collect  parse metadata, enumerate + sort burst pages, read back
//!  └─ 5. Release  unlink every scratch path, success or failure
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_massage::{Massage, MassageConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let massage = Massage::new(MassageConfig::default())?;
//!
//!     let pdf = massage.get_buffer("https://example.com/3x4x6.pdf").await?;
//!     for page in massage.burst_pdf(pdf).await? {
//!         let thumb = massage.generate_thumbnail(page.bytes, "20%").await?;
//!         std::fs::write(format!("page_{:03}.png", page.page), thumb)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Units
//!
//! [`MetaData::width`] and [`MetaData::length`] are in inches, measured on
//! the first page only.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `massage` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## External Tools
//!
//! | Tool | Used by |
//! |------|---------|
//! | `identify` | [`Massage::get_meta_data`] |
//! | `convert`  | [`Massage::rotate_pdf`], [`Massage::generate_thumbnail`], [`Massage::image_to_pdf`] |
//! | `pdftk`    | [`Massage::merge`], [`Massage::burst_pdf`] |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod massage;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{MassageConfig, MassageConfigBuilder};
pub use error::{ConfigError, MassageError};
pub use massage::Massage;
pub use output::{calculate_dpi, MetaData, PageArtifact, Rotation};
pub use pipeline::input::{validate_url, ByteStream, Document};
pub use pipeline::scratch::release;
