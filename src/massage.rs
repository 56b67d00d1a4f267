//! The document operations.
//!
//! Every operation follows the same shape:
//!
//! ```text
//! validate ─▶ open Scratch ─▶ resolve + materialize ─▶ run tool ─▶ collect
//!                  │                                                  │
//!                  └──────────── release (always, awaited) ◀──────────┘
//! ```
//!
//! The public method opens the [`Scratch`] directory, hands it to a private
//! `*_in` body that may fail at any step with `?`, then awaits
//! `scratch.release()` before returning whatever the body produced. A
//! cancelled or panicking body is covered by the directory's `Drop`.

use crate::config::MassageConfig;
use crate::error::MassageError;
use crate::output::{MetaData, PageArtifact, Rotation};
use crate::pipeline::collect::{self, METADATA_FORMAT, PAGE_PATTERN};
use crate::pipeline::input::{self, ByteStream, Document, Source};
use crate::pipeline::process::{self, Invocation};
use crate::pipeline::scratch::{self, Scratch};
use futures::future::join_all;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Prefix the inspection tool puts on its error lines.
const IDENTIFY_ERROR_MARKER: &str = "identify";

/// Orchestrates identify / convert / pdftk over caller documents.
///
/// Cheap to clone; clones share one HTTP client. Independent operations may
/// run concurrently on the same value: each works in its own scratch
/// directory.
///
/// # Example
/// ```rust,no_run
/// use pdf_massage::{Massage, MassageConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let massage = Massage::new(MassageConfig::default())?;
/// let pdf = std::fs::read("4x6.pdf")?;
/// let rotated = massage.rotate_pdf(pdf, 90).await?;
/// let meta = massage.get_meta_data(rotated).await?;
/// println!("{} x {} in, {} page(s)", meta.width, meta.length, meta.page_count);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Massage {
    config: MassageConfig,
    client: Client,
}

impl Massage {
    pub fn new(config: MassageConfig) -> Result<Self, MassageError> {
        Ok(Self {
            config,
            client: input::build_client()?,
        })
    }

    pub fn config(&self) -> &MassageConfig {
        &self.config
    }

    // ── Input ────────────────────────────────────────────────────────────

    /// Resolve any document to an in-memory buffer.
    ///
    /// Buffers are returned unchanged, locators are downloaded and streams
    /// are drained.
    pub async fn get_buffer(&self, document: impl Into<Document>) -> Result<Vec<u8>, MassageError> {
        let source = self.resolve(document.into()).await?;
        source.into_bytes().await.map_err(|e| {
            warn!("Failed to drain input stream: {}", e);
            MassageError::ProcessingFailure
        })
    }

    /// Open a locator as a stream after confirming it answers `HEAD` with 200.
    pub async fn get_stream(&self, url: &str) -> Result<ByteStream, MassageError> {
        input::open_stream(&self.client, url, self.config.fetch_timeout()).await
    }

    async fn resolve(&self, document: Document) -> Result<Source, MassageError> {
        input::resolve(&self.client, document, self.config.fetch_timeout()).await
    }

    fn scratch(&self, prefix: &str) -> Result<Scratch, MassageError> {
        Scratch::new(&self.config.scratch_dir, prefix)
    }

    async fn run_checked(
        &self,
        invocation: &Invocation,
        stdin: Option<Source>,
        marker: Option<&str>,
    ) -> Result<process::ToolOutput, MassageError> {
        let output = process::run(invocation, stdin, self.config.tool_timeout()).await?;
        output.classify(&invocation.tool_name(), marker)?;
        Ok(output)
    }

    // ── Metadata ─────────────────────────────────────────────────────────

    /// Inspect a document's first page.
    ///
    /// The bytes are piped to the inspection tool's stdin, so no temp file is
    /// created.
    pub async fn get_meta_data(&self, document: impl Into<Document>) -> Result<MetaData, MassageError> {
        let source = self.resolve(document.into()).await?;
        let invocation = Invocation::new(&self.config.identify_path)
            .arg("-density")
            .arg(self.config.inspect_density.to_string())
            .arg("-format")
            .arg(METADATA_FORMAT)
            .arg("-");

        let output = self
            .run_checked(&invocation, Some(source), Some(IDENTIFY_ERROR_MARKER))
            .await?;
        let meta = collect::parse_metadata(&output.stdout_lossy())?;
        debug!("Metadata: {:?}", meta);
        Ok(meta)
    }

    // ── Rotate ───────────────────────────────────────────────────────────

    /// Rotate every page clockwise by `degrees` (90, 180 or 270).
    ///
    /// Any other angle fails with [`MassageError::InvalidRotation`] before
    /// the document is even resolved.
    pub async fn rotate_pdf(
        &self,
        document: impl Into<Document>,
        degrees: i64,
    ) -> Result<Vec<u8>, MassageError> {
        let rotation = Rotation::try_from(degrees)?;
        let document = document.into();
        let scratch = self.scratch("rotate")?;
        let result = self.rotate_in(&scratch, document, rotation).await;
        scratch.release().await;
        result
    }

    async fn rotate_in(
        &self,
        scratch: &Scratch,
        document: Document,
        rotation: Rotation,
    ) -> Result<Vec<u8>, MassageError> {
        info!("Rotating document by {}°", rotation);
        let source = self.resolve(document).await?;
        let in_path = scratch.materialize(source, "in.pdf").await?;
        let out_path = scratch.file("out.pdf");

        let invocation = Invocation::new(&self.config.convert_path)
            .arg("-rotate")
            .arg(rotation.to_string())
            .arg("-density")
            .arg(self.config.rotate_density.to_string())
            .arg(&in_path)
            .arg(&out_path);
        self.run_checked(&invocation, None, None).await?;
        scratch::read_artifact(&out_path).await
    }

    // ── Merge ────────────────────────────────────────────────────────────

    /// Concatenate two documents, `first` then `second`.
    pub async fn merge(
        &self,
        first: impl Into<Document>,
        second: impl Into<Document>,
    ) -> Result<Vec<u8>, MassageError> {
        self.merge_all(vec![first.into(), second.into()]).await
    }

    /// Concatenate one or more documents in order.
    ///
    /// Inputs are resolved and written concurrently. Every branch runs to
    /// completion; if any failed, the first failure (in input order) is
    /// returned after all written files are removed. An empty list is a
    /// [`MassageError::ProcessingFailure`] without any I/O.
    pub async fn merge_all(&self, documents: Vec<Document>) -> Result<Vec<u8>, MassageError> {
        if documents.is_empty() {
            warn!("Nothing to merge");
            return Err(MassageError::ProcessingFailure);
        }
        let scratch = self.scratch("merge")?;
        let result = self.merge_in(&scratch, documents).await;
        scratch.release().await;
        result
    }

    async fn merge_in(
        &self,
        scratch: &Scratch,
        documents: Vec<Document>,
    ) -> Result<Vec<u8>, MassageError> {
        let start = Instant::now();
        info!("Merging {} documents", documents.len());

        let in_paths: Vec<PathBuf> = (1..=documents.len())
            .map(|i| scratch.file(&format!("in{i}.pdf")))
            .collect();
        let out_path = scratch.file("out.pdf");

        let writes = documents
            .into_iter()
            .zip(&in_paths)
            .map(|(doc, path)| async move {
                let source = self.resolve(doc).await?;
                scratch::write_source(source, path).await
            });
        join_all(writes)
            .await
            .into_iter()
            .collect::<Result<Vec<()>, MassageError>>()?;

        let mut invocation = Invocation::new(&self.config.pdftk_path);
        for path in &in_paths {
            invocation = invocation.arg(path);
        }
        let invocation = invocation.arg("cat").arg("output").arg(&out_path);
        self.run_checked(&invocation, None, None).await?;

        let merged = scratch::read_artifact(&out_path).await?;
        info!(
            "Merged {} inputs into {} bytes in {}ms",
            in_paths.len(),
            merged.len(),
            start.elapsed().as_millis()
        );
        Ok(merged)
    }

    // ── Burst ────────────────────────────────────────────────────────────

    /// Split a document into single-page PDFs, ordered by page number.
    ///
    /// The tool runs from the operation's scratch directory, so the
    /// fixed-name log it writes stays private to this burst and goes away
    /// with the directory.
    pub async fn burst_pdf(&self, document: impl Into<Document>) -> Result<Vec<PageArtifact>, MassageError> {
        let document = document.into();
        let scratch = self.scratch("burst")?;
        let result = self.burst_in(&scratch, document).await;
        scratch.release().await;
        result
    }

    async fn burst_in(
        &self,
        scratch: &Scratch,
        document: Document,
    ) -> Result<Vec<PageArtifact>, MassageError> {
        let start = Instant::now();
        let source = self.resolve(document).await?;
        scratch.materialize(source, "in.pdf").await?;

        // Relative names: the tool runs from the scratch directory.
        let invocation = Invocation::new(&self.config.pdftk_path)
            .arg("in.pdf")
            .arg("burst")
            .arg("output")
            .arg(PAGE_PATTERN)
            .current_dir(scratch.path());
        self.run_checked(&invocation, None, None).await?;

        let pages = collect::enumerate_pages(scratch.path()).await?;
        collect::check_contiguous(&pages)?;

        let reads = pages.iter().map(|(page, path)| async move {
            scratch::read_artifact(path).await.map(|bytes| PageArtifact {
                page: *page,
                bytes,
            })
        });
        let artifacts = join_all(reads)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, MassageError>>()?;

        info!(
            "Burst into {} pages in {}ms",
            artifacts.len(),
            start.elapsed().as_millis()
        );
        Ok(artifacts)
    }

    // ── Thumbnail ────────────────────────────────────────────────────────

    /// Render the first page resized to `geometry` (e.g. `"200x200"`, `"20%"`).
    ///
    /// The geometry is passed to the rasterizer untouched; a malformed one
    /// makes it exit non-zero, reported as
    /// [`MassageError::ProcessingFailure`].
    pub async fn generate_thumbnail(
        &self,
        document: impl Into<Document>,
        geometry: &str,
    ) -> Result<Vec<u8>, MassageError> {
        let document = document.into();
        let scratch = self.scratch("thumb")?;
        let result = self.thumbnail_in(&scratch, document, geometry).await;
        scratch.release().await;
        result
    }

    async fn thumbnail_in(
        &self,
        scratch: &Scratch,
        document: Document,
        geometry: &str,
    ) -> Result<Vec<u8>, MassageError> {
        info!("Generating {} thumbnail", geometry);
        let source = self.resolve(document).await?;
        let in_path = scratch.materialize(source, "in").await?;
        let out_path = scratch.file(&format!("out.{}", self.config.thumbnail_format));

        let mut first_page = in_path.clone().into_os_string();
        first_page.push("[0]");
        let invocation = Invocation::new(&self.config.convert_path)
            .arg("-resize")
            .arg(geometry)
            .arg("-density")
            .arg(self.config.thumbnail_density.to_string())
            .arg(first_page)
            .arg(&out_path);
        self.run_checked(&invocation, None, None).await?;
        scratch::read_artifact(&out_path).await
    }

    // ── Image → PDF ──────────────────────────────────────────────────────

    /// Wrap a raster image in a PDF whose page size follows from `dpi`.
    pub async fn image_to_pdf(
        &self,
        image: impl Into<Document>,
        dpi: u32,
    ) -> Result<Vec<u8>, MassageError> {
        let image = image.into();
        let scratch = self.scratch("img2pdf")?;
        let result = self.image_to_pdf_in(&scratch, image, dpi).await;
        scratch.release().await;
        result
    }

    async fn image_to_pdf_in(
        &self,
        scratch: &Scratch,
        image: Document,
        dpi: u32,
    ) -> Result<Vec<u8>, MassageError> {
        info!("Converting image to PDF at {} DPI", dpi);
        let source = self.resolve(image).await?;
        let in_path = scratch.materialize(source, "in").await?;
        let out_path = scratch.file("out.pdf");

        let invocation = Invocation::new(&self.config.convert_path)
            .arg(&in_path)
            .arg("-quality")
            .arg("100")
            .arg("-units")
            .arg("PixelsPerInch")
            .arg("-density")
            .arg(format!("{dpi}x{dpi}"))
            .arg(&out_path);
        self.run_checked(&invocation, None, None).await?;
        scratch::read_artifact(&out_path).await
    }
}
