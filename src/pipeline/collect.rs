//! Turning tool output back into typed results.
//!
//! Two collectors live here:
//!
//! * [`parse_metadata`] reads the inspection tool's comma-delimited summary
//!   line (`type,width,height,pages,`), which the tool repeats once per page.
//!   Only the first record is used.
//! * [`enumerate_pages`] lists the files the page-assembly tool burst into a
//!   directory and orders them by the page number embedded in each name.
//!   Directory listings come back in no particular order, so the sort here
//!   is the only thing guaranteeing `1..N`.

use crate::error::MassageError;
use crate::output::{MetaData, POINTS_PER_INCH};
use crate::pipeline::scratch::io_failure;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `-format` string handed to the inspection tool.
pub const METADATA_FORMAT: &str = "%m,%[fx:w],%[fx:h],%n,";

/// Output pattern handed to the page-assembly tool's burst.
pub const PAGE_PATTERN: &str = "page_%03d";

/// Parse the inspection tool's stdout into [`MetaData`].
///
/// Width and height arrive in points and are converted to inches. Anything
/// that does not carry four usable fields means the tool could not make
/// sense of the input, so it is reported as [`MassageError::InvalidDocument`].
pub fn parse_metadata(stdout: &str) -> Result<MetaData, MassageError> {
    let mut fields = stdout.trim().split(',').map(str::trim);
    let record = (fields.next(), fields.next(), fields.next(), fields.next());

    let (Some(file_type), Some(width), Some(height), Some(pages)) = record else {
        warn!("Inspection output too short: {:?}", stdout);
        return Err(MassageError::InvalidDocument);
    };

    let parsed = (
        width.parse::<f64>(),
        height.parse::<f64>(),
        pages.parse::<u32>(),
    );
    match parsed {
        (Ok(w), Ok(h), Ok(n)) if !file_type.is_empty() && n > 0 => Ok(MetaData {
            file_type: file_type.to_ascii_uppercase(),
            width: w / POINTS_PER_INCH,
            length: h / POINTS_PER_INCH,
            page_count: n,
        }),
        _ => {
            warn!("Unparseable inspection output: {:?}", stdout);
            Err(MassageError::InvalidDocument)
        }
    }
}

static RE_PAGE_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^page_(\d+)$").unwrap());

/// Page number embedded in a burst file name such as `page_007`.
pub fn page_index(file_name: &str) -> Option<u32> {
    RE_PAGE_INDEX
        .captures(file_name)
        .and_then(|caps| caps[1].parse().ok())
}

/// Find every `page_NNN` file in `dir`, sorted by page number.
pub async fn enumerate_pages(dir: &Path) -> Result<Vec<(u32, PathBuf)>, MassageError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| io_failure("list", dir, e))?;

    let mut pages = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| io_failure("list", dir, e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        match page_index(&name) {
            Some(page) => pages.push((page, entry.path())),
            None => debug!("Ignoring non-page file {}", name),
        }
    }

    pages.sort_by_key(|(page, _)| *page);
    Ok(pages)
}

/// Check the burst produced pages `1..=N` with no gaps.
pub fn check_contiguous(pages: &[(u32, PathBuf)]) -> Result<(), MassageError> {
    for (expected, (page, path)) in (1u32..).zip(pages) {
        if *page != expected {
            warn!(
                "Burst output has a gap: expected page {}, found {}",
                expected,
                path.display()
            );
            return Err(MassageError::ProcessingFailure);
        }
    }
    Ok(())
}
