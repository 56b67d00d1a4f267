//! Typed values handed back to callers.

use crate::error::MassageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Points per inch; the inspection tool reports points at 72 DPI.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Summary of a document, taken from its first page.
///
/// `width` and `length` are in **inches**. Only page 1 is inspected, so for
/// documents with mixed page sizes they describe page 1 alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    /// Normalised short format code, e.g. `"PDF"`, `"PNG"`.
    pub file_type: String,
    pub width: f64,
    pub length: f64,
    pub page_count: u32,
}

/// One page produced by [`crate::Massage::burst_pdf`].
#[derive(Clone, PartialEq, Eq)]
pub struct PageArtifact {
    /// 1-based page index.
    pub page: u32,
    /// Single-page PDF bytes.
    pub bytes: Vec<u8>,
}

impl fmt::Debug for PageArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageArtifact")
            .field("page", &self.page)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// A clockwise quarter-turn multiple accepted by [`crate::Massage::rotate_pdf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    Quarter,
    Half,
    ThreeQuarter,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarter => 270,
        }
    }

    /// `true` when width and length trade places.
    pub fn swaps_dimensions(self) -> bool {
        !matches!(self, Rotation::Half)
    }
}

impl TryFrom<i64> for Rotation {
    type Error = MassageError;

    fn try_from(degrees: i64) -> Result<Self, Self::Error> {
        match degrees {
            90 => Ok(Rotation::Quarter),
            180 => Ok(Rotation::Half),
            270 => Ok(Rotation::ThreeQuarter),
            _ => Err(MassageError::InvalidRotation),
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

/// DPI at which an `in_width` × `in_length` page (pixels or points) must be
/// rendered to fill an `out_width` × `out_length` inch target.
///
/// When the aspect ratios match this is `in_length / out_length`. Otherwise
/// the page is assumed to be turned a quarter relative to the target, so its
/// width is measured against the target length.
pub fn calculate_dpi(in_width: f64, in_length: f64, out_width: f64, out_length: f64) -> f64 {
    if in_width / in_length == out_width / out_length {
        in_length / out_length
    } else {
        in_width / out_length
    }
}
