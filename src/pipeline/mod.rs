//! Building blocks shared by every document operation.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ scratch ──▶ process ──▶ collect ──▶ scratch
//! (resolve)  (materialize) (run tool) (parse/read) (release)
//! ```
//!
//! 1. [`input`]   — turn a buffer, stream or URL into a byte [`input::Source`]
//! 2. [`scratch`] — open a private per-operation directory, write sources into
//!    it, and remove it with everything inside when the operation ends
//! 3. [`process`] — run an external tool from an argument vector and classify
//!    its exit
//! 4. [`collect`] — parse inspection output and enumerate burst pages

pub mod collect;
pub mod input;
pub mod process;
pub mod scratch;
