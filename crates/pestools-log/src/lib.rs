//! # pestools log extraction
//!
//! Extracts iteration histories and sensitivities from the plain-text reports
//! written by PEST and PEST_HP.
//!
//! ## Overview
//!
//! The reports are not a grammar. They are free text with known anchor phrases
//! and whitespace-delimited tables whose row counts come from counts reported
//! earlier in the same file. Extraction is split in two layers:
//!
//! - [`ScanCursor`](cursor::ScanCursor) - a byte-offset-aware reader that finds
//!   phrases, measures blocks and reads tables, landing exactly on the line after
//!   each table. It knows nothing about PEST.
//! - Extractors that own one cursor each and walk a file's section sequence:
//!   - [`OptimizationLogExtractor`](rec::OptimizationLogExtractor) for run
//!     records (`*.rec`)
//!   - [`SensitivityLogExtractor`](sen::SensitivityLogExtractor) for
//!     sensitivity files (`*.sen`)
//!
//! ```text
//! ┌────────────┐  open()   ┌────────────┐  extract()  ┌──────────────────────┐
//! │ .rec/.sen  │ ────────► │ ScanCursor │ ──────────► │ OptimizationHistory  │
//! │   file     │           │  (owned)   │             │ SensitivityHistory   │
//! └────────────┘           └────────────┘             └──────────────────────┘
//! ```
//!
//! Sections that repeat (iterations, observation groups) end when a probe for
//! the next one comes back empty; every other missing phrase is an error
//! carrying the phrase, the section and the byte offset.
//!
//! ## Examples
//!
//! ```no_run
//! use pestools_log::read_rec;
//!
//! let history = read_rec("case.rec")?;
//! println!("{} iterations", history.iteration_count());
//! if let Some(summary) = history.summary() {
//!     print!("{summary}");
//! }
//! # Ok::<(), pestools_log::ScanError>(())
//! ```
//!
//! Any seekable reader works, which keeps tests off the filesystem:
//!
//! ```
//! use std::io::Cursor;
//! use pestools_log::cursor::{Case, Landing, ScanCursor};
//!
//! let text = "PEST Version: 17.2\nnext line\n";
//! let mut cursor = ScanCursor::from_reader(Cursor::new(text.as_bytes()))?;
//! cursor.find_phrase("version", Landing::LineStart, Case::Insensitive)?;
//! assert_eq!(cursor.read_field(2)?, "17.2");
//! assert_eq!(cursor.read_clean_line()?, "next line");
//! # Ok::<(), pestools_log::ScanError>(())
//! ```
//!
//! The output types implement `serde::Serialize`; NaN values become `null` in JSON.

/// Byte-offset-aware line scanner.
pub mod cursor;
pub mod error;
/// Extracted record types.
pub mod ir;
/// Run record extraction.
pub mod rec;
/// Sensitivity file extraction.
pub mod sen;
pub mod summary;
/// Column specs and table blocks.
pub mod table;

#[cfg(test)]
mod tests;

pub use cursor::ScanCursor;
pub use error::{Result, ScanError};
pub use ir::{OptimizationHistory, SensitivityHistory};
pub use rec::{OptimizationLogExtractor, read_rec};
pub use sen::{SensitivityLogExtractor, read_sen};
pub use summary::Summary;
