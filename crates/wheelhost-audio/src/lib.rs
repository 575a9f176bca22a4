//! Audio helper ingestion.
//!
//! A platform helper process (Swift on macOS, C# on Windows) listens to
//! system audio and streams envelope features as JSON lines on its stdout.
//! The ingestor supervises that child and exposes only the latest features;
//! it performs no DSP of its own and trusts helper-reported envelopes.

#![deny(static_mut_refs)]

mod ingestor;
mod line;

pub use ingestor::{AudioIngestor, AudioSnapshot, IngestorError};
pub use line::{parse_helper_line, HelperMsg};
