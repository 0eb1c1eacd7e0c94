//! Snapshot import and export over a flat object namespace.
//!
//! A bucket prefix is presented to the snapshot engine as a file tree and
//! file streams from the engine are written back as objects.
//!
//! - [`Importer`] lists a prefix and streams [`ScanRecord`]s. Directories are
//!   synthesized by [`TreeSynthesizer`]; file bodies are read on demand
//!   through a [`ContentHandle`].
//! - [`Exporter`] consumes [`ExportRecord`]s and yields one [`ExportResult`]
//!   per record, writing regular files with bounded parallelism.
//!
//! # Design Rules
//!
//! 1. Every directory is emitted once per scan, before anything beneath it.
//! 2. A listing failure ends a scan with one error record.
//! 3. Export never drops or duplicates a record's result.
//! 4. Each importer or exporter closes its connection at most once.

pub mod error;
pub mod exporter;
pub mod importer;
pub mod record;
pub mod synth;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{ExportError, ImportError, ImportResult};
pub use exporter::{ExportRecord, ExportResult, Exporter, ExporterOptions};
pub use importer::{Importer, ImporterOptions};
pub use record::{ContentHandle, EntryKind, FileRecord, ScanRecord, DIRECTORY_MODE, FILE_MODE};
pub use synth::TreeSynthesizer;
