//! ZIP archive reading and verbatim rewriting.
//!
//! This module is the archive codec of the crate: it enumerates the entries
//! of a source archive and copies selected entries into a new archive
//! without decompressing them.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`reader`]: Entry enumeration, raw payload streaming and decoding
//! - [`writer`]: Raw entry copies and central directory finalization
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The reader starts from the EOCD and the central directory, so entry
//! order is always central directory order. The writer appends entries in
//! the order they are copied and writes its own central directory last.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB, on both sides
//! - Raw copies of entries with any compression method
//! - Decoding of STORED and DEFLATE entries
//!
//! ## Limitations
//!
//! - No multi-disk archive support
//! - Archive comments are not carried over

mod parser;
mod reader;
mod structures;
mod writer;

pub use parser::ZipParser;
pub use reader::ZipReader;
pub use structures::*;
pub use writer::ZipWriter;
