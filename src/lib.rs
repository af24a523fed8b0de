//! # zip2zip
//!
//! Filter a ZIP archive into a new ZIP archive without recompressing anything.
//!
//! Every entry of the source archive is checked, in central directory order,
//! against a size ceiling on its stored (compressed) size and then against an
//! entry filter. Kept entries are copied raw: same compression method, same
//! compressed bytes, same metadata. The destination central directory is
//! written once all entries have been visited.
//!
//! ## Features
//!
//! - Name selection by regular expression, keeping either matches or non-matches
//! - Size ceiling that skips oversized entries with a warning
//! - Verbatim entry copies, including ZIP64 and data-descriptor entries
//! - Cooperative cancellation between entries
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use zip2zip::{CancelToken, ConvertConfig, NameFilter, SimpleNameFilter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let filter = SimpleNameFilter::default()
//!         .with_pattern_string(r"\.txt$")
//!         .with_include_found(true);
//!     let config = ConvertConfig::default().with_filter(filter.into_entry_filter());
//!
//!     let out = tokio::fs::File::create("texts.zip").await?;
//!     let stats = config
//!         .zip_file_to_writer(&CancelToken::new(), Path::new("archive.zip"), out)
//!         .await?;
//!     eprintln!("copied {} entries", stats.copied);
//!
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod cli;
pub mod convert;
pub mod error;
pub mod filter;
pub mod io;
pub mod zip;

pub use cancel::CancelToken;
pub use cli::{Cli, Settings};
pub use convert::{ConvertConfig, ConvertStats, MAX_ITEM_SIZE_DEFAULT, SizeGate, SizeRejection};
pub use error::ConvertError;
pub use filter::{
    ByName, EntryFilter, FilterResult, NameFilter, NopFilter, Pattern, SimpleNameFilter,
};
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use zip::{ZipFileEntry, ZipReader, ZipWriter};
