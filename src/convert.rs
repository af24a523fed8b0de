//! Filtered archive-to-archive copy.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWrite, BufWriter};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::ConvertError;
use crate::filter::{EntryFilter, NameFilter, SimpleNameFilter};
use crate::io::{LocalFileReader, ReadAt};
use crate::zip::{ZipFileEntry, ZipReader, ZipWriter};

/// Default ceiling on an entry's stored size: 16 MiB.
pub const MAX_ITEM_SIZE_DEFAULT: i64 = 16_777_216;

/// Rejects entries whose stored (compressed) size is above a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeGate {
    pub max_item_size: i64,
}

impl SizeGate {
    pub fn new(max_item_size: i64) -> Self {
        Self { max_item_size }
    }

    pub fn allow(&self, entry: &ZipFileEntry) -> bool {
        self.reject(entry).is_none()
    }

    /// Describe why `entry` is too big, or `None` when it fits.
    ///
    /// A size equal to the ceiling fits. A negative ceiling rejects everything.
    pub fn reject(&self, entry: &ZipFileEntry) -> Option<SizeRejection> {
        let too_big = match i64::try_from(entry.compressed_size) {
            Ok(size) => size > self.max_item_size,
            Err(_) => true,
        };
        too_big.then(|| SizeRejection {
            name: entry.file_name.clone(),
            size: entry.compressed_size,
            max_item_size: self.max_item_size,
        })
    }
}

impl Default for SizeGate {
    fn default() -> Self {
        Self::new(MAX_ITEM_SIZE_DEFAULT)
    }
}

/// An entry skipped for size. Advisory only, the run goes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeRejection {
    pub name: String,
    pub size: u64,
    pub max_item_size: i64,
}

impl fmt::Display for SizeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "too big file({}): {} (max item size {}); make ENV_MAX_ITEM_SIZE bigger to process it",
            self.size, self.name, self.max_item_size
        )
    }
}

/// Counts from a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertStats {
    pub copied: usize,
    pub skipped_by_filter: usize,
    pub skipped_by_size: usize,
}

/// Entry filter plus size ceiling, fixed for the duration of a run.
#[derive(Clone)]
pub struct ConvertConfig {
    filter: Arc<dyn EntryFilter>,
    max_item_size: i64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            filter: Arc::new(SimpleNameFilter::default().into_entry_filter()),
            max_item_size: MAX_ITEM_SIZE_DEFAULT,
        }
    }
}

impl fmt::Debug for ConvertConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertConfig")
            .field("max_item_size", &self.max_item_size)
            .finish_non_exhaustive()
    }
}

impl ConvertConfig {
    pub fn with_filter<F: EntryFilter + 'static>(mut self, filter: F) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn with_max_item_size(mut self, max_item_size: i64) -> Self {
        self.max_item_size = max_item_size;
        self
    }

    pub fn max_item_size(&self) -> i64 {
        self.max_item_size
    }

    pub fn size_gate(&self) -> SizeGate {
        SizeGate::new(self.max_item_size)
    }

    /// Copy the selected entries of the archive in `source` into a new
    /// archive written to `out`.
    ///
    /// Entries are visited in central directory order. For each one the
    /// cancel token is checked, then the size gate, then the filter; kept
    /// entries are copied raw. The destination is finalized whether or not
    /// the loop succeeded, and a finalize failure is joined with any earlier
    /// error.
    pub async fn zip_to_filtered<R, W>(
        &self,
        cancel: &CancelToken,
        source: Arc<R>,
        out: W,
    ) -> Result<ConvertStats, ConvertError>
    where
        R: ReadAt,
        W: AsyncWrite + Unpin,
    {
        let reader = ZipReader::open(source)
            .await
            .map_err(|err| ConvertError::ArchiveOpen(err.into()))?;

        let mut writer = ZipWriter::new(out);
        let copied = self.copy_selected(cancel, &reader, &mut writer).await;
        let finished = writer
            .finish()
            .await
            .map(drop)
            .map_err(|err| ConvertError::Finalize(err.into()));

        ConvertError::join(copied, finished)
    }

    async fn copy_selected<R, W>(
        &self,
        cancel: &CancelToken,
        reader: &ZipReader<R>,
        writer: &mut ZipWriter<W>,
    ) -> Result<ConvertStats, ConvertError>
    where
        R: ReadAt,
        W: AsyncWrite + Unpin,
    {
        let gate = self.size_gate();
        let mut stats = ConvertStats::default();

        for entry in reader.entries() {
            cancel.check()?;

            if let Some(rejection) = gate.reject(entry) {
                warn!(name = %rejection.name, size = rejection.size, "{rejection}");
                stats.skipped_by_size += 1;
                continue;
            }

            if !self.filter.decide(entry).is_keep() {
                debug!(name = %entry.file_name, "skipped by filter");
                stats.skipped_by_filter += 1;
                continue;
            }

            writer
                .raw_copy(reader, entry)
                .await
                .map_err(|err| ConvertError::Copy {
                    name: entry.file_name.clone(),
                    source: err.into(),
                })?;
            debug!(name = %entry.file_name, size = entry.compressed_size, "copied");
            stats.copied += 1;
        }

        Ok(stats)
    }

    /// Filter the archive at `path` into `out` through a buffered writer.
    pub async fn zip_file_to_writer<W>(
        &self,
        cancel: &CancelToken,
        path: &Path,
        out: W,
    ) -> Result<ConvertStats, ConvertError>
    where
        W: AsyncWrite + Unpin,
    {
        let reader =
            LocalFileReader::new(path).map_err(|err| ConvertError::ArchiveOpen(err.into()))?;
        self.zip_to_filtered(cancel, Arc::new(reader), BufWriter::new(out))
            .await
    }

    pub async fn zip_file_to_stdout(
        &self,
        cancel: &CancelToken,
        path: &Path,
    ) -> Result<ConvertStats, ConvertError> {
        self.zip_file_to_writer(cancel, path, tokio::io::stdout())
            .await
    }
}
