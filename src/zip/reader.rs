use std::io::Read;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};
use flate2::read::DeflateDecoder;

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Chunk size used when streaming an entry's raw payload.
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Read side of an archive: its entries and their raw payloads
pub struct ZipReader<R: ReadAt> {
    parser: ZipParser<R>,
    entries: Vec<ZipFileEntry>,
}

impl<R: ReadAt> ZipReader<R> {
    /// Parse the central directory of `reader`.
    pub async fn open(reader: Arc<R>) -> Result<Self> {
        let parser = ZipParser::new(reader);
        let entries = parser.list_files().await?;
        Ok(Self { parser, entries })
    }

    /// Entries in central directory order
    pub fn entries(&self) -> &[ZipFileEntry] {
        &self.entries
    }

    pub async fn data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        self.parser.get_data_offset(entry).await
    }

    /// Stream the stored bytes of `entry` to `out` exactly as they appear in
    /// the archive, without decompressing them.
    ///
    /// Returns the number of bytes written, which always equals
    /// `entry.compressed_size` on success.
    pub async fn copy_raw<W>(&self, entry: &ZipFileEntry, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let data_offset = self.data_offset(entry).await?;
        self.copy_raw_from(entry, data_offset, out).await
    }

    /// Like [`ZipReader::copy_raw`] with the payload offset already known.
    pub async fn copy_raw_from<W>(
        &self,
        entry: &ZipFileEntry,
        data_offset: u64,
        out: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut offset = data_offset;
        let mut remaining = entry.compressed_size;
        let mut buf = vec![0u8; COPY_CHUNK_SIZE.min(remaining as usize)];

        while remaining > 0 {
            let len = buf.len().min(remaining as usize);
            self.parser
                .reader()
                .read_exact_at(offset, &mut buf[..len])
                .await?;
            out.write_all(&buf[..len]).await?;
            offset += len as u64;
            remaining -= len as u64;
        }

        Ok(entry.compressed_size)
    }

    /// Read and decode the contents of `entry`.
    pub async fn read_entry(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        // Bounds-checked against the archive, so the size below is sane
        let data_offset = self.data_offset(entry).await?;
        let mut raw = Vec::with_capacity(entry.compressed_size as usize);
        self.copy_raw_from(entry, data_offset, &mut raw).await?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => raw,
            CompressionMethod::Deflate => {
                // The declared size is untrusted; one byte past it is enough
                // to notice a longer stream.
                let limit = entry.uncompressed_size.saturating_add(1);
                let capacity = COPY_CHUNK_SIZE.min(entry.uncompressed_size as usize);
                let mut data = Vec::with_capacity(capacity);
                DeflateDecoder::new(raw.as_slice())
                    .take(limit)
                    .read_to_end(&mut data)
                    .with_context(|| format!("failed to inflate {}", entry.file_name))?;
                data
            }
            CompressionMethod::Unknown(method) => {
                bail!(
                    "Unsupported compression method {} for {}",
                    method,
                    entry.file_name
                );
            }
        };

        if data.len() as u64 != entry.uncompressed_size {
            bail!(
                "{} decoded to {} bytes, expected {}",
                entry.file_name,
                data.len(),
                entry.uncompressed_size
            );
        }
        let mut crc = flate2::Crc::new();
        crc.update(&data);
        if crc.sum() != entry.crc32 {
            bail!("CRC-32 mismatch for {}", entry.file_name);
        }

        Ok(data)
    }
}
