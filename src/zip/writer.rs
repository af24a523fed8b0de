//! Archive writer that only accepts entries copied from another archive.
//!
//! Each copied entry gets a fresh local header built from the source
//! central directory record, followed by the untouched payload bytes. The
//! central directory is kept in memory and written by [`ZipWriter::finish`].

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

use crate::io::ReadAt;
use anyhow::{Result, bail};

use super::reader::ZipReader;
use super::structures::*;

/// One entry of the central directory still to be written.
struct CentralRecord {
    entry: ZipFileEntry,
    lfh_offset: u64,
}

impl CentralRecord {
    fn needs_zip64(&self) -> bool {
        self.entry.needs_zip64_sizes() || self.lfh_offset >= ZIP64_MARKER_32 as u64
    }

    /// ZIP64 block holding only the fields that overflow, in format order.
    fn zip64_extra(&self) -> Vec<u8> {
        let mut values = Vec::with_capacity(3);
        if self.entry.uncompressed_size >= ZIP64_MARKER_32 as u64 {
            values.push(self.entry.uncompressed_size);
        }
        if self.entry.compressed_size >= ZIP64_MARKER_32 as u64 {
            values.push(self.entry.compressed_size);
        }
        if self.lfh_offset >= ZIP64_MARKER_32 as u64 {
            values.push(self.lfh_offset);
        }
        zip64_block(&values)
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let entry = &self.entry;
        let mut extra = self.zip64_extra();
        extra.extend_from_slice(&entry.extra);
        check_field_len("extra field", &entry.file_name, extra.len())?;
        check_field_len("file name", &entry.file_name, entry.raw_name.len())?;
        check_field_len("comment", &entry.file_name, entry.comment.len())?;

        let mut buf = Vec::with_capacity(CDFH_MIN_SIZE + entry.raw_name.len() + extra.len());
        buf.write_all(CDFH_SIGNATURE)?;
        buf.write_u16::<LittleEndian>(entry.version_made_by)?;
        buf.write_u16::<LittleEndian>(version_needed(entry.version_needed, self.needs_zip64()))?;
        buf.write_u16::<LittleEndian>(entry.flags)?;
        buf.write_u16::<LittleEndian>(entry.compression_method.as_u16())?;
        buf.write_u16::<LittleEndian>(entry.last_mod_time)?;
        buf.write_u16::<LittleEndian>(entry.last_mod_date)?;
        buf.write_u32::<LittleEndian>(entry.crc32)?;
        buf.write_u32::<LittleEndian>(saturate_32(entry.compressed_size))?;
        buf.write_u32::<LittleEndian>(saturate_32(entry.uncompressed_size))?;
        buf.write_u16::<LittleEndian>(entry.raw_name.len() as u16)?;
        buf.write_u16::<LittleEndian>(extra.len() as u16)?;
        buf.write_u16::<LittleEndian>(entry.comment.len() as u16)?;
        // Disk number start
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(entry.internal_attrs)?;
        buf.write_u32::<LittleEndian>(entry.external_attrs)?;
        buf.write_u32::<LittleEndian>(saturate_32(self.lfh_offset))?;
        buf.write_all(&entry.raw_name)?;
        buf.write_all(&extra)?;
        buf.write_all(&entry.comment)?;
        Ok(buf)
    }
}

/// Passes writes through and counts the bytes the inner writer accepted.
///
/// Header offsets come from this count, so an entry that fails half way
/// still leaves the central directory pointing at the right place.
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: AsyncWrite + Unpin> AsyncWrite for CountingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.written += *n as u64;
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// ZIP archive writer for verbatim entry copies.
pub struct ZipWriter<W: AsyncWrite + Unpin> {
    writer: CountingWriter<W>,
    records: Vec<CentralRecord>,
}

impl<W: AsyncWrite + Unpin> ZipWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: CountingWriter {
                inner: writer,
                written: 0,
            },
            records: Vec::new(),
        }
    }

    /// Copy `entry` from `source` without re-encoding it.
    ///
    /// Method, flags, CRC, sizes, timestamps, attributes, name, extra field
    /// and comment are carried over; only the header offset changes.
    pub async fn raw_copy<R: ReadAt>(
        &mut self,
        source: &ZipReader<R>,
        entry: &ZipFileEntry,
    ) -> Result<()> {
        // Locate the payload first so a broken entry leaves no partial header
        let data_offset = source.data_offset(entry).await?;
        let header = local_header(entry)?;

        let lfh_offset = self.writer.written;
        tokio::io::AsyncWriteExt::write_all(&mut self.writer, &header).await?;
        source
            .copy_raw_from(entry, data_offset, &mut self.writer)
            .await?;

        if entry.has_data_descriptor() {
            let descriptor = data_descriptor(entry)?;
            tokio::io::AsyncWriteExt::write_all(&mut self.writer, &descriptor).await?;
        }

        self.records.push(CentralRecord {
            entry: entry.clone(),
            lfh_offset,
        });
        Ok(())
    }

    /// Write the central directory and end records, flush, and hand back
    /// the underlying writer.
    pub async fn finish(mut self) -> Result<W> {
        let cd_offset = self.writer.written;

        for record in &self.records {
            let encoded = record.encode()?;
            tokio::io::AsyncWriteExt::write_all(&mut self.writer, &encoded).await?;
        }
        let cd_size = self.writer.written - cd_offset;

        let total_entries = self.records.len() as u64;
        let mut tail = Vec::with_capacity(
            Zip64EOCD::MIN_SIZE + Zip64EOCDLocator::SIZE + EndOfCentralDirectory::SIZE,
        );

        if total_entries >= ZIP64_MARKER_16 as u64
            || cd_size >= ZIP64_MARKER_32 as u64
            || cd_offset >= ZIP64_MARKER_32 as u64
        {
            let eocd64_offset = cd_offset + cd_size;
            Zip64EOCD::for_directory(total_entries, cd_size, cd_offset).write_to(&mut tail)?;
            Zip64EOCDLocator {
                disk_with_eocd64: 0,
                eocd64_offset,
                total_disks: 1,
            }
            .write_to(&mut tail)?;
        }

        EndOfCentralDirectory::for_directory(total_entries, cd_size, cd_offset)
            .write_to(&mut tail)?;

        tokio::io::AsyncWriteExt::write_all(&mut self.writer, &tail).await?;
        tokio::io::AsyncWriteExt::flush(&mut self.writer).await?;
        Ok(self.writer.inner)
    }
}

fn local_header(entry: &ZipFileEntry) -> Result<Vec<u8>> {
    let zip64 = entry.needs_zip64_sizes();
    let deferred = entry.has_data_descriptor();

    // With a data descriptor the local CRC and sizes are zero
    let (crc32, compressed, uncompressed) = if deferred {
        (0, 0, 0)
    } else {
        (entry.crc32, entry.compressed_size, entry.uncompressed_size)
    };

    let mut extra = if zip64 {
        zip64_block(&[uncompressed, compressed])
    } else {
        Vec::new()
    };
    extra.extend_from_slice(&entry.extra);
    check_field_len("extra field", &entry.file_name, extra.len())?;
    check_field_len("file name", &entry.file_name, entry.raw_name.len())?;

    let (compressed_32, uncompressed_32) = if zip64 {
        (ZIP64_MARKER_32, ZIP64_MARKER_32)
    } else {
        (compressed as u32, uncompressed as u32)
    };

    let mut buf = Vec::with_capacity(LFH_SIZE + entry.raw_name.len() + extra.len());
    buf.write_all(LFH_SIGNATURE)?;
    buf.write_u16::<LittleEndian>(version_needed(entry.version_needed, zip64))?;
    buf.write_u16::<LittleEndian>(entry.flags)?;
    buf.write_u16::<LittleEndian>(entry.compression_method.as_u16())?;
    buf.write_u16::<LittleEndian>(entry.last_mod_time)?;
    buf.write_u16::<LittleEndian>(entry.last_mod_date)?;
    buf.write_u32::<LittleEndian>(crc32)?;
    buf.write_u32::<LittleEndian>(compressed_32)?;
    buf.write_u32::<LittleEndian>(uncompressed_32)?;
    buf.write_u16::<LittleEndian>(entry.raw_name.len() as u16)?;
    buf.write_u16::<LittleEndian>(extra.len() as u16)?;
    buf.write_all(&entry.raw_name)?;
    buf.write_all(&extra)?;
    Ok(buf)
}

fn data_descriptor(entry: &ZipFileEntry) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(24);
    buf.write_all(DATA_DESCRIPTOR_SIGNATURE)?;
    buf.write_u32::<LittleEndian>(entry.crc32)?;
    if entry.needs_zip64_sizes() {
        buf.write_u64::<LittleEndian>(entry.compressed_size)?;
        buf.write_u64::<LittleEndian>(entry.uncompressed_size)?;
    } else {
        buf.write_u32::<LittleEndian>(entry.compressed_size as u32)?;
        buf.write_u32::<LittleEndian>(entry.uncompressed_size as u32)?;
    }
    Ok(buf)
}

fn zip64_block(values: &[u64]) -> Vec<u8> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut block = Vec::with_capacity(4 + values.len() * 8);
    block.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
    block.extend_from_slice(&((values.len() * 8) as u16).to_le_bytes());
    for value in values {
        block.extend_from_slice(&value.to_le_bytes());
    }
    block
}

fn version_needed(original: u16, zip64: bool) -> u16 {
    if zip64 {
        original.max(ZIP64_VERSION_NEEDED)
    } else {
        original
    }
}

fn saturate_32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(ZIP64_MARKER_32)
}

fn check_field_len(field: &str, name: &str, len: usize) -> Result<()> {
    if len > u16::MAX as usize {
        bail!("{} of {} is {} bytes, over the 65535 byte limit", field, name, len);
    }
    Ok(())
}
