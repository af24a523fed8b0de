//! Builds small ZIP archives in memory for the integration tests.

#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;
use std::sync::Arc;

use zip2zip::{MemoryReader, ZipFileEntry, ZipReader};

const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

#[derive(Debug, Clone)]
pub struct FixtureEntry {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
    pub deflate: bool,
    pub data_descriptor: bool,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
    /// Compressed size written to the central directory instead of the real one
    pub declared_size: Option<u32>,
    /// Same for the uncompressed size
    pub declared_uncompressed_size: Option<u32>,
}

impl FixtureEntry {
    pub fn stored(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            data: data.to_vec(),
            deflate: false,
            data_descriptor: false,
            extra: Vec::new(),
            comment: Vec::new(),
            declared_size: None,
            declared_uncompressed_size: None,
        }
    }

    pub fn deflated(name: &str, data: &[u8]) -> Self {
        Self {
            deflate: true,
            ..Self::stored(name, data)
        }
    }
}

#[derive(Debug, Default)]
pub struct ZipBuilder {
    body: Vec<u8>,
    central: Vec<u8>,
    count: u16,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(FixtureEntry::stored(name, data))
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.entry(FixtureEntry::deflated(name, data))
    }

    pub fn entry(mut self, entry: FixtureEntry) -> Self {
        let mut crc = flate2::Crc::new();
        crc.update(&entry.data);
        let crc32 = crc.sum();

        let (payload, method) = if entry.deflate {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&entry.data).unwrap();
            (encoder.finish().unwrap(), 8u16)
        } else {
            (entry.data.clone(), 0u16)
        };
        let flags = if entry.data_descriptor { FLAG_DATA_DESCRIPTOR } else { 0 };
        let compressed = payload.len() as u32;
        let uncompressed = entry.data.len() as u32;
        let offset = self.body.len() as u32;
        // 2024-06-09 13:45:30
        let time = (13u16 << 11) | (45 << 5) | 15;
        let date = ((2024u16 - 1980) << 9) | (6 << 5) | 9;

        let b = &mut self.body;
        b.write_all(b"PK\x03\x04").unwrap();
        b.write_u16::<LittleEndian>(20).unwrap();
        b.write_u16::<LittleEndian>(flags).unwrap();
        b.write_u16::<LittleEndian>(method).unwrap();
        b.write_u16::<LittleEndian>(time).unwrap();
        b.write_u16::<LittleEndian>(date).unwrap();
        if entry.data_descriptor {
            b.write_all(&[0u8; 12]).unwrap();
        } else {
            b.write_u32::<LittleEndian>(crc32).unwrap();
            b.write_u32::<LittleEndian>(compressed).unwrap();
            b.write_u32::<LittleEndian>(uncompressed).unwrap();
        }
        b.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
        b.write_u16::<LittleEndian>(entry.extra.len() as u16).unwrap();
        b.write_all(&entry.name).unwrap();
        b.write_all(&entry.extra).unwrap();
        b.write_all(&payload).unwrap();
        if entry.data_descriptor {
            b.write_all(b"PK\x07\x08").unwrap();
            b.write_u32::<LittleEndian>(crc32).unwrap();
            b.write_u32::<LittleEndian>(compressed).unwrap();
            b.write_u32::<LittleEndian>(uncompressed).unwrap();
        }

        let c = &mut self.central;
        c.write_all(b"PK\x01\x02").unwrap();
        c.write_u16::<LittleEndian>(0x031E).unwrap();
        c.write_u16::<LittleEndian>(20).unwrap();
        c.write_u16::<LittleEndian>(flags).unwrap();
        c.write_u16::<LittleEndian>(method).unwrap();
        c.write_u16::<LittleEndian>(time).unwrap();
        c.write_u16::<LittleEndian>(date).unwrap();
        c.write_u32::<LittleEndian>(crc32).unwrap();
        c.write_u32::<LittleEndian>(entry.declared_size.unwrap_or(compressed))
            .unwrap();
        c.write_u32::<LittleEndian>(entry.declared_uncompressed_size.unwrap_or(uncompressed))
            .unwrap();
        c.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
        c.write_u16::<LittleEndian>(entry.extra.len() as u16).unwrap();
        c.write_u16::<LittleEndian>(entry.comment.len() as u16).unwrap();
        c.write_u16::<LittleEndian>(0).unwrap();
        c.write_u16::<LittleEndian>(0).unwrap();
        c.write_u32::<LittleEndian>(0o100644 << 16).unwrap();
        c.write_u32::<LittleEndian>(offset).unwrap();
        c.write_all(&entry.name).unwrap();
        c.write_all(&entry.extra).unwrap();
        c.write_all(&entry.comment).unwrap();

        self.count += 1;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = self.body;
        let cd_offset = out.len() as u32;
        let cd_size = self.central.len() as u32;
        out.extend_from_slice(&self.central);
        out.write_all(b"PK\x05\x06").unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(self.count).unwrap();
        out.write_u16::<LittleEndian>(self.count).unwrap();
        out.write_u32::<LittleEndian>(cd_size).unwrap();
        out.write_u32::<LittleEndian>(cd_offset).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out
    }
}

pub fn archive(names: &[&str]) -> Vec<u8> {
    names
        .iter()
        .fold(ZipBuilder::new(), |builder, name| {
            builder.deflated(name, format!("contents of {name}\n").repeat(8).as_bytes())
        })
        .build()
}

pub async fn open(bytes: Vec<u8>) -> ZipReader<MemoryReader> {
    ZipReader::open(Arc::new(MemoryReader::new(bytes)))
        .await
        .unwrap()
}

pub async fn names(bytes: Vec<u8>) -> Vec<String> {
    open(bytes)
        .await
        .entries()
        .iter()
        .map(|entry| entry.file_name.clone())
        .collect()
}

/// ZIP64 extended information block carrying `values` in format order.
pub fn zip64_extra(values: &[u64]) -> Vec<u8> {
    let mut extra = vec![0x01, 0x00];
    extra.write_u16::<LittleEndian>(values.len() as u16 * 8).unwrap();
    for value in values {
        extra.write_u64::<LittleEndian>(*value).unwrap();
    }
    extra
}

/// Entry metadata with the placement-dependent offset cleared.
pub fn placement_free(entry: &ZipFileEntry) -> ZipFileEntry {
    ZipFileEntry {
        lfh_offset: 0,
        ..entry.clone()
    }
}
