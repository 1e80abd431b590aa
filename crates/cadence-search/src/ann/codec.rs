//! Little-endian binary helpers shared by the index formats.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{SearchError, SearchResult};

#[derive(Debug, Default)]
pub(crate) struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub(crate) fn with_magic(magic: &[u8; 4], version: u32) -> Self {
        let mut enc = Self::default();
        enc.buf.extend_from_slice(magic);
        enc.put_u32(version);
        enc
    }

    pub(crate) fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn put_count(&mut self, value: usize) {
        self.put_u32(value as u32);
    }

    pub(crate) fn put_f32s(&mut self, values: &[f32]) {
        self.buf.reserve(values.len() * 4);
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    pub(crate) fn put_u32s(&mut self, values: &[u32]) {
        self.buf.reserve(values.len() * 4);
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    /// Write to `path` through a sibling temp file and rename.
    pub(crate) fn write_to(self, path: &Path) -> SearchResult<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&self.buf)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

pub(crate) struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> Decoder<'a> {
    /// Check magic and version and position after them.
    pub(crate) fn open(
        data: &'a [u8],
        path: &'a Path,
        magic: &[u8; 4],
        version: u32,
    ) -> SearchResult<Self> {
        let mut dec = Self { data, pos: 0, path };
        if dec.take(4)? != magic {
            return Err(dec.corrupted("bad magic bytes"));
        }
        let found = dec.u32()?;
        if found != version {
            return Err(dec.corrupted(format!("unsupported format version {found}")));
        }
        Ok(dec)
    }

    pub(crate) fn corrupted(&self, reason: impl Into<String>) -> SearchError {
        SearchError::corrupted(self.path, reason)
    }

    fn take(&mut self, n: usize) -> SearchResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| self.corrupted(format!("truncated at byte {}", self.pos)))?;
        let data = self.data;
        let slice = &data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> SearchResult<[u8; N]> {
        let mut out = [0_u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u32(&mut self) -> SearchResult<u32> {
        self.array::<4>().map(u32::from_le_bytes)
    }

    pub(crate) fn count(&mut self) -> SearchResult<usize> {
        self.u32().map(|v| v as usize)
    }

    pub(crate) fn f32s(&mut self, count: usize) -> SearchResult<Vec<f32>> {
        let size = count
            .checked_mul(4)
            .ok_or_else(|| self.corrupted("length overflow"))?;
        let bytes = self.take(size)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    pub(crate) fn u32s(&mut self, count: usize) -> SearchResult<Vec<u32>> {
        let size = count
            .checked_mul(4)
            .ok_or_else(|| self.corrupted("length overflow"))?;
        let bytes = self.take(size)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Fail if bytes remain.
    pub(crate) fn finish(self) -> SearchResult<()> {
        if self.pos != self.data.len() {
            return Err(self.corrupted(format!(
                "{} trailing bytes",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}

/// Labels must be unique within one index.
pub(crate) fn check_unique_labels(labels: &[u32]) -> Result<(), u32> {
    let mut seen = std::collections::HashSet::with_capacity(labels.len());
    for label in labels {
        if !seen.insert(*label) {
            return Err(*label);
        }
    }
    Ok(())
}
