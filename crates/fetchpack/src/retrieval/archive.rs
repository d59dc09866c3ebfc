//! In-memory archive assembly
//!
//! Retrieved objects are added as named entries and serialized once into a
//! ZIP container. Entries are stored without compression: the payloads are
//! media files that are already compressed.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::retrieval::core::{FileOperation, Result, RetrievalError};

/// Entry compression of the finished archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArchiveCompression {
    /// Bytes stored verbatim
    #[default]
    Store,
}

/// One named entry of the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Accumulates entries for a single archive
///
/// Entry names are unique within one assembler; adding a name twice is an
/// error rather than a silent overwrite.
#[derive(Debug, Default)]
pub struct ArchiveAssembler {
    entries: Vec<ArchiveEntry>,
    names: HashSet<String>,
    total_bytes: u64,
}

impl ArchiveAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `bytes` under the archive path `name`
    pub fn add_entry(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<()> {
        let name = name.into();
        if !self.names.insert(name.clone()) {
            return Err(RetrievalError::DuplicateDisplayName { name });
        }
        self.total_bytes += bytes.len() as u64;
        self.entries.push(ArchiveEntry { name, bytes });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Sum of the payload sizes added so far
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Serialize every entry into one archive blob
    ///
    /// Serialization runs on the blocking pool so large payloads do not
    /// stall the async workers.
    pub async fn finalize(self, compression: ArchiveCompression) -> Result<ArchiveBlob> {
        let entry_count = self.entries.len();
        let payload_bytes = self.total_bytes;
        let bytes = tokio::task::spawn_blocking(move || write_zip(self.entries, compression)).await??;

        info!(
            entries = entry_count,
            payload_bytes,
            archive_bytes = bytes.len(),
            "Archive finalized"
        );
        Ok(ArchiveBlob { bytes, entry_count })
    }
}

fn write_zip(entries: Vec<ArchiveEntry>, compression: ArchiveCompression) -> Result<Vec<u8>> {
    let method = match compression {
        ArchiveCompression::Store => CompressionMethod::Stored,
    };

    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(archive_capacity(&entries))));
    for entry in entries {
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .large_file(entry.bytes.len() as u64 >= u32::MAX as u64);
        writer.start_file(entry.name.as_str(), options)?;
        writer.write_all(&entry.bytes).map_err(zip::result::ZipError::Io)?;
        debug!("Added archive entry {} ({} bytes)", entry.name, entry.bytes.len());
    }

    Ok(writer.finish()?.into_inner())
}

// Local header + central directory record, each with room for zip64 extras
const ENTRY_OVERHEAD: usize = 30 + 46 + 2 * 32;
// End of central directory plus the zip64 locator and record
const TRAILER_OVERHEAD: usize = 22 + 20 + 56;

/// Upper bound on the serialized size so the buffer is allocated once
fn archive_capacity(entries: &[ArchiveEntry]) -> usize {
    entries
        .iter()
        .map(|e| e.bytes.len() + 2 * e.name.len() + ENTRY_OVERHEAD)
        .sum::<usize>()
        + TRAILER_OVERHEAD
}

/// A finished archive held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBlob {
    bytes: Vec<u8>,
    entry_count: usize,
}

impl ArchiveBlob {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }

    /// Write the archive to `path`, creating parent directories as needed
    pub async fn save_to(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| RetrievalError::FileSystem {
                path: parent.to_path_buf(),
                operation: FileOperation::CreateDir,
                source: e,
            })?;
        }
        fs::write(path, &self.bytes).await.map_err(|e| RetrievalError::FileSystem {
            path: path.to_path_buf(),
            operation: FileOperation::Write,
            source: e,
        })?;
        info!("Saved archive ({} bytes) to {}", self.bytes.len(), path.display());
        Ok(path.to_path_buf())
    }
}

impl AsRef<[u8]> for ArchiveBlob {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
