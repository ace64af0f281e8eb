//! Binary persistence for the vector index and the embedding matrix
//!
//! Both files are a bincode header followed by the payload:
//!
//! ```text
//! header: magic [u8; 4] | version u16 | metric Option<Metric> | dimension u32 | count u64
//! index:  header("LRVI") | ids Vec<ListingId> | data Vec<f32>
//! matrix: header("LREM") | data Vec<f32>
//! ```
//!
//! `f32` components are stored as raw little-endian bits, so a loaded
//! artifact searches bit-for-bit like the one that was saved.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{EmbeddingMatrix, Metric, VectorIndex};
use crate::error::{RetrievalError, Result};
use crate::record::ListingId;

const INDEX_MAGIC: [u8; 4] = *b"LRVI";
const MATRIX_MAGIC: [u8; 4] = *b"LREM";
const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactHeader {
    magic: [u8; 4],
    version: u16,
    metric: Option<Metric>,
    dimension: u32,
    count: u64,
}

impl ArtifactHeader {
    fn new(magic: [u8; 4], metric: Option<Metric>, dimension: usize, count: usize) -> Self {
        Self {
            magic,
            version: FORMAT_VERSION,
            metric,
            dimension: dimension as u32,
            count: count as u64,
        }
    }

    fn read(reader: &mut impl std::io::Read, magic: [u8; 4], path: &Path) -> Result<Self> {
        let header: Self = bincode::deserialize_from(reader).map_err(|e| {
            RetrievalError::index_not_found(format!(
                "{}: unreadable header: {}",
                path.display(),
                e
            ))
        })?;

        if header.magic != magic {
            return Err(RetrievalError::index_not_found(format!(
                "{}: not a {} file",
                path.display(),
                String::from_utf8_lossy(&magic)
            )));
        }
        if header.version != FORMAT_VERSION {
            return Err(RetrievalError::index_not_found(format!(
                "{}: unsupported format version {}",
                path.display(),
                header.version
            )));
        }

        Ok(header)
    }
}

impl VectorIndex {
    /// Persist the index to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let header = ArtifactHeader::new(INDEX_MAGIC, Some(self.metric), self.dimension, self.len());
        write_atomically(path.as_ref(), |writer| {
            bincode::serialize_into(&mut *writer, &header)?;
            bincode::serialize_into(&mut *writer, &self.ids)?;
            bincode::serialize_into(&mut *writer, &self.data)?;
            Ok(())
        })?;

        log::debug!(
            "Saved index ({} vectors, {}d) to {}",
            self.len(),
            self.dimension,
            path.as_ref().display()
        );
        Ok(())
    }

    /// Load an index previously written by [`VectorIndex::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = open_artifact(path)?;
        let header = ArtifactHeader::read(&mut reader, INDEX_MAGIC, path)?;

        let ids: Vec<ListingId> =
            bincode::deserialize_from(&mut reader).map_err(|e| unreadable(path, e))?;
        let data: Vec<f32> =
            bincode::deserialize_from(&mut reader).map_err(|e| unreadable(path, e))?;

        let count = header.count as usize;
        let dimension = header.dimension as usize;
        if ids.len() != count {
            return Err(RetrievalError::artifact_mismatch(format!(
                "{}: header declares {} vectors, found {} ids",
                path.display(),
                count,
                ids.len()
            )));
        }
        let expected = count.checked_mul(dimension).ok_or_else(|| {
            RetrievalError::index_not_found(format!(
                "{}: header declares {} x {} vectors",
                path.display(),
                count,
                dimension
            ))
        })?;
        if data.len() != expected {
            return Err(RetrievalError::dimension_mismatch(expected, data.len()));
        }

        Ok(Self {
            metric: header.metric.unwrap_or_default(),
            dimension,
            ids,
            data,
        })
    }

    /// Load an index and require it to hold vectors of `dimension`
    pub fn load_with_dimension(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        let index = Self::load(path)?;
        if index.dimension != dimension {
            return Err(RetrievalError::dimension_mismatch(dimension, index.dimension));
        }
        Ok(index)
    }
}

impl EmbeddingMatrix {
    /// Persist the matrix to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let header = ArtifactHeader::new(MATRIX_MAGIC, None, self.dimension(), self.rows());
        write_atomically(path.as_ref(), |writer| {
            bincode::serialize_into(&mut *writer, &header)?;
            bincode::serialize_into(&mut *writer, self.as_slice())?;
            Ok(())
        })
    }

    /// Load a matrix previously written by [`EmbeddingMatrix::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = open_artifact(path)?;
        let header = ArtifactHeader::read(&mut reader, MATRIX_MAGIC, path)?;

        let data: Vec<f32> =
            bincode::deserialize_from(&mut reader).map_err(|e| unreadable(path, e))?;

        Self::from_parts(header.dimension as usize, header.count as usize, data)
    }
}

fn open_artifact(path: &Path) -> Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| {
        RetrievalError::index_not_found(format!("{}: {}", path.display(), e))
    })
}

fn unreadable(path: &Path, e: bincode::Error) -> RetrievalError {
    RetrievalError::index_not_found(format!("{}: unreadable payload: {}", path.display(), e))
}

/// Write through a sibling `.tmp` file and rename it over `path`
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_sibling(path);
    let written = File::create(&tmp_path)
        .map_err(RetrievalError::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            write(&mut writer)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })
        .and_then(|()| Ok(std::fs::rename(&tmp_path, path)?));

    if written.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    written
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
