//! On-disk index artifacts
//!
//! Three files, written together and positionally aligned:
//!
//! - `vectors.bin`: magic `RKVEC001`, u32 LE dimension, u64 LE count, then
//!   `count * dimension` f32 LE values
//! - `index.json`: manifest describing the vectors and their SHA-256
//! - `metadata.json`: array of `{id, did, name, description}`, one per vector
//!
//! Each file is written to a temp file in the target directory and renamed
//! into place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use super::index::FlatIpIndex;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const INDEX_FILE: &str = "index.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const VECTORS_MAGIC: &[u8; 8] = b"RKVEC001";
pub const INDEX_KIND: &str = "flat_ip";
pub const INDEX_METRIC: &str = "inner_product";

const HEADER_LEN: usize = 8 + 4 + 8;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt vectors file: {0}")]
    Corrupt(String),

    #[error("manifest mismatch: {0}")]
    Manifest(String),

    #[error("vectors digest mismatch: manifest {expected}, file {actual}")]
    DigestMismatch { expected: String, actual: String },
}

/// Contents of `index.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub kind: String,
    pub dimension: usize,
    pub count: usize,
    pub metric: String,
    pub model: String,
    pub vectors_sha256: String,
}

/// One entry of `metadata.json`, aligned with the vector at the same position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: String,
    pub did: String,
    pub name: String,
    pub description: String,
}

/// A loaded or freshly built artifact set.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub manifest: IndexManifest,
    pub index: FlatIpIndex,
    pub metadata: Vec<MetadataRecord>,
}

impl ArtifactSet {
    /// Assemble a set, computing the manifest from the index.
    pub fn new(model: &str, index: FlatIpIndex, metadata: Vec<MetadataRecord>) -> Self {
        let bytes = encode_vectors(&index);
        let manifest = IndexManifest {
            kind: INDEX_KIND.to_string(),
            dimension: index.dimension(),
            count: index.len(),
            metric: INDEX_METRIC.to_string(),
            model: model.to_string(),
            vectors_sha256: sha256_hex(&bytes),
        };
        Self {
            manifest,
            index,
            metadata,
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn encode_vectors(index: &FlatIpIndex) -> Vec<u8> {
    let values = index.as_slice();
    let mut bytes = Vec::with_capacity(HEADER_LEN + std::mem::size_of_val(values));
    bytes.extend_from_slice(VECTORS_MAGIC);
    bytes.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    for &value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn decode_vectors(bytes: &[u8]) -> Result<FlatIpIndex, IndexError> {
    if bytes.len() < HEADER_LEN {
        return Err(IndexError::Corrupt(format!(
            "file is {} bytes, shorter than the header",
            bytes.len()
        )));
    }
    if &bytes[..8] != VECTORS_MAGIC {
        return Err(IndexError::Corrupt("bad magic".to_string()));
    }

    let mut dim = [0u8; 4];
    dim.copy_from_slice(&bytes[8..12]);
    let dimension = u32::from_le_bytes(dim) as usize;
    let mut cnt = [0u8; 8];
    cnt.copy_from_slice(&bytes[12..20]);
    let count = u64::from_le_bytes(cnt) as usize;

    if dimension == 0 {
        return Err(IndexError::Corrupt("dimension is zero".to_string()));
    }
    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| IndexError::Corrupt("count * dimension overflows".to_string()))?;
    let body = &bytes[HEADER_LEN..];
    if body.len() != expected {
        return Err(IndexError::Corrupt(format!(
            "expected {expected} payload bytes for {count}x{dimension}, found {}",
            body.len()
        )));
    }

    let mut data = Vec::with_capacity(count * dimension);
    for chunk in body.chunks_exact(4) {
        let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if !value.is_finite() {
            return Err(IndexError::Corrupt("non-finite vector value".to_string()));
        }
        data.push(value);
    }

    FlatIpIndex::from_raw(dimension, data)
        .ok_or_else(|| IndexError::Corrupt("payload is not whole rows".to_string()))
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), IndexError> {
    let path = dir.join(name);
    let io = |source| IndexError::Io {
        path: path.clone(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(io)?;
    tmp.write_all(bytes).map_err(io)?;
    tmp.as_file().sync_all().map_err(io)?;
    tmp.persist(&path).map_err(|e| io(e.error))?;
    debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
    Ok(())
}

/// Persist all three artifacts into `dir` (created if missing).
pub fn write_artifacts(dir: &Path, set: &ArtifactSet) -> Result<(), IndexError> {
    fs::create_dir_all(dir).map_err(|source| IndexError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    write_atomic(dir, VECTORS_FILE, &encode_vectors(&set.index))?;
    write_atomic(dir, INDEX_FILE, &to_json(dir, INDEX_FILE, &set.manifest)?)?;
    write_atomic(dir, METADATA_FILE, &to_json(dir, METADATA_FILE, &set.metadata)?)?;

    info!(
        dir = %dir.display(),
        vectors = set.index.len(),
        dimension = set.index.dimension(),
        "index artifacts written"
    );
    Ok(())
}

fn to_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<Vec<u8>, IndexError> {
    serde_json::to_vec_pretty(value).map_err(|source| IndexError::Json {
        path: dir.join(name),
        source,
    })
}

fn read_file(path: PathBuf) -> Result<Vec<u8>, IndexError> {
    fs::read(&path).map_err(|source| IndexError::Io { path, source })
}

fn read_json<T: serde::de::DeserializeOwned>(path: PathBuf) -> Result<T, IndexError> {
    let bytes = read_file(path.clone())?;
    serde_json::from_slice(&bytes).map_err(|source| IndexError::Json { path, source })
}

/// Load and cross-check the artifacts in `dir`.
///
/// The manifest must describe the vectors file exactly (kind, dimension,
/// count, digest). Metadata length is not checked here.
pub fn load_artifacts(dir: &Path) -> Result<ArtifactSet, IndexError> {
    let manifest: IndexManifest = read_json(dir.join(INDEX_FILE))?;
    let vector_bytes = read_file(dir.join(VECTORS_FILE))?;
    let metadata: Vec<MetadataRecord> = read_json(dir.join(METADATA_FILE))?;

    if manifest.kind != INDEX_KIND {
        return Err(IndexError::Manifest(format!(
            "unsupported index kind '{}'",
            manifest.kind
        )));
    }
    if manifest.metric != INDEX_METRIC {
        return Err(IndexError::Manifest(format!(
            "unsupported metric '{}'",
            manifest.metric
        )));
    }

    let actual = sha256_hex(&vector_bytes);
    if actual != manifest.vectors_sha256 {
        return Err(IndexError::DigestMismatch {
            expected: manifest.vectors_sha256,
            actual,
        });
    }

    let index = decode_vectors(&vector_bytes)?;
    if index.dimension() != manifest.dimension || index.len() != manifest.count {
        return Err(IndexError::Manifest(format!(
            "manifest says {}x{}, vectors file holds {}x{}",
            manifest.count,
            manifest.dimension,
            index.len(),
            index.dimension()
        )));
    }

    Ok(ArtifactSet {
        manifest,
        index,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> ArtifactSet {
        let mut index = FlatIpIndex::new(2);
        index.add(&[1.0, 0.0]);
        index.add(&[0.0, 1.0]);
        let metadata = vec![
            MetadataRecord {
                id: "a1".into(),
                did: "did:a1".into(),
                name: "Alpha".into(),
                description: "first".into(),
            },
            MetadataRecord {
                id: "a2".into(),
                did: "did:a2".into(),
                name: "Beta".into(),
                description: "second".into(),
            },
        ];
        ArtifactSet::new("hashing-v1-2", index, metadata)
    }

    #[test]
    fn header_layout() {
        let set = sample_set();
        let bytes = encode_vectors(&set.index);
        assert_eq!(&bytes[..8], b"RKVEC001");
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 2);
        assert_eq!(u64::from_le_bytes(bytes[12..20].try_into().unwrap()), 2);
        assert_eq!(bytes.len(), 20 + 2 * 2 * 4);
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let set = sample_set();
        write_artifacts(dir.path(), &set).unwrap();

        let loaded = load_artifacts(dir.path()).unwrap();
        assert_eq!(loaded.manifest, set.manifest);
        assert_eq!(loaded.index, set.index);
        assert_eq!(loaded.metadata, set.metadata);
    }

    #[test]
    fn truncated_vectors_are_corrupt() {
        let set = sample_set();
        let bytes = encode_vectors(&set.index);
        let err = decode_vectors(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)));
        assert!(matches!(
            decode_vectors(b"RKVEC00").unwrap_err(),
            IndexError::Corrupt(_)
        ));
    }

    #[test]
    fn tampered_vectors_fail_digest() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), &sample_set()).unwrap();

        let path = dir.path().join(VECTORS_FILE);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        let err = load_artifacts(dir.path()).unwrap_err();
        assert!(matches!(err, IndexError::DigestMismatch { .. }));
    }

    #[test]
    fn missing_metadata_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path(), &sample_set()).unwrap();
        fs::remove_file(dir.path().join(METADATA_FILE)).unwrap();

        let err = load_artifacts(dir.path()).unwrap_err();
        assert!(matches!(err, IndexError::Io { .. }));
    }

    #[test]
    fn empty_index_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let set = ArtifactSet::new("m", FlatIpIndex::new(4), Vec::new());
        write_artifacts(dir.path(), &set).unwrap();
        let loaded = load_artifacts(dir.path()).unwrap();
        assert!(loaded.index.is_empty());
        assert_eq!(loaded.index.dimension(), 4);
    }
}
