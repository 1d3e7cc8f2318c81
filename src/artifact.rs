//! Persistence for the trained artifact pair.
//!
//! The fitted vectorizer and the fitted ensemble are written as two
//! independently loadable binary artifacts so either half can be upgraded
//! on its own, as long as the vector dimensions stay compatible. Each file
//! carries magic bytes, a version-tagged header, a bincode payload, and a
//! CRC32 of the payload, so an incompatible or corrupt artifact is
//! rejected at load time instead of producing garbage predictions.
//!
//! Layout:
//!
//! ```text
//! [magic: 4 bytes][header len: u32 LE][header: bincode]
//! [payload len: u64 LE][payload: bincode][payload crc32: u32 LE]
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::ensemble::VotingEnsemble;
use crate::error::{LodestarError, Result};
use crate::features::TfIdfVectorizer;

/// Magic bytes for a persisted vectorizer.
pub const VECTORIZER_MAGIC: [u8; 4] = *b"LQRV";
/// Magic bytes for a persisted ensemble.
pub const ENSEMBLE_MAGIC: [u8; 4] = *b"LQRE";
/// Current artifact format version.
pub const FORMAT_VERSION: u32 = 1;

/// Metadata written ahead of every artifact payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Serialization format version.
    pub format_version: u32,
    /// Feature-vector dimension of the payload.
    pub dimension: u32,
    /// Number of destination classes (zero for the vectorizer).
    pub n_classes: u32,
    /// Unix timestamp of when the artifact was created.
    pub created_at: i64,
}

/// Serialize a fitted vectorizer to its artifact byte layout.
pub fn encode_vectorizer(vectorizer: &TfIdfVectorizer) -> Result<Vec<u8>> {
    let header = ArtifactHeader {
        format_version: FORMAT_VERSION,
        dimension: vectorizer.vocabulary_size() as u32,
        n_classes: 0,
        created_at: chrono::Utc::now().timestamp(),
    };
    encode_artifact(&VECTORIZER_MAGIC, &header, vectorizer)
}

/// Serialize a fitted ensemble to its artifact byte layout.
pub fn encode_ensemble(ensemble: &VotingEnsemble) -> Result<Vec<u8>> {
    let header = ArtifactHeader {
        format_version: FORMAT_VERSION,
        dimension: ensemble.n_features() as u32,
        n_classes: ensemble.n_classes() as u32,
        created_at: chrono::Utc::now().timestamp(),
    };
    encode_artifact(&ENSEMBLE_MAGIC, &header, ensemble)
}

/// Write a fitted vectorizer artifact.
pub fn save_vectorizer(path: &Path, vectorizer: &TfIdfVectorizer) -> Result<()> {
    fs::write(path, encode_vectorizer(vectorizer)?)?;
    Ok(())
}

/// Write a fitted ensemble artifact.
pub fn save_ensemble(path: &Path, ensemble: &VotingEnsemble) -> Result<()> {
    fs::write(path, encode_ensemble(ensemble)?)?;
    Ok(())
}

/// Load a vectorizer artifact, verifying magic, version, and checksum.
pub fn load_vectorizer(path: &Path) -> Result<TfIdfVectorizer> {
    let bytes = read_artifact_bytes(path)?;
    let (_, vectorizer) = decode_artifact(&VECTORIZER_MAGIC, &bytes, path)?;
    Ok(vectorizer)
}

/// Load an ensemble artifact, verifying magic, version, and checksum.
pub fn load_ensemble(path: &Path) -> Result<VotingEnsemble> {
    let bytes = read_artifact_bytes(path)?;
    let (_, ensemble) = decode_artifact(&ENSEMBLE_MAGIC, &bytes, path)?;
    Ok(ensemble)
}

/// Read only the header of an artifact file.
pub fn read_header(path: &Path) -> Result<ArtifactHeader> {
    let bytes = read_artifact_bytes(path)?;
    let (header, _) = split_header(&bytes, path)?;
    Ok(header)
}

/// Load the vectorizer/ensemble pair, rejecting a mismatched pair.
///
/// A vectorizer whose vocabulary size differs from the ensemble's expected
/// feature dimension would silently produce garbage predictions; that is
/// surfaced here as an [`LodestarError::ArtifactMismatch`].
pub fn load_pair(
    vectorizer_path: &Path,
    ensemble_path: &Path,
) -> Result<(TfIdfVectorizer, VotingEnsemble)> {
    let vectorizer = load_vectorizer(vectorizer_path)?;
    let ensemble = load_ensemble(ensemble_path)?;

    if vectorizer.vocabulary_size() != ensemble.n_features() {
        return Err(LodestarError::artifact_mismatch(format!(
            "vectorizer dimension {} does not match ensemble dimension {}; \
             the two artifacts were not produced by the same training run",
            vectorizer.vocabulary_size(),
            ensemble.n_features()
        )));
    }

    Ok((vectorizer, ensemble))
}

fn encode_artifact<T: Serialize>(
    magic: &[u8; 4],
    header: &ArtifactHeader,
    value: &T,
) -> Result<Vec<u8>> {
    let header_bytes = bincode::serde::encode_to_vec(header, bincode::config::standard())
        .map_err(|e| LodestarError::serialization(format!("failed to serialize header: {e}")))?;
    let payload = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| LodestarError::serialization(format!("failed to serialize payload: {e}")))?;
    let checksum = crc32fast::hash(&payload);

    let mut bytes =
        Vec::with_capacity(4 + 4 + header_bytes.len() + 8 + payload.len() + 4);
    bytes.extend_from_slice(magic);
    bytes.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&header_bytes);
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&checksum.to_le_bytes());
    Ok(bytes)
}

fn read_artifact_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        LodestarError::artifact(format!("cannot read artifact {}: {e}", path.display()))
    })
}

/// Parse and validate everything up to the payload; returns the header and
/// the remaining `[payload][crc32]` bytes.
fn split_header<'a>(bytes: &'a [u8], path: &Path) -> Result<(ArtifactHeader, &'a [u8])> {
    let truncated =
        || LodestarError::artifact(format!("artifact {} is truncated", path.display()));

    if bytes.len() < 8 {
        return Err(truncated());
    }
    let header_len =
        u32::from_le_bytes(bytes[4..8].try_into().expect("slice is 4 bytes")) as usize;
    let header_end = 8 + header_len;
    if bytes.len() < header_end {
        return Err(truncated());
    }

    let (header, _): (ArtifactHeader, usize) =
        bincode::serde::decode_from_slice(&bytes[8..header_end], bincode::config::standard())
            .map_err(|e| {
                LodestarError::artifact(format!(
                    "artifact {} has an unreadable header: {e}",
                    path.display()
                ))
            })?;

    if header.format_version != FORMAT_VERSION {
        return Err(LodestarError::artifact(format!(
            "artifact {} has format version {}, expected {}",
            path.display(),
            header.format_version,
            FORMAT_VERSION
        )));
    }

    Ok((header, &bytes[header_end..]))
}

fn decode_artifact<T: DeserializeOwned>(
    magic: &[u8; 4],
    bytes: &[u8],
    path: &Path,
) -> Result<(ArtifactHeader, T)> {
    if bytes.len() < 4 || &bytes[..4] != magic {
        return Err(LodestarError::artifact(format!(
            "artifact {} has wrong magic bytes; not a {} artifact",
            path.display(),
            String::from_utf8_lossy(magic)
        )));
    }

    let (header, rest) = split_header(bytes, path)?;

    let truncated =
        || LodestarError::artifact(format!("artifact {} is truncated", path.display()));
    if rest.len() < 8 {
        return Err(truncated());
    }
    let payload_len =
        u64::from_le_bytes(rest[..8].try_into().expect("slice is 8 bytes")) as usize;
    if rest.len() < 8 + payload_len + 4 {
        return Err(truncated());
    }
    let payload = &rest[8..8 + payload_len];
    let stored_checksum = u32::from_le_bytes(
        rest[8 + payload_len..8 + payload_len + 4]
            .try_into()
            .expect("slice is 4 bytes"),
    );

    if crc32fast::hash(payload) != stored_checksum {
        return Err(LodestarError::artifact(format!(
            "artifact {} failed its checksum; the file is corrupt",
            path.display()
        )));
    }

    let (value, _): (T, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard()).map_err(|e| {
            LodestarError::artifact(format!(
                "artifact {} has an unreadable payload: {e}",
                path.display()
            ))
        })?;

    Ok((header, value))
}
