//! Model manifest and integrity verification for the recognition pipeline.
//!
//! Two models are pinned by SHA-256 and downloadable via `rollcall setup`.
//! The 68-point landmark model has no canonical upstream artifact to pin;
//! it is operator-provided (see `ROLLCALL_LANDMARK_MODEL`) and only checked
//! for existence.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pinned model descriptor: URL, expected filename, SHA-256 checksum,
/// human-readable size.
pub struct ModelFile {
    pub name: &'static str,
    pub url: &'static str,
    pub sha256: &'static str,
    pub size_display: &'static str,
}

// Checksums verified from HuggingFace Git LFS pointer files (oid sha256: field).
// Source: https://huggingface.co/public-data/insightface/raw/main/models/buffalo_l/
pub const MODELS: &[ModelFile] = &[
    ModelFile {
        name: "det_10g.onnx",
        url: "https://huggingface.co/public-data/insightface/resolve/main/models/buffalo_l/det_10g.onnx",
        sha256: "5838f7fe053675b1c7a08b633df49e7af5495cee0493c7dcf6697200b85b5b91",
        size_display: "16 MB",
    },
    ModelFile {
        name: "w600k_r50.onnx",
        url: "https://huggingface.co/public-data/insightface/resolve/main/models/buffalo_l/w600k_r50.onnx",
        sha256: "4c06341c33c2ca1f86781dab0e829f88ad5b64be9fba56e56bc9ebdefc619e43",
        size_display: "166 MB",
    },
];

/// Default filename for the operator-provided 68-point landmark model.
pub const LANDMARK_MODEL_FILE: &str = "landmark_68.onnx";

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("model file not found: {name} ({path})")]
    MissingModel { name: String, path: PathBuf },

    #[error("failed to open model file: {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read model file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "model checksum mismatch for {name} ({path})\n  expected: {expected}\n  got:      {got}"
    )]
    ChecksumMismatch {
        name: String,
        path: PathBuf,
        expected: String,
        got: String,
    },
}

/// Default model directory: `$XDG_DATA_HOME/rollcall/models`
/// (falling back to `~/.local/share/rollcall/models`).
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.local/share")
    });
    PathBuf::from(data_home).join("rollcall/models")
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file_hex(path: &Path) -> Result<String, ModelIntegrityError> {
    let mut file = fs::File::open(path).map_err(|source| ModelIntegrityError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = file
            .read(&mut buf)
            .map_err(|source| ModelIntegrityError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify a single file against an expected SHA-256 digest.
pub fn verify_file_sha256(
    name: &str,
    path: &Path,
    expected_sha256: &str,
) -> Result<(), ModelIntegrityError> {
    if !path.exists() {
        return Err(ModelIntegrityError::MissingModel {
            name: name.to_string(),
            path: path.to_path_buf(),
        });
    }

    let digest = sha256_file_hex(path)?;
    if digest != expected_sha256 {
        return Err(ModelIntegrityError::ChecksumMismatch {
            name: name.to_string(),
            path: path.to_path_buf(),
            expected: expected_sha256.to_string(),
            got: digest,
        });
    }

    Ok(())
}

/// Verify every pinned model under `model_dir`.
pub fn verify_models_dir(model_dir: &Path) -> Result<(), ModelIntegrityError> {
    for model in MODELS {
        let path = model_dir.join(model.name);
        verify_file_sha256(model.name, &path, model.sha256)?;
    }

    Ok(())
}

/// Check that the operator-provided landmark model exists. No checksum:
/// there is no pinned upstream artifact for it.
pub fn verify_landmark_model(path: &Path) -> Result<(), ModelIntegrityError> {
    if !path.exists() {
        return Err(ModelIntegrityError::MissingModel {
            name: LANDMARK_MODEL_FILE.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
