//! Face-encoding file codec.
//!
//! Encodings live as standalone files referenced by path from the students
//! table: 512 × f32, little-endian, nothing else. Strict on read — a
//! truncated or NaN-ridden file is rejected, which the gallery loader turns
//! into a per-student soft failure.

use std::path::Path;

use rollcall_core::types::{Embedding, EMBEDDING_DIM};
use thiserror::Error;

const ENCODING_BYTE_LEN: usize = EMBEDDING_DIM * 4;

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("encoding file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid encoding file size: {0} bytes")]
    InvalidLength(usize),
    #[error("invalid encoding dimension: {0} (expected {EMBEDDING_DIM})")]
    InvalidDimension(usize),
    #[error("invalid encoding value (NaN/Inf)")]
    InvalidValue,
}

/// Write an embedding to an encoding file, creating parent directories.
pub fn write_encoding(path: &Path, embedding: &Embedding) -> Result<(), EncodingError> {
    validate_values(&embedding.values)?;

    let mut bytes = Vec::with_capacity(ENCODING_BYTE_LEN);
    for &v in &embedding.values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Read and validate an encoding file.
pub fn read_encoding(path: &Path) -> Result<Embedding, EncodingError> {
    let bytes = std::fs::read(path)?;
    if bytes.len() != ENCODING_BYTE_LEN {
        return Err(EncodingError::InvalidLength(bytes.len()));
    }

    let mut values = Vec::with_capacity(EMBEDDING_DIM);
    for chunk in bytes.chunks_exact(4) {
        let arr: [u8; 4] = chunk
            .try_into()
            .map_err(|_| EncodingError::InvalidLength(bytes.len()))?;
        let v = f32::from_le_bytes(arr);
        if !v.is_finite() {
            return Err(EncodingError::InvalidValue);
        }
        values.push(v);
    }

    Ok(Embedding { values })
}

fn validate_values(values: &[f32]) -> Result<(), EncodingError> {
    if values.len() != EMBEDDING_DIM {
        return Err(EncodingError::InvalidDimension(values.len()));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(EncodingError::InvalidValue);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_file(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "rollcall-encoding-test-{tag}-{}.bin",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    fn sample_embedding() -> Embedding {
        let mut values: Vec<f32> = (0..EMBEDDING_DIM)
            .map(|i| i as f32 / EMBEDDING_DIM as f32)
            .collect();
        values[0] = 0.0;
        values[1] = -0.0;
        values[2] = f32::MIN_POSITIVE;
        values[3] = std::f32::consts::PI;
        Embedding { values }
    }

    #[test]
    fn test_roundtrip_bit_fidelity() {
        let path = scratch_file("roundtrip");
        let embedding = sample_embedding();

        write_encoding(&path, &embedding).unwrap();
        let recovered = read_encoding(&path).unwrap();

        assert_eq!(embedding.values.len(), recovered.values.len());
        for (orig, rec) in embedding.values.iter().zip(recovered.values.iter()) {
            assert_eq!(orig.to_bits(), rec.to_bits(), "mismatch: {orig} vs {rec}");
        }

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_read_rejects_truncated_file() {
        let path = scratch_file("truncated");
        std::fs::write(&path, vec![0u8; 100]).unwrap();

        let err = read_encoding(&path).unwrap_err();
        assert!(matches!(err, EncodingError::InvalidLength(100)));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_read_rejects_nan() {
        let path = scratch_file("nan");
        let mut bytes = vec![0u8; ENCODING_BYTE_LEN];
        bytes[40..44].copy_from_slice(&f32::NAN.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        let err = read_encoding(&path).unwrap_err();
        assert!(matches!(err, EncodingError::InvalidValue));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let err = read_encoding(Path::new("/nonexistent/rollcall/enc.bin")).unwrap_err();
        assert!(matches!(err, EncodingError::Io(_)));
    }

    #[test]
    fn test_write_rejects_wrong_dimension() {
        let path = scratch_file("wrong-dim");
        let embedding = Embedding { values: vec![0.5; 128] };
        let err = write_encoding(&path, &embedding).unwrap_err();
        assert!(matches!(err, EncodingError::InvalidDimension(128)));
    }

    #[test]
    fn test_write_rejects_infinity() {
        let path = scratch_file("inf");
        let mut embedding = sample_embedding();
        embedding.values[7] = f32::INFINITY;
        let err = write_encoding(&path, &embedding).unwrap_err();
        assert!(matches!(err, EncodingError::InvalidValue));
    }
}
