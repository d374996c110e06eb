//! Model artifact resolution
//!
//! The trained classifier blob lives in object storage (or on local disk for
//! dev runs) and is fetched exactly once at startup; afterwards the model is
//! read-only. Any failure here is fatal to process start.

use std::io::Read;

use sha2::{Digest, Sha256};

use crate::error::PipelineError;

/// Fetch the artifact bytes from a local path or an `http(s)://` location.
pub fn fetch(location: &str) -> Result<Vec<u8>, PipelineError> {
    let bytes = if location.starts_with("http://") || location.starts_with("https://") {
        log::info!("fetching model artifact from {}", location);
        let response = ureq::get(location)
            .call()
            .map_err(|e| PipelineError::ModelUnavailable(format!("fetch {}: {}", location, e)))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| PipelineError::ModelUnavailable(format!("read {}: {}", location, e)))?;
        bytes
    } else {
        log::info!("loading model artifact from {}", location);
        std::fs::read(location)
            .map_err(|e| PipelineError::ModelUnavailable(format!("read {}: {}", location, e)))?
    };

    if bytes.is_empty() {
        return Err(PipelineError::ModelUnavailable(format!("{} is empty", location)));
    }
    Ok(bytes)
}

/// Verify the artifact against an expected hex SHA-256 digest.
pub fn verify_checksum(bytes: &[u8], expected_hex: &str) -> Result<(), PipelineError> {
    let digest = Sha256::digest(bytes);
    let actual = hex::encode(digest);
    if actual.eq_ignore_ascii_case(expected_hex.trim()) {
        Ok(())
    } else {
        Err(PipelineError::ModelUnavailable(format!(
            "artifact checksum mismatch: expected {}, got {}",
            expected_hex, actual
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_fetch_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"model-bytes").unwrap();
        let bytes = fetch(file.path().to_str().unwrap()).unwrap();
        assert_eq!(bytes, b"model-bytes");
    }

    #[test]
    fn test_fetch_missing_file_is_model_unavailable() {
        let err = fetch("/nonexistent/model.onnx").unwrap_err();
        assert!(matches!(err, PipelineError::ModelUnavailable(_)));
    }

    #[test]
    fn test_checksum_roundtrip() {
        let bytes = b"model-bytes";
        let digest = hex::encode(Sha256::digest(bytes));
        assert!(verify_checksum(bytes, &digest).is_ok());
        assert!(verify_checksum(bytes, &digest.to_uppercase()).is_ok());
        assert!(verify_checksum(bytes, "deadbeef").is_err());
    }
}
