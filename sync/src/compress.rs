//! Gzip helpers for pull payloads.

use crate::error::{Result, SyncError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read as _, Write as _};

/// Gzip a JSON body and base64-encode it for the wire. Returns the encoded
/// blob and the gzip byte length (what `compressed_size` reports).
///
/// # Errors
///
/// `Internal` when the encoder fails.
pub fn gzip_base64(raw: &[u8]) -> Result<(String, usize)> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(raw)
        .map_err(|e| SyncError::Internal(format!("gzip write: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| SyncError::Internal(format!("gzip finish: {e}")))?;
    let size = compressed.len();
    Ok((STANDARD.encode(compressed), size))
}

/// Reverse of [`gzip_base64`]: base64-decode and gunzip.
///
/// # Errors
///
/// `InvalidInput` on malformed base64 or gzip framing.
pub fn gunzip_base64(blob: &str) -> Result<Vec<u8>> {
    let compressed = STANDARD
        .decode(blob.as_bytes())
        .map_err(|_| SyncError::InvalidInput("payload is not base64".into()))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|_| SyncError::InvalidInput("payload is not gzip".into()))?;
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let body = br#"{"bookings":[{"id":"b-1"},{"id":"b-2"}]}"#.repeat(50);
        let (blob, size) = gzip_base64(&body).unwrap();
        assert!(size < body.len(), "repetitive JSON should shrink");
        assert_eq!(gunzip_base64(&blob).unwrap(), body);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(gunzip_base64("!!!").is_err());
        let valid_b64_not_gzip = STANDARD.encode(b"plain");
        assert!(gunzip_base64(&valid_b64_not_gzip).is_err());
    }
}
