//! Checkpoint and resume-token codecs.
//!
//! Clients treat both as opaque strings. The wire shape is a version byte
//! followed by a bincode body, base64-encoded; unknown versions are
//! rejected so the encoding can evolve.

use crate::error::{Result, SyncError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sokoni_core::ids::UserId;
use sokoni_core::model::{Collection, Watermark};
use std::collections::BTreeMap;

/// Current checkpoint encoding version.
const CHECKPOINT_VERSION: u8 = 1;

/// Current resume-token encoding version.
const RESUME_VERSION: u8 = 1;

/// Per-collection watermarks: the highest `(updated_at, id)` already
/// delivered to the client.
pub type WatermarkMap = BTreeMap<Collection, Watermark>;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointBody {
    marks: WatermarkMap,
}

/// Encode per-collection watermarks into an opaque checkpoint string.
#[must_use]
pub fn encode_checkpoint(marks: &WatermarkMap) -> String {
    let body = CheckpointBody {
        marks: marks.clone(),
    };
    // Bincode of a plain struct over owned data cannot fail.
    let payload = bincode::serialize(&body).unwrap_or_default();
    let mut framed = Vec::with_capacity(payload.len() + 1);
    framed.push(CHECKPOINT_VERSION);
    framed.extend_from_slice(&payload);
    STANDARD.encode(framed)
}

/// Decode a checkpoint back into watermarks.
///
/// # Errors
///
/// `InvalidCheckpoint` on bad base64, an unknown version byte, or a
/// malformed body.
pub fn decode_checkpoint(encoded: &str) -> Result<WatermarkMap> {
    let framed = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|_| SyncError::InvalidCheckpoint)?;
    let (&version, payload) = framed.split_first().ok_or(SyncError::InvalidCheckpoint)?;
    if version != CHECKPOINT_VERSION {
        return Err(SyncError::InvalidCheckpoint);
    }
    let body: CheckpointBody =
        bincode::deserialize(payload).map_err(|_| SyncError::InvalidCheckpoint)?;
    Ok(body.marks)
}

/// Durable cursor binding a chunked pull to one snapshot window.
///
/// The lower bound is where the client's checkpoint left off; the upper
/// bound is frozen when chunk 0 is served, so rows written afterwards
/// cannot interleave into later chunks of the same pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeCursor {
    /// User the window belongs to.
    pub user_id: UserId,

    /// Exclusive lower bound per collection.
    pub lower: WatermarkMap,

    /// Inclusive upper bound: rows above this are left for the next sync.
    pub upper: Watermark,

    /// When the window was opened.
    pub issued_at: DateTime<Utc>,
}

/// Encode a resume cursor into an opaque token.
#[must_use]
pub fn encode_resume_token(cursor: &ResumeCursor) -> String {
    let payload = bincode::serialize(cursor).unwrap_or_default();
    let mut framed = Vec::with_capacity(payload.len() + 1);
    framed.push(RESUME_VERSION);
    framed.extend_from_slice(&payload);
    STANDARD.encode(framed)
}

/// Decode a resume token.
///
/// # Errors
///
/// `InvalidCheckpoint` on any decoding failure.
pub fn decode_resume_token(encoded: &str) -> Result<ResumeCursor> {
    let framed = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|_| SyncError::InvalidCheckpoint)?;
    let (&version, payload) = framed.split_first().ok_or(SyncError::InvalidCheckpoint)?;
    if version != RESUME_VERSION {
        return Err(SyncError::InvalidCheckpoint);
    }
    bincode::deserialize(payload).map_err(|_| SyncError::InvalidCheckpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_roundtrip() {
        let mut marks = WatermarkMap::new();
        marks.insert(
            Collection::Bookings,
            Watermark {
                updated_at_micros: 1_700_000_000_000_000,
                last_id: "b-42".into(),
            },
        );
        marks.insert(Collection::Ledger, Watermark::origin());

        let encoded = encode_checkpoint(&marks);
        let decoded = decode_checkpoint(&encoded).unwrap();
        assert_eq!(decoded, marks);
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(
            decode_checkpoint("not base64 !!!").unwrap_err(),
            SyncError::InvalidCheckpoint
        );
        // Valid base64, wrong version byte.
        let framed = STANDARD.encode([9u8, 1, 2, 3]);
        assert_eq!(
            decode_checkpoint(&framed).unwrap_err(),
            SyncError::InvalidCheckpoint
        );
        assert_eq!(decode_checkpoint("").unwrap_err(), SyncError::InvalidCheckpoint);
    }

    #[test]
    fn test_resume_token_roundtrip() {
        let cursor = ResumeCursor {
            user_id: UserId::new(),
            lower: WatermarkMap::new(),
            upper: Watermark {
                updated_at_micros: 99,
                last_id: "z".into(),
            },
            issued_at: Utc::now(),
        };
        let decoded = decode_resume_token(&encode_resume_token(&cursor)).unwrap();
        assert_eq!(decoded.user_id, cursor.user_id);
        assert_eq!(decoded.upper, cursor.upper);
    }

    #[test]
    fn test_checkpoint_is_opaque_base64() {
        let encoded = encode_checkpoint(&WatermarkMap::new());
        assert!(STANDARD.decode(encoded.as_bytes()).is_ok());
    }
}
