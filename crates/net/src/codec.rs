//! Envelope encoding and decoding with framing.
//!
//! Provides length-prefixed JSON encoding for reliable delivery over QUIC
//! streams. Frame format: `[magic: 4][length: u32 le][json payload]`.

use crate::protocol::{Envelope, MessageType, PROTOCOL_VERSION};
use anyhow::{bail, Context, Result};
use blake3::Hash;

/// Frame magic bytes; a peer speaking something else fails fast.
pub const FRAME_MAGIC: &[u8; 4] = b"GTN1";

/// Upper bound on a single frame's payload. A full-grid sync serialized as
/// JSON sits well under this.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Compute the catalog hash from protocol definitions.
///
/// Logged on both sides at startup so operators can confirm the peers speak
/// the same message catalog.
pub fn catalog_hash() -> u64 {
    let mut hasher = blake3::Hasher::new();

    hasher.update(PROTOCOL_VERSION.as_bytes());
    hasher.update(FRAME_MAGIC);

    // Catalog wire names, in catalog order (deterministic)
    for kind in MessageType::CATALOG {
        hasher.update(kind.as_wire().as_bytes());
    }

    let hash: Hash = hasher.finalize();
    u64::from_le_bytes(hash.as_bytes()[0..8].try_into().unwrap_or([0; 8]))
}

/// Encode an envelope into a framed byte buffer.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(envelope).context("Failed to serialize envelope")?;

    if payload.len() > MAX_FRAME_LEN {
        bail!(
            "Envelope too large: {} bytes (limit {})",
            payload.len(),
            MAX_FRAME_LEN
        );
    }

    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(FRAME_MAGIC);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);

    Ok(frame)
}

/// Decode an envelope from framed data.
///
/// Expects the buffer to start with the frame magic and length prefix.
/// The decoded envelope is structurally validated and size-verified.
pub fn decode(data: &[u8]) -> Result<Envelope> {
    if data.len() < 8 {
        bail!("Frame too short: {} bytes (minimum 8)", data.len());
    }

    if &data[0..4] != FRAME_MAGIC {
        bail!("Bad frame magic");
    }

    let length = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;

    if length > MAX_FRAME_LEN {
        bail!("Frame payload too large: {length} bytes (limit {MAX_FRAME_LEN})");
    }

    if data.len() < 8 + length {
        bail!("Incomplete frame: expected {} bytes, got {}", 8 + length, data.len());
    }

    let payload = &data[8..8 + length];

    let value: serde_json::Value =
        serde_json::from_slice(payload).context("Frame payload is not valid JSON")?;
    Envelope::validate_value(&value).context("Envelope failed validation")?;

    let envelope: Envelope =
        serde_json::from_value(value).context("Failed to deserialize envelope")?;
    envelope.verify().map_err(|reason| anyhow::anyhow!(reason))?;

    Ok(envelope)
}
