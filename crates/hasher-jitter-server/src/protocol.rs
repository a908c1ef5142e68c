//! Jitter RPC wire format.
//!
//! Every request starts with a one-byte protocol version followed by a
//! fixed-size body. All integers are little-endian.
//!
//! ```text
//! v1: [0x01] [hash: 4]                                   -> [jitter: 4]
//! v2: [0x02] [slots: 12 x 4] [hash: 4] [pass: 4]         -> [jitter: 4]
//! ```
//!
//! v1 is the hash-only lookup against slot 3 and best seeds; v2 is the
//! zone-based flash search. The two are not interchangeable.

use hasher_jitter::{FlashSearcher, JitterVector, Slots, SLOT_COUNT};

use crate::error::{Result, ServerError};

/// Legacy hash-only request
pub const VERSION_LEGACY: u8 = 0x01;

/// Slots + hash + pass request
pub const VERSION_SLOTS: u8 = 0x02;

/// Body size of a v1 request
pub const LEGACY_BODY_LEN: usize = 4;

/// Body size of a v2 request
pub const SLOTS_BODY_LEN: usize = SLOT_COUNT * 4 + 8;

/// Response size for both versions
pub const RESPONSE_LEN: usize = 4;

/// A decoded jitter request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterRequest {
    /// v1: hash key only
    Legacy {
        /// Lookup key
        hash: u32,
    },
    /// v2: full search context
    Search {
        /// Semantic slots of the current header
        slots: Slots,
        /// Lookup key of the current pass
        hash: u32,
        /// Pass index
        pass: u32,
    },
}

/// Body length for a version byte, or `None` if the version is unknown
pub fn body_len(version: u8) -> Option<usize> {
    match version {
        VERSION_LEGACY => Some(LEGACY_BODY_LEN),
        VERSION_SLOTS => Some(SLOTS_BODY_LEN),
        _ => None,
    }
}

fn le_word(buf: &[u8], index: usize) -> u32 {
    let o = index * 4;
    u32::from_le_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]])
}

impl JitterRequest {
    /// Decode a request body for `version`
    pub fn decode(version: u8, body: &[u8]) -> Result<Self> {
        let expected = body_len(version).ok_or(ServerError::UnsupportedVersion(version))?;
        if body.len() != expected {
            return Err(ServerError::Malformed {
                expected,
                actual: body.len(),
            });
        }

        if version == VERSION_LEGACY {
            return Ok(JitterRequest::Legacy {
                hash: le_word(body, 0),
            });
        }

        let mut slots = [0u32; SLOT_COUNT];
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = le_word(body, i);
        }
        Ok(JitterRequest::Search {
            slots,
            hash: le_word(body, SLOT_COUNT),
            pass: le_word(body, SLOT_COUNT + 1),
        })
    }

    /// Protocol version of this request
    pub fn version(&self) -> u8 {
        match self {
            JitterRequest::Legacy { .. } => VERSION_LEGACY,
            JitterRequest::Search { .. } => VERSION_SLOTS,
        }
    }

    /// Encode version byte and body
    pub fn encode(&self) -> Vec<u8> {
        match self {
            JitterRequest::Legacy { hash } => {
                let mut buf = Vec::with_capacity(1 + LEGACY_BODY_LEN);
                buf.push(VERSION_LEGACY);
                buf.extend_from_slice(&hash.to_le_bytes());
                buf
            }
            JitterRequest::Search { slots, hash, pass } => {
                let mut buf = Vec::with_capacity(1 + SLOTS_BODY_LEN);
                buf.push(VERSION_SLOTS);
                for slot in slots {
                    buf.extend_from_slice(&slot.to_le_bytes());
                }
                buf.extend_from_slice(&hash.to_le_bytes());
                buf.extend_from_slice(&pass.to_le_bytes());
                buf
            }
        }
    }

    /// Resolve the jitter for this request
    pub fn resolve(&self, searcher: &FlashSearcher) -> JitterVector {
        match *self {
            JitterRequest::Legacy { hash } => searcher.search_key(hash).0,
            JitterRequest::Search { slots, hash, pass } => {
                searcher.search(&slots, hash, pass as usize).0
            }
        }
    }
}

/// Encode a jitter response
pub fn encode_response(jitter: JitterVector) -> [u8; RESPONSE_LEN] {
    jitter.to_le_bytes()
}

/// Decode a jitter response
pub fn decode_response(buf: [u8; RESPONSE_LEN]) -> JitterVector {
    u32::from_le_bytes(buf)
}
