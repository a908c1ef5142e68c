//! Camouflaged header codec.
//!
//! Packs twelve semantic slots and a nonce into the 80-byte layout of a
//! Bitcoin-style block header so that stock SHA-256 mining hardware accepts it.
//!
//! ```text
//! offset  len  field         content
//!      0    4  version       0x00000002 (LE)
//!      4   32  prev_hash     slots 0-7 (BE)
//!     36   32  merkle_root   slots 8-11 (BE) + 16 zero bytes
//!     68    4  timestamp     fixed per run (LE)
//!     72    4  bits          0x1d00ffff (LE)
//!     76    4  nonce         candidate (LE)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{JitterError, Result};
use crate::types::{JitterVector, Slots, SLOT_COUNT};

/// Header length in bytes.
pub const HEADER_LEN: usize = 80;

/// Version field value.
pub const HEADER_VERSION: u32 = 0x0000_0002;

/// Difficulty bits field value.
pub const HEADER_BITS: u32 = 0x1d00_ffff;

const VERSION_OFFSET: usize = 0;
const PREV_HASH_OFFSET: usize = 4;
/// First byte of the merkle-root field; jitter lands in its first 16 bytes.
pub const MERKLE_OFFSET: usize = 36;
const TIMESTAMP_OFFSET: usize = 68;
const BITS_OFFSET: usize = 72;
/// First byte of the nonce field.
pub const NONCE_OFFSET: usize = 76;

/// Number of merkle-root words that carry slots 8-11 and receive jitter.
pub const JITTER_WORDS: usize = 4;

/// How jitter is folded into the merkle-root slots between passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionStrategy {
    /// XOR `jitter.rotate_left(8 * i)` into each of the four words every pass
    #[default]
    Rotating,
    /// XOR the raw jitter into word `pass % 4` only
    PassSelected,
}

impl InjectionStrategy {
    /// Apply this strategy to a header slice of any length.
    pub fn apply(self, header: &mut [u8], jitter: JitterVector, pass: usize) -> Result<()> {
        self.inject(as_header_mut(header)?, jitter, pass);
        Ok(())
    }

    /// Apply this strategy to a fixed-size header. Cannot fail.
    pub fn inject(self, header: &mut [u8; HEADER_LEN], jitter: JitterVector, pass: usize) {
        match self {
            InjectionStrategy::Rotating => inject_rotating(header, jitter),
            InjectionStrategy::PassSelected => inject_word(header, jitter, pass),
        }
    }
}

fn inject_rotating(header: &mut [u8; HEADER_LEN], jitter: JitterVector) {
    for i in 0..JITTER_WORDS {
        let offset = MERKLE_OFFSET + i * 4;
        let word = get_be(header, offset) ^ jitter.rotate_left(8 * i as u32);
        put_be(header, offset, word);
    }
}

fn inject_word(header: &mut [u8; HEADER_LEN], jitter: JitterVector, pass: usize) {
    let offset = MERKLE_OFFSET + (pass % JITTER_WORDS) * 4;
    let word = get_be(header, offset) ^ jitter;
    put_be(header, offset, word);
}

#[inline]
fn put_be(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

#[inline]
fn put_le(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn get_be(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

#[inline]
fn get_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn check_len(header: &[u8]) -> Result<()> {
    if header.len() != HEADER_LEN {
        return Err(JitterError::InvalidLength {
            expected: HEADER_LEN,
            actual: header.len(),
        });
    }
    Ok(())
}

fn as_header_mut(header: &mut [u8]) -> Result<&mut [u8; HEADER_LEN]> {
    let actual = header.len();
    header.try_into().map_err(|_| JitterError::InvalidLength {
        expected: HEADER_LEN,
        actual,
    })
}

/// Encode slots and nonce with a zero timestamp.
pub fn encode(slots: &Slots, nonce: u32) -> [u8; HEADER_LEN] {
    encode_with_timestamp(slots, nonce, 0)
}

/// Encode slots, nonce and an explicit timestamp.
pub fn encode_with_timestamp(slots: &Slots, nonce: u32, timestamp: u32) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    put_le(&mut header, VERSION_OFFSET, HEADER_VERSION);
    for (i, &slot) in slots[..8].iter().enumerate() {
        put_be(&mut header, PREV_HASH_OFFSET + i * 4, slot);
    }
    for (i, &slot) in slots[8..].iter().enumerate() {
        put_be(&mut header, MERKLE_OFFSET + i * 4, slot);
    }
    // bytes 52..68 stay zero
    put_le(&mut header, TIMESTAMP_OFFSET, timestamp);
    put_le(&mut header, BITS_OFFSET, HEADER_BITS);
    put_le(&mut header, NONCE_OFFSET, nonce);
    header
}

/// One header per candidate nonce, all sharing the same 76-byte prefix.
pub fn encode_batch(slots: &Slots, nonces: &[u32], timestamp: u32) -> Vec<[u8; HEADER_LEN]> {
    let prefix = encode_with_timestamp(slots, 0, timestamp);
    nonces
        .iter()
        .map(|&nonce| {
            let mut header = prefix;
            put_le(&mut header, NONCE_OFFSET, nonce);
            header
        })
        .collect()
}

/// Recover the twelve slots. Short input yields all zeros.
pub fn decode_slots(header: &[u8]) -> Slots {
    let mut slots = [0u32; SLOT_COUNT];
    if header.len() < HEADER_LEN {
        return slots;
    }
    for (i, slot) in slots[..8].iter_mut().enumerate() {
        *slot = get_be(header, PREV_HASH_OFFSET + i * 4);
    }
    for (i, slot) in slots[8..].iter_mut().enumerate() {
        *slot = get_be(header, MERKLE_OFFSET + i * 4);
    }
    slots
}

/// Nonce field. Short input yields zero.
pub fn decode_nonce(header: &[u8]) -> u32 {
    if header.len() < HEADER_LEN {
        return 0;
    }
    get_le(header, NONCE_OFFSET)
}

/// Timestamp field. Short input yields zero.
pub fn decode_timestamp(header: &[u8]) -> u32 {
    if header.len() < HEADER_LEN {
        return 0;
    }
    get_le(header, TIMESTAMP_OFFSET)
}

/// Overwrite the nonce field.
pub fn set_nonce(header: &mut [u8], nonce: u32) -> Result<()> {
    check_len(header)?;
    put_le(header, NONCE_OFFSET, nonce);
    Ok(())
}

/// Structural check: length, version and bits. Says nothing about the hash.
pub fn validate(header: &[u8]) -> bool {
    header.len() == HEADER_LEN
        && get_le(header, VERSION_OFFSET) == HEADER_VERSION
        && get_le(header, BITS_OFFSET) == HEADER_BITS
}

/// Rotating injection: word `i` of the merkle root receives `jitter.rotate_left(8 * i)`.
pub fn xor_jitter_into_header(header: &mut [u8], jitter: JitterVector) -> Result<()> {
    inject_rotating(as_header_mut(header)?, jitter);
    Ok(())
}

/// Pass-selected injection: only word `pass % 4` of the merkle root changes.
pub fn xor_jitter_into_slot(header: &mut [u8], jitter: JitterVector, pass: usize) -> Result<()> {
    inject_word(as_header_mut(header)?, jitter, pass);
    Ok(())
}

/// First four bytes of a hash, big-endian.
#[inline]
pub fn lookup_key(hash: &[u8; 32]) -> u32 {
    get_be(hash, 0)
}

/// Count of non-zero slots.
pub fn count_nonzero_slots(slots: &Slots) -> usize {
    slots.iter().filter(|&&s| s != 0).count()
}

/// At least eight populated slots, the minimum the pipeline treats as meaningful.
pub fn has_meaningful_slots(slots: &Slots) -> bool {
    count_nonzero_slots(slots) >= 8
}
