//! Core types for the jitter engine

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::header::{self, HEADER_LEN};

/// Number of semantic slots carried by a camouflaged header
pub const SLOT_COUNT: usize = 12;

/// Default number of passes in the temporal loop
pub const DEFAULT_PASS_COUNT: usize = 21;

/// Semantic feature vector ("ASIC slots")
pub type Slots = [u32; SLOT_COUNT];

/// A 32-bit value folded into the header between passes
pub type JitterVector = u32;

// Domain signatures carried in the high nibble range of slot 10.
/// Narrative prose
pub const DOMAIN_PROSE: u32 = 0x1000;
/// Academic prose
pub const DOMAIN_ACADEMIC: u32 = 0x1100;
/// Mathematics
pub const DOMAIN_MATH: u32 = 0x2000;
/// Formal logic
pub const DOMAIN_LOGIC: u32 = 0x2100;
/// Source code
pub const DOMAIN_CODE: u32 = 0x3000;
/// Markup languages
pub const DOMAIN_MARKUP: u32 = 0x3100;
/// Financial text
pub const DOMAIN_FINANCIAL: u32 = 0x4000;
/// Technical documentation
pub const DOMAIN_TECHNICAL: u32 = 0x5000;
/// Debug / synthetic data
pub const DOMAIN_DEBUG: u32 = 0xFFFF;

/// Search strategy selected by the pass index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchZone {
    /// Passes 0..=7: exact match on slot 0
    Topic,
    /// Passes 8..=14: nearest slot 1 inside a domain/POS bucket
    Grammar,
    /// Passes 15 and up: leading-zero proximity on slot 3
    Specificity,
}

impl SearchZone {
    /// Last pass routed to the topic zone
    pub const TOPIC_END: usize = 7;
    /// Last pass routed to the grammar zone
    pub const GRAMMAR_END: usize = 14;

    /// Route a pass index to its zone. Every pass maps to exactly one zone;
    /// passes past the nominal 21 stay in the specificity zone.
    pub fn for_pass(pass: usize) -> Self {
        if pass <= Self::TOPIC_END {
            SearchZone::Topic
        } else if pass <= Self::GRAMMAR_END {
            SearchZone::Grammar
        } else {
            SearchZone::Specificity
        }
    }
}

impl fmt::Display for SearchZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchZone::Topic => write!(f, "topic"),
            SearchZone::Grammar => write!(f, "grammar"),
            SearchZone::Specificity => write!(f, "specificity"),
        }
    }
}

/// A knowledge-base entry produced by the data pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFrame")]
pub struct TrainingFrame {
    /// Source document
    pub source_file: String,
    /// Chunk identifier inside the source
    pub chunk_id: i32,
    /// First token of the sliding window
    pub window_start: i32,
    /// Last token of the sliding window
    pub window_end: i32,
    /// Number of context tokens
    pub context_length: i32,
    /// Semantic feature vector
    #[serde(rename = "asic_slots")]
    pub slots: Slots,
    /// Original token context, used by exact-match resolution
    pub token_sequence: Vec<i32>,
    /// Token this frame predicts
    pub target_token_id: i32,
    /// Golden nonce found for this frame during training
    #[serde(serialize_with = "serialize_seed", skip_serializing_if = "Option::is_none")]
    pub best_seed: Option<Vec<u8>>,
    /// Free-form producer metadata
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TrainingFrame {
    /// Create a frame from slots and a target, leaving provenance empty
    pub fn new(slots: Slots, target_token_id: i32) -> Self {
        Self {
            slots,
            target_token_id,
            ..Default::default()
        }
    }

    /// Attach a token context
    pub fn with_tokens(mut self, tokens: Vec<i32>) -> Self {
        self.token_sequence = tokens;
        self
    }

    /// Build the camouflaged header for this frame with a zero nonce
    pub fn to_header(&self, timestamp: u32) -> [u8; HEADER_LEN] {
        header::encode_with_timestamp(&self.slots, 0, timestamp)
    }
}

fn serialize_seed<S: Serializer>(seed: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match seed {
        Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
        None => s.serialize_none(),
    }
}

/// Seeds arrive base64-encoded from the trainer or as plain byte arrays.
#[derive(Deserialize)]
#[serde(untagged)]
enum SeedRepr {
    Encoded(String),
    Bytes(Vec<u8>),
}

/// Wire shape accepting both producer spellings.
#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    source_file: Option<String>,
    #[serde(default)]
    chunk_id: Option<i32>,
    #[serde(default)]
    window_start: Option<i32>,
    #[serde(default)]
    window_end: Option<i32>,
    #[serde(default)]
    context_length: Option<i32>,
    #[serde(default)]
    asic_slots: Option<Vec<u32>>,
    #[serde(default)]
    feature_vector: Option<Vec<u32>>,
    #[serde(default)]
    token_sequence: Option<Vec<i32>>,
    #[serde(default)]
    target_token_id: Option<i32>,
    #[serde(default)]
    target_token: Option<i32>,
    #[serde(default)]
    best_seed: Option<SeedRepr>,
    #[serde(default)]
    metadata: Option<HashMap<String, serde_json::Value>>,
}

fn to_slots(values: &[u32]) -> Result<Slots, String> {
    if values.len() > SLOT_COUNT {
        return Err(format!(
            "slot vector has {} entries, at most {} allowed",
            values.len(),
            SLOT_COUNT
        ));
    }
    let mut slots = [0u32; SLOT_COUNT];
    slots[..values.len()].copy_from_slice(values);
    Ok(slots)
}

impl TryFrom<RawFrame> for TrainingFrame {
    type Error = String;

    fn try_from(raw: RawFrame) -> Result<Self, Self::Error> {
        let canonical = raw.asic_slots.as_deref().map(to_slots).transpose()?;
        let fallback = raw.feature_vector.as_deref().map(to_slots).transpose()?;
        let slots = match (canonical, fallback) {
            (Some(c), _) if c.iter().any(|&s| s != 0) => c,
            (_, Some(f)) => f,
            (Some(c), None) => c,
            (None, None) => [0; SLOT_COUNT],
        };

        let target_token_id = match (raw.target_token_id, raw.target_token) {
            (Some(t), _) if t != 0 => t,
            (_, Some(t)) => t,
            (t, None) => t.unwrap_or(0),
        };

        let best_seed = match raw.best_seed {
            Some(SeedRepr::Encoded(s)) if s.is_empty() => None,
            Some(SeedRepr::Encoded(s)) => Some(
                STANDARD
                    .decode(s.as_bytes())
                    .map_err(|e| format!("invalid best_seed: {e}"))?,
            ),
            Some(SeedRepr::Bytes(b)) if b.is_empty() => None,
            Some(SeedRepr::Bytes(b)) => Some(b),
            None => None,
        };

        Ok(TrainingFrame {
            source_file: raw.source_file.unwrap_or_default(),
            chunk_id: raw.chunk_id.unwrap_or(0),
            window_start: raw.window_start.unwrap_or(0),
            window_end: raw.window_end.unwrap_or(0),
            context_length: raw.context_length.unwrap_or(0),
            slots,
            token_sequence: raw.token_sequence.unwrap_or_default(),
            target_token_id,
            best_seed,
            metadata: raw.metadata.unwrap_or_default(),
        })
    }
}

/// One pass of the temporal loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassRecord {
    /// Pass index (0-based)
    pub pass: usize,
    /// Double hash of the header entering this pass
    pub hash: [u8; 32],
    /// Jitter folded into the header after hashing
    pub jitter: JitterVector,
    /// Whether the jitter came from the knowledge base
    pub found: bool,
}

impl PassRecord {
    /// Lookup key derived from this pass's hash
    pub fn hash_key(&self) -> u32 {
        header::lookup_key(&self.hash)
    }
}

/// Working state of a single search
#[derive(Debug, Clone)]
pub struct HashState {
    /// Header being hashed; only the jitter and nonce fields change
    pub header: [u8; HEADER_LEN],
    /// Current pass index
    pub pass: usize,
    /// Append-only jitter history
    pub jitter_history: Vec<PassRecord>,
    /// Token the search is aiming at
    pub target_token_id: u32,
    /// Nonce candidate the header started from
    pub nonce: u32,
}

impl HashState {
    /// Start a search from a header
    pub fn new(header: [u8; HEADER_LEN], target_token_id: u32, pass_count: usize) -> Self {
        Self {
            nonce: header::decode_nonce(&header),
            header,
            pass: 0,
            jitter_history: Vec::with_capacity(pass_count),
            target_token_id,
        }
    }

    /// Jitter values applied so far, in pass order
    pub fn jitters(&self) -> Vec<JitterVector> {
        self.jitter_history.iter().map(|r| r.jitter).collect()
    }
}

/// Outcome of a full temporal loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenNonceResult {
    /// First four bytes of the final hash, big-endian
    pub nonce: u32,
    /// Alignment reached the convergence threshold
    pub found: bool,
    /// Double hash after the last pass
    pub final_hash: [u8; 32],
    /// Passes executed
    pub passes_completed: usize,
    /// Inverse-variance score over the jitter history
    pub stability: f64,
    /// Bitwise similarity between nonce and target
    pub alignment: f64,
    /// Header nonce the run started from
    pub seed_nonce: u32,
    /// Target token of the run
    pub target_token_id: u32,
    /// Per-pass history
    pub jitter_history: Vec<PassRecord>,
}

impl GoldenNonceResult {
    /// Jitter values in pass order
    pub fn jitter_vectors(&self) -> Vec<JitterVector> {
        self.jitter_history.iter().map(|r| r.jitter).collect()
    }

    /// Full 32-byte seed (the final hash)
    pub fn full_seed(&self) -> Vec<u8> {
        self.final_hash.to_vec()
    }

    /// Number of passes whose jitter came from the knowledge base
    pub fn knowledge_hits(&self) -> usize {
        self.jitter_history.iter().filter(|r| r.found).count()
    }
}

/// Flash-search counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Knowledge-base hits
    pub hits: u64,
    /// Knowledge-base misses
    pub misses: u64,
    /// LRU cache hits
    pub cache_hits: u64,
    /// LRU cache misses
    pub cache_misses: u64,
}
