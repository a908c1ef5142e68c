//! Flash-search associative memory.
//!
//! Holds the knowledge base of training frames plus three derived indices and
//! resolves a jitter value per pass. Which index is consulted depends on the
//! zone the pass falls into:
//!
//! | zone        | passes | strategy                                             |
//! |-------------|--------|------------------------------------------------------|
//! | topic       | 0-7    | exact match on slot 0, answer slot 1                 |
//! | grammar     | 8-14   | domain/POS bucket, closest slot 1, answer slot 2     |
//! | specificity | 15-20  | >= 12 leading zeros in `hash ^ slot3`, answer diff   |
//!
//! The knowledge base and its indices live behind one reader-writer lock and
//! are replaced together; the LRU cache has its own lock and is consulted
//! first, so cache hits proceed while a rebuild holds the write lock.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::{CachedJitter, JitterCache};
use crate::config::JitterConfig;
use crate::error::{JitterError, Result};
use crate::types::{JitterVector, SearchStats, SearchZone, Slots, TrainingFrame};

/// Salt of the deterministic fallback jitter (golden ratio constant).
pub const DEFAULT_JITTER_SALT: u32 = 0x9E37_79B9;

/// XOR mask applied to specificity-zone answers.
pub const SPECIFICITY_MASK: u32 = 0xFEED_FACE;

/// Minimum leading zero bits of `hash ^ slot3` for a specificity hit.
pub const SPECIFICITY_MIN_LEADING_ZEROS: u32 = 12;

/// Deterministic jitter used whenever the knowledge base has no answer.
#[inline]
pub fn default_jitter(key: u32) -> JitterVector {
    key ^ DEFAULT_JITTER_SALT ^ (key >> 16)
}

/// Bucket key of the grammar zone: domain nibble of slot 10 plus the POS byte of slot 4.
#[inline]
pub fn domain_pos_key(slots: &Slots) -> u32 {
    (slots[10] & 0xF000) | (slots[4] & 0xFF)
}

/// Indices derived from a knowledge-base snapshot. Always rebuilt in full.
#[derive(Debug, Default)]
pub struct FrameIndices {
    slot0: HashMap<u32, Vec<usize>>,
    domain_pos: HashMap<u32, Vec<usize>>,
    slot3: HashMap<u32, usize>,
}

impl FrameIndices {
    /// Build all three indices in one pass over the frames
    pub fn build(frames: &[TrainingFrame]) -> Self {
        let mut indices = FrameIndices {
            slot0: HashMap::with_capacity(frames.len()),
            domain_pos: HashMap::new(),
            slot3: HashMap::with_capacity(frames.len()),
        };
        for (i, frame) in frames.iter().enumerate() {
            indices.slot0.entry(frame.slots[0]).or_default().push(i);
            indices
                .domain_pos
                .entry(domain_pos_key(&frame.slots))
                .or_default()
                .push(i);
            // last writer wins
            indices.slot3.insert(frame.slots[3], i);
        }
        indices
    }

    /// Frames whose slot 0 equals `key`
    pub fn slot0_bucket(&self, key: u32) -> &[usize] {
        self.slot0.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Frames sharing a domain/POS key
    pub fn domain_pos_bucket(&self, key: u32) -> &[usize] {
        self.domain_pos.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Last frame whose slot 3 equals `key`
    pub fn slot3_entry(&self, key: u32) -> Option<usize> {
        self.slot3.get(&key).copied()
    }
}

/// Sizes of the derived indices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Frames in the knowledge base
    pub frames: usize,
    /// Distinct slot-0 keys
    pub slot0_keys: usize,
    /// Distinct domain/POS keys
    pub domain_pos_keys: usize,
    /// Distinct slot-3 keys
    pub slot3_keys: usize,
}

pub(crate) struct KnowledgeBase {
    pub(crate) frames: Vec<TrainingFrame>,
    pub(crate) indices: FrameIndices,
}

#[derive(Default)]
struct SearchCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// Associative memory resolving per-pass jitter
pub struct FlashSearcher {
    knowledge: RwLock<KnowledgeBase>,
    cache: JitterCache,
    counters: SearchCounters,
}

impl Default for FlashSearcher {
    fn default() -> Self {
        Self::new(&JitterConfig::default())
    }
}

impl FlashSearcher {
    /// Create an empty searcher
    pub fn new(config: &JitterConfig) -> Self {
        Self {
            knowledge: RwLock::new(KnowledgeBase {
                frames: Vec::new(),
                indices: FrameIndices::default(),
            }),
            cache: JitterCache::new(config.cache_size),
            counters: SearchCounters::default(),
        }
    }

    /// Create a searcher already holding `frames`
    pub fn with_frames(config: &JitterConfig, frames: Vec<TrainingFrame>) -> Self {
        let searcher = Self::new(config);
        searcher.build_from_training_data(frames);
        searcher
    }

    /// Replace the knowledge base and rebuild every index.
    ///
    /// Indices are built before the write lock is taken; readers see either
    /// the old snapshot or the new one. The cache is cleared with the swap.
    pub fn build_from_training_data(&self, frames: Vec<TrainingFrame>) {
        let indices = FrameIndices::build(&frames);
        let summary = summarize(&frames, &indices);

        let mut knowledge = self.knowledge.write();
        *knowledge = KnowledgeBase { frames, indices };
        self.cache.clear();
        drop(knowledge);

        tracing::info!(
            frames = summary.frames,
            slot0_keys = summary.slot0_keys,
            domain_pos_keys = summary.domain_pos_keys,
            "Rebuilt flash-search indices"
        );
    }

    /// Append frames to the knowledge base and rebuild. Returns the new total.
    pub fn merge_frames(&self, frames: Vec<TrainingFrame>) -> usize {
        let added = frames.len();
        let mut knowledge = self.knowledge.write();
        knowledge.frames.extend(frames);
        let indices = FrameIndices::build(&knowledge.frames);
        knowledge.indices = indices;
        self.cache.clear();
        let total = knowledge.frames.len();
        drop(knowledge);

        tracing::info!(added, total, "Merged frames into knowledge base");
        total
    }

    /// Drop every frame and cached value
    pub fn clear(&self) {
        let mut knowledge = self.knowledge.write();
        *knowledge = KnowledgeBase {
            frames: Vec::new(),
            indices: FrameIndices::default(),
        };
        self.cache.clear();
    }

    /// Record the golden nonce found for a frame during training
    pub fn set_best_seed(&self, index: usize, seed: Vec<u8>) -> Result<()> {
        let mut knowledge = self.knowledge.write();
        let frame = knowledge
            .frames
            .get_mut(index)
            .ok_or(JitterError::FrameNotFound(index))?;
        frame.best_seed = Some(seed);
        Ok(())
    }

    /// Resolve the jitter for one pass. A miss is data, not an error.
    ///
    /// The cache is keyed by hash alone, so a hit answers for whichever zone
    /// first resolved that hash. Cache hits never touch the knowledge-base lock.
    pub fn search(&self, slots: &Slots, current_hash: u32, pass: usize) -> (JitterVector, bool) {
        if let Some(cached) = self.cache.get(current_hash) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return (cached.jitter, cached.found);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        // entries are inserted under the read lock and cleared under the write
        // lock, so nothing from a replaced snapshot survives a rebuild
        let knowledge = self.knowledge.read();

        let (jitter, found) = match SearchZone::for_pass(pass) {
            SearchZone::Topic => topic_lookup(&knowledge, slots),
            SearchZone::Grammar => grammar_lookup(&knowledge, slots, current_hash),
            SearchZone::Specificity => specificity_lookup(slots, current_hash),
        };

        if found {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }

        self.cache.put(current_hash, CachedJitter { jitter, found });
        (jitter, found)
    }

    /// Hash-only lookup used by the legacy RPC protocol.
    ///
    /// Exact match on slot 3; the answer is the little-endian word at the
    /// start of the frame's best seed. Bypasses the cache.
    pub fn search_key(&self, hash_key: u32) -> (JitterVector, bool) {
        let knowledge = self.knowledge.read();
        let seeded = knowledge
            .indices
            .slot3_entry(hash_key)
            .and_then(|i| knowledge.frames[i].best_seed.as_deref())
            .filter(|seed| seed.len() >= 4)
            .map(|seed| u32::from_le_bytes([seed[0], seed[1], seed[2], seed[3]]));

        match seeded {
            Some(jitter) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                (jitter, true)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                (default_jitter(hash_key), false)
            }
        }
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> SearchStats {
        SearchStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter
    pub fn reset_stats(&self) {
        self.counters.hits.store(0, Ordering::Relaxed);
        self.counters.misses.store(0, Ordering::Relaxed);
        self.counters.cache_hits.store(0, Ordering::Relaxed);
        self.counters.cache_misses.store(0, Ordering::Relaxed);
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.knowledge.read().frames.len()
    }

    /// True when the knowledge base is empty
    pub fn is_empty(&self) -> bool {
        self.knowledge.read().frames.is_empty()
    }

    /// Clone of one frame
    pub fn frame(&self, index: usize) -> Option<TrainingFrame> {
        self.knowledge.read().frames.get(index).cloned()
    }

    /// Clone of the whole knowledge base
    pub fn frames(&self) -> Vec<TrainingFrame> {
        self.knowledge.read().frames.clone()
    }

    /// Entries currently cached
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Sizes of the derived indices
    pub fn index_summary(&self) -> IndexSummary {
        let knowledge = self.knowledge.read();
        summarize(&knowledge.frames, &knowledge.indices)
    }

    /// Run `f` against the frames under the read lock
    pub(crate) fn with_knowledge<R>(&self, f: impl FnOnce(&KnowledgeBase) -> R) -> R {
        f(&self.knowledge.read())
    }
}

fn summarize(frames: &[TrainingFrame], indices: &FrameIndices) -> IndexSummary {
    IndexSummary {
        frames: frames.len(),
        slot0_keys: indices.slot0.len(),
        domain_pos_keys: indices.domain_pos.len(),
        slot3_keys: indices.slot3.len(),
    }
}

fn topic_lookup(knowledge: &KnowledgeBase, slots: &Slots) -> (JitterVector, bool) {
    match knowledge.indices.slot0_bucket(slots[0]).first() {
        Some(&i) => (knowledge.frames[i].slots[1], true),
        None => (default_jitter(slots[0]), false),
    }
}

fn grammar_lookup(
    knowledge: &KnowledgeBase,
    slots: &Slots,
    current_hash: u32,
) -> (JitterVector, bool) {
    let bucket = knowledge.indices.domain_pos_bucket(domain_pos_key(slots));
    // min_by_key keeps the first of equally close frames
    let closest = bucket
        .iter()
        .map(|&i| &knowledge.frames[i])
        .min_by_key(|frame| frame.slots[1].abs_diff(current_hash));

    match closest {
        Some(frame) => (frame.slots[2], true),
        None => (default_jitter(current_hash), false),
    }
}

fn specificity_lookup(slots: &Slots, current_hash: u32) -> (JitterVector, bool) {
    let diff = current_hash ^ slots[3];
    if diff.leading_zeros() >= SPECIFICITY_MIN_LEADING_ZEROS {
        (diff ^ SPECIFICITY_MASK, true)
    } else {
        (default_jitter(current_hash), false)
    }
}
