//! The 21-pass temporal loop.
//!
//! Each pass hashes the current header, asks the [`FlashSearcher`] for a
//! jitter keyed on the first four hash bytes, and folds that jitter into the
//! merkle-root words. After the last pass the final hash yields the golden
//! nonce, which is scored against the target token.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::{HashBackend, SoftwareHasher};
use crate::config::JitterConfig;
use crate::error::{JitterError, Result};
use crate::flash_search::FlashSearcher;
use crate::header::{self, HEADER_LEN};
use crate::types::{
    GoldenNonceResult, HashState, JitterVector, PassRecord, SearchStats, SearchZone,
};

/// Alignment at or above which a run counts as converged.
pub const ALIGNMENT_THRESHOLD: f64 = 0.95;

/// Bonus added to a pass reward when its jitter came from the knowledge base.
pub const KNOWLEDGE_HIT_BONUS: f64 = 0.1;

/// Variance normaliser of the stability score (2^30).
const STABILITY_SCALE: f64 = (1u64 << 30) as f64;

/// Engine counters plus the searcher's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatistics {
    /// Completed runs of the temporal loop
    pub loops_executed: u64,
    /// Total passes across all runs
    pub passes_executed: u64,
    /// Runs whose alignment reached the threshold
    pub nonces_found: u64,
    /// Flash-search counters
    pub search: SearchStats,
}

impl EngineStatistics {
    /// Fraction of runs that converged
    pub fn found_rate(&self) -> f64 {
        if self.loops_executed == 0 {
            0.0
        } else {
            self.nonces_found as f64 / self.loops_executed as f64
        }
    }
}

#[derive(Default)]
struct EngineCounters {
    loops: AtomicU64,
    passes: AtomicU64,
    found: AtomicU64,
}

/// Runs the temporal loop over a shared [`FlashSearcher`].
///
/// The engine owns no mutable search state; several engines may share one
/// searcher and run in parallel.
pub struct JitterEngine<H: HashBackend = SoftwareHasher> {
    searcher: Arc<FlashSearcher>,
    config: JitterConfig,
    hasher: H,
    counters: EngineCounters,
}

impl JitterEngine<SoftwareHasher> {
    /// Create an engine using the software hasher
    pub fn new(searcher: Arc<FlashSearcher>, config: JitterConfig) -> Self {
        Self::with_backend(searcher, config, SoftwareHasher)
    }
}

impl<H: HashBackend> JitterEngine<H> {
    /// Create an engine over a specific hash backend
    pub fn with_backend(searcher: Arc<FlashSearcher>, config: JitterConfig, hasher: H) -> Self {
        Self {
            searcher,
            config,
            hasher,
            counters: EngineCounters::default(),
        }
    }

    /// Shared searcher
    pub fn searcher(&self) -> &Arc<FlashSearcher> {
        &self.searcher
    }

    /// Engine configuration
    pub fn config(&self) -> &JitterConfig {
        &self.config
    }

    /// Hash backend in use
    pub fn backend(&self) -> &H {
        &self.hasher
    }

    /// Run the full temporal loop over `header` and score the result.
    ///
    /// Never fails: lookup misses resolve to default jitter and every pass runs.
    pub fn execute_loop(&self, header: [u8; HEADER_LEN], target_token_id: u32) -> GoldenNonceResult {
        let mut state = HashState::new(header, target_token_id, self.config.pass_count);

        for pass in 0..self.config.pass_count {
            state.pass = pass;
            let hash = self.hasher.compute_double_hash(&state.header);
            let key = header::lookup_key(&hash);

            let (jitter, found) = self.resolve_jitter(&state.header, key, pass);

            self.config.injection.inject(&mut state.header, jitter, pass);

            if self.config.verbose {
                tracing::debug!(
                    pass,
                    zone = %SearchZone::for_pass(pass),
                    key,
                    jitter,
                    found,
                    "Jitter pass"
                );
            }

            state.jitter_history.push(PassRecord {
                pass,
                hash,
                jitter,
                found,
            });
        }

        let final_hash = self.hasher.compute_double_hash(&state.header);
        let nonce = header::lookup_key(&final_hash);
        let jitters = state.jitters();
        let stability = compute_stability(&jitters);
        let alignment = compute_alignment(nonce, target_token_id);
        let found = alignment >= ALIGNMENT_THRESHOLD;

        self.counters.loops.fetch_add(1, Ordering::Relaxed);
        self.counters
            .passes
            .fetch_add(state.jitter_history.len() as u64, Ordering::Relaxed);
        if found {
            self.counters.found.fetch_add(1, Ordering::Relaxed);
        }

        GoldenNonceResult {
            nonce,
            found,
            final_hash,
            passes_completed: state.jitter_history.len(),
            stability,
            alignment,
            seed_nonce: state.nonce,
            target_token_id,
            jitter_history: state.jitter_history,
        }
    }

    /// Length-checked variant of [`execute_loop`](Self::execute_loop)
    pub fn execute_header(&self, header: &[u8], target_token_id: u32) -> Result<GoldenNonceResult> {
        let header: [u8; HEADER_LEN] = header.try_into().map_err(|_| JitterError::InvalidLength {
            expected: HEADER_LEN,
            actual: header.len(),
        })?;
        Ok(self.execute_loop(header, target_token_id))
    }

    /// Run independent loops in parallel against the shared searcher
    pub fn execute_batch(
        &self,
        headers: &[[u8; HEADER_LEN]],
        target_token_id: u32,
    ) -> Vec<GoldenNonceResult> {
        headers
            .par_iter()
            .map(|header| self.execute_loop(*header, target_token_id))
            .collect()
    }

    /// Try each candidate nonce and keep the best-aligned result.
    ///
    /// Ties keep the earliest candidate. Stops at the first exact match.
    pub fn hunt_golden_nonce(
        &self,
        base_header: [u8; HEADER_LEN],
        target_token_id: u32,
        candidate_nonces: &[u32],
    ) -> Result<GoldenNonceResult> {
        let mut best: Option<GoldenNonceResult> = None;

        for &candidate in candidate_nonces {
            let mut header = base_header;
            header::set_nonce(&mut header, candidate)?;
            let result = self.execute_loop(header, target_token_id);

            let exact = result.alignment >= 1.0;
            let better = best
                .as_ref()
                .map_or(true, |b| result.alignment > b.alignment);
            if better {
                best = Some(result);
            }
            if exact {
                break;
            }
        }

        let best = best.ok_or(JitterError::NoValidResult)?;
        tracing::debug!(
            target_token_id,
            seed_nonce = best.seed_nonce,
            alignment = best.alignment,
            candidates = candidate_nonces.len(),
            "Hunt finished"
        );
        Ok(best)
    }

    /// Engine and searcher counters
    pub fn statistics(&self) -> EngineStatistics {
        EngineStatistics {
            loops_executed: self.counters.loops.load(Ordering::Relaxed),
            passes_executed: self.counters.passes.load(Ordering::Relaxed),
            nonces_found: self.counters.found.load(Ordering::Relaxed),
            search: self.searcher.stats(),
        }
    }

    fn resolve_jitter(&self, header: &[u8; HEADER_LEN], key: u32, pass: usize) -> (JitterVector, bool) {
        if !self.config.enable_flash_search {
            return (self.config.default_jitter, false);
        }
        let slots = header::decode_slots(header);
        self.searcher.search(&slots, key, pass)
    }
}

/// `1 - variance / 2^30` over the jitter history, clamped to `[0, 1]`.
/// Histories shorter than two are perfectly stable.
pub fn compute_stability(jitters: &[JitterVector]) -> f64 {
    if jitters.len() < 2 {
        return 1.0;
    }
    let n = jitters.len() as f64;
    let mean = jitters.iter().map(|&j| f64::from(j)).sum::<f64>() / n;
    let variance = jitters
        .iter()
        .map(|&j| {
            let d = f64::from(j) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (1.0 - variance / STABILITY_SCALE).clamp(0.0, 1.0)
}

/// Fraction of equal bits between `nonce` and `target`; exactly 1.0 on equality.
pub fn compute_alignment(nonce: u32, target: u32) -> f64 {
    if nonce == target {
        return 1.0;
    }
    f64::from((!(nonce ^ target)).count_ones()) / 32.0
}

/// Reward of a single pass for the training harness.
pub fn compute_pass_reward(record: &PassRecord, target_token_id: u32) -> f64 {
    let proximity = f64::from((record.hash_key() ^ target_token_id).leading_zeros()) / 32.0;
    if record.found {
        proximity + KNOWLEDGE_HIT_BONUS
    } else {
        proximity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::InjectionStrategy;
    use crate::types::{TrainingFrame, SLOT_COUNT};

    fn engine(config: JitterConfig) -> JitterEngine {
        JitterEngine::new(Arc::new(FlashSearcher::new(&config)), config)
    }

    fn test_header() -> [u8; HEADER_LEN] {
        let mut slots = [0u32; SLOT_COUNT];
        for (i, s) in slots.iter_mut().enumerate() {
            *s = 0x1000 + i as u32;
        }
        header::encode_with_timestamp(&slots, 0, 1_700_000_000)
    }

    #[test]
    fn test_loop_runs_every_pass() {
        let engine = engine(JitterConfig::default());
        let result = engine.execute_loop(test_header(), 42);
        assert_eq!(result.passes_completed, 21);
        assert_eq!(result.jitter_history.len(), 21);
        for (i, record) in result.jitter_history.iter().enumerate() {
            assert_eq!(record.pass, i);
        }
        assert_eq!(result.nonce, header::lookup_key(&result.final_hash));
        assert_eq!(result.target_token_id, 42);
    }

    #[test]
    fn test_empty_knowledge_base_uses_default_jitter() {
        let engine = engine(JitterConfig::default());
        let result = engine.execute_loop(test_header(), 42);
        for record in &result.jitter_history {
            if record.pass <= 7 {
                let slot0 = 0x1000;
                assert_eq!(record.jitter, crate::flash_search::default_jitter(slot0));
                assert!(!record.found);
            }
        }
    }

    #[test]
    fn test_loop_is_deterministic() {
        let config = JitterConfig::builder().cache_size(0).build().unwrap();
        let a = engine(config.clone()).execute_loop(test_header(), 7);
        let b = engine(config).execute_loop(test_header(), 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_repeated_runs_hit_the_cache() {
        let engine = engine(JitterConfig::default());
        let first = engine.execute_loop(test_header(), 9);
        let again = engine.execute_loop(test_header(), 9);
        assert_eq!(first, again);
    }

    #[test]
    fn test_cache_hits_cross_zones() {
        // empty knowledge base: every topic pass injects default_jitter(slot 0), and the
        // rotating XOR undoes itself, so the header alternates between two states
        let topic_jitter = crate::flash_search::default_jitter(0x1000);

        let cached = engine(JitterConfig::default());
        let result = cached.execute_loop(test_header(), 9);
        assert_eq!(result.jitter_history[8].hash, result.jitter_history[0].hash);
        assert_eq!(result.jitter_history[9].hash, result.jitter_history[1].hash);
        for record in &result.jitter_history[8..10] {
            assert!(!record.found);
            assert_eq!(record.jitter, topic_jitter);
        }
        let stats = cached.searcher().stats();
        assert_eq!(stats.cache_misses, 2);
        assert_eq!(stats.cache_hits, 19);

        // without the cache, pass 8 runs the grammar zone on the same key
        let uncached = engine(JitterConfig::builder().cache_size(0).build().unwrap());
        let plain = uncached.execute_loop(test_header(), 9);
        let key = plain.jitter_history[8].hash_key();
        assert_eq!(plain.jitter_history[8].hash, result.jitter_history[0].hash);
        assert_eq!(plain.jitter_history[8].jitter, crate::flash_search::default_jitter(key));
        assert_ne!(plain.jitter_history[8].jitter, topic_jitter);
    }

    #[test]
    fn test_disabled_flash_search_injects_constant() {
        let config = JitterConfig::builder()
            .enable_flash_search(false)
            .default_jitter(0x0BAD_F00D)
            .build()
            .unwrap();
        let engine = engine(config);
        let result = engine.execute_loop(test_header(), 1);
        assert!(result.jitter_vectors().iter().all(|&j| j == 0x0BAD_F00D));
        assert_eq!(result.stability, 1.0);
        assert_eq!(engine.searcher().stats(), SearchStats::default());
    }

    #[test]
    fn test_injection_strategies_diverge() {
        let rotating = engine(JitterConfig::default()).execute_loop(test_header(), 3);
        let selected = engine(
            JitterConfig::builder()
                .injection(InjectionStrategy::PassSelected)
                .build()
                .unwrap(),
        )
        .execute_loop(test_header(), 3);
        // first pass hashes the same header
        assert_eq!(rotating.jitter_history[0].hash, selected.jitter_history[0].hash);
        assert_ne!(rotating.final_hash, selected.final_hash);
    }

    #[test]
    fn test_pass_count_respected() {
        let engine = engine(JitterConfig::builder().pass_count(3).build().unwrap());
        let result = engine.execute_loop(test_header(), 0);
        assert_eq!(result.passes_completed, 3);
        assert_eq!(engine.statistics().passes_executed, 3);
        assert_eq!(engine.statistics().loops_executed, 1);
    }

    #[test]
    fn test_execute_header_checks_length() {
        let engine = engine(JitterConfig::default());
        let err = engine.execute_header(&[0u8; 79], 0).unwrap_err();
        assert!(matches!(
            err,
            JitterError::InvalidLength {
                expected: 80,
                actual: 79
            }
        ));
        let ok = engine.execute_header(&test_header(), 5).unwrap();
        assert_eq!(ok, engine.execute_loop(test_header(), 5));
    }

    #[test]
    fn test_execute_batch_matches_sequential() {
        let engine = engine(JitterConfig::default());
        let headers = header::encode_batch(&[3; SLOT_COUNT], &[1, 2, 3, 4], 0);
        let batch = engine.execute_batch(&headers, 11);
        assert_eq!(batch.len(), 4);
        for (header, result) in headers.iter().zip(&batch) {
            assert_eq!(result, &engine.execute_loop(*header, 11));
        }
    }

    #[test]
    fn test_hunt_rejects_empty_candidates() {
        let engine = engine(JitterConfig::default());
        assert!(matches!(
            engine.hunt_golden_nonce(test_header(), 1, &[]),
            Err(JitterError::NoValidResult)
        ));
    }

    #[test]
    fn test_hunt_picks_best_alignment() {
        let engine = engine(JitterConfig::default());
        let candidates: Vec<u32> = (0..16).collect();
        let best = engine.hunt_golden_nonce(test_header(), 77, &candidates).unwrap();

        let mut expected: Option<GoldenNonceResult> = None;
        for &c in &candidates {
            let mut header = test_header();
            header::set_nonce(&mut header, c).unwrap();
            let r = engine.execute_loop(header, 77);
            if expected.as_ref().map_or(true, |e| r.alignment > e.alignment) {
                expected = Some(r);
            }
        }
        let expected = expected.unwrap();
        assert_eq!(best.seed_nonce, expected.seed_nonce);
        assert_eq!(best.alignment, expected.alignment);
    }

    #[test]
    fn test_hunt_stops_on_exact_match() {
        let engine = engine(JitterConfig::default());
        let mut header = test_header();
        header::set_nonce(&mut header, 5).unwrap();
        // aim at the nonce candidate 5 actually produces
        let target = engine.execute_loop(header, 0).nonce;

        let before = engine.statistics().loops_executed;
        let best = engine.hunt_golden_nonce(test_header(), target, &[5, 6, 7]).unwrap();
        assert_eq!(best.seed_nonce, 5);
        assert_eq!(best.alignment, 1.0);
        assert!(best.found);
        assert_eq!(engine.statistics().loops_executed - before, 1);
    }

    #[test]
    fn test_stability() {
        assert_eq!(compute_stability(&[]), 1.0);
        assert_eq!(compute_stability(&[123]), 1.0);
        assert_eq!(compute_stability(&[5, 5, 5]), 1.0);
        // variance 1 out of 2^30
        let s = compute_stability(&[0, 2]);
        assert!((s - (1.0 - 1.0 / STABILITY_SCALE)).abs() < 1e-12);
        assert_eq!(compute_stability(&[0, u32::MAX]), 0.0);
    }

    #[test]
    fn test_alignment() {
        assert_eq!(compute_alignment(42, 42), 1.0);
        assert_eq!(compute_alignment(0, u32::MAX), 0.0);
        assert_eq!(compute_alignment(0, 1), 31.0 / 32.0);
        assert_eq!(compute_alignment(0, 3), 30.0 / 32.0);
    }

    #[test]
    fn test_pass_reward() {
        let mut hash = [0u8; 32];
        hash[..4].copy_from_slice(&0x0000_FFFFu32.to_be_bytes());
        let miss = PassRecord {
            pass: 0,
            hash,
            jitter: 0,
            found: false,
        };
        assert_eq!(compute_pass_reward(&miss, 0), 16.0 / 32.0);
        let hit = PassRecord { found: true, ..miss };
        assert!((compute_pass_reward(&hit, 0) - 0.6).abs() < 1e-12);
        assert_eq!(compute_pass_reward(&miss, 0x0000_FFFF), 1.0);
    }

    #[test]
    fn test_topic_hits_feed_statistics() {
        let config = JitterConfig::default();
        let searcher = Arc::new(FlashSearcher::new(&config));
        let mut slots = [0u32; SLOT_COUNT];
        slots[0] = 0xAAAA;
        slots[1] = 0x5555;
        searcher.build_from_training_data(vec![TrainingFrame::new(slots, 1)]);

        let engine = JitterEngine::new(searcher, config);
        let result = engine.execute_loop(header::encode(&slots, 0), 1);
        // slot 0 is never touched by injection, so every topic pass hits
        assert!(result.jitter_history[..8].iter().all(|r| r.found && r.jitter == 0x5555));
        assert!(result.knowledge_hits() >= 8);
        assert_eq!(engine.statistics().loops_executed, 1);
    }
}
