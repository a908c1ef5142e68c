//! Property-based tests using proptest

use proptest::prelude::*;
use std::sync::Arc;

use hasher_jitter::{
    compute_alignment, compute_stability, header, FlashSearcher, InjectionStrategy, JitterConfig,
    JitterEngine, SearchZone, TrainingFrame, SLOT_COUNT,
};

fn slots_strategy() -> impl Strategy<Value = [u32; SLOT_COUNT]> {
    prop::array::uniform12(any::<u32>())
}

proptest! {
    #[test]
    fn test_header_round_trip(slots in slots_strategy(), nonce in any::<u32>(), ts in any::<u32>()) {
        let encoded = header::encode_with_timestamp(&slots, nonce, ts);
        prop_assert_eq!(header::decode_slots(&encoded), slots);
        prop_assert_eq!(header::decode_nonce(&encoded), nonce);
        prop_assert_eq!(header::decode_timestamp(&encoded), ts);
        prop_assert!(header::validate(&encoded));
    }

    #[test]
    fn test_injection_only_touches_merkle_words(
        slots in slots_strategy(),
        jitter in any::<u32>(),
        pass in 0usize..64,
    ) {
        for strategy in [InjectionStrategy::Rotating, InjectionStrategy::PassSelected] {
            let original = header::encode(&slots, 7);
            let mut jittered = original;
            strategy.apply(&mut jittered, jitter, pass).unwrap();
            prop_assert_eq!(&jittered[..36], &original[..36]);
            prop_assert_eq!(&jittered[52..], &original[52..]);
            // XOR twice restores the header
            strategy.apply(&mut jittered, jitter, pass).unwrap();
            prop_assert_eq!(jittered, original);
        }
    }

    #[test]
    fn test_alignment_bounds(nonce in any::<u32>(), target in any::<u32>()) {
        let a = compute_alignment(nonce, target);
        prop_assert!((0.0..=1.0).contains(&a));
        prop_assert_eq!(a == 1.0, nonce == target);
    }

    #[test]
    fn test_stability_bounds(jitters in prop::collection::vec(any::<u32>(), 0..40)) {
        let s = compute_stability(&jitters);
        prop_assert!((0.0..=1.0).contains(&s));
        if jitters.len() < 2 {
            prop_assert_eq!(s, 1.0);
        }
    }

    #[test]
    fn test_every_pass_routes_to_one_zone(pass in 0usize..1000) {
        let zone = SearchZone::for_pass(pass);
        let expected = match pass {
            0..=7 => SearchZone::Topic,
            8..=14 => SearchZone::Grammar,
            _ => SearchZone::Specificity,
        };
        prop_assert_eq!(zone, expected);
    }

    #[test]
    fn test_cache_returns_first_answer(
        frames in prop::collection::vec(slots_strategy(), 0..16),
        query in slots_strategy(),
        hash in any::<u32>(),
        pass in 0usize..21,
        later_pass in 0usize..21,
    ) {
        let searcher = FlashSearcher::default();
        searcher.build_from_training_data(
            frames.into_iter().map(|s| TrainingFrame::new(s, 0)).collect(),
        );
        let first = searcher.search(&query, hash, pass);
        let hits_before = searcher.stats().cache_hits;
        let second = searcher.search(&query, hash, later_pass);
        prop_assert_eq!(first, second);
        prop_assert_eq!(searcher.stats().cache_hits, hits_before + 1);
    }

    #[test]
    fn test_loop_scores_in_bounds(slots in slots_strategy(), target in any::<u32>()) {
        let config = JitterConfig::builder().pass_count(4).build().unwrap();
        let engine = JitterEngine::new(Arc::new(FlashSearcher::new(&config)), config);
        let result = engine.execute_loop(header::encode(&slots, 0), target);
        prop_assert_eq!(result.passes_completed, 4);
        prop_assert!((0.0..=1.0).contains(&result.alignment));
        prop_assert!((0.0..=1.0).contains(&result.stability));
        prop_assert_eq!(result.found, result.alignment >= 0.95);
    }
}
