//! Token resolution against the knowledge base

use crate::flash_search::FlashSearcher;

/// Latest start index of `needle` as a contiguous run inside `haystack`.
fn rfind_subsequence(haystack: &[i32], needle: &[i32]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

impl FlashSearcher {
    /// Map a golden nonce onto the vocabulary and return the first frame
    /// predicting that token.
    pub fn lookup_by_nonce(&self, nonce: u32, vocab_size: u32) -> Option<i32> {
        if vocab_size == 0 {
            return None;
        }
        let target = i64::from(nonce % vocab_size);
        self.with_knowledge(|kb| {
            kb.frames
                .iter()
                .find(|f| i64::from(f.target_token_id) == target)
                .map(|f| f.target_token_id)
        })
    }

    /// Find the frame whose token sequence occurs in `context`, preferring the
    /// longest sequence and then the occurrence that starts latest.
    pub fn lookup_by_context(&self, context: &[i32]) -> Option<i32> {
        self.with_knowledge(|kb| {
            let mut best: Option<(usize, usize, i32)> = None;
            for frame in &kb.frames {
                let len = frame.token_sequence.len();
                let Some(start) = rfind_subsequence(context, &frame.token_sequence) else {
                    continue;
                };
                let better = match best {
                    None => true,
                    Some((best_len, best_start, _)) => {
                        len > best_len || (len == best_len && start > best_start)
                    }
                };
                if better {
                    best = Some((len, start, frame.target_token_id));
                }
            }
            best.map(|(_, _, token)| token)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TrainingFrame, SLOT_COUNT};

    fn searcher(frames: Vec<TrainingFrame>) -> FlashSearcher {
        let s = FlashSearcher::default();
        s.build_from_training_data(frames);
        s
    }

    #[test]
    fn test_rfind_subsequence() {
        assert_eq!(rfind_subsequence(&[1, 2, 3, 2, 3], &[2, 3]), Some(3));
        assert_eq!(rfind_subsequence(&[1, 2, 3], &[3, 4]), None);
        assert_eq!(rfind_subsequence(&[1], &[1, 2]), None);
        assert_eq!(rfind_subsequence(&[1, 2], &[]), None);
    }

    #[test]
    fn test_lookup_by_nonce() {
        let s = searcher(vec![TrainingFrame::new([0; SLOT_COUNT], 5)]);
        assert_eq!(s.lookup_by_nonce(105, 100), Some(5));
        assert_eq!(s.lookup_by_nonce(106, 100), None);
        assert_eq!(s.lookup_by_nonce(105, 0), None);
    }

    #[test]
    fn test_lookup_by_nonce_empty() {
        assert_eq!(FlashSearcher::default().lookup_by_nonce(5, 100), None);
    }

    #[test]
    fn test_lookup_by_nonce_first_match() {
        let mut a = TrainingFrame::new([1; SLOT_COUNT], 5);
        a.source_file = "a".into();
        let b = TrainingFrame::new([2; SLOT_COUNT], 5);
        let s = searcher(vec![a, b]);
        assert_eq!(s.lookup_by_nonce(5, 10), Some(5));
    }

    #[test]
    fn test_lookup_by_context_basic() {
        let s = searcher(vec![TrainingFrame::new([0; SLOT_COUNT], 9).with_tokens(vec![2, 3])]);
        assert_eq!(s.lookup_by_context(&[1, 2, 3, 4]), Some(9));
        assert_eq!(s.lookup_by_context(&[3, 2]), None);
    }

    #[test]
    fn test_lookup_by_context_prefers_longest() {
        let s = searcher(vec![
            TrainingFrame::new([0; SLOT_COUNT], 1).with_tokens(vec![4]),
            TrainingFrame::new([0; SLOT_COUNT], 2).with_tokens(vec![2, 3, 4]),
            TrainingFrame::new([0; SLOT_COUNT], 3).with_tokens(vec![3, 4]),
        ]);
        assert_eq!(s.lookup_by_context(&[1, 2, 3, 4]), Some(2));
    }

    #[test]
    fn test_lookup_by_context_prefers_latest_start() {
        let s = searcher(vec![
            TrainingFrame::new([0; SLOT_COUNT], 1).with_tokens(vec![1, 2]),
            TrainingFrame::new([0; SLOT_COUNT], 2).with_tokens(vec![3, 4]),
            TrainingFrame::new([0; SLOT_COUNT], 3).with_tokens(vec![2, 3]),
        ]);
        assert_eq!(s.lookup_by_context(&[1, 2, 3, 4]), Some(2));
    }

    #[test]
    fn test_lookup_by_context_skips_empty_sequences() {
        let s = searcher(vec![TrainingFrame::new([0; SLOT_COUNT], 1)]);
        assert_eq!(s.lookup_by_context(&[1, 2, 3]), None);
    }
}
