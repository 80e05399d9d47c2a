//! Fixed-width interest bitsets
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02

use serde::{Deserialize, Serialize};

const WORD_BITS: usize = u64::BITS as usize;

/// A set of interest ids from a shared vocabulary, one bit per interest.
///
/// Sets of different widths compare as if the shorter one were padded with
/// zero words.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterestSet {
    words: Vec<u64>,
}

impl InterestSet {
    /// Empty set wide enough for `vocabulary` interests
    pub fn with_capacity(vocabulary: usize) -> Self {
        Self {
            words: vec![0; vocabulary.div_ceil(WORD_BITS)],
        }
    }

    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words }
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn insert(&mut self, interest: usize) {
        let (word, bit) = (interest / WORD_BITS, interest % WORD_BITS);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    pub fn contains(&self, interest: usize) -> bool {
        self.words
            .get(interest / WORD_BITS)
            .is_some_and(|word| word & (1 << (interest % WORD_BITS)) != 0)
    }

    pub fn len(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// `|A ∩ B| / |A ∪ B|`, or 0 when either set is empty
    pub fn jaccard(&self, other: &InterestSet) -> f64 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }
        let width = self.words.len().max(other.words.len());
        let (mut intersection, mut union) = (0u32, 0u32);
        for i in 0..width {
            let a = self.words.get(i).copied().unwrap_or(0);
            let b = other.words.get(i).copied().unwrap_or(0);
            intersection += (a & b).count_ones();
            union += (a | b).count_ones();
        }
        f64::from(intersection) / f64::from(union)
    }
}

impl FromIterator<usize> for InterestSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = InterestSet::default();
        for interest in iter {
            set.insert(interest);
        }
        set
    }
}
