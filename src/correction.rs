//! Model-guided hit correction.
//!
//! A live hit is nudged toward what the background forecast expects to
//! happen soon: candidate events in a short forward window become a
//! frequency distribution, the performer's own instrument gets a fixed
//! additive weight so it is never fully overridden, instruments heard in
//! the last few hits are damped to discourage immediate repetition, and a
//! corrected instrument is sampled from the renormalized result.
//!
//! With no candidates in the window the corrector fails open and returns
//! the live instrument unchanged; input is never blocked or rejected.

use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::kit::InstrumentId;

/// Weighted-sampling hit corrector.
pub struct Corrector {
    user_weight: f64,
    recency_damping: f64,
    context_window: usize,
    rng: ChaCha8Rng,
}

impl Corrector {
    /// `seed` fixes the sampler for reproducible performances;
    /// `None` seeds from OS entropy.
    pub fn new(
        user_weight: f64,
        recency_damping: f64,
        context_window: usize,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        Self {
            user_weight,
            recency_damping,
            context_window,
            rng,
        }
    }

    /// Correct a live hit against the forecast candidates.
    ///
    /// `recent` is the tail of the history, oldest first, and may include
    /// the raw hit itself: repeating what was just played is discouraged
    /// even when the performer asks for it.
    pub fn correct(
        &mut self,
        raw: InstrumentId,
        candidates: &[InstrumentId],
        recent: &[InstrumentId],
    ) -> InstrumentId {
        if candidates.is_empty() {
            return raw;
        }
        let weights = self.distribution(raw, candidates, recent);
        weights
            .choose_weighted(&mut self.rng, |&(_, w)| w)
            .map(|&(instrument, _)| instrument)
            .unwrap_or(raw)
    }

    /// The categorical distribution `correct` samples from.
    ///
    /// Returns `(instrument, probability)` pairs with non-negative
    /// probabilities summing to 1. Exposed separately so the weighting can
    /// be inspected without consuming randomness.
    pub fn distribution(
        &self,
        raw: InstrumentId,
        candidates: &[InstrumentId],
        recent: &[InstrumentId],
    ) -> Vec<(InstrumentId, f64)> {
        if candidates.is_empty() {
            return vec![(raw, 1.0)];
        }
        let mut weight = [0.0_f64; InstrumentId::COUNT];

        // Candidate frequency.
        for candidate in candidates {
            weight[candidate.index()] += 1.0;
        }
        let total = candidates.len() as f64;
        for w in weight.iter_mut() {
            *w /= total;
        }

        // The performer's intent, added even when the forecast disagrees.
        weight[raw.index()] += self.user_weight;

        // Damp each instrument present in the recent context, once.
        let context_start = recent.len().saturating_sub(self.context_window);
        let mut damped = [false; InstrumentId::COUNT];
        for instrument in &recent[context_start..] {
            let i = instrument.index();
            if !damped[i] {
                weight[i] *= self.recency_damping;
                damped[i] = true;
            }
        }

        // Renormalize.
        let sum: f64 = weight.iter().sum();
        InstrumentId::ALL
            .iter()
            .filter(|i| weight[i.index()] > 0.0)
            .map(|&i| (i, weight[i.index()] / sum))
            .collect()
    }
}
