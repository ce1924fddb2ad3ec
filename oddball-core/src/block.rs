use rand::seq::SliceRandom;
use rand::Rng;

use crate::stimulus::StimulusKind;

/// One planned trial. Immutable once its block has been generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialSpec {
    /// 1-based position within the block.
    pub position: usize,
    pub kind: StimulusKind,
}

/// An ordered trial sequence honoring the target-probability constraint.
#[derive(Debug, Clone)]
pub struct Block {
    pub number: u32,
    trials: Vec<TrialSpec>,
}

impl Block {
    /// Generates a shuffled sequence of `trial_count` trials with
    /// `floor(trial_count * target_probability)` targets.
    ///
    /// With `first_standard` set, position 0 is reserved for a Standard so a
    /// target never appears before any baseline exposure; the target count is
    /// then capped at `trial_count - 1`. A probability that truncates to zero
    /// targets produces an all-Standard block.
    pub fn generate<R: Rng>(
        number: u32,
        trial_count: usize,
        target_probability: f64,
        first_standard: bool,
        rng: &mut R,
    ) -> Self {
        if trial_count == 0 {
            return Self {
                number,
                trials: Vec::new(),
            };
        }

        let p = target_probability.clamp(0.0, 1.0);
        let mut num_targets = (trial_count as f64 * p) as usize;
        if first_standard {
            num_targets = num_targets.min(trial_count - 1);
        }
        let shuffled = if first_standard {
            trial_count - 1
        } else {
            trial_count
        };

        let mut kinds = vec![StimulusKind::Standard; shuffled - num_targets];
        kinds.resize(shuffled, StimulusKind::Target);
        kinds.shuffle(rng);
        if first_standard {
            kinds.insert(0, StimulusKind::Standard);
        }

        let trials = kinds
            .into_iter()
            .enumerate()
            .map(|(i, kind)| TrialSpec {
                position: i + 1,
                kind,
            })
            .collect();

        Self { number, trials }
    }

    pub fn trials(&self) -> &[TrialSpec] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn target_count(&self) -> usize {
        self.trials.iter().filter(|t| t.kind.is_target()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn counts_match_floor_of_probability() {
        let mut rng = StdRng::seed_from_u64(7);
        for &(n, p, expected) in &[
            (25usize, 0.2f64, 5usize),
            (10, 0.25, 2),
            (10, 0.29, 2),
            (1, 0.0, 0),
            (1, 0.99, 0),
            (40, 0.5, 20),
            (7, 1.0, 7),
        ] {
            let block = Block::generate(1, n, p, false, &mut rng);
            assert_eq!(block.len(), n, "length for n={n} p={p}");
            assert_eq!(block.target_count(), expected, "targets for n={n} p={p}");
        }
    }

    #[test]
    fn zero_targets_yields_all_standard_block() {
        let mut rng = StdRng::seed_from_u64(3);
        let block = Block::generate(1, 9, 0.1, false, &mut rng);
        assert_eq!(block.target_count(), 0);
        assert!(block.trials().iter().all(|t| !t.kind.is_target()));
    }

    #[test]
    fn first_standard_holds_for_any_seed() {
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let block = Block::generate(1, 25, 0.2, true, &mut rng);
            assert_eq!(block.len(), 25);
            assert_eq!(block.target_count(), 5);
            assert_eq!(block.trials()[0].kind, StimulusKind::Standard);
        }
    }

    #[test]
    fn first_standard_caps_saturated_probability() {
        let mut rng = StdRng::seed_from_u64(11);
        let block = Block::generate(1, 6, 1.0, true, &mut rng);
        assert_eq!(block.len(), 6);
        assert_eq!(block.trials()[0].kind, StimulusKind::Standard);
        assert_eq!(block.target_count(), 5);
    }

    #[test]
    fn positions_are_one_based_and_sequential() {
        let mut rng = StdRng::seed_from_u64(5);
        let block = Block::generate(2, 12, 0.3, true, &mut rng);
        for (i, trial) in block.trials().iter().enumerate() {
            assert_eq!(trial.position, i + 1);
        }
    }

    #[test]
    fn empty_request_does_not_panic() {
        let mut rng = StdRng::seed_from_u64(1);
        let block = Block::generate(1, 0, 0.5, true, &mut rng);
        assert!(block.is_empty());
    }
}
