use oddball_core::{Modality, StimulusKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Targets occur at a fixed 20% rate; the probability is not exposed on the
/// parameter screen.
pub const DEFAULT_TARGET_PROBABILITY: f64 = 0.2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("trials per block must be at least 1")]
    NoTrials,
    #[error("number of blocks must be at least 1")]
    NoBlocks,
    #[error("target probability {0} is outside [0, 1]")]
    Probability(f64),
}

/// Photodiode sync-square pulse lengths, per stimulus kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiodePulse {
    pub standard_ms: u64,
    pub target_ms: u64,
}

impl DiodePulse {
    pub fn for_kind(&self, kind: StimulusKind) -> u64 {
        match kind {
            StimulusKind::Standard => self.standard_ms,
            StimulusKind::Target => self.target_ms,
        }
    }
}

impl Default for DiodePulse {
    fn default() -> Self {
        Self {
            standard_ms: 128,
            target_ms: 512,
        }
    }
}

/// Immutable session parameters, constructed once after parameter entry and
/// passed by reference from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub participant: String,
    pub trials_per_block: u32,
    pub stimulus_duration_ms: u64,
    pub base_isi_ms: u64,
    pub num_blocks: u32,
    pub target_probability: f64,
    /// Draw each ISI uniformly from +/- 500 ms around the base, floored at
    /// 50 ms.
    pub isi_jitter: bool,
    pub modality: Modality,
    /// Fixation cross shown for this long before each stimulus; `None`
    /// disables the cross.
    pub fixation_ms: Option<u64>,
    pub diode: Option<DiodePulse>,
    /// Reserve position 0 of every block for a Standard.
    pub first_standard: bool,
    /// Ask for the participant's subjective target count after each block.
    pub collect_target_report: bool,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trials_per_block == 0 {
            return Err(ConfigError::NoTrials);
        }
        if self.num_blocks == 0 {
            return Err(ConfigError::NoBlocks);
        }
        if !(0.0..=1.0).contains(&self.target_probability) {
            return Err(ConfigError::Probability(self.target_probability));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            participant: String::new(),
            trials_per_block: 25,
            stimulus_duration_ms: 500,
            base_isi_ms: 1000,
            num_blocks: 1,
            target_probability: DEFAULT_TARGET_PROBABILITY,
            isi_jitter: false,
            modality: Modality::Both,
            fixation_ms: Some(750),
            diode: Some(DiodePulse::default()),
            first_standard: true,
            collect_target_report: true,
        }
    }
}
