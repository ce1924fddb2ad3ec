use oddball_core::Modality;
use oddball_experiment::{DiodePulse, SessionConfig};

pub const PARAM_LABELS: [&str; 7] = [
    "Trials per block",
    "Stimulus duration (ms)",
    "Inter-stimulus interval (ms)",
    "Number of blocks",
    "Fixation duration (ms)",
    "Diode pulse length (target, ms)",
    "Diode pulse length (non-target, ms)",
];

/// Editable state of the parameter screen. Fields accept digits only, so a
/// non-empty field always parses.
pub struct ParamForm {
    pub values: [String; 7],
    pub active: usize,
    pub isi_jitter: bool,
    pub fixation_on: bool,
    pub modality: Modality,
}

impl ParamForm {
    pub fn new() -> Self {
        let defaults = SessionConfig::default();
        let diode = defaults.diode.unwrap_or_default();
        Self {
            values: [
                defaults.trials_per_block.to_string(),
                defaults.stimulus_duration_ms.to_string(),
                defaults.base_isi_ms.to_string(),
                defaults.num_blocks.to_string(),
                defaults.fixation_ms.unwrap_or(750).to_string(),
                diode.target_ms.to_string(),
                diode.standard_ms.to_string(),
            ],
            active: 0,
            isi_jitter: defaults.isi_jitter,
            fixation_on: defaults.fixation_ms.is_some(),
            modality: defaults.modality,
        }
    }

    pub fn push_digit(&mut self, ch: char) {
        if ch.is_ascii_digit() {
            self.values[self.active].push(ch);
        }
    }

    pub fn backspace(&mut self) {
        self.values[self.active].pop();
    }

    pub fn next_field(&mut self) {
        self.active = (self.active + 1) % self.values.len();
    }

    pub fn toggle_isi_jitter(&mut self) {
        self.isi_jitter = !self.isi_jitter;
    }

    pub fn toggle_fixation(&mut self) {
        self.fixation_on = !self.fixation_on;
    }

    pub fn cycle_modality(&mut self) {
        let all = Modality::ALL;
        let idx = all.iter().position(|m| *m == self.modality).unwrap_or(0);
        self.modality = all[(idx + 1) % all.len()];
    }

    /// Enter is only honored once every field has a value.
    pub fn complete(&self) -> bool {
        self.values.iter().all(|v| !v.is_empty())
    }

    /// Builds the immutable session configuration. `None` when a field is
    /// empty or overflows its type.
    pub fn build_config(&self, participant: &str) -> Option<SessionConfig> {
        if !self.complete() {
            return None;
        }
        let trials_per_block: u32 = self.values[0].parse().ok()?;
        let stimulus_duration_ms: u64 = self.values[1].parse().ok()?;
        let base_isi_ms: u64 = self.values[2].parse().ok()?;
        let num_blocks: u32 = self.values[3].parse().ok()?;
        let fixation_ms: u64 = self.values[4].parse().ok()?;
        let target_pulse_ms: u64 = self.values[5].parse().ok()?;
        let standard_pulse_ms: u64 = self.values[6].parse().ok()?;

        let config = SessionConfig {
            participant: participant.to_string(),
            trials_per_block,
            stimulus_duration_ms,
            base_isi_ms,
            num_blocks,
            isi_jitter: self.isi_jitter,
            modality: self.modality,
            fixation_ms: self.fixation_on.then_some(fixation_ms),
            diode: Some(DiodePulse {
                standard_ms: standard_pulse_ms,
                target_ms: target_pulse_ms,
            }),
            ..SessionConfig::default()
        };
        config.validate().ok()?;
        Some(config)
    }
}

impl Default for ParamForm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete_and_build() {
        let form = ParamForm::new();
        assert!(form.complete());
        let config = form.build_config("ada").expect("config");
        assert_eq!(config.participant, "ada");
        assert_eq!(config.trials_per_block, 25);
        assert_eq!(config.fixation_ms, Some(750));
        let diode = config.diode.expect("diode");
        assert_eq!(diode.target_ms, 512);
        assert_eq!(diode.standard_ms, 128);
    }

    #[test]
    fn only_digits_are_accepted() {
        let mut form = ParamForm::new();
        form.values[0].clear();
        form.push_digit('4');
        form.push_digit('x');
        form.push_digit('2');
        assert_eq!(form.values[0], "42");
        form.backspace();
        assert_eq!(form.values[0], "4");
    }

    #[test]
    fn empty_field_blocks_config() {
        let mut form = ParamForm::new();
        form.values[2].clear();
        assert!(!form.complete());
        assert!(form.build_config("ada").is_none());
    }

    #[test]
    fn zero_trials_fails_validation() {
        let mut form = ParamForm::new();
        form.values[0] = "0".into();
        assert!(form.build_config("ada").is_none());
    }

    #[test]
    fn fixation_checkbox_gates_the_duration() {
        let mut form = ParamForm::new();
        form.toggle_fixation();
        let config = form.build_config("ada").expect("config");
        assert_eq!(config.fixation_ms, None);
    }

    #[test]
    fn tab_cycles_and_modality_rotates() {
        let mut form = ParamForm::new();
        for _ in 0..PARAM_LABELS.len() {
            form.next_field();
        }
        assert_eq!(form.active, 0);

        assert_eq!(form.modality, Modality::Both);
        form.cycle_modality();
        assert_eq!(form.modality, Modality::Audio);
        form.cycle_modality();
        assert_eq!(form.modality, Modality::Visual);
        form.cycle_modality();
        assert_eq!(form.modality, Modality::Both);
    }
}
