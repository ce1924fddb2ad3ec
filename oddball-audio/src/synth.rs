//! Waveform synthesis for stimulus tones and feedback chimes.

use std::f32::consts::PI;

/// Low tone for the frequent standard stimulus.
pub const STANDARD_TONE_HZ: f32 = 1000.0;
/// High tone for the rare target stimulus.
pub const TARGET_TONE_HZ: f32 = 1500.0;
pub const CORRECT_CHIME_HZ: f32 = 1500.0;
pub const INCORRECT_CHIME_HZ: f32 = 500.0;
pub const CHIME_MS: u64 = 200;

pub const TONE_VOLUME: f32 = 0.5;
pub const CHIME_VOLUME: f32 = 0.7;

fn sample_count(sample_rate: u32, duration_ms: u64) -> usize {
    (sample_rate as u64 * duration_ms / 1000) as usize
}

/// Pure sine stimulus tone, mono samples in `[-volume, volume]`.
pub fn sine_tone(sample_rate: u32, freq_hz: f32, duration_ms: u64, volume: f32) -> Vec<f32> {
    let n = sample_count(sample_rate, duration_ms);
    (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (volume * (2.0 * PI * freq_hz * t).sin()).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Triangle carrier at four cycles per unit phase, range `[0, 1]`.
fn triangle(t: f32, freq_hz: f32) -> f32 {
    ((t * freq_hz * 4.0).rem_euclid(2.0) - 1.0).abs()
}

/// Feedback chime: three triangle partials (base, 2x, 3x) under a 20 ms
/// linear attack and an exponential decay envelope.
pub fn chime(sample_rate: u32, base_freq_hz: f32, duration_ms: u64, volume: f32) -> Vec<f32> {
    let n = sample_count(sample_rate, duration_ms);
    let attack = 0.02_f32;
    let decay = (duration_ms as f32 / 1000.0 - attack).max(0.001);

    (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let tone = 0.5 * triangle(t, base_freq_hz)
                + 0.3 * triangle(t, base_freq_hz * 2.0)
                + 0.2 * triangle(t, base_freq_hz * 3.0);
            let envelope = (t / attack).min(1.0) * (-t / decay * 3.0).exp();
            (volume * tone * envelope).clamp(-1.0, 1.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_length_matches_duration() {
        assert_eq!(sine_tone(44_100, 1000.0, 300, 0.5).len(), 13_230);
        assert_eq!(sine_tone(48_000, 1500.0, 200, 0.5).len(), 9_600);
        assert!(sine_tone(44_100, 1000.0, 0, 0.5).is_empty());
    }

    #[test]
    fn tone_respects_volume_bounds() {
        let samples = sine_tone(44_100, 1000.0, 100, 0.5);
        assert!(samples.iter().all(|s| s.abs() <= 0.5 + f32::EPSILON));
        assert_eq!(samples[0], 0.0);
    }

    #[test]
    fn chime_attack_starts_near_silence() {
        let samples = chime(44_100, CORRECT_CHIME_HZ, CHIME_MS, CHIME_VOLUME);
        assert_eq!(samples.len(), 8_820);
        assert!(samples[0].abs() < 1e-3);
        assert!(samples.iter().all(|s| s.abs() <= 1.0));
        // The envelope must actually produce sound after the attack.
        let peak = samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.1);
    }

    #[test]
    fn triangle_carrier_stays_in_unit_range() {
        for i in 0..1000 {
            let v = triangle(i as f32 / 1000.0, 500.0);
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
