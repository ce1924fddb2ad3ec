use log::info;
use oddball_core::{round2, Block, BlockSummary, StimulusKind, TrialOutcome, TrialSpec};
use oddball_timing::Timer;
use rand::Rng;

use crate::config::SessionConfig;
use crate::storage::SessionLog;

/// Events surfaced to the shell by each poll of the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    /// A stimulus just came on; the shell plays the matching tone.
    StimulusOnset(StimulusKind),
    BlockDone { block: u32 },
    SessionDone,
}

/// Classification of a press, returned by [`SessionRunner::accept`]; the
/// shell plays the matching chime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    /// Block trials exhausted, waiting for the subjective target count.
    AwaitingReport,
    /// Break screen between blocks.
    BetweenBlocks,
    Finished,
    Aborted,
}

/// What the trial screen should currently show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub fixation: bool,
    pub stimulus: Option<StimulusKind>,
    pub diode_on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrialPhase {
    Fixation {
        until: u64,
    },
    /// Combined stimulus-presentation and response-acceptance window. All
    /// deadlines are fixed at onset; a pause shifts every one of them.
    Window {
        onset: u64,
        stim_end: u64,
        pulse_end: u64,
        window_end: u64,
        /// A qualifying (correct) response has been recorded.
        answered: bool,
        /// Any outcome row has been recorded for this trial.
        logged: bool,
    },
}

#[derive(Debug, Clone, Copy)]
struct ActiveTrial {
    spec: TrialSpec,
    phase: TrialPhase,
}

enum Step {
    Idle,
    BeginWindow,
    Resolve,
}

/// Per-trial state machine driving a whole session: block generation, the
/// stimulus/response window, pause bookkeeping, and the append-only log.
pub struct SessionRunner<T, R>
where
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    pub config: SessionConfig,
    pub timer: T,
    rng: R,
    log: SessionLog,
    state: SessionState,
    block_number: u32,
    sequence: Vec<TrialSpec>,
    trial_idx: usize,
    current: Option<ActiveTrial>,
    paused_at: Option<u64>,
}

const NS_PER_MS: u64 = 1_000_000;

impl<T, R> SessionRunner<T, R>
where
    T: Timer<Timestamp = u64>,
    R: Rng,
{
    pub fn new(config: SessionConfig, timer: T, rng: R) -> Self {
        Self {
            config,
            timer,
            rng,
            log: SessionLog::new(),
            state: SessionState::Idle,
            block_number: 0,
            sequence: Vec::new(),
            trial_idx: 0,
            current: None,
            paused_at: None,
        }
    }

    /// Starts block 1. No-op unless the runner is idle.
    pub fn start(&mut self) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        if self.state == SessionState::Idle {
            self.block_number = 1;
            self.begin_block(&mut events);
        }
        events
    }

    /// Polled every frame; applies any deadline that has passed.
    pub fn update(&mut self) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        if self.state != SessionState::Running {
            return events;
        }
        let now = self.timer.now();

        let step = match self.current.as_ref() {
            Some(ActiveTrial {
                phase: TrialPhase::Fixation { until },
                ..
            }) if now >= *until => Step::BeginWindow,
            Some(ActiveTrial {
                phase: TrialPhase::Window { window_end, .. },
                ..
            }) if now >= *window_end => Step::Resolve,
            _ => Step::Idle,
        };

        match step {
            Step::BeginWindow => {
                if let Some(trial) = self.current.take() {
                    self.begin_window(trial.spec, now, &mut events);
                }
            }
            Step::Resolve => {
                if let Some(trial) = self.current.take() {
                    self.resolve_unanswered(&trial);
                    self.advance(&mut events);
                }
            }
            Step::Idle => {}
        }

        events
    }

    /// Classifies a space-bar press against the current window.
    ///
    /// The first press on a Target wins and fixes the trial's reaction time;
    /// presses after a qualifying response are suppressed; every other press
    /// is logged as incorrect.
    pub fn accept(&mut self) -> Option<Feedback> {
        if self.state != SessionState::Running {
            return None;
        }
        let now = self.timer.now();
        let block = self.block_number;

        enum Verdict {
            Hit,
            Wrong,
            Suppressed,
        }

        let (kind, position, rt, verdict) = {
            let trial = self.current.as_mut()?;
            let TrialPhase::Window {
                onset,
                window_end,
                answered,
                logged,
                ..
            } = &mut trial.phase
            else {
                return None;
            };
            if now >= *window_end {
                return None;
            }
            let rt = round2(now.saturating_sub(*onset) as f64 / NS_PER_MS as f64);
            let verdict = if trial.spec.kind.is_target() && !*answered {
                *answered = true;
                *logged = true;
                Verdict::Hit
            } else if *answered {
                Verdict::Suppressed
            } else {
                *logged = true;
                Verdict::Wrong
            };
            (trial.spec.kind, trial.spec.position as u32, rt, verdict)
        };

        match verdict {
            Verdict::Hit => {
                self.log.append_trial(TrialOutcome {
                    block,
                    trial: position,
                    kind,
                    reaction_time_ms: Some(rt),
                    correct: true,
                });
                info!("block {block} trial {position} {}: rt {rt} ms, correct", kind.label());
                Some(Feedback::Correct)
            }
            Verdict::Wrong => {
                self.log.append_trial(TrialOutcome {
                    block,
                    trial: position,
                    kind,
                    reaction_time_ms: Some(rt),
                    correct: false,
                });
                info!("block {block} trial {position} {}: rt {rt} ms, incorrect", kind.label());
                Some(Feedback::Incorrect)
            }
            Verdict::Suppressed => None,
        }
    }

    /// Freezes the machine and remembers when, so `resume` can shift every
    /// active deadline by the measured pause duration.
    pub fn pause(&mut self) {
        if self.state == SessionState::Running {
            self.paused_at = Some(self.timer.now());
            self.state = SessionState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state != SessionState::Paused {
            return;
        }
        if let Some(entered) = self.paused_at.take() {
            let shift = self.timer.now().saturating_sub(entered);
            if let Some(trial) = self.current.as_mut() {
                match &mut trial.phase {
                    TrialPhase::Fixation { until } => *until += shift,
                    TrialPhase::Window {
                        onset,
                        stim_end,
                        pulse_end,
                        window_end,
                        ..
                    } => {
                        *onset += shift;
                        *stim_end += shift;
                        *pulse_end += shift;
                        *window_end += shift;
                    }
                }
            }
        }
        self.state = SessionState::Running;
    }

    /// Halts the session from any live state. The shell decides whether the
    /// partial log gets flushed.
    pub fn abort(&mut self) {
        if self.state != SessionState::Finished {
            self.state = SessionState::Aborted;
            self.current = None;
        }
    }

    /// Records the participant's subjective target count for the block just
    /// finished, then moves on to the break screen or ends the session.
    pub fn submit_report(&mut self, reported_targets: u32) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        if self.state != SessionState::AwaitingReport {
            return events;
        }
        self.log.append_summary(BlockSummary {
            block: self.block_number,
            reported_targets,
        });
        self.finish_block(&mut events);
        events
    }

    /// Launches the next block from the break screen.
    pub fn next_block(&mut self) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        if self.state == SessionState::BetweenBlocks {
            self.block_number += 1;
            self.begin_block(&mut events);
        }
        events
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn current_block(&self) -> u32 {
        self.block_number
    }

    /// (1-based current trial, block length) while a block is live.
    pub fn progress(&self) -> Option<(usize, usize)> {
        if self.sequence.is_empty() {
            return None;
        }
        Some((
            (self.trial_idx + 1).min(self.sequence.len()),
            self.sequence.len(),
        ))
    }

    /// What the trial screen should show right now.
    pub fn display(&self) -> DisplayState {
        if self.state != SessionState::Running {
            return DisplayState::default();
        }
        let now = self.timer.now();
        match self.current.as_ref() {
            Some(ActiveTrial {
                phase: TrialPhase::Fixation { .. },
                ..
            }) => DisplayState {
                fixation: true,
                ..DisplayState::default()
            },
            Some(ActiveTrial {
                spec,
                phase:
                    TrialPhase::Window {
                        stim_end,
                        pulse_end,
                        ..
                    },
            }) => DisplayState {
                fixation: false,
                stimulus: (now < *stim_end).then_some(spec.kind),
                diode_on: now < *pulse_end,
            },
            None => DisplayState::default(),
        }
    }

    fn begin_block(&mut self, events: &mut Vec<RunnerEvent>) {
        let block = Block::generate(
            self.block_number,
            self.config.trials_per_block as usize,
            self.config.target_probability,
            self.config.first_standard,
            &mut self.rng,
        );
        info!(
            "block {} generated: {} trials, {} targets",
            block.number,
            block.len(),
            block.target_count()
        );
        self.sequence = block.trials().to_vec();
        self.trial_idx = 0;
        self.state = SessionState::Running;
        if self.sequence.is_empty() {
            self.finish_block(events);
        } else {
            self.start_trial(events);
        }
    }

    fn start_trial(&mut self, events: &mut Vec<RunnerEvent>) {
        let spec = self.sequence[self.trial_idx];
        let now = self.timer.now();
        match self.config.fixation_ms {
            Some(fix_ms) => {
                self.current = Some(ActiveTrial {
                    spec,
                    phase: TrialPhase::Fixation {
                        until: now + fix_ms * NS_PER_MS,
                    },
                });
            }
            None => self.begin_window(spec, now, events),
        }
    }

    fn begin_window(&mut self, spec: TrialSpec, onset: u64, events: &mut Vec<RunnerEvent>) {
        let stim_ms = self.config.stimulus_duration_ms;
        let pulse_ms = self
            .config
            .diode
            .map(|d| d.for_kind(spec.kind))
            .unwrap_or(0);
        let isi_ms = self.draw_isi();
        // The acceptance window runs to the longer of stimulus and diode
        // pulse, plus the ISI.
        let window_ms = stim_ms.max(pulse_ms) as f64 + isi_ms;

        self.current = Some(ActiveTrial {
            spec,
            phase: TrialPhase::Window {
                onset,
                stim_end: onset + stim_ms * NS_PER_MS,
                pulse_end: onset + pulse_ms * NS_PER_MS,
                window_end: onset + (window_ms * NS_PER_MS as f64) as u64,
                answered: false,
                logged: false,
            },
        });
        events.push(RunnerEvent::StimulusOnset(spec.kind));
    }

    fn resolve_unanswered(&mut self, trial: &ActiveTrial) {
        let TrialPhase::Window { logged, .. } = trial.phase else {
            return;
        };
        if logged {
            return;
        }
        // No press at all: a missed target is the one incorrect no-response
        // case; a quiet standard counts as correct.
        let kind = trial.spec.kind;
        self.log.append_trial(TrialOutcome {
            block: self.block_number,
            trial: trial.spec.position as u32,
            kind,
            reaction_time_ms: None,
            correct: !kind.is_target(),
        });
        info!(
            "block {} trial {} {}: no response",
            self.block_number,
            trial.spec.position,
            kind.label()
        );
    }

    fn advance(&mut self, events: &mut Vec<RunnerEvent>) {
        self.trial_idx += 1;
        if self.trial_idx >= self.sequence.len() {
            events.push(RunnerEvent::BlockDone {
                block: self.block_number,
            });
            if self.config.collect_target_report {
                self.state = SessionState::AwaitingReport;
            } else {
                self.finish_block(events);
            }
        } else {
            self.start_trial(events);
        }
    }

    fn finish_block(&mut self, events: &mut Vec<RunnerEvent>) {
        self.current = None;
        if self.block_number < self.config.num_blocks {
            self.state = SessionState::BetweenBlocks;
        } else {
            self.state = SessionState::Finished;
            events.push(RunnerEvent::SessionDone);
        }
    }

    fn draw_isi(&mut self) -> f64 {
        let base = self.config.base_isi_ms as f64;
        if self.config.isi_jitter {
            self.rng.random_range(base - 500.0..=base + 500.0).max(50.0)
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiodePulse;
    use oddball_core::LogRow;
    use oddball_timing::ManualTimer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_config() -> SessionConfig {
        SessionConfig {
            participant: "tester".into(),
            trials_per_block: 3,
            stimulus_duration_ms: 300,
            base_isi_ms: 1000,
            num_blocks: 1,
            target_probability: 0.2,
            isi_jitter: false,
            modality: oddball_core::Modality::Both,
            fixation_ms: None,
            diode: None,
            first_standard: true,
            collect_target_report: false,
        }
    }

    fn runner_with_sequence(
        config: SessionConfig,
        kinds: &[StimulusKind],
    ) -> SessionRunner<ManualTimer, StdRng> {
        let mut runner = SessionRunner::new(config, ManualTimer::new(), StdRng::seed_from_u64(1));
        runner.block_number = 1;
        runner.state = SessionState::Running;
        runner.sequence = kinds
            .iter()
            .enumerate()
            .map(|(i, &kind)| TrialSpec {
                position: i + 1,
                kind,
            })
            .collect();
        runner.trial_idx = 0;
        let mut events = Vec::new();
        runner.start_trial(&mut events);
        runner
    }

    fn trial_rows(runner: &SessionRunner<ManualTimer, StdRng>) -> Vec<TrialOutcome> {
        runner
            .log()
            .rows()
            .iter()
            .filter_map(|row| match row {
                LogRow::Trial(t) => Some(t.clone()),
                LogRow::Summary(_) => None,
            })
            .collect()
    }

    use StimulusKind::{Standard, Target};

    #[test]
    fn end_to_end_three_trial_block() {
        let mut runner = runner_with_sequence(test_config(), &[Standard, Target, Standard]);

        // Trial 1 (standard): window is 300 + 1000 ms, no press.
        runner.timer.advance_ms(1300);
        let events = runner.update();
        assert_eq!(events, vec![RunnerEvent::StimulusOnset(Target)]);

        // Trial 2 (target): press 120 ms after onset.
        runner.timer.advance_ms(120);
        assert_eq!(runner.accept(), Some(Feedback::Correct));

        runner.timer.advance_ms(1300 - 120);
        let events = runner.update();
        assert_eq!(events, vec![RunnerEvent::StimulusOnset(Standard)]);

        // Trial 3 (standard): runs out quietly, session ends.
        runner.timer.advance_ms(1300);
        let events = runner.update();
        assert!(events.contains(&RunnerEvent::BlockDone { block: 1 }));
        assert!(events.contains(&RunnerEvent::SessionDone));
        assert_eq!(runner.state(), SessionState::Finished);

        let rows = trial_rows(&runner);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].kind, Standard);
        assert_eq!(rows[0].reaction_time_ms, None);
        assert!(rows[0].correct);
        assert_eq!(rows[1].kind, Target);
        assert_eq!(rows[1].reaction_time_ms, Some(120.0));
        assert!(rows[1].correct);
        assert_eq!(rows[2].reaction_time_ms, None);
        assert!(rows[2].correct);
    }

    #[test]
    fn missed_target_emits_one_synthetic_row() {
        let config = SessionConfig {
            trials_per_block: 1,
            ..test_config()
        };
        let mut runner = runner_with_sequence(config, &[Target]);
        runner.timer.advance_ms(1300);
        runner.update();

        let rows = trial_rows(&runner);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reaction_time_ms, None);
        assert!(!rows[0].correct);
        assert!(rows[0].is_target());
    }

    #[test]
    fn presses_after_a_hit_are_suppressed() {
        let config = SessionConfig {
            trials_per_block: 1,
            ..test_config()
        };
        let mut runner = runner_with_sequence(config, &[Target]);

        runner.timer.advance_ms(100);
        assert_eq!(runner.accept(), Some(Feedback::Correct));
        runner.timer.advance_ms(50);
        assert_eq!(runner.accept(), None);
        runner.timer.advance_ms(1150);
        runner.update();

        let rows = trial_rows(&runner);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].correct);
        assert_eq!(rows[0].reaction_time_ms, Some(100.0));
    }

    #[test]
    fn each_wrong_press_on_a_standard_is_logged() {
        let config = SessionConfig {
            trials_per_block: 1,
            ..test_config()
        };
        let mut runner = runner_with_sequence(config, &[Standard]);

        runner.timer.advance_ms(50);
        assert_eq!(runner.accept(), Some(Feedback::Incorrect));
        runner.timer.advance_ms(60);
        assert_eq!(runner.accept(), Some(Feedback::Incorrect));
        runner.timer.advance_ms(1190);
        runner.update();

        let rows = trial_rows(&runner);
        // Two incorrect press rows; no extra no-response row.
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| !r.correct));
        assert_eq!(rows[0].reaction_time_ms, Some(50.0));
        assert_eq!(rows[1].reaction_time_ms, Some(110.0));
    }

    #[test]
    fn presses_outside_the_window_are_ignored() {
        let config = SessionConfig {
            trials_per_block: 2,
            ..test_config()
        };
        let mut runner = runner_with_sequence(config, &[Target, Standard]);
        runner.timer.advance_ms(1300);
        assert_eq!(runner.accept(), None);
        assert!(trial_rows(&runner).is_empty());
    }

    #[test]
    fn fixation_delays_stimulus_onset() {
        let config = SessionConfig {
            trials_per_block: 1,
            fixation_ms: Some(750),
            ..test_config()
        };
        let mut runner = runner_with_sequence(config, &[Target]);

        let display = runner.display();
        assert!(display.fixation);
        assert_eq!(display.stimulus, None);

        runner.timer.advance_ms(750);
        let events = runner.update();
        assert_eq!(events, vec![RunnerEvent::StimulusOnset(Target)]);
        assert_eq!(runner.display().stimulus, Some(Target));

        // RT measures from stimulus onset, not fixation onset.
        runner.timer.advance_ms(200);
        assert_eq!(runner.accept(), Some(Feedback::Correct));
        assert_eq!(trial_rows(&runner)[0].reaction_time_ms, Some(200.0));
    }

    #[test]
    fn diode_square_follows_its_own_pulse() {
        let config = SessionConfig {
            trials_per_block: 1,
            diode: Some(DiodePulse {
                standard_ms: 128,
                target_ms: 512,
            }),
            ..test_config()
        };
        let mut runner = runner_with_sequence(config, &[Standard]);

        runner.timer.advance_ms(60);
        let display = runner.display();
        assert_eq!(display.stimulus, Some(Standard));
        assert!(display.diode_on);

        runner.timer.advance_ms(140); // t = 200: pulse over, stimulus still on
        let display = runner.display();
        assert_eq!(display.stimulus, Some(Standard));
        assert!(!display.diode_on);

        runner.timer.advance_ms(150); // t = 350: both off, window still open
        let display = runner.display();
        assert_eq!(display.stimulus, None);
        assert!(!display.diode_on);
        assert_eq!(runner.accept(), Some(Feedback::Incorrect));
    }

    #[test]
    fn pause_shifts_deadlines_and_excludes_paused_time_from_rt() {
        let config = SessionConfig {
            trials_per_block: 1,
            ..test_config()
        };
        let mut runner = runner_with_sequence(config, &[Target]);

        runner.timer.advance_ms(100);
        runner.pause();
        assert_eq!(runner.state(), SessionState::Paused);
        assert_eq!(runner.accept(), None);

        runner.timer.advance_ms(5000);
        runner.resume();
        assert_eq!(runner.state(), SessionState::Running);

        // Window would have closed at 1300 ms without the shift.
        runner.timer.advance_ms(1100);
        assert!(runner.update().is_empty());

        runner.timer.advance_ms(50);
        assert_eq!(runner.accept(), Some(Feedback::Correct));
        // 100 ms before the pause + 1150 after it.
        assert_eq!(trial_rows(&runner)[0].reaction_time_ms, Some(1250.0));
    }

    #[test]
    fn jittered_isi_stays_within_bounds() {
        let mut runner = runner_with_sequence(
            SessionConfig {
                isi_jitter: true,
                ..test_config()
            },
            &[Standard],
        );
        for _ in 0..500 {
            let isi = runner.draw_isi();
            assert!((500.0..=1500.0).contains(&isi), "isi {isi} out of range");
        }

        let mut runner = runner_with_sequence(
            SessionConfig {
                isi_jitter: true,
                base_isi_ms: 400,
                ..test_config()
            },
            &[Standard],
        );
        for _ in 0..500 {
            let isi = runner.draw_isi();
            assert!((50.0..=900.0).contains(&isi), "isi {isi} out of range");
        }
    }

    #[test]
    fn report_and_break_flow_across_blocks() {
        let config = SessionConfig {
            trials_per_block: 2,
            num_blocks: 2,
            collect_target_report: true,
            fixation_ms: None,
            ..test_config()
        };
        let mut runner = SessionRunner::new(config, ManualTimer::new(), StdRng::seed_from_u64(9));
        runner.start();

        // Run through block 1 without responding.
        for _ in 0..2 {
            runner.timer.advance_ms(1300);
            runner.update();
        }
        assert_eq!(runner.state(), SessionState::AwaitingReport);

        let events = runner.submit_report(3);
        assert!(events.is_empty());
        assert_eq!(runner.state(), SessionState::BetweenBlocks);

        runner.next_block();
        assert_eq!(runner.state(), SessionState::Running);
        assert_eq!(runner.current_block(), 2);

        for _ in 0..2 {
            runner.timer.advance_ms(1300);
            runner.update();
        }
        assert_eq!(runner.state(), SessionState::AwaitingReport);
        let events = runner.submit_report(1);
        assert!(events.contains(&RunnerEvent::SessionDone));
        assert_eq!(runner.state(), SessionState::Finished);

        let rows = runner.log().rows();
        assert_eq!(rows.len(), 6);
        assert!(rows[2].is_summary());
        assert!(rows[5].is_summary());
        match &rows[2] {
            LogRow::Summary(s) => {
                assert_eq!(s.block, 1);
                assert_eq!(s.reported_targets, 3);
            }
            other => panic!("expected summary row, got {other:?}"),
        }
    }

    #[test]
    fn abort_freezes_the_machine() {
        let mut runner = runner_with_sequence(test_config(), &[Standard, Target, Standard]);
        runner.timer.advance_ms(100);
        runner.abort();
        assert_eq!(runner.state(), SessionState::Aborted);
        assert_eq!(runner.accept(), None);
        runner.timer.advance_ms(5000);
        assert!(runner.update().is_empty());
    }

    #[test]
    fn generated_session_respects_first_standard() {
        let config = SessionConfig {
            trials_per_block: 25,
            ..test_config()
        };
        for seed in 0..16 {
            let mut runner =
                SessionRunner::new(config.clone(), ManualTimer::new(), StdRng::seed_from_u64(seed));
            runner.start();
            assert_eq!(runner.sequence.len(), 25);
            assert_eq!(
                runner.sequence.iter().filter(|t| t.kind.is_target()).count(),
                5
            );
            assert_eq!(runner.sequence[0].kind, Standard);
        }
    }
}
