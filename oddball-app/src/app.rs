use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use oddball_audio::{synth, AudioPlayer};
use oddball_core::StimulusKind;
use oddball_experiment::{
    flush_session, Feedback, RunnerEvent, SessionConfig, SessionRunner, SessionState,
};
use oddball_render::{FormField, ParamFormView, Scene, SceneRenderer};
use oddball_timing::{MonotonicTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use rand::rngs::ThreadRng;
use tiny_skia::Pixmap;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, KeyCode, NamedKey, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowId};

use crate::screens::{ParamForm, PARAM_LABELS};

const COUNTDOWN_STEPS: [&str; 4] = ["3", "2", "1", "GO!"];
const NS_PER_MS: u64 = 1_000_000;

/// Session sounds, synthesized at the device rate once the configuration is
/// known (the stimulus tones depend on the stimulus duration).
struct Sounds {
    standard: Vec<f32>,
    target: Vec<f32>,
    correct: Vec<f32>,
    incorrect: Vec<f32>,
}

impl Sounds {
    fn synthesize(sample_rate: u32, stimulus_ms: u64) -> Self {
        Self {
            standard: synth::sine_tone(
                sample_rate,
                synth::STANDARD_TONE_HZ,
                stimulus_ms,
                synth::TONE_VOLUME,
            ),
            target: synth::sine_tone(
                sample_rate,
                synth::TARGET_TONE_HZ,
                stimulus_ms,
                synth::TONE_VOLUME,
            ),
            correct: synth::chime(
                sample_rate,
                synth::CORRECT_CHIME_HZ,
                synth::CHIME_MS,
                synth::CHIME_VOLUME,
            ),
            incorrect: synth::chime(
                sample_rate,
                synth::INCORRECT_CHIME_HZ,
                synth::CHIME_MS,
                synth::CHIME_VOLUME,
            ),
        }
    }
}

/// One variant per UI state; no nested event loops anywhere.
enum Screen {
    NameEntry { input: String },
    Params { form: ParamForm },
    Instructions,
    Countdown { step: usize, deadline: u64 },
    Trial,
    QuitConfirm,
    TargetReport { block: u32, input: String },
    BlockBreak { finished: u32 },
    Finished { aborted: bool },
}

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SceneRenderer>,
    canvas: Option<Pixmap>,
    timer: MonotonicTimer,
    audio: Option<AudioPlayer>,
    sounds: Option<Sounds>,
    screen: Screen,
    participant: String,
    runner: Option<SessionRunner<MonotonicTimer, ThreadRng>>,
    should_exit: bool,
}

impl App {
    pub fn new() -> Result<Self> {
        let audio = match AudioPlayer::new() {
            Ok(player) => Some(player),
            Err(err) => {
                warn!("audio unavailable, running without sound: {err}");
                None
            }
        };

        Ok(Self {
            window: None,
            pixels: None,
            renderer: None,
            canvas: None,
            timer: MonotonicTimer::new(),
            audio,
            sounds: None,
            screen: Screen::NameEntry {
                input: String::new(),
            },
            participant: String::new(),
            runner: None,
            should_exit: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!(
            "audiovisual oddball task starting on {} ({})",
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        event_loop.run_app(&mut self)?;
        Ok(())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next());

        let window_attributes = Window::default_attributes()
            .with_title("Audiovisual Oddball Task")
            .with_fullscreen(Some(Fullscreen::Borderless(primary_monitor)))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let size = window.inner_size();
        info!(
            "display: {}x{}, scale {:.2}",
            size.width,
            size.height,
            window.scale_factor()
        );

        let surface_texture = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface_texture)?);
        self.canvas = Pixmap::new(size.width, size.height);
        self.renderer = Some(SceneRenderer::new(size.width, size.height)?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);

        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(renderer), Some(canvas), Some(pixels)) = (
            self.renderer.as_mut(),
            self.canvas.as_mut(),
            self.pixels.as_mut(),
        ) else {
            return Ok(());
        };

        let scene = match &self.screen {
            Screen::NameEntry { input } => Scene::NameEntry { input },
            Screen::Params { form } => Scene::Params(ParamFormView {
                fields: PARAM_LABELS
                    .iter()
                    .zip(form.values.iter())
                    .map(|(label, value)| FormField {
                        label,
                        value: value.as_str(),
                    })
                    .collect(),
                active: form.active,
                isi_jitter: form.isi_jitter,
                fixation_on: form.fixation_on,
                modality: form.modality,
            }),
            Screen::Instructions => Scene::Instructions {
                participant: &self.participant,
                modality: self
                    .runner
                    .as_ref()
                    .map(|r| r.config.modality)
                    .unwrap_or_default(),
            },
            Screen::Countdown { step, .. } => Scene::Countdown {
                label: COUNTDOWN_STEPS.get(*step).copied().unwrap_or("GO!"),
            },
            Screen::Trial => match &self.runner {
                Some(runner) => {
                    let display = runner.display();
                    Scene::Trial {
                        fixation: display.fixation,
                        stimulus: display
                            .stimulus
                            .filter(|_| runner.config.modality.has_visual()),
                        diode_on: display.diode_on,
                        diode_enabled: runner.config.diode.is_some(),
                    }
                }
                None => Scene::Trial {
                    fixation: false,
                    stimulus: None,
                    diode_on: false,
                    diode_enabled: false,
                },
            },
            Screen::QuitConfirm => Scene::QuitPrompt,
            Screen::TargetReport { block, input } => Scene::TargetReport {
                block: *block,
                input,
            },
            Screen::BlockBreak { finished } => Scene::BlockBreak {
                finished: *finished,
            },
            Screen::Finished { aborted } => Scene::Finished { aborted: *aborted },
        };

        renderer.render(canvas, &scene);

        let frame = pixels.frame_mut();
        if frame.len() == canvas.data().len() {
            frame.copy_from_slice(canvas.data());
        }
        pixels.render()?;
        Ok(())
    }

    fn update(&mut self) {
        let now = self.timer.now();
        match &self.screen {
            Screen::Countdown { step, deadline } if now >= *deadline => {
                let next = *step + 1;
                if next >= COUNTDOWN_STEPS.len() {
                    let events = match self.runner.as_mut() {
                        Some(runner) => runner.start(),
                        None => Vec::new(),
                    };
                    self.screen = Screen::Trial;
                    self.process_events(events);
                } else {
                    self.screen = Screen::Countdown {
                        step: next,
                        deadline: now + 1_000 * NS_PER_MS,
                    };
                }
            }
            Screen::Trial => {
                let events = match self.runner.as_mut() {
                    Some(runner) => runner.update(),
                    None => Vec::new(),
                };
                self.process_events(events);
            }
            _ => {}
        }
    }

    fn process_events(&mut self, events: Vec<RunnerEvent>) {
        for event in events {
            match event {
                RunnerEvent::StimulusOnset(kind) => {
                    let audible = self
                        .runner
                        .as_ref()
                        .map(|r| r.config.modality.has_audio())
                        .unwrap_or(false);
                    if audible {
                        self.play_stimulus(kind);
                    }
                }
                RunnerEvent::BlockDone { block } => {
                    match self.runner.as_ref().map(|r| r.state()) {
                        Some(SessionState::AwaitingReport) => {
                            self.screen = Screen::TargetReport {
                                block,
                                input: String::new(),
                            };
                        }
                        Some(SessionState::BetweenBlocks) => {
                            self.screen = Screen::BlockBreak { finished: block };
                        }
                        _ => {}
                    }
                }
                RunnerEvent::SessionDone => self.finish_session(false),
            }
        }
    }

    fn play_stimulus(&self, kind: StimulusKind) {
        if let (Some(audio), Some(sounds)) = (&self.audio, &self.sounds) {
            match kind {
                StimulusKind::Standard => audio.play(&sounds.standard),
                StimulusKind::Target => audio.play(&sounds.target),
            }
        }
    }

    fn play_feedback(&self, feedback: Feedback) {
        if let (Some(audio), Some(sounds)) = (&self.audio, &self.sounds) {
            match feedback {
                Feedback::Correct => audio.play(&sounds.correct),
                Feedback::Incorrect => audio.play(&sounds.incorrect),
            }
        }
    }

    fn start_session(&mut self, config: SessionConfig) {
        info!(
            "session configured: {} trials x {} blocks, modality {:?}",
            config.trials_per_block, config.num_blocks, config.modality
        );

        if let Some(audio) = &self.audio {
            let sounds = Sounds::synthesize(audio.sample_rate(), config.stimulus_duration_ms);
            // Audible chime check before the instructions screen.
            audio.play(&sounds.correct);
            self.timer.sleep(Duration::from_millis(250));
            self.sounds = Some(sounds);
        }

        self.runner = Some(SessionRunner::new(config, self.timer.clone(), rand::rng()));
        self.screen = Screen::Instructions;
    }

    /// Writes the session log exactly once and lands on the end screen.
    fn finish_session(&mut self, aborted: bool) {
        if let Some(runner) = self.runner.as_ref() {
            let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            match flush_session(runner.log(), &runner.config, &dir, aborted) {
                Ok(path) => info!("results saved to {}", path.display()),
                Err(err) => error!("failed to save session results: {err}"),
            }
        }
        self.screen = Screen::Finished { aborted };
    }

    fn handle_key(&mut self, event: KeyEvent, event_loop: &ActiveEventLoop) {
        if event.repeat {
            return;
        }
        let logical = event.logical_key.clone();
        let physical = event.physical_key;

        match &mut self.screen {
            Screen::NameEntry { input } => match logical {
                Key::Named(NamedKey::Enter) if !input.is_empty() => {
                    self.participant = std::mem::take(input);
                    self.screen = Screen::Params {
                        form: ParamForm::new(),
                    };
                }
                Key::Named(NamedKey::Backspace) => {
                    input.pop();
                }
                Key::Named(NamedKey::Escape) => self.exit(event_loop),
                Key::Character(text) => {
                    for ch in text.chars() {
                        if ch.is_ascii_alphanumeric() {
                            input.push(ch);
                        }
                    }
                }
                _ => {}
            },

            Screen::Params { form } => match logical {
                Key::Named(NamedKey::Tab) => form.next_field(),
                Key::Named(NamedKey::Backspace) => form.backspace(),
                Key::Named(NamedKey::Enter) if form.complete() => {
                    if let Some(config) = form.build_config(&self.participant) {
                        self.start_session(config);
                    }
                }
                Key::Named(NamedKey::Escape) => self.exit(event_loop),
                Key::Character(text) => {
                    for ch in text.chars() {
                        match ch.to_ascii_lowercase() {
                            'j' => form.toggle_isi_jitter(),
                            'f' => form.toggle_fixation(),
                            'm' => form.cycle_modality(),
                            c if c.is_ascii_digit() => form.push_digit(c),
                            _ => {}
                        }
                    }
                }
                _ => {}
            },

            Screen::Instructions => {
                if matches!(logical, Key::Named(NamedKey::Escape)) {
                    self.exit(event_loop);
                } else {
                    self.screen = Screen::Countdown {
                        step: 0,
                        deadline: self.timer.now() + 1_000 * NS_PER_MS,
                    };
                }
            }

            Screen::Countdown { .. } => {}

            Screen::Trial => {
                if physical == PhysicalKey::Code(KeyCode::Space) {
                    let feedback = self.runner.as_mut().and_then(|r| r.accept());
                    if let Some(feedback) = feedback {
                        self.play_feedback(feedback);
                    }
                } else if matches!(logical, Key::Named(NamedKey::Escape)) {
                    if let Some(runner) = self.runner.as_mut() {
                        runner.pause();
                    }
                    self.screen = Screen::QuitConfirm;
                }
            }

            Screen::QuitConfirm => {
                if let Key::Character(text) = &logical {
                    if text.eq_ignore_ascii_case("y") {
                        if let Some(runner) = self.runner.as_mut() {
                            runner.abort();
                        }
                        self.finish_session(true);
                    } else if text.eq_ignore_ascii_case("n") {
                        if let Some(runner) = self.runner.as_mut() {
                            runner.resume();
                        }
                        self.screen = Screen::Trial;
                    }
                }
            }

            Screen::TargetReport { input, .. } => match logical {
                Key::Named(NamedKey::Enter) if !input.is_empty() => {
                    let Ok(count) = input.parse::<u32>() else {
                        return;
                    };
                    let events = match self.runner.as_mut() {
                        Some(runner) => runner.submit_report(count),
                        None => Vec::new(),
                    };
                    self.process_events(events);
                    if let Some(SessionState::BetweenBlocks) =
                        self.runner.as_ref().map(|r| r.state())
                    {
                        let finished = self
                            .runner
                            .as_ref()
                            .map(|r| r.current_block())
                            .unwrap_or(0);
                        self.screen = Screen::BlockBreak { finished };
                    }
                }
                Key::Named(NamedKey::Backspace) => {
                    input.pop();
                }
                Key::Character(text) => {
                    for ch in text.chars() {
                        if ch.is_ascii_digit() {
                            input.push(ch);
                        }
                    }
                }
                _ => {}
            },

            Screen::BlockBreak { .. } => {
                if matches!(logical, Key::Named(NamedKey::Escape)) {
                    self.exit(event_loop);
                } else {
                    let events = match self.runner.as_mut() {
                        Some(runner) => runner.next_block(),
                        None => Vec::new(),
                    };
                    self.screen = Screen::Trial;
                    self.process_events(events);
                }
            }

            Screen::Finished { .. } => match &logical {
                Key::Character(text) if text.eq_ignore_ascii_case("x") => {
                    self.runner = None;
                    self.sounds = None;
                    self.participant.clear();
                    self.screen = Screen::NameEntry {
                        input: String::new(),
                    };
                }
                Key::Named(NamedKey::Escape) => self.exit(event_loop),
                _ => {}
            },
        }
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        if let Some(pixels) = &mut self.pixels {
            if let Err(err) = pixels.resize_surface(size.width, size.height) {
                warn!("failed to resize surface: {err}");
            }
            if let Err(err) = pixels.resize_buffer(size.width, size.height) {
                warn!("failed to resize buffer: {err}");
            }
        }
        self.canvas = Pixmap::new(size.width, size.height);
        if let Some(renderer) = &mut self.renderer {
            renderer.resize(size.width, size.height);
        }
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        self.should_exit = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(err) = self.create_window_and_surface(event_loop) {
                error!("failed to create window and surface: {err}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.exit(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.render() {
                    error!("render failed: {err}");
                    event_loop.exit();
                    return;
                }
                self.update();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                self.handle_key(event, event_loop);
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = self.window.as_ref().map(|w| w.inner_size());
                if let Some(size) = size {
                    self.handle_resize(size);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}
