use ab_glyph::FontVec;
use oddball_core::{Modality, StimulusKind};
use tiny_skia::{
    Color, FillRule, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke, Transform,
};

use crate::text::{load_system_font, RenderError, TextCache};

pub const RED: [u8; 4] = [255, 0, 0, 255];
pub const GREEN: [u8; 4] = [0, 255, 0, 255];
pub const BLACK: [u8; 4] = [0, 0, 0, 255];
pub const DARK_GRAY: [u8; 4] = [30, 30, 30, 255];
pub const CYAN: [u8; 4] = [0, 255, 255, 255];
pub const WHITE: [u8; 4] = [255, 255, 255, 255];

const TITLE_PX: f32 = 50.0;
const PROMPT_PX: f32 = 28.0;
const INFO_PX: f32 = 24.0;
const COUNTDOWN_PX: f32 = 80.0;

const STIMULUS_RADIUS: f32 = 100.0;
const DIODE_SIZE: f32 = 50.0;

fn color(c: [u8; 4]) -> Color {
    Color::from_rgba8(c[0], c[1], c[2], c[3])
}

fn fill(canvas: &mut Pixmap, c: [u8; 4]) {
    canvas.fill(color(c));
}

/// Red disc for the frequent standard stimulus, centered on (cx, cy).
pub fn draw_standard_circle(canvas: &mut Pixmap, cx: f32, cy: f32) {
    let mut paint = Paint::default();
    paint.set_color(color(RED));
    paint.anti_alias = true;

    let mut pb = PathBuilder::new();
    pb.push_circle(cx, cy, STIMULUS_RADIUS);
    if let Some(path) = pb.finish() {
        canvas.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}

/// Green upward triangle for the rare target stimulus.
pub fn draw_target_triangle(canvas: &mut Pixmap, cx: f32, cy: f32) {
    let mut paint = Paint::default();
    paint.set_color(color(GREEN));
    paint.anti_alias = true;

    let mut pb = PathBuilder::new();
    pb.move_to(cx, cy - STIMULUS_RADIUS);
    pb.line_to(cx - STIMULUS_RADIUS, cy + STIMULUS_RADIUS);
    pb.line_to(cx + STIMULUS_RADIUS, cy + STIMULUS_RADIUS);
    pb.close();
    if let Some(path) = pb.finish() {
        canvas.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}

/// White fixation cross, 40 px arms, 4 px bars.
pub fn draw_fixation_cross(canvas: &mut Pixmap, cx: f32, cy: f32) {
    let mut paint = Paint::default();
    paint.set_color(color(WHITE));
    paint.anti_alias = false;

    if let Some(h) = Rect::from_xywh(cx - 20.0, cy - 2.0, 40.0, 4.0) {
        canvas.fill_rect(h, &paint, Transform::identity(), None);
    }
    if let Some(v) = Rect::from_xywh(cx - 2.0, cy - 20.0, 4.0, 40.0) {
        canvas.fill_rect(v, &paint, Transform::identity(), None);
    }
}

/// Photodiode sync square in the bottom-right corner, 10 px inset.
pub fn draw_diode_square(canvas: &mut Pixmap, width: u32, height: u32, on: bool) {
    let mut paint = Paint::default();
    paint.set_color(color(if on { WHITE } else { BLACK }));
    paint.anti_alias = false;

    if let Some(rect) = Rect::from_xywh(
        width as f32 - DIODE_SIZE - 10.0,
        height as f32 - DIODE_SIZE - 10.0,
        DIODE_SIZE,
        DIODE_SIZE,
    ) {
        canvas.fill_rect(rect, &paint, Transform::identity(), None);
    }
}

/// One parameter-screen input row.
pub struct FormField<'a> {
    pub label: &'a str,
    pub value: &'a str,
}

/// Parameter screen as the shell wants it drawn this frame.
pub struct ParamFormView<'a> {
    pub fields: Vec<FormField<'a>>,
    pub active: usize,
    pub isi_jitter: bool,
    pub fixation_on: bool,
    pub modality: Modality,
}

/// Everything the task ever puts on screen, one variant per UI state.
pub enum Scene<'a> {
    NameEntry {
        input: &'a str,
    },
    Params(ParamFormView<'a>),
    Instructions {
        participant: &'a str,
        modality: Modality,
    },
    Countdown {
        label: &'a str,
    },
    Trial {
        fixation: bool,
        stimulus: Option<StimulusKind>,
        diode_on: bool,
        diode_enabled: bool,
    },
    QuitPrompt,
    TargetReport {
        block: u32,
        input: &'a str,
    },
    BlockBreak {
        finished: u32,
    },
    Finished {
        aborted: bool,
    },
}

/// Draws full frames with tiny-skia; text lines are rasterized once and
/// cached.
pub struct SceneRenderer {
    width: u32,
    height: u32,
    font: FontVec,
    cache: TextCache,
}

impl SceneRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        Ok(Self {
            width,
            height,
            font: load_system_font()?,
            cache: TextCache::new(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn render(&mut self, canvas: &mut Pixmap, scene: &Scene) {
        match scene {
            Scene::NameEntry { input } => self.render_name_entry(canvas, input),
            Scene::Params(form) => self.render_params(canvas, form),
            Scene::Instructions {
                participant,
                modality,
            } => self.render_instructions(canvas, participant, *modality),
            Scene::Countdown { label } => {
                fill(canvas, DARK_GRAY);
                self.draw_panel(canvas);
                self.text_centered(canvas, label, COUNTDOWN_PX, CYAN, self.height as f32 / 2.0 - 40.0);
            }
            Scene::Trial {
                fixation,
                stimulus,
                diode_on,
                diode_enabled,
            } => {
                fill(canvas, BLACK);
                let cx = self.width as f32 / 2.0;
                let cy = self.height as f32 / 2.0;
                if *fixation {
                    draw_fixation_cross(canvas, cx, cy);
                }
                match stimulus {
                    Some(StimulusKind::Standard) => draw_standard_circle(canvas, cx, cy),
                    Some(StimulusKind::Target) => draw_target_triangle(canvas, cx, cy),
                    None => {}
                }
                if *diode_enabled {
                    draw_diode_square(canvas, self.width, self.height, *diode_on);
                }
            }
            Scene::QuitPrompt => {
                fill(canvas, BLACK);
                self.text_centered(
                    canvas,
                    "Quit? (Y/N)",
                    PROMPT_PX,
                    WHITE,
                    self.height as f32 / 2.0 - 14.0,
                );
            }
            Scene::TargetReport { block, input } => {
                fill(canvas, DARK_GRAY);
                self.draw_panel(canvas);
                let cy = self.height as f32 / 2.0;
                self.text_centered(canvas, &format!("Block {block} finished"), PROMPT_PX, WHITE, cy - 80.0);
                self.text_centered(
                    canvas,
                    "How many targets did you see?",
                    PROMPT_PX,
                    WHITE,
                    cy - 30.0,
                );
                self.text_centered(canvas, &format!("{input}|"), INFO_PX, WHITE, cy + 20.0);
                self.text_centered(canvas, "Press Enter to continue", INFO_PX, CYAN, cy + 70.0);
            }
            Scene::BlockBreak { finished } => {
                fill(canvas, DARK_GRAY);
                self.draw_panel(canvas);
                let cy = self.height as f32 / 2.0;
                self.text_centered(canvas, &format!("Block {finished} finished"), PROMPT_PX, WHITE, cy - 70.0);
                self.text_centered(
                    canvas,
                    &format!("Ready for block {}?", finished + 1),
                    PROMPT_PX,
                    WHITE,
                    cy - 20.0,
                );
                self.text_centered(canvas, "Press any key when ready", INFO_PX, CYAN, cy + 40.0);
            }
            Scene::Finished { aborted } => {
                fill(canvas, DARK_GRAY);
                self.draw_panel(canvas);
                let cy = self.height as f32 / 2.0;
                let headline = if *aborted {
                    "Session aborted - partial results saved"
                } else {
                    "Thank you for participating!"
                };
                self.text_centered(canvas, headline, PROMPT_PX, WHITE, cy - 50.0);
                self.text_centered(
                    canvas,
                    "Press X to go to the main menu",
                    INFO_PX,
                    CYAN,
                    cy + 20.0,
                );
            }
        }
    }

    fn render_name_entry(&mut self, canvas: &mut Pixmap, input: &str) {
        fill(canvas, DARK_GRAY);
        let cy = self.height as f32 / 2.0;
        self.text_centered(canvas, "Welcome", TITLE_PX, CYAN, cy - 110.0);
        self.text_centered(canvas, "Enter your name:", PROMPT_PX, WHITE, cy - 30.0);
        self.text_centered(canvas, &format!("{input}|"), INFO_PX, WHITE, cy + 20.0);
    }

    fn render_params(&mut self, canvas: &mut Pixmap, form: &ParamFormView) {
        fill(canvas, DARK_GRAY);
        self.draw_panel(canvas);
        self.text_centered(canvas, "Welcome", TITLE_PX, CYAN, 60.0);

        let start_y = 150.0;
        let spacing = 70.0;
        let box_w = 200.0;
        let box_h = 40.0;
        let cx = self.width as f32 / 2.0;

        for (i, field) in form.fields.iter().enumerate() {
            let y = start_y + i as f32 * spacing;
            self.text_centered(canvas, field.label, INFO_PX, WHITE, y);

            let box_color = if i == form.active { CYAN } else { WHITE };
            self.stroke_rect(canvas, cx - box_w / 2.0, y + 28.0, box_w, box_h, 3.0, box_color);

            let caret = if i == form.active { "|" } else { "" };
            let value = format!("{}{caret}", field.value);
            let pm = self.cache.get_or_render(&self.font, &value, INFO_PX, WHITE);
            canvas.draw_pixmap(
                (cx - box_w / 2.0 + 10.0) as i32,
                (y + 28.0 + (box_h - pm.height() as f32) / 2.0) as i32,
                (*pm).as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }

        // Checkboxes sit to the right of their rows; toggled from the
        // keyboard, so the hint keys are part of the labels.
        let checkbox_x = cx + box_w / 2.0 + 10.0;
        let isi_y = start_y + 2.0 * spacing + 38.0;
        self.draw_checkbox(canvas, checkbox_x, isi_y, form.isi_jitter);
        self.text_at(canvas, "[J] 500ms variation", INFO_PX, WHITE, checkbox_x + 30.0, isi_y - 4.0);

        let fix_y = start_y + 4.0 * spacing + 38.0;
        self.draw_checkbox(canvas, checkbox_x, fix_y, form.fixation_on);
        self.text_at(canvas, "[F] Fixation cross?", INFO_PX, WHITE, checkbox_x + 30.0, fix_y - 4.0);

        // Modality radio group.
        let radio_y = start_y + 7.0 * spacing + 10.0;
        self.text_centered(canvas, "[M] Stimuli Type:", PROMPT_PX, WHITE, radio_y - 34.0);
        for (i, modality) in Modality::ALL.iter().enumerate() {
            let x = cx - 150.0 + i as f32 * 100.0;
            self.draw_radio(canvas, x, radio_y + 10.0, *modality == form.modality);
            self.text_at(canvas, modality.label(), INFO_PX, WHITE, x + 18.0, radio_y);
        }

        self.text_centered(
            canvas,
            "Press Enter to continue",
            INFO_PX,
            WHITE,
            radio_y + 60.0,
        );
    }

    fn render_instructions(&mut self, canvas: &mut Pixmap, participant: &str, modality: Modality) {
        fill(canvas, DARK_GRAY);
        self.draw_panel(canvas);
        let cy = self.height as f32 / 2.0;
        self.text_centered(canvas, "Welcome", TITLE_PX, CYAN, self.height as f32 / 4.0 + 20.0);

        let line2 = match modality {
            Modality::Both => "when the green triangle or high tone occurs",
            Modality::Audio => "when you hear the high tone",
            Modality::Visual => "when the green triangle is displayed",
        };
        self.text_centered(
            canvas,
            &format!("{participant}, press the spacebar"),
            PROMPT_PX,
            WHITE,
            cy - 50.0,
        );
        self.text_centered(canvas, line2, PROMPT_PX, WHITE, cy);
        self.text_centered(canvas, "Press any key to start", INFO_PX, CYAN, cy + 60.0);
    }

    /// Black framed panel behind every menu screen.
    fn draw_panel(&mut self, canvas: &mut Pixmap) {
        let w = self.width as f32;
        let h = self.height as f32;
        self.stroke_rect(canvas, w / 4.0, h / 8.0, w / 2.0, h * 0.75, 5.0, BLACK);
    }

    fn stroke_rect(
        &mut self,
        canvas: &mut Pixmap,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        width: f32,
        c: [u8; 4],
    ) {
        let Some(rect) = Rect::from_xywh(x, y, w, h) else {
            return;
        };
        let path = PathBuilder::from_rect(rect);
        let mut paint = Paint::default();
        paint.set_color(color(c));
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        canvas.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    fn draw_checkbox(&mut self, canvas: &mut Pixmap, x: f32, y: f32, checked: bool) {
        self.stroke_rect(canvas, x, y, 20.0, 20.0, 2.0, WHITE);
        if checked {
            let mut pb = PathBuilder::new();
            pb.move_to(x + 4.0, y + 10.0);
            pb.line_to(x + 10.0, y + 16.0);
            pb.line_to(x + 16.0, y + 4.0);
            if let Some(path) = pb.finish() {
                let mut paint = Paint::default();
                paint.set_color(color(WHITE));
                paint.anti_alias = true;
                let stroke = Stroke {
                    width: 2.0,
                    ..Stroke::default()
                };
                canvas.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
        }
    }

    fn draw_radio(&mut self, canvas: &mut Pixmap, x: f32, y: f32, selected: bool) {
        let mut paint = Paint::default();
        paint.set_color(color(WHITE));
        paint.anti_alias = true;

        let mut pb = PathBuilder::new();
        pb.push_circle(x, y, 10.0);
        if let Some(path) = pb.finish() {
            let stroke = Stroke {
                width: 2.0,
                ..Stroke::default()
            };
            canvas.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }

        if selected {
            let mut inner = Paint::default();
            inner.set_color(color(CYAN));
            inner.anti_alias = true;
            let mut pb = PathBuilder::new();
            pb.push_circle(x, y, 6.0);
            if let Some(path) = pb.finish() {
                canvas.fill_path(&path, &inner, FillRule::Winding, Transform::identity(), None);
            }
        }
    }

    fn text_centered(&mut self, canvas: &mut Pixmap, text: &str, size: f32, c: [u8; 4], y: f32) {
        let pm = self.cache.get_or_render(&self.font, text, size, c);
        let x = (self.width as f32 - pm.width() as f32) / 2.0;
        canvas.draw_pixmap(
            x as i32,
            y as i32,
            (*pm).as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    fn text_at(&mut self, canvas: &mut Pixmap, text: &str, size: f32, c: [u8; 4], x: f32, y: f32) {
        let pm = self.cache.get_or_render(&self.font, text, size, c);
        canvas.draw_pixmap(
            x as i32,
            y as i32,
            (*pm).as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black_canvas(size: u32) -> Pixmap {
        let mut canvas = Pixmap::new(size, size).expect("pixmap");
        canvas.fill(color(BLACK));
        canvas
    }

    fn pixel(canvas: &Pixmap, x: u32, y: u32) -> [u8; 4] {
        let px = canvas
            .pixel(x, y)
            .expect("pixel in bounds")
            .demultiply();
        [px.red(), px.green(), px.blue(), px.alpha()]
    }

    #[test]
    fn standard_circle_paints_red_at_center() {
        let mut canvas = black_canvas(400);
        draw_standard_circle(&mut canvas, 200.0, 200.0);
        assert_eq!(pixel(&canvas, 200, 200), RED);
        // Outside the 100 px radius stays black.
        assert_eq!(pixel(&canvas, 30, 30), BLACK);
    }

    #[test]
    fn target_triangle_paints_green_inside_only() {
        let mut canvas = black_canvas(400);
        draw_target_triangle(&mut canvas, 200.0, 200.0);
        // Centroid is inside; the apex corners above the base are not.
        assert_eq!(pixel(&canvas, 200, 250), GREEN);
        assert_eq!(pixel(&canvas, 110, 110), BLACK);
    }

    #[test]
    fn fixation_cross_covers_both_bars() {
        let mut canvas = black_canvas(200);
        draw_fixation_cross(&mut canvas, 100.0, 100.0);
        assert_eq!(pixel(&canvas, 85, 100), WHITE);
        assert_eq!(pixel(&canvas, 100, 85), WHITE);
        assert_eq!(pixel(&canvas, 70, 70), BLACK);
    }

    #[test]
    fn diode_square_toggles_with_pulse_state() {
        let mut canvas = black_canvas(200);
        draw_diode_square(&mut canvas, 200, 200, true);
        assert_eq!(pixel(&canvas, 170, 170), WHITE);

        draw_diode_square(&mut canvas, 200, 200, false);
        assert_eq!(pixel(&canvas, 170, 170), BLACK);
    }
}
