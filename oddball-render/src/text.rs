use std::collections::HashMap;
use std::sync::Arc;

use ab_glyph::{point, Font, FontVec, Glyph, PxScale, ScaleFont};
use log::info;
use thiserror::Error;
use tiny_skia::{Color, Paint, Pixmap, PremultipliedColorU8, Rect, Transform};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no usable sans-serif font found on this system")]
    NoFont,
    #[error("failed to read font file: {0}")]
    Io(#[from] std::io::Error),
    #[error("font data is not a valid font")]
    InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// Loads a sans-serif face from the system font database. Nothing is
/// bundled; whatever the OS offers is good enough for menu text.
pub fn load_system_font() -> Result<FontVec, RenderError> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    let query = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..fontdb::Query::default()
    };
    let id = db.query(&query).ok_or(RenderError::NoFont)?;
    let (source, index) = db.face_source(id).ok_or(RenderError::NoFont)?;

    let bytes = match source {
        fontdb::Source::Binary(data) => data.as_ref().as_ref().to_vec(),
        fontdb::Source::File(path) => {
            info!("using system font {}", path.display());
            std::fs::read(path)?
        }
        fontdb::Source::SharedFile(path, data) => {
            info!("using system font {}", path.display());
            data.as_ref().as_ref().to_vec()
        }
    };

    Ok(FontVec::try_from_vec_and_index(bytes, index)?)
}

/// Rasterizes one line of text into a tightly-bounded transparent pixmap.
pub fn render_text_pixmap(text: &str, font_size: f32, font: &FontVec, color: Color) -> Pixmap {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    // Layout with baseline at ascent.
    let mut pen_x = 0.0_f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    // Union pixel bounds from outlined glyphs.
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;

    for g in &glyphs {
        if let Some(out) = font.outline_glyph(g.clone()) {
            let b = out.px_bounds();
            min_x = min_x.min(b.min.x);
            min_y = min_y.min(b.min.y);
            max_x = max_x.max(b.max.x);
            max_y = max_y.max(b.max.y);
        }
    }

    if min_x == f32::INFINITY {
        return Pixmap::new(1, 1).expect("pixmap");
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;

    let mut pm = Pixmap::new(w, h).expect("pixmap");
    let mut clear = Paint::default();
    clear.set_color(Color::from_rgba8(0, 0, 0, 0));
    if let Some(rect) = Rect::from_xywh(0.0, 0.0, w as f32, h as f32) {
        pm.fill_rect(rect, &clear, Transform::identity(), None);
    }

    let stride = pm.width() as usize;
    let dst = pm.pixels_mut();
    let cu = [
        (color.red() * 255.0) as u8,
        (color.green() * 255.0) as u8,
        (color.blue() * 255.0) as u8,
        (color.alpha() * 255.0) as u8,
    ];

    for g in &glyphs {
        if let Some(out) = font.outline_glyph(g.clone()) {
            let b = out.px_bounds();
            out.draw(|x, y, cov| {
                if cov <= f32::EPSILON {
                    return;
                }
                let fx = x as f32 + b.min.x - min_x;
                let fy = y as f32 + b.min.y - min_y;

                let ix = fx.floor() as i32;
                let iy = fy.floor() as i32;
                if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                    return;
                }

                let i = iy as usize * stride + ix as usize;
                if i >= dst.len() {
                    return;
                }

                // Premultiply source by coverage * alpha, then Porter-Duff
                // over in premultiplied space.
                let a_lin = (cov * cu[3] as f32 / 255.0).clamp(0.0, 1.0);
                let sr = (cu[0] as f32 * a_lin) as u8;
                let sg = (cu[1] as f32 * a_lin) as u8;
                let sb = (cu[2] as f32 * a_lin) as u8;
                let sa = (a_lin * 255.0) as u8;

                let Some(src) = PremultipliedColorU8::from_rgba(sr, sg, sb, sa) else {
                    return;
                };
                let bg = dst[i];

                let inv = 1.0 - (sa as f32 / 255.0);
                let r = src.red().saturating_add((bg.red() as f32 * inv) as u8);
                let g = src.green().saturating_add((bg.green() as f32 * inv) as u8);
                let b = src.blue().saturating_add((bg.blue() as f32 * inv) as u8);
                let a = src.alpha().saturating_add((bg.alpha() as f32 * inv) as u8);

                if let Some(out_px) = PremultipliedColorU8::from_rgba(r, g, b, a) {
                    dst[i] = out_px;
                }
            });
        }
    }

    pm
}

/// Rendered-line cache keyed by text, pixel size, and color.
pub struct TextCache {
    map: HashMap<(String, u32, [u8; 4]), Arc<Pixmap>>,
}

impl TextCache {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn get_or_render(
        &mut self,
        font: &FontVec,
        text: &str,
        size_px: f32,
        color: [u8; 4],
    ) -> Arc<Pixmap> {
        let key = (text.to_string(), size_px as u32, color);
        if let Some(pm) = self.map.get(&key) {
            return Arc::clone(pm);
        }
        let pm = Arc::new(render_text_pixmap(
            text,
            size_px,
            font,
            Color::from_rgba8(color[0], color[1], color[2], color[3]),
        ));
        self.map.insert(key, Arc::clone(&pm));
        pm
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for TextCache {
    fn default() -> Self {
        Self::new()
    }
}
