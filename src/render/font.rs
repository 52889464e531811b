//! Shaped text drawn as filled glyph outlines

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};

/// Families tried, in order, when no font file is configured
const FALLBACK_FAMILIES: &[&str] = &["DejaVu Sans", "Liberation Sans", "Noto Sans", "FreeSans"];

/// Owns one font face and draws text with it
pub struct FontRenderer {
    outlines: ttf_parser::Face<'static>,
    shaper: rustybuzz::Face<'static>,
    name: String,
}

impl FontRenderer {
    /// Load `path`, or look up a sans-serif face on the system
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (data, index, name) = match path {
            Some(path) => {
                let data = std::fs::read(path)
                    .with_context(|| format!("Failed to read font {}", path.display()))?;
                (data, 0, path.display().to_string())
            }
            None => find_system_font()?,
        };

        Self::from_data(data, index, name)
    }

    pub fn from_data(data: Vec<u8>, index: u32, name: String) -> Result<Self> {
        // One font per process; both faces borrow its bytes until exit
        let data: &'static [u8] = Box::leak(data.into_boxed_slice());

        let outlines = ttf_parser::Face::parse(data, index)
            .map_err(|e| anyhow!("Invalid font {}: {}", name, e))?;
        let shaper = rustybuzz::Face::from_slice(data, index)
            .ok_or_else(|| anyhow!("Font {} cannot be shaped", name))?;

        Ok(Self {
            outlines,
            shaper,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Advance width of `text` at `size` pixels
    pub fn measure(&self, text: &str, size: f32) -> f32 {
        self.layout(text, size).iter().map(|g| g.advance).sum()
    }

    /// Draw `text` with its baseline starting at (`x`, `y`)
    pub fn draw(&self, pixmap: &mut Pixmap, text: &str, x: f32, y: f32, size: f32, color: [u8; 3]) {
        let face = &self.outlines;
        let glyphs = self.layout(text, size);

        let scale = size / face.units_per_em() as f32;
        let mut outline = GlyphOutline {
            builder: PathBuilder::new(),
            scale,
            x,
            y,
        };

        let mut pen = x;
        for glyph in glyphs {
            outline.x = pen + glyph.x_offset;
            outline.y = y - glyph.y_offset;
            face.outline_glyph(ttf_parser::GlyphId(glyph.id), &mut outline);
            pen += glyph.advance;
        }

        let Some(path) = outline.builder.finish() else {
            return;
        };

        let mut paint = Paint::default();
        paint.set_color_rgba8(color[0], color[1], color[2], 255);
        paint.anti_alias = true;

        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    fn layout(&self, text: &str, size: f32) -> Vec<PlacedGlyph> {
        let scale = size / self.shaper.units_per_em() as f32;

        let mut buffer = rustybuzz::UnicodeBuffer::new();
        buffer.push_str(text);
        let shaped = rustybuzz::shape(&self.shaper, &[], buffer);

        shaped
            .glyph_infos()
            .iter()
            .zip(shaped.glyph_positions())
            .map(|(info, pos)| PlacedGlyph {
                id: info.glyph_id as u16,
                advance: pos.x_advance as f32 * scale,
                x_offset: pos.x_offset as f32 * scale,
                y_offset: pos.y_offset as f32 * scale,
            })
            .collect()
    }
}

struct PlacedGlyph {
    id: u16,
    advance: f32,
    x_offset: f32,
    y_offset: f32,
}

/// Maps font units (y up) onto the pixmap (y down) at the pen position
struct GlyphOutline {
    builder: PathBuilder,
    scale: f32,
    x: f32,
    y: f32,
}

impl GlyphOutline {
    fn point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.x + x * self.scale, self.y - y * self.scale)
    }
}

impl ttf_parser::OutlineBuilder for GlyphOutline {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x, y) = self.point(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x2, y2) = self.point(x2, y2);
        let (x, y) = self.point(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn find_system_font() -> Result<(Vec<u8>, u32, String)> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    let id = pick_face(&db).ok_or_else(|| {
        anyhow!(
            "No usable system font found (tried {} and {} installed faces)",
            FALLBACK_FAMILIES.join(", "),
            db.len()
        )
    })?;
    let name = db
        .face(id)
        .and_then(|face| face.families.first().map(|(family, _)| family.clone()))
        .unwrap_or_else(|| format!("{:?}", id));

    db.with_face_data(id, |data, index| (data.to_vec(), index, name))
        .ok_or_else(|| anyhow!("Failed to read system font data"))
}

/// Known sans families first, then any face named Sans, then whatever exists
fn pick_face(db: &fontdb::Database) -> Option<fontdb::ID> {
    FALLBACK_FAMILIES
        .iter()
        .find_map(|&family| {
            db.query(&fontdb::Query {
                families: &[fontdb::Family::Name(family)],
                ..fontdb::Query::default()
            })
        })
        .or_else(|| {
            db.faces()
                .find(|face| {
                    face.families
                        .iter()
                        .any(|(family, _)| family.contains("Sans") && !family.contains("Mono"))
                })
                .map(|face| face.id)
        })
        .or_else(|| db.faces().next().map(|face| face.id))
}
