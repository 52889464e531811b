//! tiny-skia rendering of the monitor screen

mod font;
mod geometry;

pub use font::FontRenderer;

use crate::alarm::AlarmStatus;
use geometry::{ChevronLayout, TraceLayout, chevrons, split_at_cursor, to_pixels, trace_points};
use tiny_skia::*;

const TRACE_COLOR: [u8; 3] = [0, 255, 0];
const TRACE_WIDTH: f32 = 3.0;

/// Everything drawn in one frame
#[derive(Debug, Clone)]
pub struct FrameContent<'a> {
    pub samples: &'a [f32],
    /// Index the next sample will be written to
    pub cursor: usize,
    /// Detected peaks as window positions in [-1, 1)
    pub peaks: &'a [f32],
    pub status: AlarmStatus,
    pub clock: &'a str,
}

pub struct Scene {
    font: FontRenderer,
    trace: TraceLayout,
    markers: ChevronLayout,
}

impl Scene {
    pub fn new(font: FontRenderer) -> Self {
        Self {
            font,
            trace: TraceLayout::default(),
            markers: ChevronLayout::default(),
        }
    }

    pub fn draw(&self, pixmap: &mut Pixmap, frame: &FrameContent) {
        let (width, height) = (pixmap.width(), pixmap.height());
        pixmap.fill(Color::BLACK);

        // 1. Trace, split at the cursor so the newest sample never joins the oldest
        let points: Vec<(f32, f32)> = trace_points(frame.samples, &self.trace)
            .into_iter()
            .map(|p| to_pixels(p, width, height))
            .collect();
        let (newest, oldest) = split_at_cursor(&points, frame.cursor);
        stroke_strip(pixmap, newest, TRACE_COLOR);
        stroke_strip(pixmap, oldest, TRACE_COLOR);

        // 2. Peak markers
        for triangle in chevrons(frame.peaks, &self.markers) {
            fill_triangle(pixmap, triangle.map(|p| to_pixels(p, width, height)), TRACE_COLOR);
        }

        // 3. Heart rate, scaled from a 1920x1080 layout
        let sx = width as f32 / 1920.0;
        let sy = height as f32 / 1080.0;
        self.font.draw(
            pixmap,
            &frame.status.rate.to_string(),
            1600.0 * sx,
            750.0 * sy,
            175.0 * sy,
            TRACE_COLOR,
        );

        // 4. Advisory label in the severity color
        if let Some(label) = frame.status.label {
            self.font.draw(
                pixmap,
                label,
                80.0 * sx,
                140.0 * sy,
                90.0 * sy,
                frame.status.severity.color(),
            );
        }

        // 5. Wall clock, right-aligned
        let clock_size = 48.0 * sy;
        let clock_width = self.font.measure(frame.clock, clock_size);
        self.font.draw(
            pixmap,
            frame.clock,
            width as f32 - clock_width - 40.0 * sx,
            80.0 * sy,
            clock_size,
            [200, 200, 200],
        );
    }
}

fn stroke_strip(pixmap: &mut Pixmap, points: &[(f32, f32)], color: [u8; 3]) {
    let Some((&(x0, y0), rest)) = points.split_first() else {
        return;
    };
    if rest.is_empty() {
        return;
    }

    let mut builder = PathBuilder::new();
    builder.move_to(x0, y0);
    for &(x, y) in rest {
        builder.line_to(x, y);
    }
    let Some(path) = builder.finish() else {
        return;
    };

    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], 255);
    paint.anti_alias = true;

    let stroke = Stroke {
        width: TRACE_WIDTH,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
}

fn fill_triangle(pixmap: &mut Pixmap, [a, b, c]: [(f32, f32); 3], color: [u8; 3]) {
    let mut builder = PathBuilder::new();
    builder.move_to(a.0, a.1);
    builder.line_to(b.0, b.1);
    builder.line_to(c.0, c.1);
    builder.close();
    let Some(path) = builder.finish() else {
        return;
    };

    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], 255);
    paint.anti_alias = true;

    pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
}
