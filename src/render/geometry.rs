//! Pure coordinate mapping for the trace and peak markers
//!
//! Layouts are in normalized device coordinates: x and y in [-1, 1], y up.
//! [`to_pixels`] converts to the pixmap's top-left origin.

/// Placement of the rolling trace
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceLayout {
    pub x_offset: f32,
    /// Fraction of the screen width used by the window
    pub x_scale: f32,
    /// Screen y of a zero sample
    pub y_offset: f32,
    pub y_scale: f32,
}

impl Default for TraceLayout {
    fn default() -> Self {
        Self {
            x_offset: -0.2,
            x_scale: 0.8,
            y_offset: 0.25,
            y_scale: 1.0,
        }
    }
}

/// Placement of the chevrons drawn above detected peaks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChevronLayout {
    pub x_offset: f32,
    pub x_scale: f32,
    /// Screen y of the chevron tips
    pub y: f32,
    pub size: f32,
}

impl Default for ChevronLayout {
    fn default() -> Self {
        Self {
            x_offset: -0.2,
            x_scale: 0.8,
            y: 0.5,
            size: 0.1,
        }
    }
}

/// One vertex per sample, evenly spaced across the window
pub fn trace_points(samples: &[f32], layout: &TraceLayout) -> Vec<(f32, f32)> {
    let n = samples.len().max(1) as f32;
    samples
        .iter()
        .enumerate()
        .map(|(i, &sample)| {
            let x = ((i as f32 / n) * 2.0 - 1.0) * layout.x_scale + layout.x_offset;
            let y = sample * layout.y_scale + layout.y_offset;
            (x, y)
        })
        .collect()
}

/// Split trace vertices at the write cursor into (newest, oldest) strips.
///
/// Drawing them separately leaves a gap where the newest sample meets the
/// oldest.
pub fn split_at_cursor<T>(points: &[T], cursor: usize) -> (&[T], &[T]) {
    points.split_at(cursor.min(points.len()))
}

/// Downward-pointing triangle above each peak position in [-1, 1)
pub fn chevrons(peaks: &[f32], layout: &ChevronLayout) -> Vec<[(f32, f32); 3]> {
    let half = layout.size / 2.0;
    peaks
        .iter()
        .map(|&position| {
            let x = position * layout.x_scale + layout.x_offset;
            [
                (x, layout.y),
                (x - half, layout.y + layout.size),
                (x + half, layout.y + layout.size),
            ]
        })
        .collect()
}

/// Normalized device coordinates to pixmap pixels
pub fn to_pixels((x, y): (f32, f32), width: u32, height: u32) -> (f32, f32) {
    (
        (x + 1.0) / 2.0 * width as f32,
        (1.0 - y) / 2.0 * height as f32,
    )
}
