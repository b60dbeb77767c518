use crate::components::replay::StrokeApplier;
use crate::components::strokes::{Stroke, StrokeMode};
use crate::mask::MaskBuffer;

/// Segments shorter than this are drawn as a single stamp at their start.
const MIN_SEGMENT: f32 = 0.1;
/// Stamp spacing along a segment, in pixels.
const STAMP_STEP: f32 = 1.0;

/// Hard-edged round brush. Every pixel whose center lies inside a stamp is
/// set to the stroke mode's value (255 paint, 0 erase). No anti-aliasing, so
/// the output stays binary and depends only on points, size and mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoundBrush;

impl StrokeApplier for RoundBrush {
    fn apply(&self, mask: &mut MaskBuffer, stroke: &Stroke) {
        apply_stroke(mask, &stroke.points, stroke.brush_size, stroke.mode);
    }
}

/// Stamp a whole polyline.
pub fn apply_stroke(
    mask: &mut MaskBuffer,
    points: &[(f32, f32)],
    brush_size: f32,
    mode: StrokeMode,
) {
    let radius = brush_size * 0.5;
    let value = mode.pixel_value();
    match points {
        [] => {}
        [only] => stamp_circle(mask, *only, radius, value),
        _ => {
            for pair in points.windows(2) {
                stamp_segment(mask, pair[0], pair[1], radius, value);
            }
        }
    }
}

/// Stamp circles along `start → end` at one-pixel spacing, both ends included.
/// The segment is first clipped to the mask grown by the radius, so stamps
/// are only placed where they can touch a pixel.
pub fn stamp_segment(
    mask: &mut MaskBuffer,
    start: (f32, f32),
    end: (f32, f32),
    radius: f32,
    value: u8,
) {
    let Some((start, end)) = clip_segment(mask, start, end, radius) else {
        return;
    };
    let dx = end.0 - start.0;
    let dy = end.1 - start.1;
    let distance = (dx * dx + dy * dy).sqrt();

    if distance < MIN_SEGMENT {
        stamp_circle(mask, start, radius, value);
        return;
    }

    let steps = (distance / STAMP_STEP).ceil() as usize;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        stamp_circle(mask, (start.0 + dx * t, start.1 + dy * t), radius, value);
    }
}

/// Liang–Barsky clip of `start → end` against the mask rectangle widened by
/// `radius + 1`. Endpoints already inside are returned unchanged. `None` when
/// no part of the segment is inside.
fn clip_segment(
    mask: &MaskBuffer,
    start: (f32, f32),
    end: (f32, f32),
    radius: f32,
) -> Option<((f32, f32), (f32, f32))> {
    if !start.0.is_finite() || !start.1.is_finite() || !end.0.is_finite() || !end.1.is_finite() {
        return None;
    }
    let margin = f64::from(radius.max(0.0)) + 1.0;
    let (x0, y0) = (f64::from(start.0), f64::from(start.1));
    let (x1, y1) = (f64::from(end.0), f64::from(end.1));
    let (dx, dy) = (x1 - x0, y1 - y0);
    let (min_x, max_x) = (-margin, f64::from(mask.width()) + margin);
    let (min_y, max_y) = (-margin, f64::from(mask.height()) + margin);

    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [
        (-dx, x0 - min_x),
        (dx, max_x - x0),
        (-dy, y0 - min_y),
        (dy, max_y - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    let at = |t: f64| ((x0 + dx * t) as f32, (y0 + dy * t) as f32);
    let clipped_start = if t0 > 0.0 { at(t0) } else { start };
    let clipped_end = if t1 < 1.0 { at(t1) } else { end };
    Some((clipped_start, clipped_end))
}

/// Set every pixel whose center is within `radius` of `center`. The pixel
/// containing `center` is always set, so tiny brushes still leave a mark.
pub fn stamp_circle(mask: &mut MaskBuffer, center: (f32, f32), radius: f32, value: u8) {
    let (cx, cy) = center;
    if !cx.is_finite() || !cy.is_finite() || !radius.is_finite() {
        return;
    }
    let width = mask.width() as i64;
    let height = mask.height() as i64;

    if cx >= 0.0 && cy >= 0.0 && (cx as i64) < width && (cy as i64) < height {
        mask.set(cx as u32, cy as u32, value);
    }

    let r = radius.max(0.0);
    let min_x = ((cx - r).floor() as i64).max(0);
    let min_y = ((cy - r).floor() as i64).max(0);
    let max_x = ((cx + r).ceil() as i64).min(width - 1);
    let max_y = ((cy + r).ceil() as i64).min(height - 1);
    if min_x > max_x || min_y > max_y {
        return;
    }

    let r2 = r * r;
    let stride = mask.width() as usize;
    let data = mask.as_bytes_mut();
    for y in min_y..=max_y {
        let py = y as f32 + 0.5 - cy;
        let row = y as usize * stride;
        for x in min_x..=max_x {
            let px = x as f32 + 0.5 - cx;
            if px * px + py * py <= r2 {
                data[row + x as usize] = value;
            }
        }
    }
}
