//! Turns a pressure-sampled polyline into the outline of a filled stroke.

use std::f32::consts::PI;

use egui::{Pos2, Vec2, vec2};

/// Segments used for each round end cap.
const CAP_SEGMENTS: usize = 8;

/// Points closer than this to the previous kept point are dropped.
const MIN_SPACING: f32 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct OutlineOptions {
    /// How far each point lags behind the pointer, 0 = raw input.
    pub streamline: f32,
    /// Weight of the neighbours when smoothing the radius, 0 = none.
    pub smoothing: f32,
}

impl Default for OutlineOptions {
    fn default() -> Self {
        Self {
            streamline: 0.5,
            smoothing: 0.6,
        }
    }
}

/// Builds a closed polygon around `points`, where `radii[i]` is the half
/// width at `points[i]`.
///
/// Returns `None` when fewer than two distinct points remain after
/// streamlining; callers draw a dot instead.
pub fn stroke_outline(points: &[Pos2], radii: &[f32], options: OutlineOptions) -> Option<Vec<Pos2>> {
    let (centers, radii) = streamline(points, radii, options.streamline);
    if centers.len() < 2 {
        return None;
    }
    let radii = smooth(&radii, options.smoothing);

    let last = centers.len() - 1;
    let normals: Vec<Vec2> = (0..centers.len())
        .map(|i| {
            let prev = centers[i.saturating_sub(1)];
            let next = centers[(i + 1).min(last)];
            let t = (next - prev).normalized();
            vec2(-t.y, t.x)
        })
        .collect();

    let mut outline = Vec::with_capacity(centers.len() * 2 + CAP_SEGMENTS * 2);
    for i in 0..centers.len() {
        outline.push(centers[i] + normals[i] * radii[i]);
    }
    outline.extend(cap(centers[last], normals[last], radii[last]));
    for i in (0..centers.len()).rev() {
        outline.push(centers[i] - normals[i] * radii[i]);
    }
    outline.extend(cap(centers[0], -normals[0], radii[0]));
    Some(outline)
}

/// Half circle from `center + normal * r` round to `center - normal * r`,
/// bulging in the direction `normal` rotated a quarter turn clockwise.
fn cap(center: Pos2, normal: Vec2, radius: f32) -> impl Iterator<Item = Pos2> {
    (1..CAP_SEGMENTS).map(move |k| {
        let theta = -PI * k as f32 / CAP_SEGMENTS as f32;
        let (sin, cos) = theta.sin_cos();
        let rotated = vec2(normal.x * cos - normal.y * sin, normal.x * sin + normal.y * cos);
        center + rotated * radius
    })
}

fn streamline(points: &[Pos2], radii: &[f32], amount: f32) -> (Vec<Pos2>, Vec<f32>) {
    let follow = (1.0 - amount).clamp(0.05, 1.0);
    let mut centers: Vec<Pos2> = Vec::with_capacity(points.len());
    let mut kept_radii = Vec::with_capacity(points.len());
    let mut lagged: Option<Pos2> = None;

    for (i, &p) in points.iter().enumerate() {
        let r = radii.get(i).copied().unwrap_or(1.0);
        let q = match lagged {
            None => p,
            Some(prev) => prev + (p - prev) * follow,
        };
        lagged = Some(q);
        if centers.last().is_none_or(|last| last.distance(q) >= MIN_SPACING) {
            centers.push(q);
            kept_radii.push(r);
        }
    }
    // the stroke should end where the pointer was lifted
    if let (Some(&end), Some(last)) = (points.last(), centers.last()) {
        if last.distance(end) >= MIN_SPACING {
            centers.push(end);
            kept_radii.push(radii.last().copied().unwrap_or(1.0));
        }
    }
    (centers, kept_radii)
}

fn smooth(radii: &[f32], amount: f32) -> Vec<f32> {
    if radii.len() < 3 || amount <= 0.0 {
        return radii.to_vec();
    }
    let w = amount.clamp(0.0, 1.0) / 2.0;
    (0..radii.len())
        .map(|i| {
            let prev = radii[i.saturating_sub(1)];
            let next = radii[(i + 1).min(radii.len() - 1)];
            radii[i] * (1.0 - w) + (prev + next) * w / 2.0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    #[test]
    fn single_point_has_no_outline() {
        assert!(stroke_outline(&[pos2(1.0, 1.0)], &[2.0], OutlineOptions::default()).is_none());
        let jitter = [pos2(1.0, 1.0), pos2(1.1, 1.0), pos2(1.0, 1.1)];
        assert!(stroke_outline(&jitter, &[2.0; 3], OutlineOptions::default()).is_none());
    }

    #[test]
    fn horizontal_stroke_is_wrapped_by_radius() {
        let points: Vec<Pos2> = (0..=10).map(|i| pos2(i as f32 * 10.0, 50.0)).collect();
        let outline = stroke_outline(&points, &[3.0; 11], OutlineOptions::default()).unwrap();
        let min_y = outline.iter().map(|p| p.y).fold(f32::MAX, f32::min);
        let max_y = outline.iter().map(|p| p.y).fold(f32::MIN, f32::max);
        let max_x = outline.iter().map(|p| p.x).fold(f32::MIN, f32::max);
        assert!((min_y - 47.0).abs() < 0.01 && (max_y - 53.0).abs() < 0.01);
        assert!(max_x > 100.0 && max_x <= 103.01, "end cap reaches past the last point");
    }
}
