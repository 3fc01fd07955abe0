//!
//! This module resolves the size constraints of a client from the hints it advertises and the screen it lives on.
use crate::geometry::{Rect, center, fit};

/// The smallest width a client is ever given.
pub const MIN_WIDTH: i32 = 10;
/// The smallest height a client is ever given.
pub const MIN_HEIGHT: i32 = 10;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
/// The subset of `WM_NORMAL_HINTS` the manager cares about, already decoded.
pub struct NormalHints {
    /// A position requested by the user or the program.
    pub position: Option<(i32, i32)>,
    /// A size requested by the user or the program.
    pub size: Option<(i32, i32)>,
    pub min_size: Option<(i32, i32)>,
    pub max_size: Option<(i32, i32)>,
    pub base_size: Option<(i32, i32)>,
    pub increment: Option<(i32, i32)>,
    /// Minimum and maximum aspect as `(numerator, denominator)` pairs.
    pub aspect: Option<((i32, i32), (i32, i32))>,
}

#[derive(Clone, Copy, PartialEq, Debug)]
/// Resolved size constraints of a client.
pub struct SizeConstraints {
    pub min_width: i32,
    pub min_height: i32,
    pub max_width: i32,
    pub max_height: i32,
    pub inc_width: i32,
    pub inc_height: i32,
    /// The minimum width/height ratio. `0.0` disables the constraint.
    pub min_ratio: f32,
    /// The maximum width/height ratio. `0.0` disables the constraint.
    pub max_ratio: f32,
    /// Set when the advertised minimum and maximum sizes are equal.
    pub fixed: bool,
}

impl Default for SizeConstraints {
    fn default() -> Self {
        Self {
            min_width: MIN_WIDTH,
            min_height: MIN_HEIGHT,
            max_width: i32::MAX,
            max_height: i32::MAX,
            inc_width: 1,
            inc_height: 1,
            min_ratio: 0.0,
            max_ratio: 0.0,
            fixed: false,
        }
    }
}

fn ratio((numerator, denominator): (i32, i32)) -> f32 {
    if numerator <= 0 || denominator <= 0 {
        0.0
    } else {
        numerator as f32 / denominator as f32
    }
}

/// Resolves the minimum of one dimension. Advertised minimums beyond the screen are clamped to the screen.
fn resolve_min(advertised: Option<i32>, floor: i32, screen: i32) -> i32 {
    match advertised {
        Some(min) if min > screen => screen.max(1),
        Some(min) => min.max(floor),
        None => floor,
    }
}

/// Resolves the maximum of one dimension. Only advertised maximums below the default win.
fn resolve_max(advertised: Option<i32>, default: i32) -> i32 {
    match advertised {
        Some(max) if max > 0 => max.min(default),
        _ => default,
    }
}

impl SizeConstraints {
    /// Resolves constraints from optional hints, the working area of the owning screen and the border width.
    #[must_use]
    pub fn resolve(hints: Option<&NormalHints>, work: &Rect, border: i32) -> Self {
        let Some(hints) = hints else {
            return Self {
                max_width: (work.width - 2 * border).max(MIN_WIDTH),
                max_height: (work.height - 2 * border).max(MIN_HEIGHT),
                ..Self::default()
            };
        };

        let min_width = resolve_min(hints.min_size.map(|s| s.0), MIN_WIDTH, work.width);
        let min_height = resolve_min(hints.min_size.map(|s| s.1), MIN_HEIGHT, work.height);
        let max_width = resolve_max(hints.max_size.map(|s| s.0), work.width - 2 * border)
            .max(min_width);
        let max_height = resolve_max(hints.max_size.map(|s| s.1), work.height - 2 * border)
            .max(min_height);

        let (inc_width, inc_height) = hints
            .increment
            .map_or((1, 1), |(w, h)| (w.max(1), h.max(1)));
        let (min_ratio, max_ratio) = hints
            .aspect
            .map_or((0.0, 0.0), |(min, max)| (ratio(min), ratio(max)));

        let fixed = matches!(
            (hints.min_size, hints.max_size),
            (Some(min), Some(max)) if min == max && min.0 > 0 && min.1 > 0
        );

        Self {
            min_width,
            min_height,
            max_width,
            max_height,
            inc_width,
            inc_height,
            min_ratio,
            max_ratio,
            fixed,
        }
    }

    /// Aligns a width to the constraints.
    #[must_use]
    pub fn align_width(&self, width: i32) -> i32 {
        align(width, self.min_width, self.max_width, self.inc_width)
    }

    /// Aligns a height to the constraints.
    #[must_use]
    pub fn align_height(&self, height: i32) -> i32 {
        align(height, self.min_height, self.max_height, self.inc_height)
    }

    /// Applies every constraint to a geometry and returns the constrained size.
    ///
    /// The aspect ratio is applied before the increments so the final size is always increment aligned.
    #[must_use]
    pub fn apply(&self, width: i32, height: i32) -> (i32, i32) {
        let mut width = width.clamp(self.min_width, self.max_width);
        let mut height = height.clamp(self.min_height, self.max_height);

        if self.min_ratio > 0.0 && (width as f32) < self.min_ratio * height as f32 {
            height = ((width as f32 / self.min_ratio) as i32).max(self.min_height);
        }
        if self.max_ratio > 0.0 && (width as f32) > self.max_ratio * height as f32 {
            width = ((height as f32 * self.max_ratio) as i32).max(self.min_width);
        }

        (self.align_width(width), self.align_height(height))
    }

    /// Returns whether a size satisfies the constraints.
    #[must_use]
    pub fn accepts(&self, width: i32, height: i32) -> bool {
        (self.min_width..=self.max_width).contains(&width)
            && (self.min_height..=self.max_height).contains(&height)
            && (self.inc_width <= 1 || width % self.inc_width == 0)
            && (self.inc_height <= 1 || height % self.inc_height == 0)
    }
}

/// Computes the geometry a client gets when it starts floating.
///
/// The size is taken from the minimum, the base and the requested size in that order, each overriding the last. Without a requested position the window is centered on `work`.
#[must_use]
pub fn initial_float_geometry(
    hints: Option<&NormalHints>,
    constraints: &SizeConstraints,
    current: Rect,
    border: i32,
    work: &Rect,
) -> Rect {
    let mut size = (current.width, current.height);
    let mut position = None;

    if let Some(hints) = hints {
        for candidate in [hints.min_size, hints.base_size, hints.size]
            .into_iter()
            .flatten()
        {
            if candidate.0 > 0 && candidate.1 > 0 {
                size = candidate;
            }
        }
        position = hints.position;
    }

    let (width, height) = constraints.apply(size.0, size.1);
    match position {
        Some((x, y)) => fit(
            Rect {
                x,
                y,
                width,
                height,
            },
            border,
            work,
        ),
        None => center(width, height, border, work),
    }
}

/// Clamps `value` and rounds it down to a multiple of `increment`, stepping back up when that falls below `min`.
fn align(value: i32, min: i32, max: i32, increment: i32) -> i32 {
    let value = value.clamp(min, max);
    if increment <= 1 {
        return value;
    }
    let aligned = value - value % increment;
    if aligned >= min {
        return aligned;
    }
    let raised = aligned + increment;
    if raised <= max { raised } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORK: Rect = Rect::new(0, 0, 1280, 1000);

    #[test]
    fn missing_hints_use_defaults() {
        let c = SizeConstraints::resolve(None, &WORK, 2);
        assert_eq!((c.min_width, c.min_height), (MIN_WIDTH, MIN_HEIGHT));
        assert_eq!((c.max_width, c.max_height), (1276, 996));
        assert_eq!((c.inc_width, c.inc_height), (1, 1));
        assert!(c.min_ratio == 0.0 && c.max_ratio == 0.0);
        assert!(!c.fixed);
    }

    #[test]
    fn oversized_minimum_is_clamped_to_the_screen() {
        let hints = NormalHints {
            min_size: Some((4000, 50)),
            ..NormalHints::default()
        };
        let c = SizeConstraints::resolve(Some(&hints), &WORK, 0);
        assert_eq!(c.min_width, 1280);
        assert_eq!(c.min_height, 50);
    }

    #[test]
    fn smaller_maximum_wins_and_larger_is_clamped() {
        let hints = NormalHints {
            max_size: Some((300, 5000)),
            ..NormalHints::default()
        };
        let c = SizeConstraints::resolve(Some(&hints), &WORK, 1);
        assert_eq!(c.max_width, 300);
        assert_eq!(c.max_height, 998);
    }

    #[test]
    fn equal_min_and_max_is_fixed() {
        let hints = NormalHints {
            min_size: Some((200, 100)),
            max_size: Some((200, 100)),
            ..NormalHints::default()
        };
        assert!(SizeConstraints::resolve(Some(&hints), &WORK, 1).fixed);
    }

    #[test]
    fn sizes_are_increment_aligned() {
        let hints = NormalHints {
            increment: Some((10, 7)),
            min_size: Some((100, 20)),
            ..NormalHints::default()
        };
        let c = SizeConstraints::resolve(Some(&hints), &WORK, 0);
        assert_eq!(c.apply(155, 100), (150, 98));
        assert_eq!(c.align_width(104), 100);
        assert!(c.accepts(150, 98));
        assert!(!c.accepts(155, 98));
    }

    #[test]
    fn alignment_never_drops_below_the_minimum() {
        assert_eq!(align(105, 105, 500, 10), 110);
        assert_eq!(align(3, 105, 500, 10), 110);
    }

    #[test]
    fn aspect_ratio_limits_are_applied() {
        let hints = NormalHints {
            aspect: Some(((1, 1), (2, 1))),
            ..NormalHints::default()
        };
        let c = SizeConstraints::resolve(Some(&hints), &WORK, 0);
        assert_eq!(c.apply(100, 400), (100, 100));
        assert_eq!(c.apply(900, 100), (200, 100));
    }

    #[test]
    fn float_geometry_prefers_requested_size_and_centers() {
        let hints = NormalHints {
            min_size: Some((100, 50)),
            size: Some((300, 200)),
            ..NormalHints::default()
        };
        let c = SizeConstraints::resolve(Some(&hints), &WORK, 0);
        let rect = initial_float_geometry(Some(&hints), &c, Rect::new(0, 0, 640, 480), 0, &WORK);
        assert_eq!(rect, Rect::new(490, 400, 300, 200));
    }

    #[test]
    fn float_geometry_uses_requested_position() {
        let hints = NormalHints {
            position: Some((1200, 40)),
            base_size: Some((200, 100)),
            ..NormalHints::default()
        };
        let c = SizeConstraints::resolve(Some(&hints), &WORK, 1);
        let rect = initial_float_geometry(Some(&hints), &c, Rect::new(0, 0, 640, 480), 1, &WORK);
        assert_eq!(rect, Rect::new(1078, 40, 200, 100));
    }
}
