//! Bring-up test patterns.

use crate::config::{PATTERN_CIRCLE_POINTS, PATTERN_RADIUS};
use crate::Sample;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Shape {
    Circle,
    Square,
    /// nothing is generated
    Off,
}

/// Endless sample sequence, one point per step. `Off` yields nothing.
#[derive(Clone, Copy, Debug)]
pub struct Pattern {
    shape: Shape,
    step: u32,
}

impl Pattern {
    pub const fn new(shape: Shape) -> Self {
        Self { shape, step: 0 }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Switches shape and restarts from the first point.
    pub fn set_shape(&mut self, shape: Shape) {
        if shape != self.shape {
            debug!("pattern: {}", shape);
        }
        self.shape = shape;
        self.step = 0;
    }

    fn circle(step: u32) -> Sample {
        let angle = 2.0 * core::f32::consts::PI * step as f32 / PATTERN_CIRCLE_POINTS as f32;
        let r = PATTERN_RADIUS as f32;

        let x = Sample::CENTER.x as f32 + r * libm::cosf(angle);
        let y = Sample::CENTER.y as f32 + r * libm::sinf(angle);
        Sample::new(libm::roundf(x) as u16, libm::roundf(y) as u16)
    }

    fn square(step: u32) -> Sample {
        let side_steps = PATTERN_CIRCLE_POINTS / 4;
        let r = PATTERN_RADIUS as i32;
        let (cx, cy) = (Sample::CENTER.x as i32, Sample::CENTER.y as i32);

        let d = 2 * r * (step % side_steps) as i32 / side_steps as i32;
        let (x, y) = match step / side_steps {
            0 => (cx - r + d, cy - r),
            1 => (cx + r, cy - r + d),
            2 => (cx + r - d, cy + r),
            _ => (cx - r, cy + r - d),
        };
        Sample::new(x as u16, y as u16)
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new(Shape::Off)
    }
}

impl Iterator for Pattern {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        let sample = match self.shape {
            Shape::Circle => Self::circle(self.step),
            Shape::Square => Self::square(self.step),
            Shape::Off => return None,
        };
        self.step = (self.step + 1) % PATTERN_CIRCLE_POINTS;
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: i32 = 0x8000;
    const R: i32 = PATTERN_RADIUS as i32;

    #[test]
    fn off_yields_nothing() {
        assert_eq!(Pattern::default().next(), None);
    }

    #[test]
    fn circle_starts_on_x_axis_and_stays_on_radius() {
        let mut p = Pattern::new(Shape::Circle);
        assert_eq!(p.next(), Some(Sample::new((C + R) as u16, C as u16)));

        let quarter = p.nth(PATTERN_CIRCLE_POINTS as usize / 4 - 1);
        assert_eq!(quarter, Some(Sample::new(C as u16, (C + R) as u16)));

        for s in Pattern::new(Shape::Circle).take(PATTERN_CIRCLE_POINTS as usize) {
            let (dx, dy) = ((s.x as i32 - C) as f32, (s.y as i32 - C) as f32);
            let r = libm::sqrtf(dx * dx + dy * dy);
            assert!((r - R as f32).abs() < 2.0, "{:?} off the circle", s);
        }
    }

    #[test]
    fn square_walks_the_perimeter() {
        let points: Vec<_> = Pattern::new(Shape::Square)
            .take(PATTERN_CIRCLE_POINTS as usize)
            .collect();

        let (lo, hi) = ((C - R) as u16, (C + R) as u16);
        assert_eq!(points[0], Sample::new(lo, lo));
        assert_eq!(points[PATTERN_CIRCLE_POINTS as usize / 4], Sample::new(hi, lo));
        assert_eq!(points[PATTERN_CIRCLE_POINTS as usize / 2], Sample::new(hi, hi));

        for s in points {
            assert!(s.x == lo || s.x == hi || s.y == lo || s.y == hi);
            assert!((lo..=hi).contains(&s.x) && (lo..=hi).contains(&s.y));
        }
    }

    #[test]
    fn patterns_repeat_and_restart_on_switch() {
        let mut p = Pattern::new(Shape::Square);
        let first = p.next();
        p.nth(PATTERN_CIRCLE_POINTS as usize - 2);
        assert_eq!(p.next(), first);

        p.next();
        p.set_shape(Shape::Circle);
        assert_eq!(p.shape(), Shape::Circle);
        assert_eq!(p.next(), Pattern::new(Shape::Circle).next());
    }
}
