//! Demonstration sweep: a triangle wave across the horizontal travel with
//! the vertical axis tracing a parabola that peaks mid-sweep.

use crate::settings::VerticalLimits;

/// Degrees advanced per demo cycle
pub const DEMO_STEP: i32 = 2;
const SWEEP_MAX: i32 = 180;
const SWEEP_CENTER: i32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoSweep {
    position: i32,
    direction: i32,
}

impl Default for DemoSweep {
    fn default() -> Self {
        DemoSweep {
            position: 0,
            direction: 1,
        }
    }
}

impl DemoSweep {
    pub fn position(&self) -> i32 {
        self.position
    }

    /// +1 sweeping up, -1 sweeping down
    pub fn direction(&self) -> i32 {
        self.direction
    }

    pub fn reset(&mut self) {
        *self = DemoSweep::default();
    }

    /// Step the sweep and return the new horizontal position.
    pub fn advance(&mut self) -> i32 {
        self.position += DEMO_STEP * self.direction;
        if self.position >= SWEEP_MAX {
            self.position = SWEEP_MAX;
            self.direction = -1;
        } else if self.position <= 0 {
            self.position = 0;
            self.direction = 1;
        }
        self.position
    }
}

/// Vertical target for a sweep position: `max` at the center, `min` at
/// either edge. Fractional degrees are truncated toward zero.
pub fn vertical_target(horizontal: i32, limits: VerticalLimits) -> i32 {
    let progress = (horizontal - SWEEP_CENTER).abs() as f32 / SWEEP_CENTER as f32;
    let span = (limits.max - limits.min) as f32;
    (limits.max as f32 - progress * span) as i32
}
