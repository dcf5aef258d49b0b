use anyhow::Result;
use embedded_hal::delay::DelayNs;

use crate::servo::{Actuators, Axis, AXES, MAX_ANGLE};
use crate::settings::VerticalLimits;
use crate::state::TrackerState;

/// Pause between one-degree steps of a smooth move
pub const SMOOTH_STEP_MS: u32 = 40;
/// Both axes sit here during calibration
pub const CALIBRATION_ANGLE: i32 = 90;

pub fn clamp_horizontal(degrees: i32) -> i32 {
    degrees.clamp(0, MAX_ANGLE)
}

/// Lower bound wins if the limits are inverted.
pub fn clamp_vertical(degrees: i32, limits: VerticalLimits) -> i32 {
    if degrees < limits.min {
        limits.min
    } else if degrees > limits.max {
        limits.max
    } else {
        degrees
    }
}

/// The two servos plus the primitives that move them. The recorded
/// position lives in `TrackerState`, so every call takes the state it
/// updates.
pub struct Mount<A> {
    actuators: A,
}

impl<A: Actuators> Mount<A> {
    pub fn new(actuators: A) -> Self {
        Mount { actuators }
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    #[cfg(test)]
    pub(crate) fn actuators_mut(&mut self) -> &mut A {
        &mut self.actuators
    }

    pub fn is_powered(&self) -> bool {
        AXES.iter().all(|axis| self.actuators.is_attached(*axis))
    }

    pub fn power_up(&mut self) -> Result<()> {
        for axis in AXES {
            if !self.actuators.is_attached(axis) {
                self.actuators.attach(axis)?;
            }
        }
        Ok(())
    }

    /// Cut drive current. The recorded position is left alone.
    pub fn power_down(&mut self) -> Result<()> {
        for axis in AXES {
            if self.actuators.is_attached(axis) {
                self.actuators.detach(axis)?;
            }
        }
        Ok(())
    }

    /// Jump straight to `(horizontal, vertical)` after clamping.
    pub fn set_position(
        &mut self,
        state: &mut TrackerState,
        limits: VerticalLimits,
        horizontal: i32,
        vertical: i32,
    ) -> Result<()> {
        self.power_up()?;
        state.current_horizontal = clamp_horizontal(horizontal);
        state.current_vertical = clamp_vertical(vertical, limits);
        self.write(state)
    }

    /// Walk both axes one degree per step toward the clamped target,
    /// sleeping `SMOOTH_STEP_MS` after every step. Blocks the caller for
    /// the whole move: `SMOOTH_STEP_MS` times the longer axis distance.
    pub fn smooth_move_to<D: DelayNs + ?Sized>(
        &mut self,
        state: &mut TrackerState,
        limits: VerticalLimits,
        horizontal: i32,
        vertical: i32,
        delay: &mut D,
    ) -> Result<()> {
        self.power_up()?;
        let target_h = clamp_horizontal(horizontal);
        let target_v = clamp_vertical(vertical, limits);
        log::debug!(
            "Smooth move {}/{} -> {}/{}",
            state.current_horizontal,
            state.current_vertical,
            target_h,
            target_v
        );

        while state.current_horizontal != target_h || state.current_vertical != target_v {
            state.current_horizontal += (target_h - state.current_horizontal).signum();
            state.current_vertical += (target_v - state.current_vertical).signum();
            self.write(state)?;
            delay.delay_ms(SMOOTH_STEP_MS);
        }
        Ok(())
    }

    /// Fixed 90/90 calibration pose. Ignores the vertical limits.
    pub fn hold_calibration_pose(&mut self, state: &mut TrackerState) -> Result<()> {
        self.power_up()?;
        state.current_horizontal = CALIBRATION_ANGLE;
        state.current_vertical = CALIBRATION_ANGLE;
        self.write(state)
    }

    fn write(&mut self, state: &TrackerState) -> Result<()> {
        self.actuators
            .write_angle(Axis::Horizontal, state.current_horizontal)?;
        self.actuators
            .write_angle(Axis::Vertical, state.current_vertical)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Records every driver call; failures can be injected.
    #[derive(Default)]
    pub struct FakeServos {
        pub attached: [bool; 2],
        pub writes: Vec<(i32, i32)>,
        pending: Option<i32>,
        pub attaches: usize,
        pub detaches: usize,
        pub fail_writes: bool,
    }

    fn index(axis: Axis) -> usize {
        match axis {
            Axis::Horizontal => 0,
            Axis::Vertical => 1,
        }
    }

    impl Actuators for FakeServos {
        fn attach(&mut self, axis: Axis) -> Result<()> {
            self.attached[index(axis)] = true;
            self.attaches += 1;
            Ok(())
        }

        fn detach(&mut self, axis: Axis) -> Result<()> {
            self.attached[index(axis)] = false;
            self.detaches += 1;
            Ok(())
        }

        fn is_attached(&self, axis: Axis) -> bool {
            self.attached[index(axis)]
        }

        fn write_angle(&mut self, axis: Axis, degrees: i32) -> Result<()> {
            if self.fail_writes {
                anyhow::bail!("bus fault");
            }
            assert!((0..=180).contains(&degrees));
            match axis {
                Axis::Horizontal => self.pending = Some(degrees),
                Axis::Vertical => {
                    let h = self.pending.take().expect("horizontal written first");
                    self.writes.push((h, degrees));
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct Pauses(pub Vec<u32>);

    impl DelayNs for Pauses {
        fn delay_ns(&mut self, _ns: u32) {}

        fn delay_ms(&mut self, ms: u32) {
            self.0.push(ms);
        }
    }

    const LIMITS: VerticalLimits = VerticalLimits { min: 15, max: 90 };

    #[test]
    fn set_position_clamps_and_powers_up() {
        let mut mount = Mount::new(FakeServos::default());
        let mut state = TrackerState::default();
        mount.set_position(&mut state, LIMITS, 250, 5).unwrap();
        assert_eq!((state.current_horizontal, state.current_vertical), (180, 15));
        assert_eq!(mount.actuators().writes, vec![(180, 15)]);
        assert!(mount.is_powered());
    }

    #[test]
    fn power_toggles_are_idempotent() {
        let mut mount = Mount::new(FakeServos::default());
        mount.power_up().unwrap();
        mount.power_up().unwrap();
        assert_eq!(mount.actuators().attaches, 2);
        mount.power_down().unwrap();
        mount.power_down().unwrap();
        assert_eq!(mount.actuators().detaches, 2);
        assert!(!mount.is_powered());
    }

    #[test]
    fn power_down_keeps_recorded_position() {
        let mut mount = Mount::new(FakeServos::default());
        let mut state = TrackerState::default();
        mount.set_position(&mut state, LIMITS, 30, 40).unwrap();
        mount.power_down().unwrap();
        assert_eq!((state.current_horizontal, state.current_vertical), (30, 40));
    }

    #[test]
    fn smooth_move_steps_each_axis_at_its_own_pace() {
        let mut mount = Mount::new(FakeServos::default());
        let mut state = TrackerState::default();
        state.current_horizontal = 10;
        state.current_vertical = 20;
        let mut pauses = Pauses::default();
        mount
            .smooth_move_to(&mut state, LIMITS, 14, 18, &mut pauses)
            .unwrap();
        assert_eq!(
            mount.actuators().writes,
            vec![(11, 19), (12, 18), (13, 18), (14, 18)]
        );
        assert_eq!(pauses.0, vec![SMOOTH_STEP_MS; 4]);
    }

    #[test]
    fn smooth_move_to_current_position_does_nothing() {
        let mut mount = Mount::new(FakeServos::default());
        let mut state = TrackerState::default();
        let mut pauses = Pauses::default();
        mount
            .smooth_move_to(&mut state, LIMITS, 90, 90, &mut pauses)
            .unwrap();
        assert!(mount.actuators().writes.is_empty());
        assert!(pauses.0.is_empty());
    }

    #[test]
    fn calibration_pose_ignores_vertical_limits() {
        let mut mount = Mount::new(FakeServos::default());
        let mut state = TrackerState::default();
        let narrow = VerticalLimits { min: 20, max: 60 };
        mount.set_position(&mut state, narrow, 0, 0).unwrap();
        mount.hold_calibration_pose(&mut state).unwrap();
        assert_eq!((state.current_horizontal, state.current_vertical), (90, 90));
    }

    #[test]
    fn failed_write_is_reported() {
        let mut mount = Mount::new(FakeServos {
            fail_writes: true,
            ..FakeServos::default()
        });
        let mut state = TrackerState::default();
        assert!(mount.set_position(&mut state, LIMITS, 10, 20).is_err());
    }

    proptest! {
        #[test]
        fn clamps_stay_in_travel(
            h in any::<i32>(), v in any::<i32>(), min in 0i32..=180, span in 0i32..=180
        ) {
            let limits = VerticalLimits { min, max: (min + span).min(180) };
            let ch = clamp_horizontal(h);
            let cv = clamp_vertical(v, limits);
            prop_assert!((0..=180).contains(&ch));
            prop_assert!(cv >= limits.min && cv <= limits.max);
        }

        #[test]
        fn smooth_move_is_monotonic_and_exact(
            h0 in 0i32..=180, v0 in 15i32..=90, h1 in -50i32..=250, v1 in -20i32..=200
        ) {
            let mut mount = Mount::new(FakeServos::default());
            let mut state = TrackerState::default();
            state.current_horizontal = h0;
            state.current_vertical = v0;
            let mut pauses = Pauses::default();
            mount.smooth_move_to(&mut state, LIMITS, h1, v1, &mut pauses).unwrap();

            let th = clamp_horizontal(h1);
            let tv = clamp_vertical(v1, LIMITS);
            prop_assert_eq!((state.current_horizontal, state.current_vertical), (th, tv));

            let writes = &mount.actuators().writes;
            prop_assert_eq!(writes.len() as i32, (th - h0).abs().max((tv - v0).abs()));

            let mut hs: Vec<i32> = vec![h0];
            hs.extend(writes.iter().map(|w| w.0));
            hs.dedup();
            let expected_h: Vec<i32> = if th >= h0 {
                (h0..=th).collect()
            } else {
                (th..=h0).rev().collect()
            };
            prop_assert_eq!(hs, expected_h);

            let mut vs: Vec<i32> = vec![v0];
            vs.extend(writes.iter().map(|w| w.1));
            vs.dedup();
            let expected_v: Vec<i32> = if tv >= v0 {
                (v0..=tv).collect()
            } else {
                (tv..=v0).rev().collect()
            };
            prop_assert_eq!(vs, expected_v);
        }
    }
}
