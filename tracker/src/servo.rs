use anyhow::{anyhow, Result};
use embedded_hal::pwm::SetDutyCycle;

// 50 Hz hobby servo framing
const PERIOD_US: u32 = 20_000;
pub const MIN_PULSE_US: u32 = 500;
pub const MAX_PULSE_US: u32 = 2400;
pub const MAX_ANGLE: i32 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

pub const AXES: [Axis; 2] = [Axis::Horizontal, Axis::Vertical];

/// Two-axis actuator driver. Angles arrive pre-clamped; an angle outside
/// 0..=180 is an error, never silently corrected.
pub trait Actuators {
    fn attach(&mut self, axis: Axis) -> Result<()>;
    fn detach(&mut self, axis: Axis) -> Result<()>;
    fn is_attached(&self, axis: Axis) -> bool;
    fn write_angle(&mut self, axis: Axis, degrees: i32) -> Result<()>;
}

/// A single servo on a PWM channel. Detached means no pulses (duty 0).
pub struct PwmServo<P> {
    pwm: P,
    attached: bool,
    angle: Option<i32>,
}

impl<P: SetDutyCycle> PwmServo<P> {
    pub fn new(pwm: P) -> Self {
        PwmServo {
            pwm,
            attached: false,
            angle: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Last angle written, kept across detach
    pub fn angle(&self) -> Option<i32> {
        self.angle
    }

    pub fn attach(&mut self) -> Result<()> {
        if self.attached {
            return Ok(());
        }
        self.attached = true;
        if let Some(angle) = self.angle {
            self.apply(angle)?;
        }
        Ok(())
    }

    pub fn detach(&mut self) -> Result<()> {
        if !self.attached {
            return Ok(());
        }
        self.pwm
            .set_duty_cycle_fully_off()
            .map_err(|e| anyhow!("pwm error: {:?}", e))?;
        self.attached = false;
        Ok(())
    }

    pub fn write(&mut self, degrees: i32) -> Result<()> {
        if !(0..=MAX_ANGLE).contains(&degrees) {
            return Err(anyhow!("servo angle {} outside 0..={}", degrees, MAX_ANGLE));
        }
        if !self.attached {
            return Err(anyhow!("servo is detached"));
        }
        self.apply(degrees)?;
        self.angle = Some(degrees);
        Ok(())
    }

    fn apply(&mut self, degrees: i32) -> Result<()> {
        let duty = self.duty_for(degrees);
        self.pwm
            .set_duty_cycle(duty)
            .map_err(|e| anyhow!("pwm error: {:?}", e))
    }

    fn duty_for(&self, degrees: i32) -> u16 {
        let span_us = MAX_PULSE_US - MIN_PULSE_US;
        let pulse_us = MIN_PULSE_US + (degrees as u32 * span_us) / MAX_ANGLE as u32;
        ((pulse_us * self.pwm.max_duty_cycle() as u32) / PERIOD_US) as u16
    }
}

/// Horizontal and vertical servos of the mount
pub struct ServoPair<H, V> {
    pub horizontal: PwmServo<H>,
    pub vertical: PwmServo<V>,
}

impl<H: SetDutyCycle, V: SetDutyCycle> ServoPair<H, V> {
    pub fn new(horizontal: H, vertical: V) -> Self {
        ServoPair {
            horizontal: PwmServo::new(horizontal),
            vertical: PwmServo::new(vertical),
        }
    }
}

impl<H: SetDutyCycle, V: SetDutyCycle> Actuators for ServoPair<H, V> {
    fn attach(&mut self, axis: Axis) -> Result<()> {
        match axis {
            Axis::Horizontal => self.horizontal.attach(),
            Axis::Vertical => self.vertical.attach(),
        }
    }

    fn detach(&mut self, axis: Axis) -> Result<()> {
        match axis {
            Axis::Horizontal => self.horizontal.detach(),
            Axis::Vertical => self.vertical.detach(),
        }
    }

    fn is_attached(&self, axis: Axis) -> bool {
        match axis {
            Axis::Horizontal => self.horizontal.is_attached(),
            Axis::Vertical => self.vertical.is_attached(),
        }
    }

    fn write_angle(&mut self, axis: Axis, degrees: i32) -> Result<()> {
        match axis {
            Axis::Horizontal => self.horizontal.write(degrees),
            Axis::Vertical => self.vertical.write(degrees),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::pwm::ErrorType;

    /// Duty counts equal microseconds of pulse width
    #[derive(Default)]
    struct MicrosecondPwm {
        duty: u16,
    }

    impl ErrorType for MicrosecondPwm {
        type Error = Infallible;
    }

    impl SetDutyCycle for MicrosecondPwm {
        fn max_duty_cycle(&self) -> u16 {
            20_000
        }

        fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
            self.duty = duty;
            Ok(())
        }
    }

    #[test]
    fn angle_maps_onto_pulse_range() {
        let mut servo = PwmServo::new(MicrosecondPwm::default());
        servo.attach().unwrap();
        servo.write(0).unwrap();
        assert_eq!(servo.pwm.duty, 500);
        servo.write(90).unwrap();
        assert_eq!(servo.pwm.duty, 1450);
        servo.write(180).unwrap();
        assert_eq!(servo.pwm.duty, 2400);
    }

    #[test]
    fn out_of_range_angle_is_rejected() {
        let mut servo = PwmServo::new(MicrosecondPwm::default());
        servo.attach().unwrap();
        servo.write(45).unwrap();
        assert!(servo.write(181).is_err());
        assert!(servo.write(-1).is_err());
        assert_eq!(servo.angle(), Some(45));
        assert_eq!(servo.pwm.duty, 975);
    }

    #[test]
    fn detach_stops_pulses_and_reattach_restores_angle() {
        let mut servo = PwmServo::new(MicrosecondPwm::default());
        servo.attach().unwrap();
        servo.write(90).unwrap();
        servo.detach().unwrap();
        assert_eq!(servo.pwm.duty, 0);
        assert!(!servo.is_attached());
        assert!(servo.write(10).is_err());
        servo.attach().unwrap();
        assert_eq!(servo.pwm.duty, 1450);
    }

    #[test]
    fn pair_routes_by_axis() {
        let mut pair = ServoPair::new(MicrosecondPwm::default(), MicrosecondPwm::default());
        pair.attach(Axis::Horizontal).unwrap();
        pair.write_angle(Axis::Horizontal, 180).unwrap();
        assert!(pair.write_angle(Axis::Vertical, 90).is_err());
        assert!(pair.is_attached(Axis::Horizontal));
        assert!(!pair.is_attached(Axis::Vertical));
        assert_eq!(pair.horizontal.pwm.duty, 2400);
    }
}
