pub mod sensors {
    use embedded_hal::delay::DelayNs;

    /// Raw reads from a single analog input.
    pub trait AnalogSampler {
        fn read_raw(&mut self) -> anyhow::Result<u16>;
    }

    /// Panel supply voltage seen through a resistor divider.
    ///
    /// `volts = (average_raw / max_raw) * reference_voltage * (r1 + r2) / r2`
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct PanelVoltmeter {
        pub r1_ohms: f32,
        pub r2_ohms: f32,
        pub reference_voltage: f32,
        pub max_raw: u16,
        pub samples: u8,
        pub sample_interval_ms: u32,
    }

    impl Default for PanelVoltmeter {
        fn default() -> Self {
            PanelVoltmeter {
                r1_ohms: 10_000.0,
                r2_ohms: 5_100.0,
                reference_voltage: 3.3,
                max_raw: 4095,
                samples: 10,
                sample_interval_ms: 2,
            }
        }
    }

    impl PanelVoltmeter {
        pub fn divider_ratio(&self) -> f32 {
            (self.r1_ohms + self.r2_ohms) / self.r2_ohms
        }

        pub fn convert(&self, average_raw: f32) -> f32 {
            (average_raw / self.max_raw as f32) * self.reference_voltage * self.divider_ratio()
        }

        /// Averages `samples` raw reads, pausing between each one.
        pub fn measure<S, D>(&self, sampler: &mut S, delay: &mut D) -> anyhow::Result<f32>
        where
            S: AnalogSampler + ?Sized,
            D: DelayNs + ?Sized,
        {
            let count = self.samples.max(1);
            let mut sum: u32 = 0;
            for _ in 0..count {
                sum += sampler.read_raw()? as u32;
                delay.delay_ms(self.sample_interval_ms);
            }
            let volts = self.convert(sum as f32 / count as f32);
            log::debug!("Panel voltage: {:.2} V (raw sum {})", volts, sum);
            Ok(volts)
        }
    }
}

#[cfg(target_os = "espidf")]
pub mod adc {
    use esp_idf_svc::hal::adc::attenuation::DB_11;
    use esp_idf_svc::hal::adc::oneshot::config::AdcChannelConfig;
    use esp_idf_svc::hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
    use esp_idf_svc::hal::adc::ADC1;
    use esp_idf_svc::hal::gpio::Gpio34;

    use crate::sensors::AnalogSampler;

    /// Supply divider tap on GPIO34, 12-bit one-shot reads at 11 dB.
    pub struct AdcSampler<'a> {
        channel: AdcChannelDriver<'a, Gpio34, AdcDriver<'a, ADC1>>,
    }

    impl AdcSampler<'_> {
        pub fn new<'a>(adc: ADC1, pin: Gpio34) -> anyhow::Result<AdcSampler<'a>> {
            let driver = AdcDriver::new(adc)?;
            let config = AdcChannelConfig {
                attenuation: DB_11,
                ..Default::default()
            };
            let channel = AdcChannelDriver::new(driver, pin, &config)?;
            Ok(AdcSampler { channel })
        }
    }

    impl AnalogSampler for AdcSampler<'_> {
        fn read_raw(&mut self) -> anyhow::Result<u16> {
            Ok(self.channel.read_raw()?)
        }
    }
}

pub use sensors::{AnalogSampler, PanelVoltmeter};
