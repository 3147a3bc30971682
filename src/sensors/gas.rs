use anyhow::{Context as _, Result, bail, ensure};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::{config::GasSampling, reading::GasConcentrations, sensors::Adc};

/// Load resistance on the MQ-2 board, in kΩ.
const LOAD_RESISTANCE_KOHM: f64 = 5.0;

/// Rs/Ro in clean air, from the MQ-2 datasheet.
const CLEAN_AIR_FACTOR: f64 = 9.83;

/// Sensitivity curves as (x, y, slope) points on the datasheet's log-log plot.
const LPG_CURVE: [f64; 3] = [2.3, 0.21, -0.47];
const CO_CURVE: [f64; 3] = [2.3, 0.72, -0.34];
const SMOKE_CURVE: [f64; 3] = [2.3, 0.53, -0.44];

/// An MQ-2 gas sensor read through an ADC channel.
pub struct GasSensor {
    adc: Box<dyn Adc>,
    ro: f64,
    sampling: GasSampling,
}

impl GasSensor {
    /// Captures the clean-air baseline resistance. Must run with the sensor in
    /// clean air; takes `calibration_samples * calibration_interval`.
    pub async fn calibrate(mut adc: Box<dyn Adc>, sampling: GasSampling) -> Result<Self> {
        info!(
            samples = sampling.calibration_samples,
            "calibrating gas sensor"
        );

        let rs = average_resistance(
            adc.as_mut(),
            sampling.calibration_samples,
            sampling.calibration_interval,
        )
        .await
        .context("failed to sample gas sensor during calibration")?;

        let ro = rs / CLEAN_AIR_FACTOR;
        ensure!(
            ro.is_finite() && ro > 0.0,
            "gas sensor calibration produced an invalid baseline: {ro}"
        );

        info!(ro, "gas sensor calibrated");

        Ok(Self { adc, ro, sampling })
    }

    pub fn baseline(&self) -> f64 {
        self.ro
    }

    pub async fn read(&mut self) -> Result<GasConcentrations> {
        let rs = average_resistance(
            self.adc.as_mut(),
            self.sampling.read_samples,
            self.sampling.read_interval,
        )
        .await?;
        let ratio = rs / self.ro;
        debug!(rs, ratio, "gas sensor sampled");

        Ok(GasConcentrations {
            lpg: Some(percentage(ratio, LPG_CURVE).context("failed to compute LPG")?),
            co: Some(percentage(ratio, CO_CURVE).context("failed to compute CO")?),
            smoke: Some(percentage(ratio, SMOKE_CURVE).context("failed to compute smoke")?),
        })
    }
}

async fn average_resistance(
    adc: &mut dyn Adc,
    samples: u32,
    interval: std::time::Duration,
) -> Result<f64> {
    let samples = samples.max(1);
    let mut total = 0.0;
    for i in 0..samples {
        let raw = adc.read_raw().context("failed to read ADC")?;
        total += resistance(raw, adc.max_value())?;
        if i + 1 < samples {
            sleep(interval).await;
        }
    }

    Ok(total / samples as f64)
}

/// Sensor resistance in kΩ for a raw ADC value.
pub fn resistance(raw: u16, max: u16) -> Result<f64> {
    if raw == 0 {
        bail!("ADC reading is zero");
    }
    if raw > max {
        bail!("ADC reading out of range: expected 1-{max}, got {raw}");
    }

    Ok(LOAD_RESISTANCE_KOHM * f64::from(max - raw) / f64::from(raw))
}

fn percentage(rs_ro_ratio: f64, curve: [f64; 3]) -> Result<f64> {
    if !(rs_ro_ratio.is_finite() && rs_ro_ratio > 0.0) {
        bail!("Rs/Ro ratio out of range: {rs_ro_ratio}");
    }

    let value = 10f64.powf((rs_ro_ratio.ln() - curve[1]) / curve[2] + curve[0]);
    if !value.is_finite() {
        bail!("concentration is not finite for Rs/Ro {rs_ro_ratio}");
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    struct ScriptedAdc {
        values: VecDeque<u16>,
        fallback: u16,
    }

    impl ScriptedAdc {
        fn constant(value: u16) -> Self {
            Self {
                values: VecDeque::new(),
                fallback: value,
            }
        }
    }

    impl Adc for ScriptedAdc {
        fn read_raw(&mut self) -> Result<u16> {
            Ok(self.values.pop_front().unwrap_or(self.fallback))
        }

        fn max_value(&self) -> u16 {
            1023
        }
    }

    #[test]
    fn resistance_follows_voltage_divider() {
        assert_eq!(resistance(1023, 1023).unwrap(), 0.0);
        assert!((resistance(512, 1023).unwrap() - 4.990_234_375).abs() < 1e-9);
        assert!(resistance(0, 1023).is_err());
        assert!(resistance(1024, 1023).is_err());
    }

    #[test]
    fn clean_air_ratio_maps_onto_curves() {
        let lpg = percentage(CLEAN_AIR_FACTOR, LPG_CURVE).unwrap();
        let co = percentage(CLEAN_AIR_FACTOR, CO_CURVE).unwrap();
        let smoke = percentage(CLEAN_AIR_FACTOR, SMOKE_CURVE).unwrap();

        assert!(lpg > 0.0 && lpg < 1.0, "{lpg}");
        assert!(co > 0.0 && co < 1.0, "{co}");
        assert!(smoke > 0.0 && smoke < 1.0, "{smoke}");
    }

    #[test]
    fn zero_ratio_is_an_error() {
        assert!(percentage(0.0, LPG_CURVE).is_err());
        assert!(percentage(f64::NAN, LPG_CURVE).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn calibration_averages_samples() {
        let adc = ScriptedAdc {
            values: VecDeque::from([256, 512, 768]),
            fallback: 512,
        };
        let sampling = GasSampling {
            calibration_samples: 3,
            ..GasSampling::default()
        };

        let sensor = GasSensor::calibrate(Box::new(adc), sampling).await.unwrap();

        let expected = (resistance(256, 1023).unwrap()
            + resistance(512, 1023).unwrap()
            + resistance(768, 1023).unwrap())
            / 3.0
            / CLEAN_AIR_FACTOR;
        assert!((sensor.baseline() - expected).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn calibration_fails_on_saturated_adc() {
        let result = GasSensor::calibrate(
            Box::new(ScriptedAdc::constant(1023)),
            GasSampling::default(),
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reading_in_clean_air_is_stable() {
        let mut sensor = GasSensor::calibrate(
            Box::new(ScriptedAdc::constant(300)),
            GasSampling::default(),
        )
        .await
        .unwrap();

        let first = sensor.read().await.unwrap();
        let second = sensor.read().await.unwrap();

        assert_eq!(first, second);
        assert!(first.lpg.is_some() && first.co.is_some() && first.smoke.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_reading_is_an_error() {
        let adc = ScriptedAdc {
            values: VecDeque::from([300; 50]),
            fallback: 1023,
        };
        let mut sensor = GasSensor::calibrate(Box::new(adc), GasSampling::default())
            .await
            .unwrap();

        assert!(sensor.read().await.is_err());
    }
}
