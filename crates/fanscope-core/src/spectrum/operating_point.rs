//! Translating the chart's operating point into a fan speed
//!
//! Spectrum band models are functions of RPM. The chart may be driven by
//! RPM directly or by noise level, in which case the curve's `noise_to_rpm`
//! cross model converts it.

use crate::models::{FanCurve, SpectrumModel};
use crate::types::{Axis, OperatingPoint};

/// Highest usable RPM of a curve: calibration first, then the raw samples,
/// else 0
pub fn rpm_max_for(curve: &FanCurve, model: Option<&SpectrumModel>) -> f64 {
    model
        .and_then(SpectrumModel::max_operating_point)
        .or_else(|| curve.data.max_rpm())
        .unwrap_or(0.0)
}

/// Lowest usable RPM of a curve, if known
pub fn rpm_min_for(curve: &FanCurve, model: Option<&SpectrumModel>) -> Option<f64> {
    model
        .and_then(SpectrumModel::min_operating_point)
        .or_else(|| curve.data.min_rpm())
}

/// RPM at which to evaluate `curve`'s spectrum for `target`
///
/// Returns NaN when no speed can be derived (non-finite RPM query).
pub fn target_rpm(curve: &FanCurve, model: Option<&SpectrumModel>, target: OperatingPoint) -> f64 {
    let rpm_max = rpm_max_for(curve, model);

    let rpm = match target.axis {
        Axis::Rpm if !target.value.is_finite() => f64::NAN,
        Axis::Rpm => match &curve.pchip.rpm_to_airflow {
            Some(cross) => cross.clamp_to_domain(target.value),
            None => target.value,
        },
        Axis::NoiseDb => {
            let converted = curve
                .pchip
                .noise_to_rpm
                .as_ref()
                .map(|cross| cross.evaluate(cross.clamp_to_domain(target.value)));
            match converted {
                Some(rpm) if rpm.is_finite() && rpm > 0.0 => rpm,
                _ => rpm_max,
            }
        }
    };
    if !rpm.is_finite() {
        return f64::NAN;
    }

    let mut rpm = rpm;
    if let Some(min) = rpm_min_for(curve, model) {
        rpm = rpm.max(min);
    }
    if rpm_max > 0.0 {
        rpm = rpm.min(rpm_max);
    }
    rpm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::PiecewiseModel;
    use crate::models::{Calibration, CrossModels};
    use crate::types::ModelKey;

    fn curve() -> FanCurve {
        FanCurve::new("fanA", ModelKey::new(1, 1))
            .with_rpm_samples([600.0, 1200.0, 1800.0])
            .with_cross_models(CrossModels {
                rpm_to_airflow: Some(
                    PiecewiseModel::new(vec![600.0, 1800.0], vec![20.0, 60.0], vec![0.03, 0.03])
                        .with_domain(500.0, 2000.0),
                ),
                noise_to_rpm: Some(PiecewiseModel::new(
                    vec![20.0, 40.0],
                    vec![600.0, 1800.0],
                    vec![60.0, 60.0],
                )),
                ..Default::default()
            })
    }

    fn calibrated(min: f64, max: f64) -> SpectrumModel {
        SpectrumModel {
            calibration: Calibration {
                rpm_min: Some(min),
                rpm_max: Some(max),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_rpm_max_prefers_calibration() {
        let c = curve();
        assert_eq!(rpm_max_for(&c, Some(&calibrated(700.0, 1500.0))), 1500.0);
        assert_eq!(rpm_max_for(&c, None), 1800.0);
        assert_eq!(rpm_max_for(&FanCurve::new("b", ModelKey::new(2, 1)), None), 0.0);
    }

    #[test]
    fn test_rpm_axis_clamps_into_ranges() {
        let c = curve();
        assert_eq!(target_rpm(&c, None, OperatingPoint::rpm(1000.0)), 1000.0);
        // Cross-model domain tops out at 2000, samples at 1800
        assert_eq!(target_rpm(&c, None, OperatingPoint::rpm(2500.0)), 1800.0);
        assert_eq!(target_rpm(&c, None, OperatingPoint::rpm(100.0)), 600.0);

        let model = calibrated(700.0, 1500.0);
        assert_eq!(target_rpm(&c, Some(&model), OperatingPoint::rpm(1600.0)), 1500.0);
        assert_eq!(target_rpm(&c, Some(&model), OperatingPoint::rpm(650.0)), 700.0);
    }

    #[test]
    fn test_noise_axis_uses_cross_model() {
        let c = curve();
        assert_eq!(target_rpm(&c, None, OperatingPoint::noise_db(20.0)), 600.0);
        assert_eq!(target_rpm(&c, None, OperatingPoint::noise_db(40.0)), 1800.0);
        // Beyond the cross model's domain: clamped
        assert_eq!(target_rpm(&c, None, OperatingPoint::noise_db(55.0)), 1800.0);
    }

    #[test]
    fn test_noise_axis_falls_back_to_max_rpm() {
        let c = FanCurve::new("fanB", ModelKey::new(2, 1)).with_rpm_samples([900.0, 1400.0]);
        assert_eq!(target_rpm(&c, None, OperatingPoint::noise_db(30.0)), 1400.0);

        let broken = c.clone().with_cross_models(CrossModels {
            noise_to_rpm: Some(PiecewiseModel::new(vec![20.0, 40.0], vec![-5.0], vec![0.0, 0.0])),
            ..Default::default()
        });
        assert_eq!(target_rpm(&broken, None, OperatingPoint::noise_db(30.0)), 1400.0);
    }

    #[test]
    fn test_non_finite_rpm_query() {
        assert!(target_rpm(&curve(), None, OperatingPoint::rpm(f64::NAN)).is_nan());
    }
}
