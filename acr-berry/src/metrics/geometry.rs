use super::locate::PhantomFrame;
use super::{sampling, Measurement, Metric, MetricError, MetricKind, MetricResult};
use crate::protocol::{ProtocolConfig, SelectedSlice};
use ordered_float::OrderedFloat;

/// 几何精度: 沿若干方向测量体模内径.
///
/// 主数值是偏离标称内径最多的那个直径.
pub struct GeometricAccuracy;

impl Metric for GeometricAccuracy {
    fn kind(&self) -> MetricKind {
        MetricKind::GeometricAccuracy
    }

    fn compute(
        &self,
        slices: &[SelectedSlice<'_>],
        config: &ProtocolConfig,
    ) -> Result<MetricResult, MetricError> {
        if slices.is_empty() {
            return Err(MetricError::NoSlices);
        }
        let geometry = &config.geometry;
        let tolerance = config.tolerances.diameter_mm;
        let mut diameters = Vec::new();
        let mut notes = Vec::new();

        for (i, sel) in slices.iter().enumerate() {
            let scan = sel.slice.scan();
            let spacing = scan.spacing();
            if !spacing.is_isotropic() {
                notes.push(format!(
                    "slice {}: non-square pixels {} x {} mm",
                    sel.number, spacing.row_mm, spacing.col_mm
                ));
            }
            let frame = PhantomFrame::locate(&scan, &config.analysis)
                .ok_or(MetricError::PhantomNotFound { slice: sel.number })?;
            for &angle in geometry.diameter_angles(i) {
                let d = sampling::diameter(
                    &scan,
                    frame.center(),
                    angle,
                    frame.threshold(),
                    config.analysis.edge_step_mm,
                )
                .ok_or(MetricError::FeatureNotFound {
                    feature: "phantom edge",
                    slice: sel.number,
                })?;
                log::debug!("slice {} diameter at {angle} deg: {d:.2} mm", sel.number);
                diameters.push(Measurement::judged(
                    format!("slice{}_diameter_{angle}deg", sel.number),
                    Some(d),
                    "mm",
                    tolerance,
                ));
            }
        }

        let nominal = geometry.inner_diameter_mm;
        let worst = diameters
            .iter()
            .rev()
            .max_by_key(|m| OrderedFloat(m.value.map_or(f64::INFINITY, |v| (v - nominal).abs())))
            .and_then(|m| m.value);
        notes.push(format!("nominal inner diameter {nominal} mm"));
        let primary = Measurement::judged("diameter", worst, "mm", tolerance);
        Ok(MetricResult::new(self.kind(), primary, diameters, notes, slices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Verdict;
    use crate::series::SeriesLabel;
    use crate::test_utils::{PhantomParams, Render};

    fn run(diameter_mm: f64) -> MetricResult {
        let config = ProtocolConfig::default();
        let spec = PhantomParams {
            diameter_mm,
            ..PhantomParams::default()
        };
        let s1 = spec.slice(Render::new(&spec).acr_slice(1, &config).finish(), "t1", 1);
        let s5 = spec.slice(Render::new(&spec).acr_slice(5, &config).finish(), "t1", 5);
        let selected = [
            SelectedSlice {
                series: SeriesLabel::T1,
                number: 1,
                slice: &s1,
            },
            SelectedSlice {
                series: SeriesLabel::T1,
                number: 5,
                slice: &s5,
            },
        ];
        GeometricAccuracy.compute(&selected, &config).unwrap()
    }

    #[test]
    fn test_nominal_phantom_passes() {
        let r = run(190.0);
        assert_eq!(r.verdict, Verdict::Pass);
        assert!((r.value.unwrap() - 190.0).abs() < 0.5, "{:?}", r.value);
        // 主测量 + 第 1 层 2 个方向 + 第 5 层 4 个方向.
        assert_eq!(r.measurements.len(), 7);
        assert!(r.measurement("slice5_diameter_45deg").is_some());
        assert_eq!(r.slices.len(), 2);
    }

    #[test]
    fn test_oversized_phantom_fails() {
        let r = run(196.0);
        assert_eq!(r.verdict, Verdict::Fail);
        assert!((r.value.unwrap() - 196.0).abs() < 0.5);
    }
}
