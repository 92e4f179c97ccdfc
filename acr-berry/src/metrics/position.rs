use super::locate::PhantomFrame;
use super::roi::RectRoi;
use super::sampling::{self, Polarity};
use super::{Measurement, Metric, MetricError, MetricKind, MetricResult, Profile};
use crate::protocol::{ProtocolConfig, SelectedSlice};
use crate::ScanSlice;
use ordered_float::OrderedFloat;

/// 层面位置精度: 左右两根楔形暗条的长度差.
///
/// 差值为正表示左条更长.
pub struct SlicePositionAccuracy;

/// 以 `c` 列为中心的纵向剖面.
fn bar_profile(
    scan: &ScanSlice,
    roi: &RectRoi,
    c: usize,
    window: usize,
    name: String,
    slice: usize,
) -> Profile {
    Profile {
        name,
        slice,
        spacing_mm: scan.spacing().row_mm,
        values: sampling::smooth(&roi.col_profile(scan, c, 1), window),
    }
}

/// 剖面中暗条的长度, 毫米.
fn bar_length(profile: &Profile) -> Option<f64> {
    sampling::fwhm(&profile.values, Polarity::Dark).map(|span| span.len() * profile.spacing_mm)
}

impl Metric for SlicePositionAccuracy {
    fn kind(&self) -> MetricKind {
        MetricKind::SlicePositionAccuracy
    }

    fn compute(
        &self,
        slices: &[SelectedSlice<'_>],
        config: &ProtocolConfig,
    ) -> Result<MetricResult, MetricError> {
        if slices.is_empty() {
            return Err(MetricError::NoSlices);
        }
        let wedges = &config.geometry.wedges;
        let window = config.analysis.profile_smoothing;
        let tolerance = config.tolerances.slice_position_mm;
        let mut differences = Vec::new();
        let mut lengths = Vec::new();
        let mut profiles = Vec::new();

        for sel in slices {
            let scan = sel.slice.scan();
            let frame = PhantomFrame::locate(&scan, &config.analysis)
                .ok_or(MetricError::PhantomNotFound { slice: sel.number })?;
            let roi = RectRoi::around(
                frame.at_mm(wedges.center_offset_mm),
                wedges.width_mm,
                wedges.height_mm,
                scan.spacing(),
                scan.shape(),
            )
            .ok_or(MetricError::RoiOutsideImage {
                roi: "wedge",
                slice: sel.number,
            })?;

            let cols = roi.col_means(&scan);
            let half = cols.len() / 2;
            let not_found = |feature| MetricError::FeatureNotFound {
                feature,
                slice: sel.number,
            };
            let left = sampling::argmin(&cols[..half]).ok_or(not_found("left wedge bar"))?;
            let right = sampling::argmin(&cols[half..]).ok_or(not_found("right wedge bar"))?;
            let name = |side| format!("slice{}_{side}_bar", sel.number);
            let left_bar = bar_profile(&scan, &roi, roi.c0 + left, window, name("left"), sel.number);
            let right_bar =
                bar_profile(&scan, &roi, roi.c0 + half + right, window, name("right"), sel.number);
            let left_len = bar_length(&left_bar).ok_or(not_found("left wedge bar"))?;
            let right_len = bar_length(&right_bar).ok_or(not_found("right wedge bar"))?;
            profiles.push(left_bar);
            profiles.push(right_bar);

            let diff = left_len - right_len;
            log::debug!(
                "slice {}: wedge bars {left_len:.2} / {right_len:.2} mm, difference {diff:.2} mm",
                sel.number
            );
            differences.push(Measurement::judged(
                format!("slice{}_difference", sel.number),
                Some(diff),
                "mm",
                tolerance,
            ));
            lengths.push(Measurement::info(
                format!("slice{}_left_bar", sel.number),
                Some(left_len),
                "mm",
            ));
            lengths.push(Measurement::info(
                format!("slice{}_right_bar", sel.number),
                Some(right_len),
                "mm",
            ));
        }

        let worst = differences
            .iter()
            .rev()
            .max_by_key(|m| OrderedFloat(m.value.map_or(f64::INFINITY, f64::abs)))
            .and_then(|m| m.value);
        let primary = Measurement::judged("difference", worst, "mm", tolerance);
        differences.extend(lengths);
        Ok(MetricResult::new(self.kind(), primary, differences, Vec::new(), slices)
            .with_profiles(profiles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Verdict;
    use crate::test_utils::{selected, PhantomParams, Render};

    fn run(bars: &[(f64, f64)]) -> Result<MetricResult, MetricError> {
        let config = ProtocolConfig::default();
        let spec = PhantomParams::default();
        let slices: Vec<_> = bars
            .iter()
            .enumerate()
            .map(|(i, &(left, right))| {
                let img = Render::new(&spec)
                    .phantom()
                    .wedges(left, right, &config.geometry)
                    .finish();
                spec.slice(img, "t1", i as i32 + 1)
            })
            .collect();
        let selected: Vec<_> = slices
            .iter()
            .enumerate()
            .map(|(i, s)| selected(s, if i == 0 { 1 } else { 11 }))
            .collect();
        SlicePositionAccuracy.compute(&selected, &config)
    }

    #[test]
    fn test_six_mm_difference_fails() {
        let r = run(&[(26.0, 20.0)]).unwrap();
        assert!((r.value.unwrap() - 6.0).abs() < 0.5, "{:?}", r.value);
        assert_eq!(r.verdict, Verdict::Fail);
        let left = r.measurement("slice1_left_bar").unwrap().value.unwrap();
        assert!((left - 26.0).abs() < 0.5, "{left}");
    }

    #[test]
    fn test_worst_slice_is_primary() {
        let r = run(&[(21.0, 22.0), (20.0, 23.0)]).unwrap();
        assert!((r.value.unwrap() + 3.0).abs() < 0.5, "{:?}", r.value);
        assert_eq!(r.verdict, Verdict::Pass);
        assert!(r.measurement("slice11_difference").is_some());
        assert_eq!(r.measurements.len(), 1 + 2 + 4);

        assert_eq!(r.profiles.len(), 4);
        assert_eq!(r.profiles[3].name, "slice11_right_bar");
        assert_eq!(r.profiles[3].slice, 11);
        let right = r.measurement("slice11_right_bar").unwrap().value.unwrap();
        assert_eq!(bar_length(&r.profiles[3]), Some(right));
    }

    #[test]
    fn test_missing_bars() {
        let config = ProtocolConfig::default();
        let spec = PhantomParams::default();
        let slice = spec.slice(Render::new(&spec).phantom().finish(), "t1", 1);
        let err = SlicePositionAccuracy
            .compute(&[selected(&slice, 1)], &config)
            .unwrap_err();
        assert!(matches!(err, MetricError::FeatureNotFound { slice: 1, .. }));
    }
}
