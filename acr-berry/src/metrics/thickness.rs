use super::locate::PhantomFrame;
use super::roi::RectRoi;
use super::sampling::{self, Polarity};
use super::{Measurement, Metric, MetricError, MetricKind, MetricResult, Profile};
use crate::protocol::{ProtocolConfig, SelectedSlice};

/// 层厚精度.
///
/// 上下两条斜坡在图像中的亮条长度 `t`, `b` 与层厚 `d` 的关系为
/// `d = 2 × slope × t × b / (t + b)`, 对 ACR 体模即 `0.2 × t × b / (t + b)`.
/// 两条斜坡方向相反, 以调和平均抵消体模的倾斜.
pub struct SliceThicknessAccuracy;

impl Metric for SliceThicknessAccuracy {
    fn kind(&self) -> MetricKind {
        MetricKind::SliceThicknessAccuracy
    }

    fn compute(
        &self,
        slices: &[SelectedSlice<'_>],
        config: &ProtocolConfig,
    ) -> Result<MetricResult, MetricError> {
        let sel = slices.first().ok_or(MetricError::NoSlices)?;
        let ramps = &config.geometry.ramps;
        let scan = sel.slice.scan();
        let frame = PhantomFrame::locate(&scan, &config.analysis)
            .ok_or(MetricError::PhantomNotFound { slice: sel.number })?;
        let roi = RectRoi::around(
            frame.at_mm(ramps.center_offset_mm),
            ramps.width_mm,
            ramps.height_mm,
            scan.spacing(),
            scan.shape(),
        )
        .ok_or(MetricError::RoiOutsideImage {
            roi: "ramp",
            slice: sel.number,
        })?;

        let rows = roi.row_means(&scan);
        let half = rows.len() / 2;
        let not_found = |feature| MetricError::FeatureNotFound {
            feature,
            slice: sel.number,
        };
        let top = sampling::argmax(&rows[..half]).ok_or(not_found("top ramp"))?;
        let bottom = sampling::argmax(&rows[half..]).ok_or(not_found("bottom ramp"))?;

        let window = config.analysis.profile_smoothing;
        let col_mm = scan.spacing().col_mm;
        let ramp = |name: &str, r: usize| Profile {
            name: name.to_string(),
            slice: sel.number,
            spacing_mm: col_mm,
            values: sampling::smooth(&roi.row_profile(&scan, r, 1), window),
        };
        let ramp_length = |p: &Profile| {
            sampling::fwhm(&p.values, Polarity::Bright).map(|span| span.len() * col_mm)
        };
        let profiles = vec![
            ramp("top_ramp", roi.r0 + top),
            ramp("bottom_ramp", roi.r0 + half + bottom),
        ];
        let t = ramp_length(&profiles[0]).ok_or(not_found("top ramp"))?;
        let b = ramp_length(&profiles[1]).ok_or(not_found("bottom ramp"))?;

        let thickness = 2.0 * ramps.slope * t * b / (t + b);
        log::debug!("ramps {t:.2} / {b:.2} mm, thickness {thickness:.2} mm");

        let primary = Measurement::judged(
            "thickness",
            Some(thickness),
            "mm",
            config.tolerances.slice_thickness_mm,
        );
        let others = vec![
            Measurement::info("top_ramp", Some(t), "mm"),
            Measurement::info("bottom_ramp", Some(b), "mm"),
        ];
        Ok(MetricResult::new(self.kind(), primary, others, Vec::new(), slices)
            .with_profiles(profiles))
    }
}
