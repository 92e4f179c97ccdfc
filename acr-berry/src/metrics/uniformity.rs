use super::locate::PhantomFrame;
use super::roi::{disk_offsets, EllipseRoi};
use super::{Measurement, Metric, MetricError, MetricKind, MetricResult};
use crate::protocol::{ProtocolConfig, SelectedSlice, UniformityGeometry};
use crate::{Idx2dF, RoiStats, ScanSlice};
use std::f64::consts::PI;

/// 图像均匀度 (PIU) 与伪影 (ghosting).
///
/// - 大 ROI 覆盖体模中心的均匀区域;
/// - 在大 ROI 内以小 ROI 搜索最高与最低的局部均值, `PIU = 100 × (1 - (高 - 低) / (高 + 低))`;
/// - 体模上下左右的背景中各放一个椭圆 ROI,
///   `ghosting = 100 × |(上 + 下) - (左 + 右)| / (2 × 大 ROI 均值)`.
///
/// 另外给出仅供参考的信噪比: 大 ROI 均值 / 背景 ROI 的合并标准差.
pub struct UniformityGhosting;

/// 在半径 `reach_mm` 内以小 ROI 搜索局部均值的 (最高, 最低).
fn search_extremes(
    scan: &ScanSlice,
    center: Idx2dF,
    reach_mm: f64,
    radius_mm: f64,
    step_mm: f64,
) -> Option<(f64, f64)> {
    if reach_mm < 0.0 || !(step_mm > 0.0) {
        return None;
    }
    let sp = scan.spacing();
    let offsets = disk_offsets(radius_mm, sp);
    let n = (reach_mm / step_mm).floor() as i64;
    let mut extremes: Option<(f64, f64)> = None;
    for i in -n..=n {
        for j in -n..=n {
            let (dx, dy) = (j as f64 * step_mm, i as f64 * step_mm);
            if dx.hypot(dy) > reach_mm {
                continue;
            }
            let r = (center.0 + dy / sp.row_mm).round() as isize;
            let c = (center.1 + dx / sp.col_mm).round() as isize;
            let stats = scan.stats_at(offsets.iter().filter_map(|&(di, dj)| {
                let (rr, cc) = (r + di, c + dj);
                (rr >= 0 && cc >= 0).then_some((rr as usize, cc as usize))
            }));
            if stats.is_empty() {
                continue;
            }
            extremes = Some(match extremes {
                None => (stats.mean, stats.mean),
                Some((hi, lo)) => (hi.max(stats.mean), lo.min(stats.mean)),
            });
        }
    }
    extremes
}

/// 体模外的四个背景椭圆 ROI: 上, 下, 左, 右.
///
/// 每个椭圆位于体模与图像边缘之间空隙的正中, 长轴平行于该侧的图像边缘.
/// 空隙太窄时缩短短轴.
fn ghost_rois(
    scan: &ScanSlice,
    frame: &PhantomFrame,
    geometry: &UniformityGeometry,
    slice: usize,
) -> Result<[(&'static str, EllipseRoi); 4], MetricError> {
    let sp = scan.spacing();
    let (h, w) = scan.shape();
    let ext = frame.extent();
    let (cr, cc) = frame.center();
    let area = geometry.ghost_roi_area_cm2 * 100.0;
    let minor = (area / (PI * geometry.ghost_roi_aspect)).sqrt();
    let major = geometry.ghost_roi_aspect * minor;

    // 空隙的像素数与中心.
    let gaps = [
        ("top ghost", ext.min_h as f64, (ext.min_h as f64 - 1.0) / 2.0),
        ("bottom ghost", (h - 1 - ext.max_h) as f64, (ext.max_h + h) as f64 / 2.0),
        ("left ghost", ext.min_w as f64, (ext.min_w as f64 - 1.0) / 2.0),
        ("right ghost", (w - 1 - ext.max_w) as f64, (ext.max_w + w) as f64 / 2.0),
    ];
    let mut out = [("", EllipseRoi::circle((0.0, 0.0), 0.0)); 4];
    for (i, (name, gap, mid)) in gaps.into_iter().enumerate() {
        let half_px = gap / 2.0 - 1.0;
        if half_px < 1.0 {
            return Err(MetricError::RoiOutsideImage { roi: name, slice });
        }
        let roi = if i < 2 {
            EllipseRoi {
                center: (mid, cc),
                semi_x_mm: major,
                semi_y_mm: minor.min(half_px * sp.row_mm),
            }
        } else {
            EllipseRoi {
                center: (cr, mid),
                semi_x_mm: minor.min(half_px * sp.col_mm),
                semi_y_mm: major,
            }
        };
        out[i] = (name, roi);
    }
    Ok(out)
}

/// 合并标准差.
fn pooled_std(stats: &[RoiStats]) -> f64 {
    let n: usize = stats.iter().map(|s| s.count).sum();
    if n == 0 {
        return 0.0;
    }
    let ss: f64 = stats.iter().map(|s| s.count as f64 * s.std * s.std).sum();
    (ss / n as f64).sqrt()
}

impl Metric for UniformityGhosting {
    fn kind(&self) -> MetricKind {
        MetricKind::UniformityGhosting
    }

    fn compute(
        &self,
        slices: &[SelectedSlice<'_>],
        config: &ProtocolConfig,
    ) -> Result<MetricResult, MetricError> {
        let sel = slices.first().ok_or(MetricError::NoSlices)?;
        let geometry = &config.geometry.uniformity;
        let scan = sel.slice.scan();
        let sp = scan.spacing();
        let frame = PhantomFrame::locate(&scan, &config.analysis)
            .ok_or(MetricError::PhantomNotFound { slice: sel.number })?;
        let outside = |roi| MetricError::RoiOutsideImage {
            roi,
            slice: sel.number,
        };

        let center = frame.at_mm(geometry.center_offset_mm);
        let large = EllipseRoi::circle_with_area(center, geometry.large_roi_area_cm2 * 100.0);
        if !large.fits(scan.shape(), sp) {
            return Err(outside("large"));
        }
        let large_stats = large.stats(&scan);
        if large_stats.is_empty() {
            return Err(outside("large"));
        }

        let small_radius = (geometry.small_roi_area_cm2 * 100.0 / PI).sqrt();
        let (high, low) = search_extremes(
            &scan,
            center,
            large.semi_x_mm - small_radius,
            small_radius,
            config.analysis.uniformity_search_step_mm,
        )
        .ok_or(outside("small"))?;
        let piu = (high + low > 0.0).then(|| 100.0 * (1.0 - (high - low) / (high + low)));

        let mut notes = Vec::new();
        let field = sel.slice.acquisition().field_strength_t;
        let piu_tolerance = if config.tolerances.is_high_field(field) {
            notes.push(format!(
                "high-field tolerance applied ({} T)",
                field.unwrap_or_default()
            ));
            config.tolerances.piu_percent_high_field
        } else {
            config.tolerances.piu_percent
        };

        let ghosts = ghost_rois(&scan, &frame, geometry, sel.number)?;
        let mut ghost_stats = Vec::with_capacity(4);
        for (name, roi) in &ghosts {
            let stats = roi.stats(&scan);
            if stats.is_empty() {
                return Err(outside(*name));
            }
            ghost_stats.push(stats);
        }
        let [top, bottom, left, right] = [0, 1, 2, 3].map(|i| ghost_stats[i].mean);
        let ghosting = (large_stats.mean > 0.0)
            .then(|| 100.0 * ((top + bottom) - (left + right)).abs() / (2.0 * large_stats.mean));
        let noise = pooled_std(&ghost_stats);
        let snr = (noise > 0.0).then(|| large_stats.mean / noise);
        log::debug!(
            "large {:.1}, high {high:.1}, low {low:.1}, ghosts {top:.1}/{bottom:.1}/{left:.1}/{right:.1}",
            large_stats.mean
        );

        let primary = Measurement::judged("piu", piu, "%", piu_tolerance);
        let others = vec![
            Measurement::judged("ghosting", ghosting, "%", config.tolerances.ghosting_percent),
            Measurement::info("snr", snr, ""),
            Measurement::info("large_roi_mean", Some(large_stats.mean), ""),
            Measurement::info("high_mean", Some(high), ""),
            Measurement::info("low_mean", Some(low), ""),
            Measurement::info("top_ghost_mean", Some(top), ""),
            Measurement::info("bottom_ghost_mean", Some(bottom), ""),
            Measurement::info("left_ghost_mean", Some(left), ""),
            Measurement::info("right_ghost_mean", Some(right), ""),
        ];
        Ok(MetricResult::new(self.kind(), primary, others, notes, slices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Verdict;
    use crate::test_utils::{selected, PhantomParams, Render};

    fn run(spec: &PhantomParams, render: impl FnOnce(Render) -> Render) -> MetricResult {
        let img = render(Render::new(spec).phantom()).finish();
        let slice = spec.slice(img, "t1", 7);
        UniformityGhosting
            .compute(&[selected(&slice, 7)], &ProtocolConfig::default())
            .unwrap()
    }

    fn value(r: &MetricResult, name: &str) -> Option<f64> {
        r.measurement(name).and_then(|m| m.value)
    }

    #[test]
    fn test_uniform_phantom_passes() {
        let r = run(&PhantomParams::default(), |r| r);
        assert!((r.value.unwrap() - 100.0).abs() < 1e-6, "{:?}", r.value);
        assert!(value(&r, "ghosting").unwrap() < 1e-6);
        assert_eq!(r.verdict, Verdict::Pass);
        // 没有噪声时信噪比无意义.
        assert_eq!(value(&r, "snr"), None);
    }

    #[test]
    fn test_intensity_gradient_fails_piu() {
        let r = run(&PhantomParams::default(), |r| r.gradient(0.2));
        let piu = r.value.unwrap();
        assert!((piu - 84.4).abs() < 0.5, "{piu}");
        assert_eq!(r.verdict, Verdict::Fail);
        assert_eq!(r.measurement("ghosting").unwrap().verdict, Some(Verdict::Pass));
    }

    #[test]
    fn test_phase_ghosts_fail() {
        let r = run(&PhantomParams::default(), |r| r.ghosts(50.0));
        let ghosting = value(&r, "ghosting").unwrap();
        assert!((ghosting - 5.0).abs() < 0.1, "{ghosting}");
        assert_eq!(r.measurement("piu").unwrap().verdict, Some(Verdict::Pass));
        assert_eq!(r.verdict, Verdict::Fail);
    }

    #[test]
    fn test_snr_from_background_noise() {
        let r = run(&PhantomParams::default(), |r| r.noise(10.0, 7));
        let snr = value(&r, "snr").unwrap();
        assert!((snr - 100.0).abs() < 10.0, "{snr}");
        assert_eq!(r.verdict, Verdict::Pass);
    }

    #[test]
    fn test_phantom_filling_the_image() {
        let spec = PhantomParams {
            matrix: 200,
            spacing_mm: 0.96,
            ..PhantomParams::default()
        };
        let img = Render::new(&spec).phantom().finish();
        let slice = spec.slice(img, "t1", 7);
        let err = UniformityGhosting
            .compute(&[selected(&slice, 7)], &ProtocolConfig::default())
            .unwrap_err();
        assert!(matches!(err, MetricError::RoiOutsideImage { .. }), "{err:?}");
    }
}
