use super::locate::PhantomFrame;
use super::roi::EllipseRoi;
use super::{Measurement, Metric, MetricError, MetricKind, MetricResult};
use crate::protocol::{AnalysisParams, LowContrastGeometry, ProtocolConfig, SelectedSlice};
use crate::{Idx2dF, RoiStats, ScanSlice};

/// 低对比可探测性.
///
/// 每张切片上有若干条辐条, 每条辐条在每个环上有一个圆盘, 同一辐条的圆盘直径相同,
/// 辐条按直径从大到小排列. 辐条的整体旋转角在标称角度附近搜索得到.
///
/// 圆盘的对比噪声比 `(圆盘均值 - 背景均值) / 背景噪声` 大于阈值即视为可见,
/// 背景取该辐条扇区内位于圆盘环之间的环带. 一条辐条的圆盘全部可见才算完整,
/// 每张切片从第一条辐条开始计数, 遇到第一条不完整的辐条即停止.
pub struct LowContrastDetectability;

/// 一张切片上的低对比插件.
struct Insert<'a> {
    scan: &'a ScanSlice<'a>,
    center: Idx2dF,
    geometry: &'a LowContrastGeometry,
    /// 背景环带内的像素: (方位角, 信号).
    background: Vec<(f64, f64)>,
}

/// 方位角之差, 折算到 (-180, 180].
fn angle_diff(a: f64, b: f64) -> f64 {
    180.0 - (180.0 - (a - b)).rem_euclid(360.0)
}

impl<'a> Insert<'a> {
    fn new(scan: &'a ScanSlice<'a>, frame: &PhantomFrame, geometry: &'a LowContrastGeometry) -> Self {
        let center = frame.at_mm(geometry.center_offset_mm);
        let sp = scan.spacing();
        let hw = geometry.background_half_width_mm;
        let outer = geometry
            .background_radii_mm
            .iter()
            .fold(0.0f64, |acc, r| acc.max(r + hw));
        let (h, w) = scan.shape();
        let r0 = (center.0 - outer / sp.row_mm).floor().max(0.0) as usize;
        let r1 = ((center.0 + outer / sp.row_mm).ceil().max(0.0) as usize).min(h.saturating_sub(1));
        let c0 = (center.1 - outer / sp.col_mm).floor().max(0.0) as usize;
        let c1 = ((center.1 + outer / sp.col_mm).ceil().max(0.0) as usize).min(w.saturating_sub(1));

        let mut background = Vec::new();
        for r in r0..=r1 {
            for c in c0..=c1 {
                let dy = (r as f64 - center.0) * sp.row_mm;
                let dx = (c as f64 - center.1) * sp.col_mm;
                let rho = dx.hypot(dy);
                if geometry
                    .background_radii_mm
                    .iter()
                    .any(|rb| (rho - rb).abs() <= hw)
                {
                    if let Some(v) = scan.get((r, c)) {
                        background.push((dy.atan2(dx).to_degrees(), *v as f64));
                    }
                }
            }
        }
        Self {
            scan,
            center,
            geometry,
            background,
        }
    }

    fn spoke_angle(&self, k: usize, rotation: f64) -> f64 {
        rotation + k as f64 * 360.0 / self.geometry.spokes() as f64
    }

    /// 方位角 `angle` 处辐条扇区内的背景统计.
    fn spoke_background(&self, angle: f64) -> RoiStats {
        let half = 180.0 / self.geometry.spokes() as f64;
        RoiStats::from_values(
            self.background
                .iter()
                .filter(|(a, _)| angle_diff(*a, angle).abs() <= half)
                .map(|(_, v)| *v),
        )
    }

    /// 圆盘 ROI 的均值. ROI 小于一个像素时退化为圆心处的插值.
    fn disk_mean(&self, angle: f64, ring_mm: f64, diameter_mm: f64) -> Option<f64> {
        let sp = self.scan.spacing();
        let (sin, cos) = angle.to_radians().sin_cos();
        let center = (
            self.center.0 + ring_mm * sin / sp.row_mm,
            self.center.1 + ring_mm * cos / sp.col_mm,
        );
        let roi = EllipseRoi::circle(center, self.geometry.disk_roi_fraction * diameter_mm / 2.0);
        let stats = roi.stats(self.scan);
        if stats.is_empty() {
            self.scan.bilinear(center.0, center.1)
        } else {
            Some(stats.mean)
        }
    }

    /// 在给定旋转角下评估所有辐条. 返回每条辐条各圆盘的对比噪声比, 以及总的对比度得分.
    fn evaluate(&self, rotation: f64, params: &AnalysisParams) -> (Vec<Vec<f64>>, f64) {
        let mut score = 0.0;
        let spokes: Vec<Vec<f64>> = self
            .geometry
            .disk_diameters_mm
            .iter()
            .enumerate()
            .map(|(k, &diameter)| {
                let angle = self.spoke_angle(k, rotation);
                let bg = self.spoke_background(angle);
                let noise = bg.std.max(params.lcd_noise_floor * bg.mean.abs());
                self.geometry
                    .ring_radii_mm
                    .iter()
                    .map(|&ring| {
                        let Some(disk) = self.disk_mean(angle, ring, diameter) else {
                            return f64::NEG_INFINITY;
                        };
                        score += disk - bg.mean;
                        if noise > 0.0 {
                            (disk - bg.mean) / noise
                        } else {
                            0.0
                        }
                    })
                    .collect::<Vec<f64>>()
            })
            .collect();
        (spokes, score)
    }

    /// 搜索旋转角, 返回 (旋转角, 各辐条的对比噪声比).
    fn search(&self, params: &AnalysisParams) -> (f64, Vec<Vec<f64>>) {
        let start = self.geometry.start_angle_deg;
        let step = params.lcd_search_step_deg;
        let n = if step > 0.0 {
            (params.lcd_search_deg / step).round() as i64
        } else {
            0
        };
        let mut best: Option<(f64, Vec<Vec<f64>>, f64)> = None;
        for i in -n..=n {
            let rotation = start + i as f64 * step;
            let (cnr, score) = self.evaluate(rotation, params);
            if best.as_ref().map_or(true, |b| score > b.2) {
                best = Some((rotation, cnr, score));
            }
        }
        best.map_or_else(
            || (start, self.evaluate(start, params).0),
            |(rotation, cnr, _)| (rotation, cnr),
        )
    }
}

/// 从第一条辐条开始数完整的辐条.
fn complete_spokes(cnr: &[Vec<f64>], min_cnr: f64) -> usize {
    cnr.iter()
        .take_while(|disks| disks.iter().all(|&c| c > min_cnr))
        .count()
}

impl Metric for LowContrastDetectability {
    fn kind(&self) -> MetricKind {
        MetricKind::LowContrastDetectability
    }

    fn compute(
        &self,
        slices: &[SelectedSlice<'_>],
        config: &ProtocolConfig,
    ) -> Result<MetricResult, MetricError> {
        let first = slices.first().ok_or(MetricError::NoSlices)?;
        let params = &config.analysis;
        let mut per_slice = Vec::new();
        let mut notes = Vec::new();
        let mut total = 0usize;

        for sel in slices {
            let scan = sel.slice.scan();
            let frame = PhantomFrame::locate(&scan, params)
                .ok_or(MetricError::PhantomNotFound { slice: sel.number })?;
            let insert = Insert::new(&scan, &frame, &config.geometry.low_contrast);
            if insert.background.is_empty() {
                return Err(MetricError::RoiOutsideImage {
                    roi: "low-contrast background",
                    slice: sel.number,
                });
            }
            let (rotation, cnr) = insert.search(params);
            let count = complete_spokes(&cnr, params.lcd_min_cnr);
            log::debug!("slice {}: {count} spokes at rotation {rotation:.1} deg", sel.number);
            notes.push(format!("slice {}: spoke rotation {rotation:.1} deg", sel.number));
            per_slice.push(Measurement::info(
                format!("slice{}_spokes", sel.number),
                Some(count as f64),
                "spokes",
            ));
            total += count;
        }

        let field = first.slice.acquisition().field_strength_t;
        let tolerance = if config.tolerances.is_high_field(field) {
            notes.push(format!(
                "high-field tolerance applied ({} T)",
                field.unwrap_or_default()
            ));
            config.tolerances.low_contrast_spokes_high_field
        } else {
            config.tolerances.low_contrast_spokes
        };
        let primary = Measurement::judged("spokes", Some(total as f64), "spokes", tolerance);
        Ok(MetricResult::new(self.kind(), primary, per_slice, notes, slices))
    }
}
