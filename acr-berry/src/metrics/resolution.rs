use super::locate::PhantomFrame;
use super::{Measurement, Metric, MetricError, MetricKind, MetricResult};
use crate::protocol::{AnalysisParams, HoleArrayPair, ProtocolConfig, SelectedSlice};
use crate::ScanSlice;

/// 高对比空间分辨率.
///
/// 每种孔径有一对 `n × n` 的孔阵: 行阵的每一行检验左右方向, 列阵的每一列检验上下方向.
/// 一条线上的 `n` 个孔被分辨, 当且仅当孔处的信号高于塑料, 且相邻两孔之间的凹陷都不小于
/// `resolution_modulation × 对比度`. 孔阵中任意一条线被分辨即视为该孔径被分辨.
pub struct HighContrastResolution;

/// 孔阵的扫描方向.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Direction {
    /// 沿行排列, 检验左右方向.
    LeftRight,
    /// 沿列排列, 检验上下方向.
    UpDown,
}

struct HoleArray<'a> {
    frame: &'a PhantomFrame,
    origin_mm: [f64; 2],
    pitch_mm: f64,
    holes: usize,
    direction: Direction,
}

impl HoleArray<'_> {
    /// 第 `line` 条线上位置 `k` 处的毫米坐标. `k` 可以是小数或负数.
    fn at(&self, line: usize, k: f64, shift: [f64; 2]) -> [f64; 2] {
        let [x0, y0] = self.origin_mm;
        let (along, across) = (k * self.pitch_mm, line as f64 * self.pitch_mm);
        match self.direction {
            Direction::LeftRight => [x0 + along + shift[0], y0 + across + shift[1]],
            Direction::UpDown => [x0 + across + shift[0], y0 + along + shift[1]],
        }
    }

    fn sample(&self, scan: &ScanSlice, mm: [f64; 2]) -> Option<f64> {
        let (r, c) = self.frame.at_mm(mm);
        scan.bilinear(r, c)
    }

    /// 在小范围内平移孔阵, 使所有孔中心处的信号之和最大.
    fn refine(&self, scan: &ScanSlice, params: &AnalysisParams) -> [f64; 2] {
        let step = params.resolution_search_step_mm;
        let n = if step > 0.0 {
            (params.resolution_search_mm / step).round() as i64
        } else {
            0
        };
        let mut best = ([0.0, 0.0], f64::NEG_INFINITY);
        for i in -n..=n {
            for j in -n..=n {
                let shift = [j as f64 * step, i as f64 * step];
                let score: f64 = (0..self.holes)
                    .flat_map(|line| (0..self.holes).map(move |k| (line, k)))
                    .map(|(line, k)| {
                        self.sample(scan, self.at(line, k as f64, shift))
                            .unwrap_or(f64::NEG_INFINITY)
                    })
                    .sum();
                if score > best.1 {
                    best = (shift, score);
                }
            }
        }
        best.0
    }

    fn line_resolved(&self, scan: &ScanSlice, line: usize, shift: [f64; 2], modulation: f64) -> bool {
        let sample = |k: f64| self.sample(scan, self.at(line, k, shift));
        let peaks: Option<Vec<f64>> = (0..self.holes).map(|k| sample(k as f64)).collect();
        let valleys: Option<Vec<f64>> = (1..self.holes).map(|k| sample(k as f64 - 0.5)).collect();
        let plastic = [sample(-1.0), sample(self.holes as f64)];
        let (Some(peaks), Some(valleys), [Some(p0), Some(p1)]) = (peaks, valleys, plastic) else {
            return false;
        };
        let mean_peak = peaks.iter().sum::<f64>() / peaks.len() as f64;
        let amplitude = mean_peak - (p0 + p1) / 2.0;
        if !(amplitude > 0.0) {
            return false;
        }
        peaks
            .windows(2)
            .zip(&valleys)
            .all(|(p, v)| p[0].min(p[1]) - v >= modulation * amplitude)
    }

    fn resolved(&self, scan: &ScanSlice, params: &AnalysisParams) -> bool {
        let shift = self.refine(scan, params);
        (0..self.holes).any(|line| self.line_resolved(scan, line, shift, params.resolution_modulation))
    }
}

fn array_resolved(
    scan: &ScanSlice,
    frame: &PhantomFrame,
    pair: &HoleArrayPair,
    holes: usize,
    direction: Direction,
    params: &AnalysisParams,
) -> bool {
    let origin_mm = match direction {
        Direction::LeftRight => pair.row_array_mm,
        Direction::UpDown => pair.column_array_mm,
    };
    HoleArray {
        frame,
        origin_mm,
        pitch_mm: 2.0 * pair.hole_mm,
        holes,
        direction,
    }
    .resolved(scan, params)
}

/// 被分辨的最小孔径.
fn finest<I: Iterator<Item = f64>>(sizes: I) -> Option<f64> {
    sizes.fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.min(s))))
}

impl Metric for HighContrastResolution {
    fn kind(&self) -> MetricKind {
        MetricKind::HighContrastResolution
    }

    fn compute(
        &self,
        slices: &[SelectedSlice<'_>],
        config: &ProtocolConfig,
    ) -> Result<MetricResult, MetricError> {
        let sel = slices.first().ok_or(MetricError::NoSlices)?;
        let scan = sel.slice.scan();
        let frame = PhantomFrame::locate(&scan, &config.analysis)
            .ok_or(MetricError::PhantomNotFound { slice: sel.number })?;
        let geometry = &config.geometry.resolution;
        let tolerance = config.tolerances.resolution_mm;

        let mut notes = Vec::new();
        let mut both = Vec::new();
        let (mut lr, mut ud) = (Vec::new(), Vec::new());
        for pair in &geometry.arrays {
            let h = array_resolved(&scan, &frame, pair, geometry.holes_per_line, Direction::LeftRight, &config.analysis);
            let v = array_resolved(&scan, &frame, pair, geometry.holes_per_line, Direction::UpDown, &config.analysis);
            log::debug!("{} mm holes: left-right {h}, up-down {v}", pair.hole_mm);
            notes.push(format!(
                "{} mm: left-right {}, up-down {}",
                pair.hole_mm,
                if h { "resolved" } else { "unresolved" },
                if v { "resolved" } else { "unresolved" },
            ));
            if h {
                lr.push(pair.hole_mm);
            }
            if v {
                ud.push(pair.hole_mm);
            }
            if h && v {
                both.push(pair.hole_mm);
            }
        }

        let primary = Measurement::judged("resolution", finest(both.into_iter()), "mm", tolerance);
        let others = vec![
            Measurement::judged("resolution_left_right", finest(lr.into_iter()), "mm", tolerance),
            Measurement::judged("resolution_up_down", finest(ud.into_iter()), "mm", tolerance),
        ];
        Ok(MetricResult::new(self.kind(), primary, others, notes, slices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Verdict;
    use crate::test_utils::{selected, PhantomParams, Render};

    fn run(spec: &PhantomParams, open: [bool; 3]) -> MetricResult {
        let config = ProtocolConfig::default();
        let img = Render::new(spec)
            .phantom()
            .resolution(&config.geometry, open)
            .finish();
        let slice = spec.slice(img, "t1", 1);
        HighContrastResolution
            .compute(&[selected(&slice, 1)], &config)
            .unwrap()
    }

    #[test]
    fn test_all_arrays_resolved() {
        let r = run(&PhantomParams::default(), [true; 3]);
        assert_eq!(r.value, Some(0.9));
        assert_eq!(r.verdict, Verdict::Pass);
        assert_eq!(r.notes.len(), 3);
    }

    #[test]
    fn test_finest_resolved_size() {
        let r = run(&PhantomParams::default(), [true, true, false]);
        assert_eq!(r.value, Some(1.0));
        assert_eq!(r.verdict, Verdict::Pass);
        let r = run(&PhantomParams::default(), [true, false, false]);
        assert_eq!(r.value, Some(1.1));
        assert_eq!(r.verdict, Verdict::Fail);
    }

    #[test]
    fn test_filled_holes_unresolved() {
        let r = run(&PhantomParams::default(), [false; 3]);
        assert_eq!(r.value, None);
        assert_eq!(r.verdict, Verdict::Fail);
        assert_eq!(r.measurement("resolution_up_down").unwrap().value, None);
    }
}
