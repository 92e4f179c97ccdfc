//! 剖面采样与半高宽.

use crate::{Idx2dF, ScanSlice};
use ordered_float::OrderedFloat;

/// 被测结构相对于周围的亮暗.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Polarity {
    /// 结构比周围亮.
    Bright,
    /// 结构比周围暗.
    Dark,
}

/// 剖面上的一段区间, 以采样点序号为单位, 端点为亚采样精度.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Span {
    /// 起点.
    pub start: f64,
    /// 终点.
    pub end: f64,
}

impl Span {
    /// 区间长度 (采样点数).
    #[inline]
    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    /// 区间中点.
    #[inline]
    pub fn mid(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// 居中的滑动平均. 边缘处窗口收缩. `window <= 1` 时原样返回.
pub fn smooth(profile: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 {
        return profile.to_vec();
    }
    let half = window / 2;
    (0..profile.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(profile.len());
            profile[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

/// 最大值的位置. 并列时取第一个.
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by_key(|(i, v)| (OrderedFloat(**v), std::cmp::Reverse(*i)))
        .map(|(i, _)| i)
}

/// 最小值的位置. 并列时取第一个.
pub fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .min_by_key(|(i, v)| (OrderedFloat(**v), *i))
        .map(|(i, _)| i)
}

/// 包含峰值的连通区间的半高宽.
///
/// 基线取剖面两端各约 10% (至少 1 个, 至多 5 个) 采样点的均值. 峰值两侧都必须回落到
/// 半高以下, 否则返回 `None`.
pub fn fwhm(profile: &[f64], polarity: Polarity) -> Option<Span> {
    let p: Vec<f64> = match polarity {
        Polarity::Bright => profile.to_vec(),
        Polarity::Dark => profile.iter().map(|v| -v).collect(),
    };
    let n = p.len();
    if n < 3 || p.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let k = (n / 10).clamp(1, 5);
    let base = (p[..k].iter().sum::<f64>() + p[n - k..].iter().sum::<f64>()) / (2 * k) as f64;
    let (imax, peak) = p
        .iter()
        .copied()
        .enumerate()
        .max_by_key(|(i, v)| (OrderedFloat(*v), std::cmp::Reverse(*i)))?;
    if !(peak > base) {
        return None;
    }
    let half = (peak + base) / 2.0;

    let mut l = imax;
    while l > 0 && p[l - 1] >= half {
        l -= 1;
    }
    let mut r = imax;
    while r + 1 < n && p[r + 1] >= half {
        r += 1;
    }
    if l == 0 || r + 1 == n {
        return None;
    }
    let start = (l - 1) as f64 + (half - p[l - 1]) / (p[l] - p[l - 1]);
    let end = r as f64 + (p[r] - half) / (p[r] - p[r + 1]);
    Some(Span { start, end })
}

/// 从图像外沿射线向 `center` 扫描, 求信号首次达到 `threshold` 处到 `center` 的距离 (毫米).
///
/// 射线方向 `angle_deg` 为图像坐标 (0 度向右, 90 度向下). 相邻采样点间线性插值.
/// 若射线在图像内的第一个采样点就已达到阈值 (体模碰到图像边缘), 或始终达不到阈值,
/// 或 `step_mm` 不是正数, 返回 `None`.
pub fn edge_distance(
    scan: &ScanSlice,
    center: Idx2dF,
    angle_deg: f64,
    threshold: f64,
    step_mm: f64,
) -> Option<f64> {
    if !(step_mm > 0.0) || !step_mm.is_finite() {
        return None;
    }
    let sp = scan.spacing();
    let (h, w) = scan.shape();
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let max_t = (h as f64 * sp.row_mm).hypot(w as f64 * sp.col_mm);
    let steps = (max_t / step_mm).ceil() as usize;

    let mut outside: Option<(f64, f64)> = None;
    for i in (0..=steps).rev() {
        let t = i as f64 * step_mm;
        let Some(v) = scan.bilinear(center.0 + t * sin / sp.row_mm, center.1 + t * cos / sp.col_mm)
        else {
            continue;
        };
        if v >= threshold {
            let (tp, vp) = outside?;
            return Some(tp - (threshold - vp) / (v - vp) * (tp - t));
        }
        outside = Some((t, v));
    }
    None
}

/// 过 `center` 沿 `angle_deg` 方向的直径 (毫米).
pub fn diameter(
    scan: &ScanSlice,
    center: Idx2dF,
    angle_deg: f64,
    threshold: f64,
    step_mm: f64,
) -> Option<f64> {
    let a = edge_distance(scan, center, angle_deg, threshold, step_mm)?;
    let b = edge_distance(scan, center, angle_deg + 180.0, threshold, step_mm)?;
    Some(a + b)
}
