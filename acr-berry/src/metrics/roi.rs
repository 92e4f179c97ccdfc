//! 以毫米描述的 ROI.

use crate::{Idx2d, Idx2dF, PixelSpacing, RoiStats, ScanSlice};

/// 轴对齐的椭圆 ROI. 像素中心落在椭圆内 (含边界) 的像素属于该 ROI.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EllipseRoi {
    /// 中心 (行, 列).
    pub center: Idx2dF,
    /// 水平半轴, 毫米.
    pub semi_x_mm: f64,
    /// 垂直半轴, 毫米.
    pub semi_y_mm: f64,
}

impl EllipseRoi {
    /// 圆形 ROI.
    pub fn circle(center: Idx2dF, radius_mm: f64) -> Self {
        Self {
            center,
            semi_x_mm: radius_mm,
            semi_y_mm: radius_mm,
        }
    }

    /// 面积为 `area_mm2` 的圆形 ROI.
    pub fn circle_with_area(center: Idx2dF, area_mm2: f64) -> Self {
        Self::circle(center, (area_mm2 / std::f64::consts::PI).sqrt())
    }

    /// 外接矩形是否完全在图像内?
    pub fn fits(&self, shape: Idx2d, spacing: PixelSpacing) -> bool {
        let (h, w) = shape;
        let dr = self.semi_y_mm / spacing.row_mm;
        let dc = self.semi_x_mm / spacing.col_mm;
        self.center.0 - dr >= 0.0
            && self.center.1 - dc >= 0.0
            && self.center.0 + dr <= (h as f64 - 1.0)
            && self.center.1 + dc <= (w as f64 - 1.0)
    }

    /// ROI 内的所有像素, 行优先. 超出图像的部分被裁掉.
    pub fn positions(&self, shape: Idx2d, spacing: PixelSpacing) -> Vec<Idx2d> {
        let (h, w) = shape;
        if h == 0 || w == 0 || self.semi_x_mm <= 0.0 || self.semi_y_mm <= 0.0 {
            return Vec::new();
        }
        let dr = self.semi_y_mm / spacing.row_mm;
        let dc = self.semi_x_mm / spacing.col_mm;
        let clamp = |v: f64, max: usize| v.max(0.0).min(max as f64) as usize;
        let (r0, r1) = (clamp((self.center.0 - dr).ceil(), h - 1), clamp((self.center.0 + dr).floor(), h - 1));
        let (c0, c1) = (clamp((self.center.1 - dc).ceil(), w - 1), clamp((self.center.1 + dc).floor(), w - 1));

        let mut out = Vec::new();
        for r in r0..=r1 {
            for c in c0..=c1 {
                let y = (r as f64 - self.center.0) / dr;
                let x = (c as f64 - self.center.1) / dc;
                if x * x + y * y <= 1.0 {
                    out.push((r, c));
                }
            }
        }
        out
    }

    /// ROI 内信号的统计量.
    pub fn stats(&self, scan: &ScanSlice) -> RoiStats {
        scan.stats_at(self.positions(scan.shape(), scan.spacing()))
    }
}

/// 半径为 `radius_mm` 的圆盘相对圆心的整数像素偏移 `(drow, dcol)`.
pub fn disk_offsets(radius_mm: f64, spacing: PixelSpacing) -> Vec<(isize, isize)> {
    let dr = radius_mm / spacing.row_mm;
    let dc = radius_mm / spacing.col_mm;
    let (mr, mc) = (dr.floor() as isize, dc.floor() as isize);
    let mut out = Vec::new();
    for i in -mr..=mr {
        for j in -mc..=mc {
            let (y, x) = (i as f64 / dr, j as f64 / dc);
            if x * x + y * y <= 1.0 {
                out.push((i, j));
            }
        }
    }
    out
}

/// 轴对齐的矩形 ROI, 以像素索引表示 (半开区间).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RectRoi {
    /// 起始行.
    pub r0: usize,
    /// 结束行 (不含).
    pub r1: usize,
    /// 起始列.
    pub c0: usize,
    /// 结束列 (不含).
    pub c1: usize,
}

impl RectRoi {
    /// 以 `center` 为中心, 宽 `width_mm`, 高 `height_mm` 的矩形. 超出图像时返回 `None`.
    pub fn around(
        center: Idx2dF,
        width_mm: f64,
        height_mm: f64,
        spacing: PixelSpacing,
        shape: Idx2d,
    ) -> Option<Self> {
        let half_r = height_mm / spacing.row_mm / 2.0;
        let half_c = width_mm / spacing.col_mm / 2.0;
        let (top, left) = (center.0 - half_r, center.1 - half_c);
        let (bottom, right) = (center.0 + half_r, center.1 + half_c);
        if top < 0.0 || left < 0.0 || bottom > shape.0 as f64 || right > shape.1 as f64 {
            return None;
        }
        let roi = Self {
            r0: top.round() as usize,
            r1: bottom.round() as usize,
            c0: left.round() as usize,
            c1: right.round() as usize,
        };
        (roi.r1 > roi.r0 + 2 && roi.c1 > roi.c0 + 2).then_some(roi)
    }

    /// 行数.
    #[inline]
    pub fn height(&self) -> usize {
        self.r1 - self.r0
    }

    /// 列数.
    #[inline]
    pub fn width(&self) -> usize {
        self.c1 - self.c0
    }

    /// ROI 内每一行的均值, 自上而下.
    pub fn row_means(&self, scan: &ScanSlice) -> Vec<f64> {
        (self.r0..self.r1)
            .map(|r| self.mean(scan, r..=r, self.c0..self.c1))
            .collect()
    }

    /// ROI 内每一列的均值, 自左而右.
    pub fn col_means(&self, scan: &ScanSlice) -> Vec<f64> {
        (self.c0..self.c1)
            .map(|c| self.mean(scan, self.r0..self.r1, c..=c))
            .collect()
    }

    /// 以第 `r` 行为中心, 上下各 `band` 行取平均的水平剖面 (限制在 ROI 内).
    pub fn row_profile(&self, scan: &ScanSlice, r: usize, band: usize) -> Vec<f64> {
        let lo = r.saturating_sub(band).max(self.r0);
        let hi = (r + band).min(self.r1 - 1);
        (self.c0..self.c1)
            .map(|c| self.mean(scan, lo..=hi, c..=c))
            .collect()
    }

    /// 以第 `c` 列为中心, 左右各 `band` 列取平均的垂直剖面 (限制在 ROI 内).
    pub fn col_profile(&self, scan: &ScanSlice, c: usize, band: usize) -> Vec<f64> {
        let lo = c.saturating_sub(band).max(self.c0);
        let hi = (c + band).min(self.c1 - 1);
        (self.r0..self.r1)
            .map(|r| self.mean(scan, r..=r, lo..=hi))
            .collect()
    }

    fn mean<R, C>(&self, scan: &ScanSlice, rows: R, cols: C) -> f64
    where
        R: Iterator<Item = usize> + Clone,
        C: Iterator<Item = usize> + Clone,
    {
        let mut sum = 0.0;
        let mut n = 0usize;
        for r in rows {
            for c in cols.clone() {
                sum += scan[(r, c)] as f64;
                n += 1;
            }
        }
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }
}
