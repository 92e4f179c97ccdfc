//! 体模定位.

use crate::protocol::AnalysisParams;
use crate::{Extent, Idx2dF, PhantomMask, PixelSpacing, ScanSlice};

/// 在一张切片中定位到的体模.
#[derive(Copy, Clone, Debug)]
pub struct PhantomFrame {
    center: Idx2dF,
    extent: Extent,
    signal: f64,
    threshold: f64,
    spacing: PixelSpacing,
}

impl PhantomFrame {
    /// 定位体模.
    ///
    /// 1. 高于 `floor_fraction × p99` 的像素的均值作为体模平均信号;
    /// 2. 以 `signal_fraction × 平均信号` 为阈值二值化;
    /// 3. 只保留最大的连通域, 填充内部空洞;
    /// 4. 外接矩形的中心即为体模中心.
    ///
    /// 图像中没有信号时返回 `None`.
    pub fn locate(scan: &ScanSlice, params: &AnalysisParams) -> Option<Self> {
        let p99 = scan.percentile(0.99)? as f64;
        if !(p99 > 0.0) {
            return None;
        }
        let floor = params.floor_fraction * p99;
        let signal = scan.stats_at(
            scan.indexed_iter()
                .filter(|(_, v)| **v as f64 >= floor)
                .map(|(p, _)| p),
        );
        if signal.is_empty() {
            return None;
        }
        let threshold = params.signal_fraction * signal.mean;

        let mut mask = PhantomMask::threshold(scan, threshold as f32);
        if !mask.keep_largest() {
            return None;
        }
        mask.fill_holes();
        let extent = mask.extent()?;
        log::debug!(
            "phantom extent {:?}, signal {:.1}, threshold {:.1}",
            extent,
            signal.mean,
            threshold
        );
        Some(Self {
            center: extent.center(),
            extent,
            signal: signal.mean,
            threshold,
            spacing: scan.spacing(),
        })
    }

    /// 体模中心 (行, 列).
    #[inline]
    pub fn center(&self) -> Idx2dF {
        self.center
    }

    /// 体模外接矩形.
    #[inline]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// 体模平均信号.
    #[inline]
    pub fn signal(&self) -> f64 {
        self.signal
    }

    /// 体模边缘阈值.
    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 相对体模中心偏移 `[dx, dy]` 毫米处的像素坐标 (行, 列).
    #[inline]
    pub fn at_mm(&self, [dx, dy]: [f64; 2]) -> Idx2dF {
        (
            self.center.0 + dy / self.spacing.row_mm,
            self.center.1 + dx / self.spacing.col_mm,
        )
    }

    /// 外接矩形的 (高, 宽), 毫米.
    pub fn size_mm(&self) -> (f64, f64) {
        let (h, w) = self.extent.size();
        (h as f64 * self.spacing.row_mm, w as f64 * self.spacing.col_mm)
    }
}
