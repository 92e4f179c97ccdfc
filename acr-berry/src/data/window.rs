use crate::ScanSlice;

/// MR 显示窗口, 包含窗位 (window level) 和窗宽 (window width).
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MrWindow {
    level: f32,
    width: f32,
}

impl MrWindow {
    /// 窗位 0.5, 窗宽 1.0. 信号范围未知时的兜底窗口.
    pub const UNIT: MrWindow = MrWindow {
        level: 0.5,
        width: 1.0,
    };

    /// 构建显示窗.
    ///
    /// `level` 和 `width` 必须在合理范围内, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<MrWindow> {
        if (-1e7..=1e7).contains(&level) && 0.0 < width && width <= 1e7 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 根据图像信号的 1% 和 99% 分位数构建窗口.
    ///
    /// 图像为空或信号近似常数时返回 `None`.
    pub fn from_scan(scan: &ScanSlice) -> Option<MrWindow> {
        let lo = scan.percentile(0.01)?;
        let hi = scan.percentile(0.99)?;
        Self::new((lo + hi) / 2.0, hi - lo)
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 求在当前窗设置下, 信号值 `v` 对应的灰度图像素整数值 (0 <= value <= 255).
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, v: f32) -> Option<u8> {
        self.eval_f32(v).map(|g| g as u8)
    }

    /// 求在当前窗设置下, 信号值 `v` 对应的灰度图像素分布点 (0.0 <= value <= 255.0).
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval_f32(&self, v: f32) -> Option<f32> {
        if !v.is_finite() {
            return None;
        }
        let lb = self.lower_bound();
        if v <= lb {
            Some(0.0)
        } else if v >= self.upper_bound() {
            Some(255.0)
        } else {
            // 255, not 256.
            Some((v - lb) / self.width() * 255.0)
        }
    }
}
