//! ACR 大体模的参考尺寸与算法参数.
//!
//! 所有偏移量都以毫米为单位, 相对于定位得到的体模中心, 形如 `[dx, dy]`:
//! `dx` 向图像右侧为正, `dy` 向图像下方为正.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// ACR 大体模的固定参考尺寸. 只读.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct PhantomGeometry {
    /// 体模内径.
    pub inner_diameter_mm: f64,
    /// 第 i 张被选切片测量直径的方向 (度, 0 为水平). 切片多于条目时重复最后一项.
    pub diameter_angles_deg: Vec<Vec<f64>>,
    /// 层面位置楔形条.
    pub wedges: WedgeGeometry,
    /// 层厚斜坡.
    pub ramps: RampGeometry,
    /// 高对比分辨率孔阵.
    pub resolution: ResolutionGeometry,
    /// 低对比圆盘.
    pub low_contrast: LowContrastGeometry,
    /// 均匀度与伪影 ROI.
    pub uniformity: UniformityGeometry,
}

impl Default for PhantomGeometry {
    fn default() -> Self {
        Self {
            inner_diameter_mm: 190.0,
            diameter_angles_deg: vec![vec![0.0, 90.0], vec![0.0, 45.0, 90.0, 135.0]],
            wedges: WedgeGeometry::default(),
            ramps: RampGeometry::default(),
            resolution: ResolutionGeometry::default(),
            low_contrast: LowContrastGeometry::default(),
            uniformity: UniformityGeometry::default(),
        }
    }
}

impl PhantomGeometry {
    /// 第 `index` 张被选切片的测量方向.
    pub fn diameter_angles(&self, index: usize) -> &[f64] {
        self.diameter_angles_deg
            .get(index)
            .or_else(|| self.diameter_angles_deg.last())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// 层面位置楔形条所在的矩形 ROI. 两根暗条分别位于 ROI 的左右两半.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct WedgeGeometry {
    /// ROI 中心.
    pub center_offset_mm: [f64; 2],
    /// ROI 宽度.
    pub width_mm: f64,
    /// ROI 高度 (沿暗条方向).
    pub height_mm: f64,
}

impl Default for WedgeGeometry {
    fn default() -> Self {
        Self {
            center_offset_mm: [0.0, -70.0],
            width_mm: 12.0,
            height_mm: 40.0,
        }
    }
}

/// 层厚斜坡所在的矩形 ROI. 上下两条亮斜坡分别位于 ROI 的上下两半.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct RampGeometry {
    /// ROI 中心.
    pub center_offset_mm: [f64; 2],
    /// ROI 宽度 (沿斜坡方向).
    pub width_mm: f64,
    /// ROI 高度.
    pub height_mm: f64,
    /// 斜坡的斜率 (高/长). ACR 体模为 1:10.
    pub slope: f64,
}

impl Default for RampGeometry {
    fn default() -> Self {
        Self {
            center_offset_mm: [0.0, 0.0],
            width_mm: 90.0,
            height_mm: 8.0,
            slope: 0.1,
        }
    }
}

/// 一种孔径的一对孔阵: 行阵 (检验左右分辨) 与列阵 (检验上下分辨).
///
/// 每个孔阵为 `holes_per_line × holes_per_line` 个孔, 孔距为两倍孔径.
/// 偏移量指向孔阵左上角孔的中心.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HoleArrayPair {
    /// 孔径.
    pub hole_mm: f64,
    /// 行阵左上角孔的中心.
    pub row_array_mm: [f64; 2],
    /// 列阵左上角孔的中心.
    pub column_array_mm: [f64; 2],
}

/// 高对比分辨率插件.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ResolutionGeometry {
    /// 每行 (列) 的孔数.
    pub holes_per_line: usize,
    /// 从粗到细的孔阵.
    pub arrays: Vec<HoleArrayPair>,
}

impl Default for ResolutionGeometry {
    fn default() -> Self {
        let pair = |hole_mm, x: f64| HoleArrayPair {
            hole_mm,
            row_array_mm: [x, 24.0],
            column_array_mm: [x + 9.0, 32.0],
        };
        Self {
            holes_per_line: 4,
            arrays: vec![pair(1.1, -32.0), pair(1.0, -10.0), pair(0.9, 12.0)],
        }
    }
}

/// 低对比可探测性插件: 若干条辐条, 每条辐条在各个环上有一个圆盘.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct LowContrastGeometry {
    /// 圆盘阵列中心.
    pub center_offset_mm: [f64; 2],
    /// 圆盘所在圆环的半径, 由内向外.
    pub ring_radii_mm: Vec<f64>,
    /// 每条辐条的圆盘直径. 辐条数等于该列表长度.
    pub disk_diameters_mm: Vec<f64>,
    /// 第一条辐条的标称角度 (度, 图像坐标, 顺时针为正).
    pub start_angle_deg: f64,
    /// 背景环带的中心半径 (位于圆盘环之间).
    pub background_radii_mm: Vec<f64>,
    /// 背景环带的半宽.
    pub background_half_width_mm: f64,
    /// 圆盘 ROI 半径占圆盘半径的比例.
    pub disk_roi_fraction: f64,
}

impl Default for LowContrastGeometry {
    fn default() -> Self {
        Self {
            center_offset_mm: [0.0, 0.0],
            ring_radii_mm: vec![15.0, 27.0, 39.0],
            disk_diameters_mm: vec![7.0, 6.39, 5.78, 5.17, 4.56, 3.94, 3.33, 2.72, 2.11, 1.5],
            start_angle_deg: -90.0,
            background_radii_mm: vec![21.0, 33.0],
            background_half_width_mm: 1.5,
            disk_roi_fraction: 0.8,
        }
    }
}

impl LowContrastGeometry {
    /// 辐条数.
    #[inline]
    pub fn spokes(&self) -> usize {
        self.disk_diameters_mm.len()
    }
}

/// 均匀度与伪影 ROI 的大小.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct UniformityGeometry {
    /// 大 ROI 中心.
    pub center_offset_mm: [f64; 2],
    /// 大 ROI 面积, 平方厘米.
    pub large_roi_area_cm2: f64,
    /// 搜索高/低信号的小 ROI 面积, 平方厘米.
    pub small_roi_area_cm2: f64,
    /// 每个背景椭圆 ROI 的面积, 平方厘米.
    pub ghost_roi_area_cm2: f64,
    /// 背景椭圆 ROI 的长短轴之比.
    pub ghost_roi_aspect: f64,
}

impl Default for UniformityGeometry {
    fn default() -> Self {
        Self {
            center_offset_mm: [0.0, 0.0],
            large_roi_area_cm2: 200.0,
            small_roi_area_cm2: 1.0,
            ghost_roi_area_cm2: 10.0,
            ghost_roi_aspect: 4.0,
        }
    }
}

/// 各度量算法共用的可调参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct AnalysisParams {
    /// 低于 `floor_fraction × p99` 的像素不参与体模平均信号的计算.
    pub floor_fraction: f64,
    /// 体模边缘阈值占平均信号的比例.
    pub signal_fraction: f64,
    /// 剖面滑动平均的窗口 (采样点数, 1 表示不平滑).
    pub profile_smoothing: usize,
    /// 直径测量沿直线向内扫描的步长.
    pub edge_step_mm: f64,
    /// 相邻两孔之间的凹陷至少为孔阵对比度的多少才算分辨.
    pub resolution_modulation: f64,
    /// 孔阵位置的局部搜索半径.
    pub resolution_search_mm: f64,
    /// 孔阵位置局部搜索的步长.
    pub resolution_search_step_mm: f64,
    /// 圆盘可见所需的最小对比噪声比.
    pub lcd_min_cnr: f64,
    /// 背景标准差的下限, 占背景均值的比例.
    pub lcd_noise_floor: f64,
    /// 辐条旋转角的搜索半径 (度).
    pub lcd_search_deg: f64,
    /// 辐条旋转角的搜索步长 (度).
    pub lcd_search_step_deg: f64,
    /// 小 ROI 搜索网格的步长.
    pub uniformity_search_step_mm: f64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            floor_fraction: 0.1,
            signal_fraction: 0.5,
            profile_smoothing: 3,
            edge_step_mm: 0.1,
            resolution_modulation: 0.25,
            resolution_search_mm: 1.0,
            resolution_search_step_mm: 0.25,
            lcd_min_cnr: 1.0,
            lcd_noise_floor: 0.002,
            lcd_search_deg: 10.0,
            lcd_search_step_deg: 0.5,
            uniformity_search_step_mm: 2.0,
        }
    }
}
