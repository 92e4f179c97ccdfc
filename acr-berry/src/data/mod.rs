//! MR 切片的基础数据结构.
//!
//! 一个 [`MrSlice`] 对应上传归档中的一个 DICOM 文件, 由解码器创建, 之后只读.

use ndarray::{Array2, ArrayView2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Idx2d;

pub mod mask;
pub mod slice;
pub mod window;

pub use mask::{Extent, PhantomMask};
pub use slice::{ImgWriteVis, RoiStats, ScanSlice};
pub use window::MrWindow;

/// 像素间距, 以毫米为单位.
///
/// `row_mm` 是相邻两行的间距 (图像的垂直方向), `col_mm` 是相邻两列的间距 (水平方向).
/// 与 DICOM `PixelSpacing` 属性的顺序一致.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelSpacing {
    /// 行间距 (垂直方向).
    pub row_mm: f64,
    /// 列间距 (水平方向).
    pub col_mm: f64,
}

impl PixelSpacing {
    /// 构建像素间距. 两个分量必须是严格为正的有限数, 否则返回 `None`.
    pub fn new(row_mm: f64, col_mm: f64) -> Option<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        (valid(row_mm) && valid(col_mm)).then_some(Self { row_mm, col_mm })
    }

    /// 两个间距是否在相对误差 `rel` 内相等.
    pub fn approx_eq(&self, other: &Self, rel: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= rel * a.abs().max(b.abs());
        close(self.row_mm, other.row_mm) && close(self.col_mm, other.col_mm)
    }

    /// 像素是否是正方形? 允许千分之一的相对误差.
    #[inline]
    pub fn is_isotropic(&self) -> bool {
        (self.row_mm - self.col_mm).abs() <= 1e-3 * self.row_mm.max(self.col_mm)
    }

    /// 单个像素的面积, 以平方毫米为单位.
    #[inline]
    pub fn pixel_area(&self) -> f64 {
        self.row_mm * self.col_mm
    }
}

/// 解剖学平面.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Plane {
    /// 横断面.
    Axial,
    /// 矢状面.
    Sagittal,
    /// 冠状面.
    Coronal,
    /// 斜切面.
    Oblique,
}

/// 图像方向, 即 DICOM `ImageOrientationPatient` 的行、列方向余弦.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Orientation {
    /// 行方向 (列索引增加的方向) 的方向余弦.
    pub row: [f64; 3],
    /// 列方向 (行索引增加的方向) 的方向余弦.
    pub col: [f64; 3],
}

impl Orientation {
    /// 标准横断面方向.
    pub const AXIAL: Orientation = Orientation {
        row: [1.0, 0.0, 0.0],
        col: [0.0, 1.0, 0.0],
    };

    /// 标准矢状面方向.
    pub const SAGITTAL: Orientation = Orientation {
        row: [0.0, 1.0, 0.0],
        col: [0.0, 0.0, -1.0],
    };

    /// 从 `ImageOrientationPatient` 的 6 个分量构建.
    pub fn from_cosines(v: [f64; 6]) -> Self {
        Self {
            row: [v[0], v[1], v[2]],
            col: [v[3], v[4], v[5]],
        }
    }

    /// 切片法向量 (行方向 × 列方向).
    pub fn normal(&self) -> [f64; 3] {
        let [a1, a2, a3] = self.row;
        let [b1, b2, b3] = self.col;
        [a2 * b3 - a3 * b2, a3 * b1 - a1 * b3, a1 * b2 - a2 * b1]
    }

    /// 两个方向的所有分量之差是否都不超过 `tol`.
    pub fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.row
            .iter()
            .chain(self.col.iter())
            .zip(other.row.iter().chain(other.col.iter()))
            .all(|(a, b)| (a - b).abs() <= tol)
    }

    /// 根据法向量的主分量判断切片所属平面.
    ///
    /// 主分量的绝对值低于 0.8 时视为斜切面.
    pub fn plane(&self) -> Plane {
        let n = self.normal();
        let (axis, mag) = n
            .iter()
            .map(|v| v.abs())
            .enumerate()
            .fold((0, 0.0), |acc, (i, v)| if v > acc.1 { (i, v) } else { acc });
        if mag < 0.8 {
            return Plane::Oblique;
        }
        match axis {
            0 => Plane::Sagittal,
            1 => Plane::Coronal,
            _ => Plane::Axial,
        }
    }
}

/// 采集参数. 所有字段都可能在 DICOM 文件中缺失.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AcquisitionParams {
    /// 回波时间 TE, 毫秒.
    pub echo_time_ms: Option<f64>,
    /// 重复时间 TR, 毫秒.
    pub repetition_time_ms: Option<f64>,
    /// 接收带宽, 每像素赫兹.
    pub receive_bandwidth_hz: Option<f64>,
    /// 采集矩阵 (频率编码, 相位编码).
    pub acquisition_matrix: Option<(u16, u16)>,
    /// 回波序号.
    pub echo_number: Option<i32>,
    /// 主磁场强度, 特斯拉.
    pub field_strength_t: Option<f64>,
    /// 标称层厚, 毫米.
    pub slice_thickness_mm: Option<f64>,
}

/// 切片的元数据部分.
#[derive(Clone, Debug)]
pub struct SliceHeader {
    /// 来源文件名 (来自归档条目).
    pub source: String,
    /// SOP Instance UID.
    pub sop_instance_uid: String,
    /// Series Instance UID, 结构化分组的依据.
    pub series_uid: String,
    /// 序列描述 (若有).
    pub series_description: Option<String>,
    /// 实例序号 (Instance Number).
    pub instance_number: i32,
    /// 声明的行数.
    pub rows: usize,
    /// 声明的列数.
    pub columns: usize,
    /// 像素间距.
    pub spacing: PixelSpacing,
    /// 图像左上角像素中心的患者坐标 (若有).
    pub image_position: Option<[f64; 3]>,
    /// 图像方向.
    pub orientation: Orientation,
    /// 沿切片法向的标量位置, 毫米. 序列内排序的依据.
    pub position: f64,
    /// 采集参数.
    pub acquisition: AcquisitionParams,
}

/// 切片不变量被破坏.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum InvalidSlice {
    /// 像素矩阵大小与声明的行列数不符.
    #[error("pixel array is {actual:?} but header declares {declared:?}")]
    ShapeMismatch {
        /// 声明的 (行, 列).
        declared: Idx2d,
        /// 实际的 (行, 列).
        actual: Idx2d,
    },

    /// 像素间距不是严格正数.
    #[error("pixel spacing must be strictly positive, got {0:?}")]
    NonPositiveSpacing(PixelSpacing),
}

/// 一个解码完成的 MR 切片. 像素值以 `f32` 保存, 已应用 rescale.
#[derive(Clone, Debug)]
pub struct MrSlice {
    header: SliceHeader,
    data: Array2<f32>,
}

impl MrSlice {
    /// 由元数据和像素矩阵创建切片, 并检查不变量.
    pub fn new(header: SliceHeader, data: Array2<f32>) -> Result<Self, InvalidSlice> {
        let s = header.spacing;
        if PixelSpacing::new(s.row_mm, s.col_mm).is_none() {
            return Err(InvalidSlice::NonPositiveSpacing(s));
        }
        let (h, w) = data.dim();
        if (h, w) != (header.rows, header.columns) {
            return Err(InvalidSlice::ShapeMismatch {
                declared: (header.rows, header.columns),
                actual: (h, w),
            });
        }
        Ok(Self { header, data })
    }

    /// 获取元数据.
    #[inline]
    pub fn header(&self) -> &SliceHeader {
        &self.header
    }

    /// 获取图像视图.
    #[inline]
    pub fn scan(&self) -> ScanSlice<'_> {
        ScanSlice::new(self.data.view(), self.header.spacing)
    }

    /// 获得像素数据的一份不可变 shallow copy.
    #[inline]
    pub fn pixels(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    /// 来源文件名.
    #[inline]
    pub fn source(&self) -> &str {
        &self.header.source
    }

    /// Series Instance UID.
    #[inline]
    pub fn series_uid(&self) -> &str {
        &self.header.series_uid
    }

    /// 实例序号.
    #[inline]
    pub fn instance_number(&self) -> i32 {
        self.header.instance_number
    }

    /// 沿切片法向的位置.
    #[inline]
    pub fn position(&self) -> f64 {
        self.header.position
    }

    /// 像素间距.
    #[inline]
    pub fn spacing(&self) -> PixelSpacing {
        self.header.spacing
    }

    /// 图像方向.
    #[inline]
    pub fn orientation(&self) -> Orientation {
        self.header.orientation
    }

    /// 采集参数.
    #[inline]
    pub fn acquisition(&self) -> &AcquisitionParams {
        &self.header.acquisition
    }

    /// 图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        (self.header.rows, self.header.columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spacing_rejects_non_positive() {
        assert!(PixelSpacing::new(0.0, 1.0).is_none());
        assert!(PixelSpacing::new(1.0, -0.5).is_none());
        assert!(PixelSpacing::new(f64::NAN, 1.0).is_none());
        assert!(PixelSpacing::new(0.5, 0.5).is_some_and(|s| s.is_isotropic()));
        assert!(!PixelSpacing::new(0.5, 0.6).unwrap().is_isotropic());
    }

    #[test]
    fn test_orientation_plane() {
        assert_eq!(Orientation::AXIAL.plane(), Plane::Axial);
        assert_eq!(Orientation::SAGITTAL.plane(), Plane::Sagittal);
        let coronal = Orientation::from_cosines([1.0, 0.0, 0.0, 0.0, 0.0, -1.0]);
        assert_eq!(coronal.plane(), Plane::Coronal);
        let tilted = Orientation::from_cosines([1.0, 0.0, 0.0, 0.0, 0.7071, 0.7071]);
        assert_eq!(tilted.plane(), Plane::Oblique);
    }

    #[test]
    fn test_slice_invariants() {
        let header = crate::test_utils::header("a", "1.2.3", 1, (4, 5));
        assert!(MrSlice::new(header.clone(), Array2::zeros((4, 5))).is_ok());
        assert_eq!(
            MrSlice::new(header.clone(), Array2::zeros((5, 4))).unwrap_err(),
            InvalidSlice::ShapeMismatch {
                declared: (4, 5),
                actual: (5, 4)
            }
        );
        let mut bad = header;
        bad.spacing = PixelSpacing {
            row_mm: 0.0,
            col_mm: 1.0,
        };
        assert!(matches!(
            MrSlice::new(bad, Array2::zeros((4, 5))),
            Err(InvalidSlice::NonPositiveSpacing(_))
        ));
    }
}
