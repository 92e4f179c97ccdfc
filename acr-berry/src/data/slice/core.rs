use crate::data::PixelSpacing;
use crate::Idx2d;
use ndarray::iter::Iter;
use ndarray::{ArrayView2, Ix2};
use ordered_float::OrderedFloat;
use std::ops::Index;

/// 不可变、借用的二维 MR 图像视图, 附带像素间距.
///
/// 所有度量算法都只通过该视图读取像素, 因此无法修改 [`crate::MrSlice`].
#[derive(Copy, Clone)]
pub struct ScanSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::MrSlice`].
    data: ArrayView2<'a, f32>,

    /// 像素间距.
    spacing: PixelSpacing,
}

impl Index<Idx2d> for ScanSlice<'_> {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl<'a> ScanSlice<'a> {
    /// 直接初始化.
    #[inline]
    pub(crate) fn new(data: ArrayView2<'a, f32>, spacing: PixelSpacing) -> Self {
        Self { data, spacing }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView2<'a, f32> {
        self.data
    }

    /// 像素间距.
    #[inline]
    pub fn spacing(&self) -> PixelSpacing {
        self.spacing
    }

    /// 获取可以迭代图像像素的迭代器.
    #[inline]
    pub fn iter(&self) -> Iter<'_, f32, Ix2> {
        self.data.iter()
    }

    /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<&f32> {
        self.data.get(pos)
    }

    /// 图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        let &[h, w] = self.data.shape() else {
            unreachable!()
        };
        (h, w)
    }

    /// 图像的像素个数.
    #[inline]
    pub fn size(&self) -> usize {
        let (h, w) = self.shape();
        h * w
    }

    /// 获得图像的高.
    #[inline]
    pub fn height(&self) -> usize {
        self.shape().0
    }

    /// 获得图像的宽.
    #[inline]
    pub fn width(&self) -> usize {
        self.shape().1
    }

    /// 判断一个索引是否合法 (未越界).
    #[inline]
    pub fn check(&self, (h, w): Idx2d) -> bool {
        let (h_len, w_len) = self.shape();
        h < h_len && w < w_len
    }

    /// 以行优先规则, 获取能迭代图像所有 `(索引, 信号值)` 的迭代器.
    #[inline]
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &f32)> {
        self.data.indexed_iter()
    }

    /// 以行优先规则, 获取能迭代图像所有索引的迭代器.
    #[inline]
    pub fn pos_iter(&self) -> impl Iterator<Item = Idx2d> {
        super::iter::PosIter::new(self.shape())
    }

    /// 在亚像素位置 `(row, col)` 上做双线性插值.
    ///
    /// 坐标以像素中心为整数点. 位置超出 `[0, h - 1] x [0, w - 1]` 时返回 `None`.
    pub fn bilinear(&self, row: f64, col: f64) -> Option<f64> {
        let (h, w) = self.shape();
        if h == 0 || w == 0 || !row.is_finite() || !col.is_finite() {
            return None;
        }
        let max_r = (h - 1) as f64;
        let max_c = (w - 1) as f64;
        if row < 0.0 || col < 0.0 || row > max_r || col > max_c {
            return None;
        }
        let r0 = row.floor() as usize;
        let c0 = col.floor() as usize;
        let r1 = (r0 + 1).min(h - 1);
        let c1 = (c0 + 1).min(w - 1);
        let fr = row - r0 as f64;
        let fc = col - c0 as f64;

        let v = |p: Idx2d| self.data[p] as f64;
        let top = v((r0, c0)) * (1.0 - fc) + v((r0, c1)) * fc;
        let bottom = v((r1, c0)) * (1.0 - fc) + v((r1, c1)) * fc;
        Some(top * (1.0 - fr) + bottom * fr)
    }

    /// 获取第 `q` 分位数 (`0.0 <= q <= 1.0`, 最近秩法).
    ///
    /// 图像为空或 `q` 不在范围内时返回 `None`. 非有限值不参与统计.
    pub fn percentile(&self, q: f64) -> Option<f32> {
        if !(0.0..=1.0).contains(&q) {
            return None;
        }
        let mut buf: Vec<OrderedFloat<f32>> = self
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .map(OrderedFloat)
            .collect();
        if buf.is_empty() {
            return None;
        }
        let k = ((buf.len() - 1) as f64 * q).round() as usize;
        let (_, nth, _) = buf.select_nth_unstable(k);
        Some(nth.0)
    }

    /// 计算由 `it` 给出的所有索引对应的信号统计量. 越界索引被忽略.
    pub fn stats_at<I: IntoIterator<Item = Idx2d>>(&self, it: I) -> RoiStats {
        RoiStats::from_values(it.into_iter().filter_map(|p| self.get(p).map(|v| *v as f64)))
    }

    /// 全图信号的统计量.
    pub fn stats(&self) -> RoiStats {
        RoiStats::from_values(self.iter().map(|v| *v as f64))
    }
}

/// 一组像素的统计量.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RoiStats {
    /// 参与统计的像素个数.
    pub count: usize,
    /// 平均值. 像素个数为 0 时为 0.
    pub mean: f64,
    /// 总体标准差. 像素个数为 0 时为 0.
    pub std: f64,
}

impl RoiStats {
    /// 从数值序列计算统计量.
    pub fn from_values<I: IntoIterator<Item = f64>>(it: I) -> Self {
        let values: Vec<f64> = it.into_iter().collect();
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Self {
            count: values.len(),
            mean,
            std: var.sqrt(),
        }
    }

    /// 是否没有任何像素?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_bilinear() {
        let data = array![[0.0f32, 10.0], [20.0, 30.0]];
        let spacing = PixelSpacing::new(1.0, 1.0).unwrap();
        let s = ScanSlice::new(data.view(), spacing);
        assert!(float_eq(s.bilinear(0.0, 0.0).unwrap(), 0.0));
        assert!(float_eq(s.bilinear(0.0, 0.5).unwrap(), 5.0));
        assert!(float_eq(s.bilinear(0.5, 0.5).unwrap(), 15.0));
        assert!(float_eq(s.bilinear(1.0, 1.0).unwrap(), 30.0));
        assert_eq!(s.bilinear(1.01, 0.0), None);
        assert_eq!(s.bilinear(-0.01, 0.0), None);
        assert_eq!(s.bilinear(f64::NAN, 0.0), None);
    }

    #[test]
    fn test_percentile_and_stats() {
        let data = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, f32::NAN]];
        let spacing = PixelSpacing::new(0.5, 0.5).unwrap();
        let s = ScanSlice::new(data.view(), spacing);
        assert_eq!(s.percentile(0.0), Some(1.0));
        assert_eq!(s.percentile(1.0), Some(5.0));
        assert_eq!(s.percentile(0.5), Some(3.0));
        assert_eq!(s.percentile(1.5), None);

        let st = s.stats_at([(0, 0), (0, 1), (0, 2), (7, 7)]);
        assert_eq!(st.count, 3);
        assert!(float_eq(st.mean, 2.0));
        assert!(float_eq(st.std, (2.0f64 / 3.0).sqrt()));
        assert!(RoiStats::from_values(std::iter::empty()).is_empty());
    }
}
