//! 体模二值掩膜.
//!
//! 掩膜由阈值化 MR 图像得到, 只包含 [`MASK_BACKGROUND`] 与 [`MASK_PHANTOM`]
//! 两种像素. 这里的连通域均按 4-相邻规则计算.

use crate::consts::gray::*;
use crate::data::slice::PosIter;
use crate::{Area2d, Areas2d, Idx2d, Predicate, ScanSlice};
use ndarray::Array2;
use std::collections::VecDeque;
use std::ops::{Index, IndexMut};

/// 体模二值掩膜, 拥有所有权.
#[derive(Clone, Debug)]
pub struct PhantomMask {
    data: Array2<u8>,
}

/// 掩膜中前景像素的外接矩形 (闭区间).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Extent {
    /// 最小行.
    pub min_h: usize,
    /// 最大行.
    pub max_h: usize,
    /// 最小列.
    pub min_w: usize,
    /// 最大列.
    pub max_w: usize,
}

impl Extent {
    /// 外接矩形中心 (行, 列), 亚像素精度.
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_h + self.max_h) as f64 / 2.0,
            (self.min_w + self.max_w) as f64 / 2.0,
        )
    }

    /// 外接矩形的 (高, 宽), 以像素为单位.
    #[inline]
    pub fn size(&self) -> Idx2d {
        (self.max_h - self.min_h + 1, self.max_w - self.min_w + 1)
    }
}

impl Index<Idx2d> for PhantomMask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for PhantomMask {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl PhantomMask {
    /// 信号值 **不低于** `threshold` 的像素被视为体模.
    pub fn threshold(scan: &ScanSlice, threshold: f32) -> Self {
        let data = scan
            .data()
            .mapv(|v| if v >= threshold { MASK_PHANTOM } else { MASK_BACKGROUND });
        Self { data }
    }

    /// 图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        let &[h, w] = self.data.shape() else {
            unreachable!()
        };
        (h, w)
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

    /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<&u8> {
        self.data.get(pos)
    }

    /// 统计图像中值为 `label` 的像素总个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|&p| *p == label).count()
    }

    /// 以行优先规则, 获取能迭代图像所有索引的迭代器.
    #[inline]
    pub fn pos_iter(&self) -> PosIter {
        PosIter::new(self.shape())
    }

    /// 判断一个索引是否位于图像的边缘.
    #[inline]
    pub fn is_at_border(&self, (h, w): Idx2d) -> bool {
        h == 0
            || h.saturating_add(1) == self.height()
            || w == 0
            || w.saturating_add(1) == self.width()
    }

    /// 判断 `positions` 的索引是否全部都在图像的内部.
    #[inline]
    fn all_within(&self, positions: &[Idx2d]) -> bool {
        positions.iter().all(|p| !self.is_at_border(*p))
    }

    /// 获得 `(h, w)` 的 4-邻居索引. 保证返回的索引都不越界.
    fn n4_positions(&self, (h, w): Idx2d) -> impl Iterator<Item = Idx2d> + '_ {
        [
            (h.wrapping_sub(1), w),
            (h.saturating_add(1), w),
            (h, w.wrapping_sub(1)),
            (h, w.saturating_add(1)),
        ]
        .into_iter()
        .filter(|p| self.get(*p).is_some())
    }

    /// 按照 4-相邻规则获取所有满足谓词 `pred` 的区域. 两个像素 `p1` 和 `p2`
    /// 属于同一个区域, 当且仅当存在一条从 `p1` 到 `p2` 的 4-相邻路径,
    /// 且路径上的所有像素都满足 `pred`.
    ///
    /// 区域按其首个像素的行优先顺序返回, 因此每次运行结果相同.
    pub fn areas(&self, pred: Predicate) -> Areas2d {
        let mut ans = Areas2d::with_capacity(1);
        let mut bfs_q = VecDeque::with_capacity(4);
        let mut visited = Array2::from_elem(self.shape(), false);

        for pos in self.pos_iter() {
            if visited[pos] || !pred(self[pos]) {
                continue;
            }
            bfs_q.push_back(pos);
            visited[pos] = true;
            let mut this_area = Area2d::with_capacity(1);
            while let Some(cur) = bfs_q.pop_front() {
                this_area.push(cur);
                for next in self.n4_positions(cur) {
                    if pred(self[next]) && !visited[next] {
                        visited[next] = true;
                        bfs_q.push_back(next);
                    }
                }
            }
            ans.push(this_area);
        }
        ans
    }

    /// 只保留面积最大的体模区域, 其它体模区域填充为背景.
    ///
    /// 如果掩膜中没有体模像素则返回 `false`.
    pub fn keep_largest(&mut self) -> bool {
        let areas = self.areas(is_phantom);
        self.non_max_filling(areas, MASK_BACKGROUND).is_some()
    }

    /// 将体模内部的背景空洞 (即不与图像边缘相连的背景区域) 填充为体模.
    ///
    /// 返回被填充的像素个数.
    pub fn fill_holes(&mut self) -> usize {
        let mut filled = 0;
        for area in self.areas(is_background) {
            if self.all_within(&area) {
                filled += area.len();
                area.into_iter().for_each(|p| self[p] = MASK_PHANTOM);
            }
        }
        filled
    }

    /// 体模像素的外接矩形. 掩膜为全背景时返回 `None`.
    pub fn extent(&self) -> Option<Extent> {
        let mut ext: Option<Extent> = None;
        for ((h, w), _) in self.data.indexed_iter().filter(|(_, p)| is_phantom(**p)) {
            let e = ext.get_or_insert(Extent {
                min_h: h,
                max_h: h,
                min_w: w,
                max_w: w,
            });
            e.min_h = e.min_h.min(h);
            e.max_h = e.max_h.max(h);
            e.min_w = e.min_w.min(w);
            e.max_w = e.max_w.max(w);
        }
        ext
    }

    /// 获取 `groups` 中第一个最大的区域并返回. 同时将其它区域都填充为 `fill_with`.
    ///
    /// 如果 `groups` 为空, 则返回 `None`.
    fn non_max_filling(&mut self, mut groups: Areas2d, fill_with: u8) -> Option<Area2d> {
        let index = groups
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.len().cmp(&b.1.len()).then(b.0.cmp(&a.0)))?
            .0;
        for (_, area) in groups.iter().enumerate().filter(|(idx, _)| *idx != index) {
            area.iter().copied().for_each(|p| self[p] = fill_with);
        }
        Some(std::mem::take(&mut groups[index]))
    }
}
