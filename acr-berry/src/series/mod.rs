//! 序列分类.
//!
//! 先按 (Series Instance UID, TE) 做结构化分组, 再按采集参数签名为每个分组赋予
//! 语义标签 (定位像, T1, T2). 序列内的切片按位置升序排列.

use crate::{MrSlice, Orientation, PixelSpacing};
use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod classify;

pub use classify::classify;

/// 语义序列标签.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SeriesLabel {
    /// 定位像.
    Localizer,
    /// ACR T1 加权序列.
    T1,
    /// ACR T2 加权序列.
    T2,
}

impl fmt::Display for SeriesLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SeriesLabel::Localizer => "localizer",
            SeriesLabel::T1 => "t1",
            SeriesLabel::T2 => "t2",
        })
    }
}

/// 一个已标注的序列. 非空, 切片按位置升序, 位置相同时按实例序号升序.
#[derive(Clone, Debug)]
pub struct Series {
    label: SeriesLabel,
    series_uid: String,
    echo_time_ms: Option<f64>,
    slices: Vec<MrSlice>,
}

impl Series {
    /// 语义标签.
    #[inline]
    pub fn label(&self) -> SeriesLabel {
        self.label
    }

    /// Series Instance UID.
    #[inline]
    pub fn series_uid(&self) -> &str {
        &self.series_uid
    }

    /// 分组所用的回波时间.
    #[inline]
    pub fn echo_time_ms(&self) -> Option<f64> {
        self.echo_time_ms
    }

    /// 所有切片.
    #[inline]
    pub fn slices(&self) -> &[MrSlice] {
        &self.slices
    }

    /// 切片数.
    #[inline]
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// 永远为 `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// 第 `number` 层 (从 1 开始).
    #[inline]
    pub fn slice(&self, number: usize) -> Option<&MrSlice> {
        number.checked_sub(1).and_then(|i| self.slices.get(i))
    }

    /// 像素间距 (序列内一致).
    pub fn spacing(&self) -> PixelSpacing {
        self.slices[0].spacing()
    }

    /// 图像方向 (序列内一致).
    pub fn orientation(&self) -> Orientation {
        self.slices[0].orientation()
    }

    /// 序列概要.
    pub fn summary(&self) -> SeriesSummary {
        let first = &self.slices[0];
        SeriesSummary {
            label: Some(self.label),
            series_uid: self.series_uid.clone(),
            description: first.header().series_description.clone(),
            slices: self.len(),
            repetition_time_ms: first.acquisition().repetition_time_ms,
            echo_time_ms: self.echo_time_ms,
        }
    }
}

/// 报告中的序列概要. 未被采用的分组没有标签.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeriesSummary {
    /// 语义标签.
    pub label: Option<SeriesLabel>,
    /// Series Instance UID.
    pub series_uid: String,
    /// 序列描述.
    pub description: Option<String>,
    /// 切片数.
    pub slices: usize,
    /// TR, 毫秒.
    pub repetition_time_ms: Option<f64>,
    /// TE, 毫秒.
    pub echo_time_ms: Option<f64>,
}

/// 语义标签到序列的映射.
#[derive(Clone, Debug, Default)]
pub struct SeriesMap {
    series: BTreeMap<SeriesLabel, Series>,
    unassigned: Vec<SeriesSummary>,
}

impl SeriesMap {
    /// 获取某个标签的序列.
    #[inline]
    pub fn get(&self, label: SeriesLabel) -> Option<&Series> {
        self.series.get(&label)
    }

    /// 按标签顺序迭代.
    pub fn iter(&self) -> impl Iterator<Item = (SeriesLabel, &Series)> {
        self.series.iter().map(|(k, v)| (*k, v))
    }

    /// 已标注的序列数.
    #[inline]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// 是否没有任何已标注的序列?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// 所有分组的概要: 先是已标注序列 (按标签顺序), 然后是未采用的分组.
    pub fn summaries(&self) -> Vec<SeriesSummary> {
        self.series
            .values()
            .map(Series::summary)
            .chain(self.unassigned.iter().cloned())
            .collect()
    }
}

/// 序列分类失败. 对整个运行是致命的.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ClassificationError {
    /// 没有任何切片.
    #[error("no decodable MR slices in the archive")]
    NoSlices,

    /// 必需的序列没有被识别出来.
    #[error("could not identify the {0} series")]
    MissingSeries(SeriesLabel),

    /// 多个分组都匹配同一标签, 且无法按切片数区分.
    #[error("ambiguous {label} series, candidates: {}", candidates.join(", "))]
    AmbiguousSeries {
        /// 标签.
        label: SeriesLabel,
        /// 候选分组的描述.
        candidates: Vec<String>,
    },

    /// 序列内的像素间距或方向不一致.
    #[error("inconsistent {label} series {series_uid}: {reason}")]
    InconsistentSeries {
        /// 标签.
        label: SeriesLabel,
        /// Series Instance UID.
        series_uid: String,
        /// 具体原因.
        reason: String,
    },
}
