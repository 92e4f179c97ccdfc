//! 选片: 把选片表的一行映射到具体的切片.

use super::{ProtocolConfig, SelectionRule};
use crate::metrics::MetricKind;
use crate::series::{SeriesLabel, SeriesMap};
use crate::MrSlice;

/// 被某个度量选中的一张切片.
#[derive(Copy, Clone, Debug)]
pub struct SelectedSlice<'a> {
    /// 所属序列.
    pub series: SeriesLabel,
    /// 协议层号, 从 1 开始.
    pub number: usize,
    /// 切片本身.
    pub slice: &'a MrSlice,
}

/// 选片失败.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SliceSelectionError {
    /// 选片表中没有该度量.
    #[error("no selection rule for {0}")]
    NoRule(MetricKind),

    /// 规则引用的序列没有被识别出来.
    #[error("{metric} needs series {series}, which was not identified")]
    SeriesMissing {
        /// 度量.
        metric: MetricKind,
        /// 序列.
        series: SeriesLabel,
    },

    /// 序列的切片数少于规则要求.
    #[error("{metric} needs {required} slices of series {series}, only {available} available")]
    TooFewSlices {
        /// 度量.
        metric: MetricKind,
        /// 序列.
        series: SeriesLabel,
        /// 需要的切片数 (即规则中的最大层号).
        required: usize,
        /// 实际的切片数.
        available: usize,
    },
}

/// 按照 `rule` 从 `series` 中选取切片. 返回顺序与 `rule.slices` 一致.
pub fn select<'a>(
    series: &'a SeriesMap,
    rule: &SelectionRule,
) -> Result<Vec<SelectedSlice<'a>>, SliceSelectionError> {
    let s = series
        .get(rule.series)
        .ok_or(SliceSelectionError::SeriesMissing {
            metric: rule.metric,
            series: rule.series,
        })?;
    let required = rule.slices.iter().copied().max().unwrap_or(0);
    let too_few = || SliceSelectionError::TooFewSlices {
        metric: rule.metric,
        series: rule.series,
        required,
        available: s.len(),
    };
    rule.slices
        .iter()
        .map(|&number| {
            s.slice(number).map(|slice| SelectedSlice {
                series: rule.series,
                number,
                slice,
            })
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(too_few)
}

/// 按照 `config` 中的选片表为 `metric` 选取切片.
pub fn select_for<'a>(
    series: &'a SeriesMap,
    config: &ProtocolConfig,
    metric: MetricKind,
) -> Result<Vec<SelectedSlice<'a>>, SliceSelectionError> {
    let rule = config
        .rule_for(metric)
        .ok_or(SliceSelectionError::NoRule(metric))?;
    select(series, rule)
}
