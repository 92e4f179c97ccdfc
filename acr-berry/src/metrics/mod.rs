//! ACR 度量.
//!
//! 每一项度量都实现 [`Metric`], 并登记在有序的 [`MetricRegistry`] 中.
//! 度量只能读取被选中的切片与配置; 一项度量的错误或 panic 只会使它自己失败.

use crate::protocol::{Interval, ProtocolConfig, SelectedSlice, SliceSelectionError};
use crate::series::SeriesLabel;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod locate;
pub mod roi;
pub mod sampling;

mod geometry;
mod lcd;
mod position;
mod resolution;
mod thickness;
mod uniformity;

pub use geometry::GeometricAccuracy;
pub use lcd::LowContrastDetectability;
pub use position::SlicePositionAccuracy;
pub use resolution::HighContrastResolution;
pub use thickness::SliceThicknessAccuracy;
pub use uniformity::UniformityGhosting;

/// 度量种类.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MetricKind {
    /// 几何精度.
    GeometricAccuracy,
    /// 层面位置精度.
    SlicePositionAccuracy,
    /// 层厚精度.
    SliceThicknessAccuracy,
    /// 高对比空间分辨率.
    HighContrastResolution,
    /// 低对比可探测性.
    LowContrastDetectability,
    /// 图像均匀度与伪影.
    UniformityGhosting,
}

impl MetricKind {
    /// 所有度量, 按 ACR 手册的顺序.
    pub const ALL: [MetricKind; 6] = [
        MetricKind::GeometricAccuracy,
        MetricKind::SlicePositionAccuracy,
        MetricKind::SliceThicknessAccuracy,
        MetricKind::HighContrastResolution,
        MetricKind::LowContrastDetectability,
        MetricKind::UniformityGhosting,
    ];

    /// 机器可读的名字, 与序列化结果一致.
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::GeometricAccuracy => "geometric_accuracy",
            MetricKind::SlicePositionAccuracy => "slice_position_accuracy",
            MetricKind::SliceThicknessAccuracy => "slice_thickness_accuracy",
            MetricKind::HighContrastResolution => "high_contrast_resolution",
            MetricKind::LowContrastDetectability => "low_contrast_detectability",
            MetricKind::UniformityGhosting => "uniformity_ghosting",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 判定结果.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Verdict {
    /// 通过.
    Pass,
    /// 不通过.
    Fail,
}

impl Verdict {
    /// 数值落在容差内则通过. 没有数值视为不通过.
    pub fn of(value: Option<f64>, tolerance: &Interval) -> Self {
        if value.is_some_and(|v| tolerance.contains(v)) {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    /// 所有判定均通过才通过. 空序列视为通过.
    pub fn all<I: IntoIterator<Item = Verdict>>(it: I) -> Self {
        if it.into_iter().all(|v| v == Verdict::Pass) {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    /// 是否通过?
    #[inline]
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// 一次具体的测量. 没有容差的测量只作参考, 不参与判定.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    /// 名字.
    pub name: String,
    /// 数值. 无法得到数值时为 `None`.
    pub value: Option<f64>,
    /// 单位.
    pub unit: String,
    /// 容差.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub tolerance: Option<Interval>,
    /// 判定.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub verdict: Option<Verdict>,
}

impl Measurement {
    /// 参与判定的测量.
    pub fn judged(name: impl Into<String>, value: Option<f64>, unit: &str, tolerance: Interval) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.to_string(),
            tolerance: Some(tolerance),
            verdict: Some(Verdict::of(value, &tolerance)),
        }
    }

    /// 仅供参考的测量.
    pub fn info(name: impl Into<String>, value: Option<f64>, unit: &str) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.to_string(),
            tolerance: None,
            verdict: None,
        }
    }
}

/// 度量所用切片的引用.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SliceRef {
    /// 序列.
    pub series: SeriesLabel,
    /// 协议层号, 从 1 开始.
    pub number: usize,
    /// 实例序号.
    pub instance_number: i32,
    /// 来源文件名.
    pub source: String,
}

impl From<&SelectedSlice<'_>> for SliceRef {
    fn from(s: &SelectedSlice<'_>) -> Self {
        Self {
            series: s.series,
            number: s.number,
            instance_number: s.slice.instance_number(),
            source: s.slice.source().to_string(),
        }
    }
}

/// 测量所依据的一维剖面, 用于导出排查.
#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    /// 剖面名, 如 `top_ramp`.
    pub name: String,
    /// 协议层号.
    pub slice: usize,
    /// 相邻采样点的间距, 毫米.
    pub spacing_mm: f64,
    /// 平滑后的信号.
    pub values: Vec<f64>,
}

impl Profile {
    /// 以 `position_mm,value` 两列写出 CSV.
    pub fn write_csv<W: std::io::Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "position_mm,value")?;
        for (i, v) in self.values.iter().enumerate() {
            writeln!(w, "{:.4},{v}", i as f64 * self.spacing_mm)?;
        }
        Ok(())
    }
}

/// 一项度量的结果.
///
/// `value`/`unit`/`tolerance` 来自主测量 (即 `measurements` 的第一项).
/// `verdict` 是所有参与判定的测量的合取.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricResult {
    /// 度量.
    pub metric: MetricKind,
    /// 主数值.
    pub value: Option<f64>,
    /// 主数值的单位.
    pub unit: String,
    /// 主数值的容差.
    pub tolerance: Interval,
    /// 判定.
    pub verdict: Verdict,
    /// 全部测量, 主测量在前.
    pub measurements: Vec<Measurement>,
    /// 诊断信息.
    pub notes: Vec<String>,
    /// 所用切片.
    pub slices: Vec<SliceRef>,
    /// 测量依据的剖面. 不进入报告.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub profiles: Vec<Profile>,
}

impl MetricResult {
    /// 由主测量和其余测量组装结果.
    pub fn new(
        metric: MetricKind,
        primary: Measurement,
        others: Vec<Measurement>,
        notes: Vec<String>,
        slices: &[SelectedSlice<'_>],
    ) -> Self {
        let measurements: Vec<Measurement> = std::iter::once(primary).chain(others).collect();
        let primary = &measurements[0];
        let verdict = Verdict::all(measurements.iter().filter_map(|m| m.verdict));
        Self {
            metric,
            value: primary.value,
            unit: primary.unit.clone(),
            tolerance: primary.tolerance.unwrap_or_else(Interval::unbounded),
            verdict,
            notes,
            slices: slices.iter().map(SliceRef::from).collect(),
            measurements,
            profiles: Vec::new(),
        }
    }

    /// 附上测量依据的剖面.
    pub fn with_profiles(mut self, profiles: Vec<Profile>) -> Self {
        self.profiles = profiles;
        self
    }

    /// 按名字查找测量.
    pub fn measurement(&self, name: &str) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.name == name)
    }
}

/// 度量执行失败.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum MetricError {
    /// 没有任何切片.
    #[error("no slices selected")]
    NoSlices,

    /// 切片中找不到体模.
    #[error("phantom not found in slice {slice}")]
    PhantomNotFound {
        /// 协议层号.
        slice: usize,
    },

    /// 找不到体模中的结构.
    #[error("{feature} not found in slice {slice}")]
    FeatureNotFound {
        /// 结构名.
        feature: &'static str,
        /// 协议层号.
        slice: usize,
    },

    /// ROI 超出图像.
    #[error("{roi} ROI does not fit in slice {slice}")]
    RoiOutsideImage {
        /// ROI 名.
        roi: &'static str,
        /// 协议层号.
        slice: usize,
    },

    /// 度量内部 panic.
    #[error("metric panicked: {0}")]
    Panicked(String),

    /// 选片失败 (仅在 `isolate` 策略下出现).
    #[error(transparent)]
    Selection(#[from] SliceSelectionError),
}

/// 一项执行失败的度量.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FailedMetric {
    /// 度量.
    pub metric: MetricKind,
    /// 人类可读的原因.
    pub reason: String,
}

/// ACR 度量.
///
/// 实现者只能读取 `slices` 与 `config`. 选中的切片与选片表的顺序一致.
pub trait Metric: Send + Sync {
    /// 度量种类.
    fn kind(&self) -> MetricKind;

    /// 计算度量.
    fn compute(
        &self,
        slices: &[SelectedSlice<'_>],
        config: &ProtocolConfig,
    ) -> Result<MetricResult, MetricError>;
}

/// 有序的度量注册表.
pub struct MetricRegistry {
    metrics: Vec<Box<dyn Metric>>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::acr_default()
    }
}

impl MetricRegistry {
    /// 空注册表.
    pub fn empty() -> Self {
        Self {
            metrics: Vec::new(),
        }
    }

    /// 六项 ACR 度量, 按手册顺序.
    pub fn acr_default() -> Self {
        let mut reg = Self::empty();
        reg.register(GeometricAccuracy)
            .register(SlicePositionAccuracy)
            .register(SliceThicknessAccuracy)
            .register(HighContrastResolution)
            .register(LowContrastDetectability)
            .register(UniformityGhosting);
        reg
    }

    /// 登记一项度量. 已有同种度量时原地替换.
    pub fn register<M: Metric + 'static>(&mut self, metric: M) -> &mut Self {
        let kind = metric.kind();
        match self.metrics.iter().position(|m| m.kind() == kind) {
            Some(i) => self.metrics[i] = Box::new(metric),
            None => self.metrics.push(Box::new(metric)),
        }
        self
    }

    /// 按登记顺序迭代.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Metric> {
        self.metrics.iter().map(|m| m.as_ref())
    }

    /// 按登记顺序列出度量种类.
    pub fn kinds(&self) -> Vec<MetricKind> {
        self.iter().map(|m| m.kind()).collect()
    }

    /// 度量数.
    #[inline]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 执行一项度量, 将 panic 转换为 [`MetricError::Panicked`].
pub fn execute(
    metric: &dyn Metric,
    slices: &[SelectedSlice<'_>],
    config: &ProtocolConfig,
) -> Result<MetricResult, MetricError> {
    panic::catch_unwind(AssertUnwindSafe(|| metric.compute(slices, config)))
        .unwrap_or_else(|payload| Err(MetricError::Panicked(panic_message(payload.as_ref()))))
}

/// 一项待执行的度量及其选片结果.
pub struct Job<'a> {
    /// 度量.
    pub metric: &'a dyn Metric,
    /// 选片结果.
    pub selection: Result<Vec<SelectedSlice<'a>>, SliceSelectionError>,
}

/// 度量阶段的输出.
#[derive(Clone, Debug, Default)]
pub struct Measured {
    /// 成功执行的结果, 按登记顺序.
    pub results: Vec<MetricResult>,
    /// 执行失败的度量, 按登记顺序.
    pub failed: Vec<FailedMetric>,
}

/// 执行所有度量. 打开 `rayon` feature 时并行执行, 输出顺序与 `jobs` 一致.
pub fn measure(jobs: &[Job<'_>], config: &ProtocolConfig) -> Measured {
    let run = |job: &Job<'_>| -> Result<MetricResult, MetricError> {
        let slices = job.selection.as_ref().map_err(|e| e.clone())?;
        execute(job.metric, slices, config)
    };

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            use rayon::prelude::*;
            let outcomes: Vec<_> = jobs.par_iter().map(run).collect();
        } else {
            let outcomes: Vec<_> = jobs.iter().map(run).collect();
        }
    }

    let mut out = Measured::default();
    for (job, outcome) in jobs.iter().zip(outcomes) {
        let kind = job.metric.kind();
        match outcome {
            Ok(result) => {
                log::info!(
                    "{kind}: {:?} {} -> {:?}",
                    result.value,
                    result.unit,
                    result.verdict
                );
                out.results.push(result);
            }
            Err(e) => {
                log::warn!("{kind} failed: {e}");
                out.failed.push(FailedMetric {
                    metric: kind,
                    reason: e.to_string(),
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exploding;

    impl Metric for Exploding {
        fn kind(&self) -> MetricKind {
            MetricKind::UniformityGhosting
        }

        fn compute(
            &self,
            _: &[SelectedSlice<'_>],
            _: &ProtocolConfig,
        ) -> Result<MetricResult, MetricError> {
            panic!("boom")
        }
    }

    struct Constant(MetricKind, f64);

    impl Metric for Constant {
        fn kind(&self) -> MetricKind {
            self.0
        }

        fn compute(
            &self,
            slices: &[SelectedSlice<'_>],
            _: &ProtocolConfig,
        ) -> Result<MetricResult, MetricError> {
            let m = Measurement::judged("value", Some(self.1), "mm", Interval::closed(0.0, 1.0));
            Ok(MetricResult::new(self.0, m, Vec::new(), Vec::new(), slices))
        }
    }

    #[test]
    fn test_verdict_is_function_of_value_and_tolerance() {
        let t = Interval::closed(188.0, 192.0);
        assert_eq!(Verdict::of(Some(190.0), &t), Verdict::Pass);
        assert_eq!(Verdict::of(Some(193.0), &t), Verdict::Fail);
        assert_eq!(Verdict::of(None, &t), Verdict::Fail);
        assert_eq!(Verdict::all([]), Verdict::Pass);
        assert_eq!(Verdict::all([Verdict::Pass, Verdict::Fail]), Verdict::Fail);
    }

    #[test]
    fn test_result_verdict_includes_secondary_measurements() {
        let primary = Measurement::judged("piu", Some(95.0), "%", Interval::at_least(87.5));
        let ghost = Measurement::judged("ghosting", Some(3.0), "%", Interval::at_most(2.5));
        let snr = Measurement::info("snr", None, "");
        let r = MetricResult::new(
            MetricKind::UniformityGhosting,
            primary,
            vec![ghost, snr],
            Vec::new(),
            &[],
        );
        assert_eq!(r.value, Some(95.0));
        assert_eq!(r.tolerance, Interval::at_least(87.5));
        assert_eq!(r.verdict, Verdict::Fail);
        assert_eq!(r.measurements.len(), 3);
        assert!(r.measurement("snr").unwrap().verdict.is_none());
    }

    #[test]
    fn test_registry_order_and_replace() {
        let mut reg = MetricRegistry::acr_default();
        assert_eq!(reg.kinds(), MetricKind::ALL.to_vec());
        reg.register(Constant(MetricKind::GeometricAccuracy, 0.5));
        assert_eq!(reg.len(), 6);
        assert_eq!(reg.kinds()[0], MetricKind::GeometricAccuracy);
    }

    #[test]
    fn test_panic_is_isolated() {
        let config = ProtocolConfig::default();
        let exploding = Exploding;
        let fine = Constant(MetricKind::GeometricAccuracy, 0.5);
        let jobs = [
            Job {
                metric: &fine,
                selection: Ok(Vec::new()),
            },
            Job {
                metric: &exploding,
                selection: Ok(Vec::new()),
            },
            Job {
                metric: &fine,
                selection: Err(SliceSelectionError::NoRule(MetricKind::GeometricAccuracy)),
            },
        ];
        let measured = measure(&jobs, &config);
        assert_eq!(measured.results.len(), 1);
        assert_eq!(measured.results[0].verdict, Verdict::Pass);
        assert_eq!(measured.failed.len(), 2);
        assert_eq!(measured.failed[0].metric, MetricKind::UniformityGhosting);
        assert!(measured.failed[0].reason.contains("boom"));
        assert!(measured.failed[1].reason.contains("no selection rule"));
    }
}
