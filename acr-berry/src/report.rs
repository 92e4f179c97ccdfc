//! 质控报告.
//!
//! 报告只由 [`Report::build`] / [`Report::build_partial`] 一次性组装, 之后只读.
//! 序列化后的字段名是稳定的; 结构变化通过 [`Report::schema_version`] 追踪.

use crate::consts::REPORT_SCHEMA_VERSION;
use crate::dicom::SkippedFile;
use crate::metrics::{FailedMetric, Measured, MetricKind, MetricResult, Verdict};
use crate::pipeline::RunState;
use crate::protocol::ProtocolConfig;
use crate::series::SeriesSummary;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 报告所依据的协议.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProtocolInfo {
    /// 协议名.
    pub name: String,
    /// 协议版本.
    pub version: String,
}

impl From<&ProtocolConfig> for ProtocolInfo {
    fn from(config: &ProtocolConfig) -> Self {
        Self {
            name: config.name.clone(),
            version: config.version.clone(),
        }
    }
}

/// 一次运行的身份信息.
#[derive(Clone, Debug, PartialEq)]
pub struct RunInfo {
    /// 运行 ID.
    pub run_id: Uuid,
    /// 运行开始的时间.
    pub timestamp: DateTime<Utc>,
    /// 协议.
    pub protocol: ProtocolInfo,
}

impl RunInfo {
    /// 以随机 ID 和当前时间开始一次运行.
    pub fn start(config: &ProtocolConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            protocol: config.into(),
        }
    }
}

/// 质控报告.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Report {
    schema_version: u32,
    run_id: Uuid,
    timestamp: DateTime<Utc>,
    protocol: ProtocolInfo,
    overall: Verdict,
    complete: bool,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    stopped_at: Option<RunState>,
    series: Vec<SeriesSummary>,
    results: Vec<MetricResult>,
    failed_metrics: Vec<FailedMetric>,
    skipped_files: Vec<SkippedFile>,
}

impl Report {
    /// 组装完整的报告.
    ///
    /// 总判定为所有度量判定的合取; 只要有度量执行失败, 总判定即为不通过.
    pub fn build(
        info: RunInfo,
        series: Vec<SeriesSummary>,
        measured: Measured,
        skipped_files: Vec<SkippedFile>,
    ) -> Self {
        Self::assemble(info, None, series, measured, skipped_files)
    }

    /// 组装被取消的运行的部分报告. `stopped_at` 是取消时所处的阶段.
    ///
    /// 部分报告的总判定一定为不通过.
    pub fn build_partial(
        info: RunInfo,
        stopped_at: RunState,
        series: Vec<SeriesSummary>,
        measured: Measured,
        skipped_files: Vec<SkippedFile>,
    ) -> Self {
        Self::assemble(info, Some(stopped_at), series, measured, skipped_files)
    }

    fn assemble(
        info: RunInfo,
        stopped_at: Option<RunState>,
        series: Vec<SeriesSummary>,
        measured: Measured,
        skipped_files: Vec<SkippedFile>,
    ) -> Self {
        let complete = stopped_at.is_none();
        let executed = Verdict::all(measured.results.iter().map(|r| r.verdict));
        let overall = if complete && measured.failed.is_empty() {
            executed
        } else {
            Verdict::Fail
        };
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            run_id: info.run_id,
            timestamp: info.timestamp,
            protocol: info.protocol,
            overall,
            complete,
            stopped_at,
            series,
            results: measured.results,
            failed_metrics: measured.failed,
            skipped_files,
        }
    }

    /// 报告结构版本.
    #[inline]
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// 运行 ID.
    #[inline]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// 运行开始的时间.
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 协议.
    #[inline]
    pub fn protocol(&self) -> &ProtocolInfo {
        &self.protocol
    }

    /// 总判定.
    #[inline]
    pub fn overall(&self) -> Verdict {
        self.overall
    }

    /// 运行是否完整 (未被取消)?
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// 被取消时所处的阶段.
    #[inline]
    pub fn stopped_at(&self) -> Option<RunState> {
        self.stopped_at
    }

    /// 识别出的序列.
    #[inline]
    pub fn series(&self) -> &[SeriesSummary] {
        &self.series
    }

    /// 成功执行的度量结果, 按登记顺序.
    #[inline]
    pub fn results(&self) -> &[MetricResult] {
        &self.results
    }

    /// 按种类查找度量结果.
    pub fn result(&self, kind: MetricKind) -> Option<&MetricResult> {
        self.results.iter().find(|r| r.metric == kind)
    }

    /// 执行失败的度量.
    #[inline]
    pub fn failed_metrics(&self) -> &[FailedMetric] {
        &self.failed_metrics
    }

    /// 被跳过的文件.
    #[inline]
    pub fn skipped_files(&self) -> &[SkippedFile] {
        &self.skipped_files
    }

    /// 序列化为缩进的 JSON.
    #[cfg(feature = "serde")]
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Measurement;
    use crate::protocol::Interval;

    fn result(kind: MetricKind, value: f64) -> MetricResult {
        let m = Measurement::judged("value", Some(value), "mm", Interval::closed(0.0, 1.0));
        MetricResult::new(kind, m, Vec::new(), Vec::new(), &[])
    }

    fn info() -> RunInfo {
        RunInfo::start(&ProtocolConfig::default())
    }

    #[test]
    fn test_overall_is_conjunction() {
        let measured = Measured {
            results: vec![
                result(MetricKind::GeometricAccuracy, 0.5),
                result(MetricKind::SliceThicknessAccuracy, 0.7),
            ],
            failed: Vec::new(),
        };
        let report = Report::build(info(), Vec::new(), measured.clone(), Vec::new());
        assert_eq!(report.overall(), Verdict::Pass);
        assert!(report.is_complete());
        assert_eq!(report.schema_version(), REPORT_SCHEMA_VERSION);

        let mut failing = measured;
        failing.results.push(result(MetricKind::UniformityGhosting, 3.0));
        let report = Report::build(info(), Vec::new(), failing, Vec::new());
        assert_eq!(report.overall(), Verdict::Fail);
        assert!(report.result(MetricKind::UniformityGhosting).is_some());
        assert!(report.failed_metrics().is_empty());
    }

    #[test]
    fn test_failed_metric_fails_overall() {
        let measured = Measured {
            results: vec![result(MetricKind::GeometricAccuracy, 0.5)],
            failed: vec![FailedMetric {
                metric: MetricKind::HighContrastResolution,
                reason: "phantom not found in slice 1".into(),
            }],
        };
        let report = Report::build(info(), Vec::new(), measured, Vec::new());
        assert_eq!(report.overall(), Verdict::Fail);
        assert_eq!(report.results().len(), 1);
        assert_eq!(report.failed_metrics().len(), 1);
    }

    #[test]
    fn test_partial_report_never_passes() {
        let report = Report::build_partial(
            info(),
            RunState::Classifying,
            Vec::new(),
            Measured::default(),
            vec![SkippedFile {
                name: "notes.txt".into(),
                reason: "not a DICOM file".into(),
            }],
        );
        assert_eq!(report.overall(), Verdict::Fail);
        assert!(!report.is_complete());
        assert_eq!(report.stopped_at(), Some(RunState::Classifying));
        assert_eq!(report.skipped_files().len(), 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_field_names() {
        let measured = Measured {
            results: vec![result(MetricKind::GeometricAccuracy, 0.5)],
            failed: Vec::new(),
        };
        let report = Report::build(info(), Vec::new(), measured, Vec::new());
        let json: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        for key in [
            "schema_version",
            "run_id",
            "timestamp",
            "protocol",
            "overall",
            "complete",
            "series",
            "results",
            "failed_metrics",
            "skipped_files",
        ] {
            assert!(json.get(key).is_some(), "{key}");
        }
        assert!(json.get("stopped_at").is_none());
        assert_eq!(json["overall"], "pass");
        assert_eq!(json["results"][0]["metric"], "geometric_accuracy");
        assert_eq!(json["protocol"]["name"], "ACR large phantom");

        let back: Report = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
