//! 流水线编排: 解码 → 分类 → 选片 → 度量 → 报告.
//!
//! 每个阶段之间检查一次取消信号. 被取消的运行返回部分报告, 而不是错误.

use crate::dicom::{decode_all, InputFile, SkippedFile};
use crate::metrics::{measure, Job, Measured, MetricRegistry, MetricResult};
use crate::protocol::{select_for, ConfigError, ProtocolConfig, SelectionPolicy, SliceSelectionError};
use crate::report::{ProtocolInfo, Report, RunInfo};
use crate::series::{classify, ClassificationError, SeriesMap, SeriesSummary};
use crate::ImgWriteVis;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::Serialize;

mod state;

pub use state::{CancelToken, FatalStage, RunState};

/// 使运行失败的底层错误.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// 序列分类失败.
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    /// 选片失败 (仅在 [`SelectionPolicy::Abort`] 下致命).
    #[error(transparent)]
    Selection(#[from] SliceSelectionError),
}

/// 失败的运行.
#[derive(Debug, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[error("run {run_id} {stage}: {reason}")]
pub struct RunFailure {
    /// 运行 ID.
    pub run_id: Uuid,
    /// 运行开始的时间.
    pub timestamp: DateTime<Utc>,
    /// 协议.
    pub protocol: ProtocolInfo,
    /// 失败的阶段, 总是 [`RunState::Failed`].
    pub stage: RunState,
    /// 人类可读的原因.
    pub reason: String,
    /// 失败前已经识别出的序列.
    pub series: Vec<SeriesSummary>,
    /// 被跳过的文件.
    pub skipped_files: Vec<SkippedFile>,
    /// 底层错误.
    #[cfg_attr(feature = "serde", serde(skip))]
    #[source]
    pub error: PipelineError,
}

impl RunFailure {
    /// 序列化为缩进的 JSON.
    #[cfg(feature = "serde")]
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// 记录一次运行的阶段迁移.
struct Tracker {
    run_id: Uuid,
    state: RunState,
}

impl Tracker {
    fn new(run_id: Uuid) -> Self {
        log::info!("run {run_id}: {}", RunState::Received);
        Self {
            run_id,
            state: RunState::Received,
        }
    }

    fn enter(&mut self, next: RunState) {
        debug_assert_eq!(self.state.next(), Some(next));
        log::info!("run {}: {} -> {next}", self.run_id, self.state);
        self.state = next;
    }

    fn fail(
        &mut self,
        info: RunInfo,
        error: PipelineError,
        series: Vec<SeriesSummary>,
        skipped_files: Vec<SkippedFile>,
    ) -> RunFailure {
        let stage = self.state.fail().unwrap_or(self.state);
        log::error!("run {}: {stage}: {error}", self.run_id);
        self.state = stage;
        RunFailure {
            run_id: info.run_id,
            timestamp: info.timestamp,
            protocol: info.protocol,
            stage,
            reason: error.to_string(),
            series,
            skipped_files,
            error,
        }
    }

    fn stop(
        &self,
        info: RunInfo,
        series: Vec<SeriesSummary>,
        measured: Measured,
        skipped_files: Vec<SkippedFile>,
    ) -> Report {
        log::warn!("run {}: cancelled after {}", self.run_id, self.state);
        Report::build_partial(info, self.state, series, measured, skipped_files)
    }
}

/// 质控流水线.
///
/// 持有协议配置与度量登记表, 本身无状态, 可以在多个线程中同时运行.
pub struct Pipeline {
    config: ProtocolConfig,
    registry: MetricRegistry,
    dump_dir: Option<PathBuf>,
}

impl Pipeline {
    /// 以 `config` 与全部六项 ACR 度量构造流水线. 配置不合法时返回错误.
    pub fn new(config: ProtocolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            registry: MetricRegistry::acr_default(),
            dump_dir: None,
        })
    }

    /// 默认 ACR 协议.
    pub fn acr_default() -> Self {
        Self {
            config: ProtocolConfig::default(),
            registry: MetricRegistry::acr_default(),
            dump_dir: None,
        }
    }

    /// 替换度量登记表.
    pub fn with_registry(mut self, registry: MetricRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// 把每项度量用到的切片另存为 PNG, 保存在 `dir/<run_id>/` 下.
    pub fn with_dump_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// 协议配置.
    #[inline]
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// 度量登记表.
    #[inline]
    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// 分析一次检查的全部文件.
    pub fn run(&self, files: &[InputFile]) -> Result<Report, RunFailure> {
        self.run_with_cancel(files, &CancelToken::new())
    }

    /// 同 [`Pipeline::run`], 但在每个阶段之间检查 `cancel`.
    ///
    /// 取消时返回 `complete == false` 的部分报告, 其中包含取消前已经得到的结果.
    pub fn run_with_cancel(&self, files: &[InputFile], cancel: &CancelToken) -> Result<Report, RunFailure> {
        let info = RunInfo::start(&self.config);
        let mut tracker = Tracker::new(info.run_id);
        if cancel.is_cancelled() {
            return Ok(tracker.stop(info, Vec::new(), Measured::default(), Vec::new()));
        }

        tracker.enter(RunState::Decoding);
        let decoded = decode_all(files);
        let skipped = decoded.skipped;
        if cancel.is_cancelled() {
            return Ok(tracker.stop(info, Vec::new(), Measured::default(), skipped));
        }

        tracker.enter(RunState::Classifying);
        let series = match classify(decoded.slices, &self.config.classification) {
            Ok(series) => series,
            Err(e) => return Err(tracker.fail(info, e.into(), Vec::new(), skipped)),
        };
        if cancel.is_cancelled() {
            return Ok(tracker.stop(info, series.summaries(), Measured::default(), skipped));
        }

        tracker.enter(RunState::Selecting);
        let jobs = match self.jobs(&series) {
            Ok(jobs) => jobs,
            Err(e) => return Err(tracker.fail(info, e.into(), series.summaries(), skipped)),
        };
        if cancel.is_cancelled() {
            return Ok(tracker.stop(info, series.summaries(), Measured::default(), skipped));
        }

        tracker.enter(RunState::Measuring);
        let measured = measure(&jobs, &self.config);
        if let Some(dir) = &self.dump_dir {
            dump(dir, info.run_id, &jobs, &measured.results);
        }
        if cancel.is_cancelled() {
            return Ok(tracker.stop(info, series.summaries(), measured, skipped));
        }

        tracker.enter(RunState::Reporting);
        let report = Report::build(info, series.summaries(), measured, skipped);
        tracker.enter(RunState::Done);
        log::info!("run {}: overall {:?}", report.run_id(), report.overall());
        Ok(report)
    }

    /// 按登记顺序为每项度量选片.
    fn jobs<'a>(&'a self, series: &'a SeriesMap) -> Result<Vec<Job<'a>>, SliceSelectionError> {
        self.registry
            .iter()
            .map(|metric| {
                let selection = select_for(series, &self.config, metric.kind());
                if let Err(e) = &selection {
                    match self.config.selection_policy {
                        SelectionPolicy::Abort => return Err(e.clone()),
                        SelectionPolicy::Isolate => log::warn!("{e}, {} will be reported as failed", metric.kind()),
                    }
                }
                Ok(Job { metric, selection })
            })
            .collect()
    }
}

/// 把每项度量选中的切片保存为 `dir/<run_id>/<metric>_<series>_<number>.png`,
/// 测量依据的剖面保存为 `dir/<run_id>/<metric>_<profile>.csv`.
///
/// 保存失败只记录日志, 不影响运行结果.
fn dump(dir: &Path, run_id: Uuid, jobs: &[Job<'_>], results: &[MetricResult]) {
    let dir = dir.join(run_id.to_string());
    if let Err(e) = std::fs::create_dir_all(&dir) {
        log::warn!("cannot create {}: {e}", dir.display());
        return;
    }
    for job in jobs {
        let Ok(slices) = &job.selection else {
            continue;
        };
        for sel in slices {
            let path = dir.join(format!(
                "{}_{}_{:02}.png",
                job.metric.kind().name(),
                sel.series,
                sel.number
            ));
            match sel.slice.save(&path) {
                Ok(()) => log::debug!("saved {}", path.display()),
                Err(e) => log::warn!("cannot save {}: {e}", path.display()),
            }
        }
    }
    for result in results {
        for profile in &result.profiles {
            let path = dir.join(format!("{}_{}.csv", result.metric.name(), profile.name));
            let written = std::fs::File::create(&path)
                .and_then(|f| profile.write_csv(std::io::BufWriter::new(f)));
            match written {
                Ok(()) => log::debug!("saved {}", path.display()),
                Err(e) => log::warn!("cannot save {}: {e}", path.display()),
            }
        }
    }
}
