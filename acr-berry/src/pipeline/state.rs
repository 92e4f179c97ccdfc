use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 可能使整次运行失败的阶段.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FatalStage {
    /// 序列分类.
    Classifying,
    /// 选片.
    Selecting,
}

/// 一次运行所处的阶段.
///
/// `Received → Decoding → Classifying → Selecting → Measuring → Reporting → Done`.
/// `Failed` 只能从 `Classifying` 或 `Selecting` 进入. `Done` 与 `Failed` 是终态.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RunState {
    /// 收到归档.
    Received,
    /// 解码.
    Decoding,
    /// 序列分类.
    Classifying,
    /// 选片.
    Selecting,
    /// 度量.
    Measuring,
    /// 生成报告.
    Reporting,
    /// 完成.
    Done,
    /// 失败.
    Failed(FatalStage),
}

impl RunState {
    /// 是否是终态?
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed(_))
    }

    /// 正常流程中的下一个阶段. 终态没有下一个阶段.
    pub fn next(&self) -> Option<RunState> {
        use RunState::*;
        match self {
            Received => Some(Decoding),
            Decoding => Some(Classifying),
            Classifying => Some(Selecting),
            Selecting => Some(Measuring),
            Measuring => Some(Reporting),
            Reporting => Some(Done),
            Done | Failed(_) => None,
        }
    }

    /// 从当前阶段失败. 只有分类与选片阶段可以失败.
    pub fn fail(&self) -> Option<RunState> {
        match self {
            RunState::Classifying => Some(RunState::Failed(FatalStage::Classifying)),
            RunState::Selecting => Some(RunState::Failed(FatalStage::Selecting)),
            _ => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Received => f.write_str("received"),
            RunState::Decoding => f.write_str("decoding"),
            RunState::Classifying => f.write_str("classifying"),
            RunState::Selecting => f.write_str("selecting"),
            RunState::Measuring => f.write_str("measuring"),
            RunState::Reporting => f.write_str("reporting"),
            RunState::Done => f.write_str("done"),
            RunState::Failed(FatalStage::Classifying) => f.write_str("failed (classifying)"),
            RunState::Failed(FatalStage::Selecting) => f.write_str("failed (selecting)"),
        }
    }
}

/// 协作式取消信号. 克隆得到的副本共享同一个信号.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// 新的未取消信号.
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消.
    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// 是否已请求取消?
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
