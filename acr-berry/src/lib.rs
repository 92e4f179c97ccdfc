#![warn(missing_docs)]

//! 核心库. 对 ACR MRI 大体模 (large phantom) 的质控扫描做全自动分析.
//!
//! 输入是一次上传归档中已解压的全部文件 (文件名 + 字节), 输出是一份带版本号、
//! 可序列化的质控报告. 数据严格单向流动:
//!
//! 归档文件 -> [`dicom`] 解码切片 -> [`series`] 序列分类 -> [`protocol`] 选片
//! -> [`metrics`] 度量 -> [`report`] 报告. 由 [`pipeline`] 负责编排.
//!
//! # 注意
//!
//! 1. 用户、HTTP、归档解压与报告落盘都不在本 crate 的范围内. 见 `tools/qa-run`
//!   中基于本地目录的简单实现.
//! 2. 所有 ACR 协议相关的数值 (体模尺寸, 容差区间, 选片表, 序列签名) 都来自
//!   [`protocol::ProtocolConfig`], 默认值与 `config/acr_large_phantom.toml` 一致.
//!
//! # 开发计划
//!
//! ### DICOM 解码 ✅
//!
//! 按文件内容 (而不是扩展名) 识别 DICOM; 只接受未压缩小端序像素数据.
//! 单个文件失败只会被记录, 不会中断整个归档.
//!
//! 实现位于 `acr-berry/src/dicom`.
//!
//! ### 序列分类 ✅
//!
//! 先按 (Series Instance UID, TE) 结构化分组, 再按 TR/TE 签名赋予语义标签.
//!
//! 实现位于 `acr-berry/src/series`.
//!
//! ### 选片表 ✅
//!
//! "第 N 项测试使用序列 S 的第 K 层" 的映射来自配置, 可审计, 可覆盖.
//!
//! 实现位于 `acr-berry/src/protocol`.
//!
//! ### 六项 ACR 度量 ✅
//!
//! 几何精度, 层面位置精度, 层厚精度, 高对比分辨率, 低对比可探测性,
//! 均匀度/伪影. 共用体模定位、剖面半高宽和 ROI 统计等基础算法.
//!
//! 实现位于 `acr-berry/src/metrics`.
//!
//! ### 3T 专用容差 ✅
//!
//! 根据 DICOM 中的磁场强度自动切换低对比与均匀度的容差.
//!
//! ### 取消与部分报告 ✅
//!
//! 阶段之间检查取消信号, 取消后仍然输出标记为不完整的报告.
//!
//! 实现位于 `acr-berry/src/pipeline`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 高精度通用二维坐标 (行, 列), 以像素为单位.
pub type Idx2dF = (f64, f64);

type Predicate = fn(u8) -> bool;

type Area2d = Vec<Idx2d>;
type Areas2d = Vec<Area2d>;

/// MR 切片基础数据结构.
mod data;

pub use data::{
    AcquisitionParams, Extent, ImgWriteVis, InvalidSlice, MrSlice, MrWindow, Orientation,
    PhantomMask, PixelSpacing, Plane, RoiStats, ScanSlice, SliceHeader,
};

pub mod consts;

pub mod dicom;

pub mod series;

pub mod protocol;

pub mod metrics;

pub mod report;

pub mod pipeline;

pub mod prelude;

#[cfg(test)]
pub(crate) mod test_utils;
