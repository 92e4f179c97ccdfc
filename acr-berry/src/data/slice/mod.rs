//! MR 切片图像的只读视图及其持久化.

mod core;
mod iter;
mod save;

pub use self::core::{RoiStats, ScanSlice};

pub(crate) use iter::PosIter;

pub use save::ImgWriteVis;
