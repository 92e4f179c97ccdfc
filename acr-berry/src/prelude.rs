//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx2dF};

pub use crate::data::{ImgWriteVis, MrSlice, MrWindow, PixelSpacing, ScanSlice};

pub use crate::dicom::{decode_all, decode_slice, DecodeError, Decoded, InputFile, SkippedFile};
pub use crate::series::{classify, ClassificationError, Series, SeriesLabel, SeriesMap};

pub use crate::protocol::{Interval, ProtocolConfig, SelectedSlice, SelectionRule};

pub use crate::metrics::{Metric, MetricKind, MetricRegistry, MetricResult, Verdict};

pub use crate::pipeline::{CancelToken, Pipeline, RunFailure, RunState};
pub use crate::report::Report;
