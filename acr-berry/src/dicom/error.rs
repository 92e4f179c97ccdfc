use crate::InvalidSlice;

/// 单个文件解码失败的原因.
///
/// 解码错误只影响当前文件: 它会被记录为 [`super::SkippedFile`], 其余文件继续解码.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// 内容既不是 Part-10 文件, 也不像裸的数据集.
    #[error("not a DICOM file")]
    NotDicom,

    /// 文件头或数据集无法解析.
    #[error("malformed DICOM header: {0}")]
    MalformedHeader(String),

    /// 像素数据经过压缩或不是小端序.
    #[error("unsupported transfer syntax {0}")]
    UnsupportedTransferSyntax(String),

    /// 不是 MR 图像.
    #[error("modality is {0}, expected MR")]
    NonMrModality(String),

    /// 缺少必需的属性.
    #[error("missing required attribute {0}")]
    MissingAttribute(&'static str),

    /// 属性存在但取值不合法.
    #[error("invalid value {value:?} for attribute {name}")]
    InvalidAttribute {
        /// 属性名.
        name: &'static str,
        /// 原始取值.
        value: String,
    },

    /// 没有像素数据, 或像素数据无法按原生格式读取.
    #[error("missing pixel data")]
    MissingPixelData,

    /// 像素数据长度小于 `行 × 列 × 每像素字节数`.
    #[error("pixel data holds {actual} bytes, expected at least {expected}")]
    PixelDataLength {
        /// 期望的字节数.
        expected: usize,
        /// 实际的字节数.
        actual: usize,
    },

    /// 不支持的像素格式.
    #[error(
        "unsupported pixel format: {samples_per_pixel} samples, \
         {bits_allocated} bits allocated, {frames} frames"
    )]
    UnsupportedPixelFormat {
        /// Bits Allocated.
        bits_allocated: u16,
        /// Samples per Pixel.
        samples_per_pixel: u16,
        /// Number of Frames.
        frames: i32,
    },

    /// 解码得到的切片不满足不变量.
    #[error(transparent)]
    InvalidSlice(#[from] InvalidSlice),
}
