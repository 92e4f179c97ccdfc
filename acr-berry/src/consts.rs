//! 通用常量.
//!
//! 这里只存放与 DICOM 文件格式和报告格式相关的常量. ACR 协议相关的数值
//! (体模尺寸, 容差区间, 切片映射表) 一律属于 [`crate::protocol::ProtocolConfig`],
//! 不允许写死在这里.

/// 二值掩膜中的像素值.
pub mod gray {
    /// 掩膜中背景 (空气/体模外) 的像素值.
    pub const MASK_BACKGROUND: u8 = 0;

    /// 掩膜中体模信号区域的像素值.
    pub const MASK_PHANTOM: u8 = 1;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, MASK_BACKGROUND)
    }

    /// 像素是否是体模?
    #[inline]
    pub const fn is_phantom(p: u8) -> bool {
        matches!(p, MASK_PHANTOM)
    }
}

/// DICOM 相关常量.
pub mod dicom {
    /// Part-10 文件前导区 (preamble) 的字节数.
    pub const PREAMBLE_LEN: usize = 128;

    /// Part-10 文件魔数.
    pub const MAGIC: &[u8; 4] = b"DICM";

    /// Implicit VR Little Endian.
    pub const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";

    /// Explicit VR Little Endian.
    pub const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

    /// 解码器接受的 (未压缩、小端序) 传输语法.
    pub const NATIVE_TRANSFER_SYNTAXES: [&str; 2] = [IMPLICIT_VR_LE, EXPLICIT_VR_LE];

    /// MR Image Storage SOP Class.
    pub const MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4";

    /// 磁共振的 Modality 取值.
    pub const MODALITY_MR: &str = "MR";
}

/// 报告文档的结构版本. 字段只允许新增, 不允许改变已有字段的含义.
pub const REPORT_SCHEMA_VERSION: u32 = 1;
