//! DICOM 解码.
//!
//! 把归档中的每个文件独立地解码为 [`MrSlice`]. 无法解码的文件被记录下来并跳过,
//! 不会影响其余文件.

use crate::MrSlice;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod decode;
mod error;

pub use decode::decode_slice;
pub use error::DecodeError;

/// 归档中的一个已解压文件.
#[derive(Clone, Debug)]
pub struct InputFile {
    /// 归档内的文件名 (路径).
    pub name: String,
    /// 文件内容.
    pub bytes: Vec<u8>,
}

impl InputFile {
    /// 直接构造.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// 被跳过的文件及原因.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SkippedFile {
    /// 文件名.
    pub name: String,
    /// 人类可读的原因.
    pub reason: String,
}

/// 整个归档的解码结果.
#[derive(Clone, Debug, Default)]
pub struct Decoded {
    /// 成功解码的切片, 与输入文件顺序一致.
    pub slices: Vec<MrSlice>,
    /// 被跳过的文件, 与输入文件顺序一致.
    pub skipped: Vec<SkippedFile>,
}

/// 解码归档中的所有文件.
///
/// 打开 `rayon` feature 时并行解码. 无论是否并行, 输出顺序都与输入一致.
pub fn decode_all(files: &[InputFile]) -> Decoded {
    let decode = |f: &InputFile| decode_slice(&f.name, &f.bytes);

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            use rayon::prelude::*;
            let results: Vec<_> = files.par_iter().map(decode).collect();
        } else {
            let results: Vec<_> = files.iter().map(decode).collect();
        }
    }

    let mut out = Decoded::default();
    for (file, result) in files.iter().zip(results) {
        match result {
            Ok(slice) => out.slices.push(slice),
            Err(e) => {
                log::warn!("Skipping {}: {e}", file.name);
                out.skipped.push(SkippedFile {
                    name: file.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    log::info!(
        "Decoded {} slices, skipped {} files",
        out.slices.len(),
        out.skipped.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{dicom_bytes, header, DicomOptions};
    use ndarray::Array2;

    #[test]
    fn test_decode_all_skips_bad_files() {
        let mut files: Vec<InputFile> = (1..=3)
            .map(|i| {
                let h = header(&format!("{i}.dcm"), "1.2.3", i, (8, 8));
                let slice = MrSlice::new(h, Array2::from_elem((8, 8), i as f32)).unwrap();
                InputFile::new(format!("{i}.dcm"), dicom_bytes(&slice, &DicomOptions::default()))
            })
            .collect();
        files.insert(1, InputFile::new("notes.txt", b"hello".to_vec()));

        let decoded = decode_all(&files);
        assert_eq!(decoded.slices.len(), 3);
        assert_eq!(decoded.skipped.len(), 1);
        assert_eq!(decoded.skipped[0].name, "notes.txt");
        let order: Vec<i32> = decoded.slices.iter().map(|s| s.instance_number()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
