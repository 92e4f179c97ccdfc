use super::DecodeError;
use crate::consts::dicom::*;
use crate::data::{AcquisitionParams, MrSlice, Orientation, PixelSpacing, SliceHeader};
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use dicom_transfer_syntax_registry::entries::IMPLICIT_VR_LITTLE_ENDIAN;
use ndarray::Array2;
use num::ToPrimitive;

type DecodeResult<T> = Result<T, DecodeError>;

/// 解析字节流, 返回数据集及其传输语法.
fn parse(bytes: &[u8]) -> DecodeResult<(InMemDicomObject, String)> {
    if let Some(offset) = magic_offset(bytes) {
        let obj = dicom_object::from_reader(&bytes[offset..])
            .map_err(|e| DecodeError::MalformedHeader(e.to_string()))?;
        let ts = obj
            .meta()
            .transfer_syntax()
            .trim_end_matches(['\0', ' '])
            .to_string();
        return Ok((obj.into_inner(), ts));
    }

    // 没有魔数: 按裸的 implicit VR little endian 数据集重试.
    if !looks_like_bare_dataset(bytes) {
        return Err(DecodeError::NotDicom);
    }
    let obj = InMemDicomObject::read_dataset_with_ts(bytes, &IMPLICIT_VR_LITTLE_ENDIAN.erased())
        .map_err(|_| DecodeError::NotDicom)?;
    let identified = [
        tags::SOP_CLASS_UID,
        tags::SOP_INSTANCE_UID,
        tags::SERIES_INSTANCE_UID,
        tags::MODALITY,
    ]
    .into_iter()
    .any(|t| obj.element(t).is_ok());
    if !identified {
        return Err(DecodeError::NotDicom);
    }
    Ok((obj, IMPLICIT_VR_LE.to_string()))
}

/// `DICM` 魔数所在的偏移: 标准文件位于前导区之后, 无前导区的流位于开头.
fn magic_offset(bytes: &[u8]) -> Option<usize> {
    if bytes.get(PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()) == Some(&MAGIC[..]) {
        Some(PREAMBLE_LEN)
    } else if bytes.starts_with(MAGIC) {
        Some(0)
    } else {
        None
    }
}

/// 第一个元素的组号和长度是否像一个裸数据集?
fn looks_like_bare_dataset(bytes: &[u8]) -> bool {
    let (Some(group), Some(len)) = (bytes.get(0..2), bytes.get(4..8)) else {
        return false;
    };
    let group = u16::from_le_bytes([group[0], group[1]]);
    let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
    matches!(group, 0x0002 | 0x0008) && len <= bytes.len() - 8
}

fn str_attr(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    let s = obj.element(tag).ok()?.to_str().ok()?;
    let s = s.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!s.is_empty()).then(|| s.to_string())
}

fn f64_attr(obj: &InMemDicomObject, tag: Tag) -> Option<f64> {
    obj.element(tag).ok()?.to_float64().ok()
}

fn f64s_attr(obj: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
    obj.element(tag).ok()?.to_multi_float64().ok()
}

fn u16_attr(obj: &InMemDicomObject, tag: Tag) -> Option<u16> {
    obj.element(tag).ok()?.to_int::<u16>().ok()
}

fn i32_attr(obj: &InMemDicomObject, tag: Tag) -> Option<i32> {
    obj.element(tag).ok()?.to_int::<i32>().ok()
}

fn spacing(obj: &InMemDicomObject) -> DecodeResult<PixelSpacing> {
    let values = f64s_attr(obj, tags::PIXEL_SPACING)
        .ok_or(DecodeError::MissingAttribute("PixelSpacing"))?;
    match values[..] {
        [row, col, ..] => PixelSpacing::new(row, col).ok_or(DecodeError::InvalidAttribute {
            name: "PixelSpacing",
            value: format!("{values:?}"),
        }),
        _ => Err(DecodeError::InvalidAttribute {
            name: "PixelSpacing",
            value: format!("{values:?}"),
        }),
    }
}

fn acquisition(obj: &InMemDicomObject) -> AcquisitionParams {
    // 频率编码行, 频率编码列, 相位编码行, 相位编码列. 只有一对非零.
    let acquisition_matrix = obj
        .element(tags::ACQUISITION_MATRIX)
        .ok()
        .and_then(|e| e.to_multi_int::<u16>().ok())
        .and_then(|v| match v[..] {
            [a, b, c, d] => Some((a.max(b), c.max(d))),
            _ => None,
        });
    AcquisitionParams {
        echo_time_ms: f64_attr(obj, tags::ECHO_TIME),
        repetition_time_ms: f64_attr(obj, tags::REPETITION_TIME),
        receive_bandwidth_hz: f64_attr(obj, tags::PIXEL_BANDWIDTH),
        acquisition_matrix,
        echo_number: i32_attr(obj, tags::ECHO_NUMBERS),
        field_strength_t: f64_attr(obj, tags::MAGNETIC_FIELD_STRENGTH),
        slice_thickness_mm: f64_attr(obj, tags::SLICE_THICKNESS),
    }
}

/// 原始像素值经 rescale 后的信号强度.
#[inline]
fn rescaled<T: ToPrimitive>(raw: T, slope: f32, intercept: f32) -> f32 {
    raw.to_f32().unwrap_or_default() * slope + intercept
}

/// 读取原生格式的像素矩阵, 并应用 rescale.
fn pixels(obj: &InMemDicomObject, rows: usize, columns: usize) -> DecodeResult<Array2<f32>> {
    let bits_allocated = u16_attr(obj, tags::BITS_ALLOCATED).unwrap_or(16);
    let samples_per_pixel = u16_attr(obj, tags::SAMPLES_PER_PIXEL).unwrap_or(1);
    let frames = i32_attr(obj, tags::NUMBER_OF_FRAMES).unwrap_or(1);
    if samples_per_pixel != 1 || frames > 1 || !matches!(bits_allocated, 8 | 16) {
        return Err(DecodeError::UnsupportedPixelFormat {
            bits_allocated,
            samples_per_pixel,
            frames,
        });
    }
    let signed = u16_attr(obj, tags::PIXEL_REPRESENTATION) == Some(1);
    let slope = f64_attr(obj, tags::RESCALE_SLOPE).unwrap_or(1.0) as f32;
    let intercept = f64_attr(obj, tags::RESCALE_INTERCEPT).unwrap_or(0.0) as f32;

    let raw = obj
        .element(tags::PIXEL_DATA)
        .map_err(|_| DecodeError::MissingPixelData)?
        .to_bytes()
        .map_err(|_| DecodeError::MissingPixelData)?;
    let n = rows * columns;
    let bytes_per_pixel = bits_allocated as usize / 8;
    if raw.len() < n * bytes_per_pixel {
        return Err(DecodeError::PixelDataLength {
            expected: n * bytes_per_pixel,
            actual: raw.len(),
        });
    }

    let values: Vec<f32> = match (bytes_per_pixel, signed) {
        (1, false) => raw[..n].iter().map(|&b| rescaled(b, slope, intercept)).collect(),
        (1, true) => raw[..n].iter().map(|&b| rescaled(b as i8, slope, intercept)).collect(),
        (_, false) => raw[..2 * n]
            .chunks_exact(2)
            .map(|b| rescaled(u16::from_le_bytes([b[0], b[1]]), slope, intercept))
            .collect(),
        (_, true) => raw[..2 * n]
            .chunks_exact(2)
            .map(|b| rescaled(i16::from_le_bytes([b[0], b[1]]), slope, intercept))
            .collect(),
    };
    Array2::from_shape_vec((rows, columns), values).map_err(|_| DecodeError::PixelDataLength {
        expected: n * bytes_per_pixel,
        actual: raw.len(),
    })
}

/// 将一个文件的字节解码为 MR 切片.
///
/// 文件类型只由内容判断, 与文件名无关. `name` 仅作为来源记录在切片中.
pub fn decode_slice(name: &str, bytes: &[u8]) -> DecodeResult<MrSlice> {
    let (obj, ts) = parse(bytes)?;
    if !NATIVE_TRANSFER_SYNTAXES.contains(&ts.as_str()) {
        return Err(DecodeError::UnsupportedTransferSyntax(ts));
    }
    match str_attr(&obj, tags::MODALITY) {
        Some(m) if m == MODALITY_MR => {}
        Some(m) => return Err(DecodeError::NonMrModality(m)),
        None => return Err(DecodeError::MissingAttribute("Modality")),
    }

    let rows = u16_attr(&obj, tags::ROWS).ok_or(DecodeError::MissingAttribute("Rows"))? as usize;
    let columns =
        u16_attr(&obj, tags::COLUMNS).ok_or(DecodeError::MissingAttribute("Columns"))? as usize;
    if rows == 0 || columns == 0 {
        return Err(DecodeError::InvalidAttribute {
            name: "Rows/Columns",
            value: format!("{rows}x{columns}"),
        });
    }
    let spacing = spacing(&obj)?;
    let series_uid = str_attr(&obj, tags::SERIES_INSTANCE_UID)
        .ok_or(DecodeError::MissingAttribute("SeriesInstanceUID"))?;

    let orientation = match f64s_attr(&obj, tags::IMAGE_ORIENTATION_PATIENT) {
        Some(v) if v.len() == 6 => Orientation::from_cosines([v[0], v[1], v[2], v[3], v[4], v[5]]),
        Some(v) => {
            return Err(DecodeError::InvalidAttribute {
                name: "ImageOrientationPatient",
                value: format!("{v:?}"),
            })
        }
        None => {
            log::debug!("{name}: no ImageOrientationPatient, assuming axial");
            Orientation::AXIAL
        }
    };
    let image_position = f64s_attr(&obj, tags::IMAGE_POSITION_PATIENT)
        .filter(|v| v.len() == 3)
        .map(|v| [v[0], v[1], v[2]]);
    let instance_number = i32_attr(&obj, tags::INSTANCE_NUMBER).unwrap_or(0);

    // 沿法向的投影 > SliceLocation > 实例序号.
    let position = match image_position {
        Some(p) => {
            let n = orientation.normal();
            p[0] * n[0] + p[1] * n[1] + p[2] * n[2]
        }
        None => f64_attr(&obj, tags::SLICE_LOCATION).unwrap_or(instance_number as f64),
    };

    let data = pixels(&obj, rows, columns)?;
    let header = SliceHeader {
        source: name.to_string(),
        sop_instance_uid: str_attr(&obj, tags::SOP_INSTANCE_UID).unwrap_or_default(),
        series_uid,
        series_description: str_attr(&obj, tags::SERIES_DESCRIPTION),
        instance_number,
        rows,
        columns,
        spacing,
        image_position,
        orientation,
        position,
        acquisition: acquisition(&obj),
    };
    Ok(MrSlice::new(header, data)?)
}
