//! 测试辅助: 合成 ACR 体模切片与 DICOM 文件.
//!
//! 坐标约定与 [`crate::protocol::PhantomGeometry`] 一致: 毫米, `[dx, dy]`,
//! `dx` 向右为正, `dy` 向下为正, 原点为体模中心.

use crate::consts::dicom::{EXPLICIT_VR_LE, MR_IMAGE_STORAGE};
use crate::dicom::InputFile;
use crate::protocol::{PhantomGeometry, ProtocolConfig, SelectedSlice};
use crate::series::SeriesLabel;
use crate::{AcquisitionParams, MrSlice, Orientation, PixelSpacing, SliceHeader};
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_transfer_syntax_registry::entries::IMPLICIT_VR_LITTLE_ENDIAN;
use ndarray::Array2;

/// 打开测试日志. 重复调用无副作用.
pub(crate) fn init_logger() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init();
}

/// 默认的切片头: 轴位, 0.9765625 mm 像素, 位置为 `(instance - 1) × 10` mm.
pub(crate) fn header(source: &str, series_uid: &str, instance: i32, shape: (usize, usize)) -> SliceHeader {
    SliceHeader {
        source: source.to_string(),
        sop_instance_uid: format!("{series_uid}.{instance}"),
        series_uid: series_uid.to_string(),
        series_description: None,
        instance_number: instance,
        rows: shape.0,
        columns: shape.1,
        spacing: PixelSpacing::new(0.9765625, 0.9765625).unwrap(),
        image_position: None,
        orientation: Orientation::AXIAL,
        position: (instance - 1) as f64 * 10.0,
        acquisition: AcquisitionParams::default(),
    }
}

/// `n` 张 8×8 的空白切片, 实例号 1..=n.
pub(crate) fn blank_series(uid: &str, n: usize, tr: f64, te: f64) -> Vec<MrSlice> {
    (1..=n as i32)
        .map(|i| {
            let mut h = header(&format!("{uid}-{i}.dcm"), uid, i, (8, 8));
            h.acquisition.repetition_time_ms = Some(tr);
            h.acquisition.echo_time_ms = Some(te);
            MrSlice::new(h, Array2::zeros((8, 8))).unwrap()
        })
        .collect()
}

/// T1 序列中的一张被选切片.
pub(crate) fn selected(slice: &MrSlice, number: usize) -> SelectedSlice<'_> {
    SelectedSlice {
        series: SeriesLabel::T1,
        number,
        slice,
    }
}

/// 生成 DICOM 文件时的可选项.
pub(crate) struct DicomOptions {
    pub rescale: Option<(f64, f64)>,
    pub modality: &'static str,
    pub transfer_syntax: &'static str,
    pub pixel_data: bool,
    /// 声明的行数, 与实际像素数不一致时用于构造损坏的文件.
    pub declared_rows: Option<u16>,
}

impl Default for DicomOptions {
    fn default() -> Self {
        Self {
            rescale: None,
            modality: "MR",
            transfer_syntax: EXPLICIT_VR_LE,
            pixel_data: true,
            declared_rows: None,
        }
    }
}

fn ds(values: &[f64]) -> PrimitiveValue {
    PrimitiveValue::Strs(values.iter().map(|v| format!("{v}")).collect())
}

/// 切片对应的数据集. 像素按 16 位无符号整数存储 (四舍五入).
fn dataset(slice: &MrSlice, opts: &DicomOptions) -> InMemDicomObject {
    let h = slice.header();
    let mut obj = InMemDicomObject::new_empty();
    let mut put = |tag: Tag, vr: VR, value: PrimitiveValue| {
        obj.put(DataElement::new(tag, vr, value));
    };

    put(tags::SOP_CLASS_UID, VR::UI, MR_IMAGE_STORAGE.into());
    put(tags::SOP_INSTANCE_UID, VR::UI, h.sop_instance_uid.as_str().into());
    put(tags::MODALITY, VR::CS, opts.modality.into());
    put(tags::SERIES_INSTANCE_UID, VR::UI, h.series_uid.as_str().into());
    if let Some(d) = &h.series_description {
        put(tags::SERIES_DESCRIPTION, VR::LO, d.as_str().into());
    }
    put(tags::INSTANCE_NUMBER, VR::IS, h.instance_number.to_string().into());
    let rows = opts.declared_rows.unwrap_or(h.rows as u16);
    put(tags::ROWS, VR::US, PrimitiveValue::from(rows));
    put(tags::COLUMNS, VR::US, PrimitiveValue::from(h.columns as u16));
    put(tags::PIXEL_SPACING, VR::DS, ds(&[h.spacing.row_mm, h.spacing.col_mm]));
    let (r, c) = (h.orientation.row, h.orientation.col);
    put(tags::IMAGE_ORIENTATION_PATIENT, VR::DS, ds(&[r[0], r[1], r[2], c[0], c[1], c[2]]));
    if let Some(p) = h.image_position {
        put(tags::IMAGE_POSITION_PATIENT, VR::DS, ds(&p));
    }
    put(tags::SLICE_LOCATION, VR::DS, ds(&[h.position]));

    let a = &h.acquisition;
    for (tag, value) in [
        (tags::ECHO_TIME, a.echo_time_ms),
        (tags::REPETITION_TIME, a.repetition_time_ms),
        (tags::MAGNETIC_FIELD_STRENGTH, a.field_strength_t),
        (tags::PIXEL_BANDWIDTH, a.receive_bandwidth_hz),
        (tags::SLICE_THICKNESS, a.slice_thickness_mm),
    ] {
        if let Some(v) = value {
            put(tag, VR::DS, ds(&[v]));
        }
    }
    if let Some((slope, intercept)) = opts.rescale {
        put(tags::RESCALE_SLOPE, VR::DS, ds(&[slope]));
        put(tags::RESCALE_INTERCEPT, VR::DS, ds(&[intercept]));
    }

    put(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1u16));
    put(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2".into());
    put(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16u16));
    put(tags::BITS_STORED, VR::US, PrimitiveValue::from(16u16));
    put(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15u16));
    put(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0u16));
    if opts.pixel_data {
        let values: Vec<u16> = slice
            .pixels()
            .iter()
            .map(|v| v.round().clamp(0.0, u16::MAX as f32) as u16)
            .collect();
        put(tags::PIXEL_DATA, VR::OW, PrimitiveValue::U16(values.into()));
    }
    obj
}

/// 将切片编码为 Part-10 文件.
pub(crate) fn dicom_bytes(slice: &MrSlice, opts: &DicomOptions) -> Vec<u8> {
    let h = slice.header();
    let file = dataset(slice, opts)
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(opts.transfer_syntax)
                .media_storage_sop_class_uid(MR_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(h.sop_instance_uid.as_str()),
        )
        .unwrap();
    let mut buf = Vec::new();
    file.write_all(&mut buf).unwrap();
    buf
}

/// 将切片编码为没有前导区和文件元信息的 implicit VR little endian 数据集.
pub(crate) fn bare_dataset_bytes(slice: &MrSlice, opts: &DicomOptions) -> Vec<u8> {
    let mut buf = Vec::new();
    dataset(slice, opts)
        .write_dataset_with_ts(&mut buf, &IMPLICIT_VR_LITTLE_ENDIAN.erased())
        .unwrap();
    buf
}

/// 合成体模的成像参数.
#[derive(Clone, Debug)]
pub(crate) struct PhantomParams {
    pub matrix: usize,
    pub spacing_mm: f64,
    /// 体模中心相对图像中心的偏移 (dx, dy), 毫米.
    pub offset_mm: (f64, f64),
    pub diameter_mm: f64,
    pub signal: f32,
    pub field_strength_t: Option<f64>,
}

impl Default for PhantomParams {
    fn default() -> Self {
        Self {
            matrix: 512,
            spacing_mm: 250.0 / 512.0,
            offset_mm: (0.0, 0.0),
            diameter_mm: 190.0,
            signal: 1000.0,
            field_strength_t: Some(1.5),
        }
    }
}

impl PhantomParams {
    /// 像素中心相对体模中心的毫米坐标 (x, y).
    fn mm(&self, r: usize, c: usize) -> (f64, f64) {
        let ctr = (self.matrix as f64 - 1.0) / 2.0;
        (
            (c as f64 - ctr) * self.spacing_mm - self.offset_mm.0,
            (r as f64 - ctr) * self.spacing_mm - self.offset_mm.1,
        )
    }

    /// 覆盖毫米矩形 `[x0, x1] × [y0, y1]` 的像素范围 (行, 列), 多留一个像素.
    fn pixel_box(&self, x0: f64, x1: f64, y0: f64, y1: f64) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let ctr = (self.matrix as f64 - 1.0) / 2.0;
        let to_px = |v: f64, off: f64| (v + off) / self.spacing_mm + ctr;
        let clamp = |v: f64| v.max(0.0).min(self.matrix as f64) as usize;
        let rows = clamp(to_px(y0, self.offset_mm.1).floor() - 1.0)..clamp(to_px(y1, self.offset_mm.1).ceil() + 2.0);
        let cols = clamp(to_px(x0, self.offset_mm.0).floor() - 1.0)..clamp(to_px(x1, self.offset_mm.0).ceil() + 2.0);
        (rows, cols)
    }

    /// 用合成图像构造 T1 风格的切片.
    pub fn slice(&self, img: Array2<f32>, series: &str, instance: i32) -> MrSlice {
        let mut h = header(&format!("{series}-{instance}.dcm"), series, instance, img.dim());
        h.spacing = PixelSpacing::new(self.spacing_mm, self.spacing_mm).unwrap();
        h.acquisition.field_strength_t = self.field_strength_t;
        h.acquisition.repetition_time_ms = Some(500.0);
        h.acquisition.echo_time_ms = Some(20.0);
        MrSlice::new(h, img).unwrap()
    }
}

/// 体模图像的绘制器. 所有图形都带一个像素宽的抗锯齿边缘.
pub(crate) struct Render<'a> {
    spec: &'a PhantomParams,
    img: Array2<f32>,
}

impl<'a> Render<'a> {
    pub fn new(spec: &'a PhantomParams) -> Self {
        Self {
            spec,
            img: Array2::zeros((spec.matrix, spec.matrix)),
        }
    }

    fn blend(&mut self, r: usize, c: usize, value: f32, coverage: f64) {
        if coverage > 0.0 {
            let p = &mut self.img[(r, c)];
            *p = (*p as f64 * (1.0 - coverage) + value as f64 * coverage) as f32;
        }
    }

    fn disk(&mut self, cx: f64, cy: f64, radius_mm: f64, value: f32) {
        let (rows, cols) = self.spec.pixel_box(cx - radius_mm, cx + radius_mm, cy - radius_mm, cy + radius_mm);
        let sp = self.spec.spacing_mm;
        for r in rows {
            for c in cols.clone() {
                let (x, y) = self.spec.mm(r, c);
                let d = (x - cx).hypot(y - cy) / sp;
                let coverage = (radius_mm / sp - d + 0.5).clamp(0.0, 1.0);
                self.blend(r, c, value, coverage);
            }
        }
    }

    fn rect(&mut self, x0: f64, x1: f64, y0: f64, y1: f64, value: f32) {
        let (rows, cols) = self.spec.pixel_box(x0, x1, y0, y1);
        let sp = self.spec.spacing_mm;
        let overlap = |lo: f64, hi: f64, v: f64| {
            ((v + sp / 2.0).min(hi) - (v - sp / 2.0).max(lo)).max(0.0) / sp
        };
        for r in rows {
            for c in cols.clone() {
                let (x, y) = self.spec.mm(r, c);
                let coverage = overlap(x0, x1, x) * overlap(y0, y1, y);
                self.blend(r, c, value, coverage);
            }
        }
    }

    /// 均匀的圆柱体模.
    pub fn phantom(mut self) -> Self {
        let (radius, signal) = (self.spec.diameter_mm / 2.0, self.spec.signal);
        self.disk(0.0, 0.0, radius, signal);
        self
    }

    /// 层面位置楔形: 左右两根暗条, 长度分别为 `left`, `right` 毫米.
    pub fn wedges(mut self, left: f64, right: f64, g: &PhantomGeometry) -> Self {
        let [cx, cy] = g.wedges.center_offset_mm;
        self.rect(cx - 4.5, cx - 1.5, cy - left / 2.0, cy + left / 2.0, 0.0);
        self.rect(cx + 1.5, cx + 4.5, cy - right / 2.0, cy + right / 2.0, 0.0);
        self
    }

    /// 层厚斜坡: 暗背景中的上下两条亮条, 长度分别为 `top`, `bottom` 毫米.
    pub fn ramps(mut self, top: f64, bottom: f64, g: &PhantomGeometry) -> Self {
        let ramps = &g.ramps;
        let [cx, cy] = ramps.center_offset_mm;
        let (hw, hh) = (ramps.width_mm / 2.0 + 5.0, ramps.height_mm / 2.0 + 1.0);
        let signal = self.spec.signal;
        self.rect(cx - hw, cx + hw, cy - hh, cy + hh, 0.0);
        self.rect(cx - top / 2.0, cx + top / 2.0, cy - 2.75, cy - 0.75, signal);
        self.rect(cx - bottom / 2.0, cx + bottom / 2.0, cy + 0.75, cy + 2.75, signal);
        self
    }

    /// 分辨率插件: 暗塑料块中的亮孔阵. `open[i]` 为假时第 i 种孔径的孔被填平.
    pub fn resolution(mut self, g: &PhantomGeometry, open: [bool; 3]) -> Self {
        let res = &g.resolution;
        let n = res.holes_per_line as f64;
        let (mut x0, mut x1, mut y0, mut y1) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for pair in &res.arrays {
            let pitch = 2.0 * pair.hole_mm;
            for [x, y] in [pair.row_array_mm, pair.column_array_mm] {
                x0 = x0.min(x - pitch);
                y0 = y0.min(y - pitch);
                x1 = x1.max(x + n * pitch);
                y1 = y1.max(y + n * pitch);
            }
        }
        self.rect(x0 - 2.0, x1 + 2.0, y0 - 2.0, y1 + 2.0, 0.0);

        let signal = self.spec.signal;
        for (pair, _) in res.arrays.iter().zip(open).filter(|(_, o)| *o) {
            let pitch = 2.0 * pair.hole_mm;
            for [x, y] in [pair.row_array_mm, pair.column_array_mm] {
                for i in 0..res.holes_per_line {
                    for j in 0..res.holes_per_line {
                        let (dx, dy) = (j as f64 * pitch, i as f64 * pitch);
                        self.disk(x + dx, y + dy, pair.hole_mm / 2.0, signal);
                    }
                }
            }
        }
        self
    }

    /// 低对比圆盘, 对比度为 `contrast` (相对体模信号), 整体旋转 `rotation_deg` 度.
    pub fn lcd(mut self, contrast: f64, rotation_deg: f64, g: &PhantomGeometry) -> Self {
        let lc = &g.low_contrast;
        let [cx, cy] = lc.center_offset_mm;
        let value = (self.spec.signal as f64 * (1.0 + contrast)) as f32;
        for (k, d) in lc.disk_diameters_mm.iter().enumerate() {
            let angle = lc.start_angle_deg + rotation_deg + k as f64 * 360.0 / lc.spokes() as f64;
            let (sin, cos) = angle.to_radians().sin_cos();
            for ring in &lc.ring_radii_mm {
                self.disk(cx + ring * cos, cy + ring * sin, d / 2.0, value);
            }
        }
        self
    }

    /// 水平方向的线性强度梯度: 体模左右边缘处分别为 `1 ∓ fraction` 倍.
    pub fn gradient(mut self, fraction: f64) -> Self {
        let radius = self.spec.diameter_mm / 2.0;
        let spec = self.spec;
        for ((r, c), v) in self.img.indexed_iter_mut() {
            let (x, _) = spec.mm(r, c);
            *v = (*v as f64 * (1.0 + fraction * x / radius)) as f32;
        }
        self
    }

    /// 相位编码方向 (上下) 的伪影: 体模上下的背景中加上 `level`.
    pub fn ghosts(mut self, level: f32) -> Self {
        let radius = self.spec.diameter_mm / 2.0 + 2.0 * self.spec.spacing_mm;
        let spec = self.spec;
        for ((r, c), v) in self.img.indexed_iter_mut() {
            let (x, y) = spec.mm(r, c);
            if x.abs() < 60.0 && x.hypot(y) > radius {
                *v += level;
            }
        }
        self
    }

    /// 均匀分布的噪声, 标准差为 `sigma`. 同一 `seed` 结果相同.
    pub fn noise(mut self, sigma: f64, seed: u64) -> Self {
        let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        let amplitude = sigma * 3f64.sqrt();
        for v in self.img.iter_mut() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let u = (state >> 11) as f64 / (1u64 << 53) as f64;
            *v += (amplitude * (2.0 * u - 1.0)) as f32;
        }
        self
    }

    /// ACR T1 序列第 `n` 层的内容.
    pub fn acr_slice(self, n: usize, config: &ProtocolConfig) -> Self {
        let g = &config.geometry;
        let r = self.phantom();
        match n {
            1 => r.ramps(50.0, 50.0, g).wedges(21.0, 20.0, g).resolution(g, [true; 3]),
            8 => r.lcd(0.014, 0.0, g),
            9 => r.lcd(0.025, 0.0, g),
            10 => r.lcd(0.036, 0.0, g),
            11 => r.lcd(0.051, 0.0, g).wedges(20.0, 21.0, g),
            _ => r,
        }
    }

    pub fn finish(self) -> Array2<f32> {
        self.img
    }
}

/// 合成 ACR 检查的文件列表.
///
/// - 定位像: `localizer_slices` 层, TR/TE 200/20;
/// - T1: `t1_slices` 层, TR/TE 500/20, 按 [`Render::acr_slice`] 绘制;
/// - T2: 11 层 (可省略), TR/TE 2000/80, 只有均匀体模.
pub(crate) fn archive(localizer_slices: usize, t1_slices: usize, with_t2: bool) -> Vec<InputFile> {
    let config = ProtocolConfig::default();
    let full = PhantomParams::default();
    let small = PhantomParams {
        matrix: 128,
        spacing_mm: 250.0 / 128.0,
        ..PhantomParams::default()
    };

    let mut files = Vec::new();
    let mut push = |spec: &PhantomParams, uid: &str, n: i32, tr: f64, te: f64, img: Array2<f32>| {
        let mut h = header(&format!("{uid}/{n:03}.dcm"), uid, n, img.dim());
        h.spacing = PixelSpacing::new(spec.spacing_mm, spec.spacing_mm).unwrap();
        h.acquisition.repetition_time_ms = Some(tr);
        h.acquisition.echo_time_ms = Some(te);
        h.acquisition.field_strength_t = spec.field_strength_t;
        h.image_position = Some([-125.0, -125.0, h.position]);
        let slice = MrSlice::new(h, img).unwrap();
        files.push(InputFile::new(slice.source(), dicom_bytes(&slice, &DicomOptions::default())));
    };

    for n in 1..=localizer_slices {
        push(&small, "loc", n as i32, 200.0, 20.0, Render::new(&small).phantom().finish());
    }
    for n in 1..=t1_slices {
        let img = Render::new(&full).acr_slice(n, &config).finish();
        push(&full, "t1", n as i32, 500.0, 20.0, img);
    }
    if with_t2 {
        for n in 1..=11 {
            push(&small, "t2", n, 2000.0, 80.0, Render::new(&small).phantom().finish());
        }
    }
    files
}

/// 单层定位像, `t1_slices` 层 T1, 以及可省略的 T2.
pub(crate) fn acr_archive_with(t1_slices: usize, with_t2: bool) -> Vec<InputFile> {
    archive(1, t1_slices, with_t2)
}

/// 完整的 ACR 检查: 定位像, T1, T2 各 11 层.
pub(crate) fn acr_archive() -> Vec<InputFile> {
    archive(11, 11, true)
}
