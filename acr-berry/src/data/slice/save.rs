//! 图像的持久化存储.

use crate::{MrSlice, MrWindow, ScanSlice};
use image::ImageResult;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// MR 信号没有像 CT HU 值那样的绝对刻度, 因此保存时会先根据图像自身的
/// 信号分布选取窗口 (见 [`MrWindow::from_scan`]), 再映射为 8-bit 灰度.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

impl ImgWriteVis for ScanSlice<'_> {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        let window = MrWindow::from_scan(self).unwrap_or(MrWindow::UNIT);
        for ((h, w), &v) in self.indexed_iter() {
            let gray = window.eval(v).unwrap_or(0);
            buf.put_pixel(w as u32, h as u32, image::Luma([gray]));
        }
        buf.save(path)
    }
}

impl ImgWriteVis for MrSlice {
    #[inline]
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        self.scan().save(path)
    }
}
