// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 双路画面合成: 两帧缩放到较小宽度 (保持宽高比), 上下拼接

use image::imageops::{self, FilterType};
use image::RgbaImage;

fn fit_width(frame: RgbaImage, width: u32) -> RgbaImage {
    if frame.width() == width {
        return frame;
    }
    let height = ((frame.height() as u64 * width as u64) / frame.width().max(1) as u64).max(1);
    imageops::resize(&frame, width, height as u32, FilterType::Triangle)
}

pub fn compose_vertical(top: RgbaImage, bottom: RgbaImage) -> RgbaImage {
    let width = top.width().min(bottom.width()).max(1);
    let top = fit_width(top, width);
    let bottom = fit_width(bottom, width);

    let mut canvas = RgbaImage::new(width, top.height() + bottom.height());
    imageops::replace(&mut canvas, &top, 0, 0);
    imageops::replace(&mut canvas, &bottom, 0, top.height() as i64);
    canvas
}

/// 单路原样返回, 多路依次上下拼接
pub fn compose(mut frames: Vec<RgbaImage>) -> Option<RgbaImage> {
    if frames.is_empty() {
        return None;
    }
    let first = frames.remove(0);
    Some(frames.into_iter().fold(first, compose_vertical))
}
