// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测框叠加绘制 (仅用于操作员画面, 不影响触发逻辑)

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{info, warn};

use super::types::Detection;

// 高亮色板, 按类别名选色
const BRIGHT_COLORS: [(u8, u8, u8); 12] = [
    (255, 0, 0),     // 红色
    (0, 255, 0),     // 绿色
    (0, 0, 255),     // 蓝色
    (255, 255, 0),   // 黄色
    (255, 0, 255),   // 品红
    (0, 255, 255),   // 青色
    (255, 128, 0),   // 橙色
    (255, 0, 128),   // 粉红
    (128, 255, 0),   // 黄绿
    (0, 128, 255),   // 天蓝
    (255, 255, 255), // 白色
    (128, 0, 255),   // 紫色
];

const LABEL_HEIGHT: f32 = 18.0;
const LINE_WIDTH: i32 = 2;

pub struct Overlay {
    font: Option<FontArc>,
}

impl Overlay {
    /// 只画框, 不画文字
    pub fn boxes_only() -> Self {
        Self { font: None }
    }

    /// 加载字体; 失败时退化为只画框
    pub fn load(font_path: Option<&Path>) -> Self {
        let Some(path) = font_path else {
            return Self::boxes_only();
        };
        let font = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FontArc::try_from_vec(bytes).map_err(|e| e.to_string()));
        match font {
            Ok(font) => {
                info!("✅ 叠加字体已加载: {}", path.display());
                Self { font: Some(font) }
            }
            Err(e) => {
                warn!("⚠️ 字体加载失败 {}: {}, 只绘制检测框", path.display(), e);
                Self::boxes_only()
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn color_for(label: &str) -> Rgba<u8> {
        let idx = label
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        let (r, g, b) = BRIGHT_COLORS[idx % BRIGHT_COLORS.len()];
        Rgba([r, g, b, 255])
    }

    pub fn draw(&self, image: &mut RgbaImage, detections: &[Detection]) {
        let (w, h) = image.dimensions();
        for det in detections {
            let b = det.bbox.clamp(w as f32, h as f32);
            let bw = b.width().round() as u32;
            let bh = b.height().round() as u32;
            if bw == 0 || bh == 0 {
                continue;
            }
            let color = Self::color_for(&det.class_label);
            for t in 0..LINE_WIDTH {
                let (x, y) = (b.x1 as i32 + t, b.y1 as i32 + t);
                let (rw, rh) = (bw as i32 - 2 * t, bh as i32 - 2 * t);
                if rw <= 0 || rh <= 0 {
                    break;
                }
                draw_hollow_rect_mut(image, Rect::at(x, y).of_size(rw as u32, rh as u32), color);
            }

            if let Some(font) = &self.font {
                let text = format!("{} {:.2}", det.class_label, det.confidence);
                let tw = (text.chars().count() as f32 * LABEL_HEIGHT * 0.55) as u32;
                let ty = (b.y1 - LABEL_HEIGHT).max(0.) as i32;
                draw_filled_rect_mut(
                    image,
                    Rect::at(b.x1 as i32, ty).of_size(tw.max(1), LABEL_HEIGHT as u32),
                    color,
                );
                draw_text_mut(
                    image,
                    Rgba([0, 0, 0, 255]),
                    b.x1 as i32 + 2,
                    ty,
                    PxScale::from(LABEL_HEIGHT),
                    font,
                    &text,
                );
            }
        }
    }
}
