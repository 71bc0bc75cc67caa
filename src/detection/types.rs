// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统数据结构定义
/// Data structures for the detection system
use image::RgbaImage;

// ========== 公共常量 ==========

/// YOLOv8推理输入尺寸
pub const INF_SIZE: u32 = 640;

// ========== 数据结构 ==========

/// 采集帧 (采集源 → 检测工作线程)
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RgbaImage,
    /// 源内序号, 单调递增
    pub index: u64,
}

impl Frame {
    pub fn new(image: RgbaImage, index: u64) -> Self {
        Self { image, index }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// 检测框, 像素坐标 (x1, y1) 左上 / (x2, y2) 右下
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 中心点 + 宽高 → 角点
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2., cy - h / 2., cx + w / 2., cy + h / 2.)
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// 限制在图像范围内
    pub fn clamp(&self, width: f32, height: f32) -> Self {
        Self::new(
            self.x1.clamp(0., width),
            self.y1.clamp(0., height),
            self.x2.clamp(0., width),
            self.y2.clamp(0., height),
        )
    }

    pub fn intersection_area(&self, another: &BBox) -> f32 {
        let l = self.x1.max(another.x1);
        let r = self.x2.min(another.x2);
        let t = self.y1.max(another.y1);
        let b = self.y2.min(another.y2);
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn iou(&self, another: &BBox) -> f32 {
        let inter = self.intersection_area(another);
        let union = self.area() + another.area() - inter;
        if union <= 0. {
            0.
        } else {
            inter / union
        }
    }
}

/// 单帧中的一个目标
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_label: String,
    /// [0, 1]
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    pub fn new(class_label: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
        Self {
            class_label: class_label.into(),
            confidence: confidence.clamp(0., 1.),
            bbox,
        }
    }
}
