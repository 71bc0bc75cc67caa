// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测器 (Detector)
//! 职责: 采集帧 → 模型推理 → 检测结果 + 叠加画面

use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;
use tracing::{debug, warn};

use super::overlay::Overlay;
use super::types::{Detection, Frame};
use crate::error::DetectorError;

/// 推理能力: 一帧进, 检测列表出
pub trait ObjectDetector: Send {
    fn infer(&mut self, image: &RgbaImage) -> Result<Vec<Detection>, DetectorError>;

    fn name(&self) -> &str {
        "detector"
    }
}

/// 每个采集工作线程各持有一个检测器实例, 在进入运行态之前统一创建
pub trait DetectorFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn ObjectDetector>, DetectorError>;
}

pub struct FrameDetector {
    model: Box<dyn ObjectDetector>,
    overlay: Arc<Overlay>,

    // 统计
    count: u64,
    window: u64,
    last: Instant,
    current_fps: f64,
    failures: u64,
}

impl FrameDetector {
    pub fn new(model: Box<dyn ObjectDetector>, overlay: Arc<Overlay>) -> Self {
        Self {
            model,
            overlay,
            count: 0,
            window: 0,
            last: Instant::now(),
            current_fps: 0.0,
            failures: 0,
        }
    }

    /// 推理一次; 单帧失败只记录, 视为无检测
    pub fn detect(&mut self, frame: Frame) -> (RgbaImage, Vec<Detection>) {
        let t0 = Instant::now();
        let detections = match self.model.infer(&frame.image) {
            Ok(d) => d,
            Err(e) => {
                self.failures += 1;
                if self.failures <= 10 || self.failures % 100 == 0 {
                    warn!("❌ 帧 #{} 推理失败 ({}次): {}", frame.index, self.failures, e);
                }
                Vec::new()
            }
        };
        let inference_ms = t0.elapsed().as_secs_f64() * 1000.0;

        let mut annotated = frame.image;
        self.overlay.draw(&mut annotated, &detections);

        self.count += 1;
        self.window += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            self.current_fps = self.window as f64 / elapsed;
            self.window = 0;
            self.last = Instant::now();
        }
        if self.count % 60 == 0 {
            debug!(
                "🔍 [{}] 检测: {}个目标 | 推理:{:.1}ms | {:.1}fps",
                self.model.name(),
                detections.len(),
                inference_ms,
                self.current_fps
            );
        }

        (annotated, detections)
    }

    pub fn frames(&self) -> u64 {
        self.count
    }

    pub fn fps(&self) -> f64 {
        self.current_fps
    }
}
