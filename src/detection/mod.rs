/// 检测系统 (Detection System)
///
/// 每个采集工作线程持有一个独立的检测器实例
/// - Detector: 推理 + 叠加画面
/// - YOLOv8:   ONNX Runtime 目标检测
/// - Overlay:  检测框与标签绘制
pub mod detector;
pub mod labels;
pub mod overlay;
pub mod types;
pub mod yolov8;

pub use detector::{DetectorFactory, FrameDetector, ObjectDetector};
pub use overlay::Overlay;
pub use types::{BBox, Detection, Frame};
pub use yolov8::{ExecutionProvider, YoloConfig, YoloFactory, YOLOv8};
