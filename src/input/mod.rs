// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输入系统 (Video Input System)
///
/// - CaptureSource: 采集源抽象 (取帧 / 释放)
/// - FfmpegOpener:  本地摄像头 (DirectShow/AVFoundation/V4L2) 与视频文件
/// - DecodeFilter:  FFmpeg 帧过滤, YUV420P → RGBA
pub mod decode_filter;
pub mod ffmpeg;
pub mod source;

pub use decode_filter::DecodeFilter;
pub use ffmpeg::{list_camera_devices, FfmpegOpener, FfmpegSource};
pub use source::{CaptureSource, SourceHandle, SourceOpener, SourceState};
