// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! FFmpeg 采集源 - 本地摄像头与视频文件
//!
//! 摄像头: DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)
//! 解码在 FFmpeg 自己的线程里进行, 解码过滤器把 RGBA 帧投递到有界通道,
//! `next_frame` 以固定间隔轮询停止信号, 保证取消延迟有界.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::core::scheduler::ffmpeg_scheduler::{FfmpegScheduler, Running};
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use tracing::{info, warn};

use super::decode_filter::DecodeFilter;
use super::source::{CaptureSource, SourceHandle, SourceOpener, SourceState};
use crate::detection::Frame;
use crate::error::SourceError;
use crate::pipeline::StopSignal;

/// 采集源参数
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    /// 取帧时检查停止信号的间隔
    pub poll_interval: Duration,
    /// 视频文件的播放帧率上限 (摄像头由设备自身节拍)
    pub file_fps: f64,
    /// 摄像头协商参数, 为空则由驱动决定
    pub camera_size: Option<String>,
    pub camera_fps: Option<u32>,
    /// 解码器到消费者之间的缓冲帧数
    pub queue_depth: usize,
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(40),
            file_fps: 30.0,
            camera_size: None,
            camera_fps: None,
            queue_depth: 2,
        }
    }
}

impl FfmpegOpener {
    /// 平台对应的摄像头输入格式
    fn camera_format() -> &'static str {
        #[cfg(target_os = "windows")]
        {
            "dshow" // DirectShow
        }
        #[cfg(target_os = "macos")]
        {
            "avfoundation" // AVFoundation
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            "v4l2" // Video4Linux2
        }
    }

    /// 格式化摄像头URL - 根据平台选择
    fn camera_url(index: usize) -> String {
        #[cfg(target_os = "windows")]
        {
            // DirectShow 需要设备名, 找不到时退回索引名让 FFmpeg 报错
            let devices = list_camera_devices();
            match devices.into_iter().find(|(i, _)| *i == index) {
                Some((_, name)) => format!("video={}", name),
                None => format!("video={}", index),
            }
        }
        #[cfg(target_os = "macos")]
        {
            format!("{}", index)
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            format!("/dev/video{}", index)
        }
    }

    fn build_input(&self, handle: &SourceHandle) -> Input {
        match handle {
            SourceHandle::Camera(index) => {
                let mut opts: Vec<(&str, String)> = Vec::new();
                if let Some(fps) = self.camera_fps {
                    opts.push(("framerate", fps.to_string()));
                }
                if let Some(size) = &self.camera_size {
                    opts.push(("video_size", size.clone()));
                }
                let input = Input::new(Self::camera_url(*index)).set_format(Self::camera_format());
                if opts.is_empty() {
                    input
                } else {
                    input.set_input_opts(
                        opts.into_iter()
                            .map(|(k, v)| (k.to_string(), v))
                            .collect(),
                    )
                }
            }
            SourceHandle::File(path) => Input::new(path.to_string_lossy().to_string()),
        }
    }
}

impl SourceOpener for FfmpegOpener {
    fn open(&self, handle: &SourceHandle) -> Result<Box<dyn CaptureSource>, SourceError> {
        info!("📷 打开采集源: {}", handle);

        if let SourceHandle::File(path) = handle {
            if !path.exists() {
                return Err(SourceError::Unavailable {
                    handle: handle.clone(),
                    reason: "file not found".to_string(),
                });
            }
        }

        let (tx, rx) = crossbeam_channel::bounded(self.queue_depth.max(1));
        let released = Arc::new(AtomicBool::new(false));
        let filter = DecodeFilter::new(handle.to_string(), tx, Arc::clone(&released));

        // 构建帧处理管线, 统一转换为 YUV420P 交给解码过滤器
        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("decode", Box::new(filter));
        let out = create_null_output().add_frame_pipeline(pipe);

        let ctx = FfmpegContext::builder()
            .input(self.build_input(handle))
            .filter_descs(["format=yuv420p"].into())
            .output(out)
            .build()
            .map_err(|e| SourceError::Unavailable {
                handle: handle.clone(),
                reason: format!("构建失败: {}", e),
            })?;

        let scheduler = ctx.start().map_err(|e| SourceError::Unavailable {
            handle: handle.clone(),
            reason: format!("启动失败: {}", e),
        })?;

        info!("✅ 采集源 {} 已打开", handle);

        let frame_interval = match handle {
            SourceHandle::File(_) if self.file_fps > 0.0 => {
                Some(Duration::from_secs_f64(1.0 / self.file_fps))
            }
            _ => None,
        };

        Ok(Box::new(FfmpegSource {
            handle: handle.clone(),
            state: SourceState::Open,
            rx,
            released,
            scheduler: Some(scheduler),
            poll_interval: self.poll_interval,
            frame_interval,
            next_due: None,
        }))
    }
}

/// 已打开的 FFmpeg 采集源
pub struct FfmpegSource {
    handle: SourceHandle,
    state: SourceState,
    rx: Receiver<Frame>,
    released: Arc<AtomicBool>,
    scheduler: Option<FfmpegScheduler<Running>>,
    poll_interval: Duration,
    frame_interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl FfmpegSource {
    /// 视频文件按帧率节拍输出, 同时保持可取消
    fn pace(&mut self, stop: &StopSignal) {
        let Some(interval) = self.frame_interval else {
            return;
        };
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            stop.wait_timeout(due - now);
        }
        self.next_due = Some(due.max(now) + interval);
    }
}

impl CaptureSource for FfmpegSource {
    fn handle(&self) -> &SourceHandle {
        &self.handle
    }

    fn state(&self) -> SourceState {
        self.state
    }

    fn next_frame(&mut self, stop: &StopSignal) -> Option<Frame> {
        if self.state != SourceState::Open {
            return None;
        }
        loop {
            if stop.is_triggered() {
                return None;
            }
            match self.rx.recv_timeout(self.poll_interval) {
                Ok(frame) => {
                    self.pace(stop);
                    return Some(frame);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    info!("📹 采集源 {} 流结束", self.handle);
                    self.state = SourceState::Closed;
                    return None;
                }
            }
        }
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::Release);
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.abort();
            info!("🛑 采集源 {} 已释放", self.handle);
        }
        if self.state == SourceState::Open {
            self.state = SourceState::Closed;
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// 获取可用的摄像头设备列表
pub fn list_camera_devices() -> Vec<(usize, String)> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().enumerate().collect(),
        Err(e) => {
            warn!("⚠️ 获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}
