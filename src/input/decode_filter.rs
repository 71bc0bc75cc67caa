// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// FFmpeg解码过滤器模块
/// FFmpeg decode filter module
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{SendTimeoutError, Sender};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::detection::Frame as CapturedFrame;

/// 背压等待时检查释放标志的间隔
const SEND_POLL: Duration = Duration::from_millis(50);

/// FFmpeg解码过滤器: 视频帧(YUV420P) → RGBA → 采集源通道
pub struct DecodeFilter {
    label: String,
    tx: Option<Sender<CapturedFrame>>,
    released: Arc<AtomicBool>,
    count: usize,
    last: Instant,
    current_fps: f64,
    dropped_frames: usize,
    total_frames: usize,
}

impl DecodeFilter {
    pub fn new(label: String, tx: Sender<CapturedFrame>, released: Arc<AtomicBool>) -> Self {
        Self {
            label,
            tx: Some(tx),
            released,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
            dropped_frames: 0,
            total_frames: 0,
        }
    }

    fn drop_frame(&mut self, reason: &str) {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            warn!("⚠️ [{}] 丢弃帧 #{}: {}", self.label, self.total_frames, reason);
        }
    }

    /// 阻塞投递一帧 (背压), 期间源被释放或接收端关闭则结束解码
    fn deliver(&mut self, mut frame: CapturedFrame) -> Result<(), String> {
        let Some(tx) = self.tx.as_ref() else {
            return Err("source released".to_string());
        };
        loop {
            if self.released.load(Ordering::Acquire) {
                return Err("source released".to_string());
            }
            match tx.send_timeout(frame, SEND_POLL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(f)) => frame = f,
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err("frame receiver closed".to_string())
                }
            }
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!("✅ [{}] 解码线程启动", self.label);
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        self.total_frames += 1;

        let rgba = unsafe {
            // 基本检查：空帧或损坏帧
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.drop_frame("空帧/损坏帧");
                return Ok(None);
            }

            let raw = &*frame.as_ptr();
            let w = raw.width as u32;
            let h = raw.height as u32;

            // 检查分辨率合法性
            if w == 0 || h == 0 || w > 4096 || h > 4096 {
                self.drop_frame(&format!("非法分辨率 {}x{}", w, h));
                return Ok(None);
            }

            // 只丢弃严重错误的帧 (缺少参考帧、无效比特流)
            if raw.decode_error_flags & 0x03 != 0 {
                self.drop_frame(&format!("解码错误标志=0x{:02x}", raw.decode_error_flags));
                return Ok(None);
            }

            let (y_plane, u_plane, v_plane) = (raw.data[0], raw.data[1], raw.data[2]);
            let y_stride = raw.linesize[0] as usize;
            let uv_stride = raw.linesize[1] as usize;

            if y_plane.is_null() || u_plane.is_null() || v_plane.is_null() {
                self.drop_frame("YUV指针为空");
                return Ok(None);
            }
            if y_stride < w as usize || uv_stride < (w as usize).div_ceil(2) {
                self.drop_frame(&format!("步长异常 y_stride={} uv_stride={}", y_stride, uv_stride));
                return Ok(None);
            }

            let mut buffer = vec![255u8; (w * h * 4) as usize];
            yuv420p_to_rgba(
                y_plane,
                u_plane,
                v_plane,
                y_stride,
                uv_stride,
                &mut buffer,
                w as usize,
                h as usize,
            );
            match RgbaImage::from_raw(w, h, buffer) {
                Some(img) => img,
                None => {
                    self.drop_frame("RGBA图像转换失败");
                    return Ok(None);
                }
            }
        };

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 1.0 {
            let elapsed = self.last.elapsed().as_secs_f64();
            self.current_fps = self.count as f64 / elapsed;
            let drop_rate = self.dropped_frames as f64 / self.total_frames as f64 * 100.0;
            debug!(
                "📺 [{}] 解码统计: {:.1}fps | 总帧{} | 丢弃{} ({:.1}%)",
                self.label, self.current_fps, self.total_frames, self.dropped_frames, drop_rate
            );
            self.last = Instant::now();
            self.count = 0;
        }

        let captured = CapturedFrame::new(rgba, self.total_frames as u64);
        self.deliver(captured)?;

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        // 关闭发送端, 接收方据此得到流结束
        self.tx = None;
        info!("✅ [{}] 解码线程退出", self.label);
    }
}

/// YUV420P → RGBA (BT.601, 定点系数 ×128)
///
/// # Safety
/// 三个平面指针必须在 `height` 行、对应步长范围内有效.
#[allow(clippy::too_many_arguments)]
#[inline]
pub unsafe fn yuv420p_to_rgba(
    y_plane: *const u8,
    u_plane: *const u8,
    v_plane: *const u8,
    y_stride: usize,
    uv_stride: usize,
    buffer: &mut [u8],
    width: usize,
    height: usize,
) {
    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * y_stride;
        let uv_row = (y >> 1) * uv_stride;

        for x in 0..width {
            let (r, g, b) = yuv_to_rgb(
                *y_plane.add(y_row + x),
                *u_plane.add(uv_row + (x >> 1)),
                *v_plane.add(uv_row + (x >> 1)),
            );
            buffer[out_idx] = r;
            buffer[out_idx + 1] = g;
            buffer[out_idx + 2] = b;
            out_idx += 4;
        }
    }
}

#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y = y as i32;
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    (
        (y + ((v * 179) >> 7)).clamp(0, 255) as u8,
        (y - ((u * 44) >> 7) - ((v * 91) >> 7)).clamp(0, 255) as u8,
        (y + ((u * 227) >> 7)).clamp(0, 255) as u8,
    )
}
