// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 全屏播放 (无检测路径), 播放器自带事件循环
//!
//! 优先 mpv; 找不到 mpv 时退回内置窗口: 采集源循环读取文件, 流结束后重新打开.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{select, Sender};
use tracing::{debug, info, warn};

use crate::error::{SourceError, UpstreamError};
use crate::input::{SourceHandle, SourceOpener};
use crate::pipeline::{DisplayFrame, StopSignal};
use crate::renderer::Renderer;

pub trait Playback: Send + Sync {
    /// 阻塞直到播放器退出
    fn play(&self, path: &Path) -> Result<(), UpstreamError>;
}

/// mpv: 全屏、静音、无限循环, 不显示任何控件
#[derive(Debug, Clone)]
pub struct MpvPlayer {
    pub binary: String,
}

impl Default for MpvPlayer {
    fn default() -> Self {
        Self {
            binary: "mpv".to_string(),
        }
    }
}

impl MpvPlayer {
    pub fn args(path: &Path) -> Vec<String> {
        vec![
            "--fs".into(),
            "--no-audio".into(),
            "--loop=inf".into(),
            "--no-osc".into(),
            "--no-input-default-bindings".into(),
            "--input-conf=/dev/null".into(),
            "--osd-level=0".into(),
            path.to_string_lossy().into_owned(),
        ]
    }
}

impl Playback for MpvPlayer {
    fn play(&self, path: &Path) -> Result<(), UpstreamError> {
        info!("🎬 全屏播放: {}", path.display());
        let status = Command::new(&self.binary)
            .args(Self::args(path))
            .status()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => UpstreamError::PlayerMissing(self.binary.clone()),
                _ => UpstreamError::Io(e),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(UpstreamError::Playback(format!(
                "{} exited with {}",
                self.binary, status
            )))
        }
    }
}

/// 循环送帧直到停止信号或接收端关闭; 每轮流结束后释放并重新打开.
/// 返回送出的帧数. 一帧都读不到的文件视为不可用, 避免空转.
pub fn feed_looping(
    opener: &dyn SourceOpener,
    handle: &SourceHandle,
    frames: &Sender<DisplayFrame>,
    stop: &StopSignal,
) -> Result<u64, SourceError> {
    let mut sent = 0u64;
    let mut rounds = 0u64;
    while !stop.is_triggered() {
        let mut source = opener.open(handle)?;
        let mut read_any = false;
        while let Some(frame) = source.next_frame(stop) {
            read_any = true;
            sent += 1;
            let display = DisplayFrame {
                image: frame.image,
                iteration: sent,
                triggered: Vec::new(),
            };
            let delivered = select! {
                send(frames, display) -> r => r.is_ok(),
                recv(stop.receiver()) -> _ => false,
            };
            if !delivered {
                source.release();
                return Ok(sent);
            }
        }
        source.release();
        if !read_any && !stop.is_triggered() {
            return Err(SourceError::Unavailable {
                handle: handle.clone(),
                reason: "no frames".to_string(),
            });
        }
        rounds += 1;
        debug!("🔁 {} 第 {} 轮播放结束, 重新打开", handle, rounds);
    }
    Ok(sent)
}

/// 内置全屏播放: 送帧线程 + 主线程 macroquad 窗口, Q / Esc 退出
pub struct WindowPlayer {
    opener: Arc<dyn SourceOpener>,
}

impl WindowPlayer {
    pub fn new(opener: Arc<dyn SourceOpener>) -> Self {
        Self { opener }
    }
}

impl Playback for WindowPlayer {
    fn play(&self, path: &Path) -> Result<(), UpstreamError> {
        info!("🎬 内置播放器: {} (Q / Esc 退出)", path.display());
        let handle = SourceHandle::File(path.to_path_buf());
        let stop = StopSignal::new();
        let (tx, rx) = crossbeam_channel::bounded(2);

        let opener = Arc::clone(&self.opener);
        let feeder_stop = stop.clone();
        let feeder = thread::Builder::new()
            .name("playback".into())
            .spawn(move || feed_looping(opener.as_ref(), &handle, &tx, &feeder_stop))?;

        Renderer::run_playback(rx, stop.clone());
        stop.trigger();

        match feeder.join() {
            Ok(Ok(frames)) => {
                info!("✅ 播放结束, 共 {} 帧", frames);
                Ok(())
            }
            Ok(Err(e)) => Err(UpstreamError::Playback(e.to_string())),
            Err(_) => Err(UpstreamError::Playback("playback thread panicked".into())),
        }
    }
}

/// 先用外部播放器, 它不存在时改用内置播放
pub struct FallbackPlayer {
    primary: Arc<dyn Playback>,
    fallback: Arc<dyn Playback>,
}

impl FallbackPlayer {
    pub fn new(primary: Arc<dyn Playback>, fallback: Arc<dyn Playback>) -> Self {
        Self { primary, fallback }
    }
}

impl Playback for FallbackPlayer {
    fn play(&self, path: &Path) -> Result<(), UpstreamError> {
        match self.primary.play(path) {
            Err(UpstreamError::PlayerMissing(binary)) => {
                warn!("⚠️ 未找到 {}, 改用内置播放器", binary);
                self.fallback.play(path)
            }
            other => other,
        }
    }
}
