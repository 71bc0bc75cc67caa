// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 集成测试替身: 脚本化采集源 / 检测器 / 消息出口 / 画面出口

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::RgbaImage;

use yolo_soundscape::detection::{BBox, Detection, DetectorFactory, Frame, ObjectDetector, Overlay};
use yolo_soundscape::error::{DetectorError, DispatchError, SourceError, UpstreamError};
use yolo_soundscape::input::{CaptureSource, SourceHandle, SourceOpener, SourceState};
use yolo_soundscape::pipeline::{DisplayFrame, FrameSink, MultiSourcePipeline, StopSignal};
use yolo_soundscape::services::{PaletteService, Playback, VideoService};
use yolo_soundscape::sound::{
    MessageSink, SessionTriggerTracker, SoundId, TriggerDispatcher, Vocabulary,
};
use yolo_soundscape::sound::dispatcher::OscPaths;

/// 每个句柄的脚本
#[derive(Clone, Debug)]
pub enum Script {
    Unavailable,
    /// 有限帧后流结束
    Frames { count: u64, width: u32, height: u32 },
    /// 无限帧, 直到停止信号
    Endless { width: u32, height: u32 },
}

/// 每个句柄被读取/释放的次数
#[derive(Default)]
pub struct SourceLog {
    pub reads: Mutex<HashMap<SourceHandle, usize>>,
    pub releases: Mutex<HashMap<SourceHandle, usize>>,
}

impl SourceLog {
    pub fn reads(&self, handle: &SourceHandle) -> usize {
        self.reads.lock().unwrap().get(handle).copied().unwrap_or(0)
    }

    pub fn releases(&self, handle: &SourceHandle) -> usize {
        self.releases.lock().unwrap().get(handle).copied().unwrap_or(0)
    }
}

pub struct ScriptedSource {
    handle: SourceHandle,
    script: Script,
    next: u64,
    state: SourceState,
    log: Arc<SourceLog>,
}

impl CaptureSource for ScriptedSource {
    fn handle(&self) -> &SourceHandle {
        &self.handle
    }

    fn state(&self) -> SourceState {
        self.state
    }

    fn next_frame(&mut self, stop: &StopSignal) -> Option<Frame> {
        if stop.is_triggered() || self.state != SourceState::Open {
            return None;
        }
        let (width, height) = match self.script {
            Script::Frames { count, .. } if self.next >= count => return None,
            Script::Frames { width, height, .. } => (width, height),
            Script::Endless { width, height } => {
                thread::sleep(Duration::from_millis(2));
                (width, height)
            }
            Script::Unavailable => return None,
        };
        *self
            .log
            .reads
            .lock()
            .unwrap()
            .entry(self.handle.clone())
            .or_default() += 1;
        self.next += 1;
        Some(Frame::new(RgbaImage::new(width, height), self.next))
    }

    fn release(&mut self) {
        if self.state == SourceState::Open {
            self.state = SourceState::Closed;
            *self
                .log
                .releases
                .lock()
                .unwrap()
                .entry(self.handle.clone())
                .or_default() += 1;
        }
    }
}

pub struct ScriptedOpener {
    scripts: HashMap<SourceHandle, Script>,
    pub log: Arc<SourceLog>,
}

impl ScriptedOpener {
    pub fn new(scripts: impl IntoIterator<Item = (SourceHandle, Script)>) -> Self {
        Self {
            scripts: scripts.into_iter().collect(),
            log: Arc::new(SourceLog::default()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::<(SourceHandle, Script)>::new())
    }
}

impl SourceOpener for ScriptedOpener {
    fn open(&self, handle: &SourceHandle) -> Result<Box<dyn CaptureSource>, SourceError> {
        match self.scripts.get(handle) {
            None | Some(Script::Unavailable) => Err(SourceError::Unavailable {
                handle: handle.clone(),
                reason: "scripted failure".into(),
            }),
            Some(script) => Ok(Box::new(ScriptedSource {
                handle: handle.clone(),
                script: script.clone(),
                next: 0,
                state: SourceState::Open,
                log: Arc::clone(&self.log),
            })),
        }
    }
}

/// 每帧返回相同标签的检测器; `fail_every` 非零时每 n 帧失败一次, `panics` 时首帧 panic
pub struct ScriptedDetector {
    labels: Vec<String>,
    fail_every: usize,
    panics: bool,
    calls: usize,
}

impl ObjectDetector for ScriptedDetector {
    fn infer(&mut self, image: &RgbaImage) -> Result<Vec<Detection>, DetectorError> {
        self.calls += 1;
        if self.panics {
            panic!("scripted detector crash");
        }
        if self.fail_every > 0 && self.calls % self.fail_every == 0 {
            return Err(DetectorError::Inference("scripted".into()));
        }
        let (w, h) = (image.width() as f32, image.height() as f32);
        Ok(self
            .labels
            .iter()
            .map(|l| Detection::new(l.as_str(), 0.9, BBox::new(0.0, 0.0, w / 2.0, h / 2.0)))
            .collect())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub struct ScriptedFactory {
    pub labels: Vec<String>,
    pub fail_every: usize,
    pub unavailable: bool,
    /// 第一个创建的检测器 (源#0) 在首帧 panic
    pub panic_first: bool,
    pub created: AtomicUsize,
}

impl ScriptedFactory {
    pub fn detecting(labels: &[&str]) -> Self {
        Self {
            labels: labels.iter().map(|s| s.to_string()).collect(),
            fail_every: 0,
            unavailable: false,
            panic_first: false,
            created: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::detecting(&[])
        }
    }
}

impl DetectorFactory for ScriptedFactory {
    fn create(&self) -> Result<Box<dyn ObjectDetector>, DetectorError> {
        if self.unavailable {
            return Err(DetectorError::InferenceUnavailable("no model".into()));
        }
        let index = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedDetector {
            labels: self.labels.clone(),
            fail_every: self.fail_every,
            panics: self.panic_first && index == 0,
            calls: 0,
        }))
    }
}

/// 记录所有发出的 OSC 消息
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl MessageSink for RecordingSink {
    fn send(&self, path: &str, arg: &str) -> Result<(), DispatchError> {
        self.sent
            .lock()
            .unwrap()
            .push((path.to_string(), arg.to_string()));
        Ok(())
    }
}

/// 记录送显画面; `stop_after` 帧后触发停止 (模拟操作员退出)
pub struct RecordingDisplay {
    pub frames: Mutex<Vec<(u32, u32, u64)>>,
    stop_after: Option<(usize, StopSignal)>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            stop_after: None,
        }
    }

    pub fn quitting_after(n: usize, stop: StopSignal) -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            stop_after: Some((n, stop)),
        }
    }

    pub fn sizes(&self) -> Vec<(u32, u32)> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|&(w, h, _)| (w, h))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

impl FrameSink for RecordingDisplay {
    fn present(&self, frame: DisplayFrame) {
        let mut frames = self.frames.lock().unwrap();
        frames.push((frame.image.width(), frame.image.height(), frame.iteration));
        if let Some((n, stop)) = &self.stop_after {
            if frames.len() >= *n {
                stop.trigger();
            }
        }
    }
}

pub fn dispatcher(sink: Arc<RecordingSink>, labels: &[&str]) -> Arc<TriggerDispatcher> {
    Arc::new(TriggerDispatcher::new(
        sink,
        Arc::new(Vocabulary::new(labels.iter().copied())),
        Arc::new(SessionTriggerTracker::new()),
        OscPaths::default(),
    ))
}

pub fn pipeline(
    opener: Arc<ScriptedOpener>,
    detectors: Arc<ScriptedFactory>,
    dispatcher: Arc<TriggerDispatcher>,
    display: Arc<RecordingDisplay>,
    stop: StopSignal,
) -> MultiSourcePipeline {
    MultiSourcePipeline::new(
        opener,
        detectors,
        dispatcher,
        Arc::new(Overlay::boxes_only()),
        display,
        stop,
    )
}

pub fn cam(index: usize) -> SourceHandle {
    SourceHandle::Camera(index)
}

pub fn frames(count: u64, width: u32, height: u32) -> Script {
    Script::Frames {
        count,
        width,
        height,
    }
}

// ========== 会话替身 ==========

pub struct FixedPalette(pub Result<String, ()>);

impl PaletteService for FixedPalette {
    fn suggest(&self, _scene: &str, vocabulary: &Vocabulary) -> Result<Vec<SoundId>, UpstreamError> {
        match &self.0 {
            Ok(raw) => Ok(vocabulary.filter_palette(raw)),
            Err(()) => Err(UpstreamError::Http("status 503".into())),
        }
    }
}

pub struct FixedVideo(pub Option<PathBuf>);

impl VideoService for FixedVideo {
    fn generate(&self, _scene: &str, _stop: &StopSignal) -> Result<PathBuf, UpstreamError> {
        self.0.clone().ok_or(UpstreamError::NoVideo)
    }
}

#[derive(Default)]
pub struct RecordingPlayer {
    pub played: Mutex<Vec<PathBuf>>,
}

impl Playback for RecordingPlayer {
    fn play(&self, path: &Path) -> Result<(), UpstreamError> {
        self.played.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}
