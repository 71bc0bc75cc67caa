// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 会话编排 (Memory Session)
//!
//! 场景描述 → 音效调色板 → (可选) 视频生成 → 检测流水线或全屏播放.
//! 外部服务失败只降级, 只有流水线启动失败是致命错误.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Settings;
use crate::detection::{DetectorFactory, Overlay};
use crate::error::SessionError;
use crate::input::{SourceHandle, SourceOpener};
use crate::pipeline::{FrameSink, MultiSourcePipeline, PipelineReport, PipelineTopology, StopSignal};
use crate::services::{PaletteService, Playback, VideoService};
use crate::sound::{SoundId, TriggerDispatcher};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub enable_palette: bool,
    pub enable_video_generation: bool,
    pub enable_detection: bool,
    pub stop_sounds_on_exit: bool,
    pub cameras: Vec<SourceHandle>,
    /// 已有视频 (`--video`), 设置后跳过视频生成
    pub video: Option<PathBuf>,
}

impl SessionOptions {
    pub fn from_settings(settings: &Settings, video: Option<PathBuf>) -> Self {
        Self {
            enable_palette: settings.enable_palette,
            enable_video_generation: settings.enable_video_generation,
            enable_detection: settings.enable_detection,
            stop_sounds_on_exit: settings.stop_sounds_on_exit,
            cameras: settings.camera_handles(),
            video,
        }
    }
}

/// 视觉阶段要做的事
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPlan {
    Detect(PipelineTopology),
    Play(PathBuf),
    Done,
}

/// 有视频: 检测该文件或直接播放; 无视频: 检测摄像头或结束
pub fn plan(options: &SessionOptions, video: Option<PathBuf>) -> Result<SessionPlan, SessionError> {
    match (video, options.enable_detection) {
        (Some(path), true) => Ok(SessionPlan::Detect(PipelineTopology::Single(
            SourceHandle::File(path),
        ))),
        (Some(path), false) => Ok(SessionPlan::Play(path)),
        (None, true) => PipelineTopology::from_handles(&options.cameras)
            .map(SessionPlan::Detect)
            .ok_or_else(|| {
                SessionError::Config(format!(
                    "1 or 2 cameras are supported, got {}",
                    options.cameras.len()
                ))
            }),
        (None, false) => Ok(SessionPlan::Done),
    }
}

#[derive(Debug, Default)]
pub struct SessionOutcome {
    pub palette: Vec<SoundId>,
    pub video: Option<PathBuf>,
    pub report: Option<PipelineReport>,
    pub played: bool,
    /// 视频生成失败, 会话提前结束
    pub ended_early: bool,
}

/// 会话依赖的协作者
pub struct Collaborators {
    pub palette: Arc<dyn PaletteService>,
    pub video: Arc<dyn VideoService>,
    pub playback: Arc<dyn Playback>,
    pub opener: Arc<dyn SourceOpener>,
    pub detectors: Arc<dyn DetectorFactory>,
    pub overlay: Arc<Overlay>,
    pub display: Arc<dyn FrameSink>,
}

pub struct MemorySession {
    options: SessionOptions,
    dispatcher: Arc<TriggerDispatcher>,
    parts: Collaborators,
    stop: StopSignal,
}

impl MemorySession {
    pub fn new(
        options: SessionOptions,
        dispatcher: Arc<TriggerDispatcher>,
        parts: Collaborators,
        stop: StopSignal,
    ) -> Self {
        Self {
            options,
            dispatcher,
            parts,
            stop,
        }
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn run(&self, scene: &str) -> Result<SessionOutcome, SessionError> {
        info!("💭 场景: {}", scene);
        let result = self.run_stages(scene);
        if self.options.stop_sounds_on_exit {
            self.dispatcher.stop_all();
        }
        match &result {
            Ok(outcome) => info!(
                "🏁 会话结束: 调色板 {} 个音效, 检测触发 {} 个",
                outcome.palette.len(),
                outcome.report.as_ref().map_or(0, |r| r.dispatched)
            ),
            Err(e) => warn!("❌ 会话失败: {}", e),
        }
        result
    }

    fn run_stages(&self, scene: &str) -> Result<SessionOutcome, SessionError> {
        let mut outcome = SessionOutcome {
            palette: self.palette(scene),
            ..SessionOutcome::default()
        };

        outcome.video = match &self.options.video {
            Some(path) => Some(path.clone()),
            None if self.options.enable_video_generation => {
                match self.parts.video.generate(scene, &self.stop) {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!("❌ 视频生成失败: {}, 会话结束", e);
                        outcome.ended_early = true;
                        return Ok(outcome);
                    }
                }
            }
            None => {
                info!("🎬 视频生成已关闭");
                None
            }
        };

        match plan(&self.options, outcome.video.clone())? {
            SessionPlan::Detect(topology) => {
                info!("🔍 启动检测流水线: {}", topology);
                let pipeline = MultiSourcePipeline::new(
                    Arc::clone(&self.parts.opener),
                    Arc::clone(&self.parts.detectors),
                    Arc::clone(&self.dispatcher),
                    Arc::clone(&self.parts.overlay),
                    Arc::clone(&self.parts.display),
                    self.stop.clone(),
                );
                outcome.report = Some(pipeline.run(&topology)?);
            }
            SessionPlan::Play(path) => {
                if let Err(e) = self.parts.playback.play(&path) {
                    warn!("⚠️ 播放失败: {}", e);
                } else {
                    outcome.played = true;
                }
            }
            SessionPlan::Done => {}
        }
        Ok(outcome)
    }

    /// 调色板失败时返回空列表
    fn palette(&self, scene: &str) -> Vec<SoundId> {
        if !self.options.enable_palette {
            return Vec::new();
        }
        match self
            .parts
            .palette
            .suggest(scene, self.dispatcher.vocabulary())
        {
            Ok(palette) => {
                let sent = self.dispatcher.trigger_many(&palette);
                info!("🎨 调色板已触发 {}/{} 个音效", sent, palette.len());
                palette
            }
            Err(e) => {
                warn!("⚠️ 音效调色板不可用: {}", e);
                Vec::new()
            }
        }
    }
}
