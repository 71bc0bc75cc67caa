// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 配置: 命令行参数 + JSON 配置文件
//!
//! 优先级: 命令行 > 配置文件 > 默认值. 配置文件不存在时写出默认配置,
//! 解析失败时使用默认值.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::{ExecutionProvider, YoloConfig};
use crate::error::SessionError;
use crate::input::{FfmpegOpener, SourceHandle};
use crate::services::{Backoff, GeminiOptions};
use crate::sound::dispatcher::OscPaths;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// 场景音效生成器参数
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "场景音效 - 实时检测触发 SuperCollider 音效", long_about = None)]
pub struct Args {
    /// 场景描述 (为空时从标准输入读取)
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,

    /// 配置文件路径
    #[arg(short, long, default_value = "soundscape.json")]
    pub config: PathBuf,

    /// 摄像头索引, 可重复 (最多两路)
    #[arg(long = "camera", action = clap::ArgAction::Append)]
    pub cameras: Vec<usize>,

    /// 对已有视频文件做检测 (代替摄像头)
    #[arg(long)]
    pub video: Option<PathBuf>,

    /// YOLOv8 ONNX 模型
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// 音效词表文件
    #[arg(short, long)]
    pub labels: Option<PathBuf>,

    /// SuperCollider 地址
    #[arg(long)]
    pub osc_host: Option<String>,

    #[arg(long)]
    pub osc_port: Option<u16>,

    /// 启用 Veo 视频生成 (付费)
    #[arg(long, conflicts_with = "no_video_generation")]
    pub video_generation: bool,

    #[arg(long)]
    pub no_video_generation: bool,

    #[arg(long)]
    pub no_detection: bool,

    /// 不请求初始音效调色板
    #[arg(long)]
    pub no_palette: bool,

    /// 日志级别 (trace/debug/info/warn/error), 也可用 RUST_LOG
    #[arg(long)]
    pub log_level: Option<String>,

    /// 列出摄像头设备后退出
    #[arg(long)]
    pub list_cameras: bool,
}

impl Args {
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ").trim().to_string()
    }
}

/// 持久化配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === 功能开关 ===
    pub enable_video_generation: bool, // 付费功能, 默认关闭
    pub enable_detection: bool,
    pub enable_palette: bool,
    pub stop_sounds_on_exit: bool,

    // === 路径 ===
    pub labels_file: PathBuf,
    pub model_path: PathBuf,
    pub font_path: Option<PathBuf>,
    pub video_dir: PathBuf,

    // === 音频引擎 (SuperCollider) ===
    pub osc_host: String,
    pub osc_port: u16,
    pub osc_start_path: String,
    pub osc_stop_path: String,

    // === 检测参数 ===
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub execution_provider: ExecutionProvider,
    pub intra_threads: usize,

    // === 采集 ===
    pub cameras: Vec<usize>,
    pub frame_timeout_ms: u64, // 取帧时检查停止信号的间隔

    // === Gemini ===
    pub gemini_api_key: String,
    pub palette_model: String,
    pub video_model: String,
    pub video_duration_secs: u32,
    pub video_aspect_ratio: String,
    pub poll_initial_secs: u64,
    pub poll_max_secs: u64,
    pub poll_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_video_generation: false,
            enable_detection: true,
            enable_palette: true,
            stop_sounds_on_exit: false,

            labels_file: PathBuf::from("sound_effect_labels.txt"),
            model_path: PathBuf::from("yolov8n.onnx"),
            font_path: None,
            video_dir: PathBuf::from("."),

            osc_host: "127.0.0.1".to_string(),
            osc_port: 57120,
            osc_start_path: "/class".to_string(),
            osc_stop_path: "/stop".to_string(),

            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            execution_provider: ExecutionProvider::Cpu,
            intra_threads: 2,

            cameras: vec![0, 1],
            frame_timeout_ms: 40,

            gemini_api_key: String::new(),
            palette_model: "gemini-2.0-flash".to_string(),
            video_model: "veo-2.0-generate-001".to_string(),
            video_duration_secs: 8,
            video_aspect_ratio: "16:9".to_string(),
            poll_initial_secs: 5,
            poll_max_secs: 30,
            poll_timeout_secs: 600,
        }
    }
}

impl Settings {
    /// 从JSON文件加载配置
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(settings) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    settings
                }
                Err(e) => {
                    warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在, 创建默认配置...");
                let settings = Self::default();
                settings.save(path);
                settings
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }

    /// 命令行覆盖配置文件
    pub fn apply_args(&mut self, args: &Args) {
        if !args.cameras.is_empty() {
            self.cameras = args.cameras.clone();
        }
        if let Some(model) = &args.model {
            self.model_path = model.clone();
        }
        if let Some(labels) = &args.labels {
            self.labels_file = labels.clone();
        }
        if let Some(host) = &args.osc_host {
            self.osc_host = host.clone();
        }
        if let Some(port) = args.osc_port {
            self.osc_port = port;
        }
        if args.video_generation {
            self.enable_video_generation = true;
        }
        if args.no_video_generation {
            self.enable_video_generation = false;
        }
        if args.no_detection {
            self.enable_detection = false;
        }
        if args.no_palette {
            self.enable_palette = false;
        }
    }

    /// 文件中为空时读取环境变量
    pub fn resolve_api_key(&mut self) {
        if self.gemini_api_key.trim().is_empty() {
            if let Ok(key) = std::env::var(API_KEY_ENV) {
                self.gemini_api_key = key;
            }
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.enable_detection && (self.cameras.is_empty() || self.cameras.len() > 2) {
            return Err(SessionError::Config(format!(
                "1 or 2 cameras are supported, got {:?}",
                self.cameras
            )));
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(SessionError::Config(format!(
                "input_size must be a positive multiple of 32, got {}",
                self.input_size
            )));
        }
        if !(0.0..=1.0).contains(&self.conf_threshold) || !(0.0..=1.0).contains(&self.iou_threshold)
        {
            return Err(SessionError::Config(
                "conf_threshold and iou_threshold must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }

    pub fn camera_handles(&self) -> Vec<SourceHandle> {
        self.cameras.iter().copied().map(SourceHandle::Camera).collect()
    }

    pub fn yolo(&self) -> YoloConfig {
        YoloConfig {
            model_path: self.model_path.clone(),
            input_size: self.input_size,
            conf_threshold: self.conf_threshold,
            iou_threshold: self.iou_threshold,
            execution_provider: self.execution_provider,
            intra_threads: self.intra_threads,
        }
    }

    pub fn osc_paths(&self) -> OscPaths {
        OscPaths {
            start: self.osc_start_path.clone(),
            stop: self.osc_stop_path.clone(),
        }
    }

    pub fn opener(&self) -> FfmpegOpener {
        FfmpegOpener {
            poll_interval: Duration::from_millis(self.frame_timeout_ms.max(1)),
            ..FfmpegOpener::default()
        }
    }

    pub fn gemini(&self) -> GeminiOptions {
        GeminiOptions {
            api_key: self.gemini_api_key.clone(),
            palette_model: self.palette_model.clone(),
            video_model: self.video_model.clone(),
            video_duration_secs: self.video_duration_secs,
            video_aspect_ratio: self.video_aspect_ratio.clone(),
            video_dir: self.video_dir.clone(),
            backoff: Backoff {
                initial: Duration::from_secs(self.poll_initial_secs),
                factor: 1.5,
                max: Duration::from_secs(self.poll_max_secs),
                timeout: Duration::from_secs(self.poll_timeout_secs),
            },
            ..GeminiOptions::default()
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        let on_off = |b: bool| if b { "ON" } else { "OFF" };
        info!("🎛️ 当前配置:");
        info!("  视频生成: {}", on_off(self.enable_video_generation));
        info!("  实时检测: {}", on_off(self.enable_detection));
        info!("  音效调色板: {}", on_off(self.enable_palette));
        info!("  音频引擎: {}:{}", self.osc_host, self.osc_port);
        info!("  摄像头: {:?}", self.cameras);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soundscape.json");
        let settings = Settings::load(&path);
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{ "osc_port": 57121, "execution_provider": "cuda" }"#).unwrap();
        let settings = Settings::load(&path);
        assert_eq!(settings.osc_port, 57121);
        assert_eq!(settings.execution_provider, ExecutionProvider::Cuda);
        assert_eq!(settings.osc_start_path, "/class");
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "soundscape",
            "--camera",
            "2",
            "--osc-port",
            "9000",
            "--no-palette",
            "--video-generation",
            "a",
            "rainy",
            "street",
        ]);
        let mut settings = Settings::default();
        settings.apply_args(&args);
        assert_eq!(settings.cameras, vec![2]);
        assert_eq!(settings.osc_port, 9000);
        assert!(!settings.enable_palette);
        assert!(settings.enable_video_generation);
        assert_eq!(args.prompt_text(), "a rainy street");
    }

    #[test]
    fn test_validate() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());
        settings.cameras = vec![0, 1, 2];
        assert!(matches!(settings.validate(), Err(SessionError::Config(_))));
        settings.cameras = vec![0];
        settings.input_size = 100;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_camera_handles() {
        let settings = Settings::default();
        assert_eq!(
            settings.camera_handles(),
            vec![SourceHandle::Camera(0), SourceHandle::Camera(1)]
        );
    }
}
