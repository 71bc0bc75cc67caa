// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 错误分类 (Error taxonomy)
//!
//! - `SourceError`:   采集源无法打开, 由回退策略就地处理
//! - `DetectorError`: 检测器初始化失败为致命错误, 单帧推理失败仅记录
//! - `DispatchError`: 音频引擎消息发送失败, 记录后吞掉
//! - `UpstreamError`: 外部服务 (音效调色板 / 视频生成 / 播放) 失败, 会话降级继续
//! - `SessionError`:  只有这些会上报到顶层并以非零状态退出

use thiserror::Error;

use crate::input::SourceHandle;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("capture source {handle} unavailable: {reason}")]
    Unavailable { handle: SourceHandle, reason: String },
}

#[derive(Debug, Error)]
pub enum DetectorError {
    /// 模型无法加载, 必须在进入逐帧循环之前暴露
    #[error("inference unavailable: {0}")]
    InferenceUnavailable(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to encode message for {addr}: {reason}")]
    Encode { addr: String, reason: String },
    #[error("failed to send message to audio engine: {0}")]
    Transport(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("http request failed: {0}")]
    Http(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("operation cancelled")]
    Cancelled,
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,
    #[error("no video was generated")]
    NoVideo,
    #[error("playback failed: {0}")]
    Playback(String),
    /// 外部播放器不存在, 可以退回内置播放
    #[error("{0} not found in PATH")]
    PlayerMissing(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ureq::Error> for UpstreamError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                UpstreamError::Http(format!("status {}: {}", code, body.trim()))
            }
            ureq::Error::Transport(t) => UpstreamError::Http(t.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no capture source could be opened (requested: {requested})")]
    NoSourceAvailable { requested: String },
    #[error(transparent)]
    Inference(#[from] DetectorError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
