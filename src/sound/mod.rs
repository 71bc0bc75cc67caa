// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 音效系统 (Sound System)
///
/// 检测结果到音频引擎的最后一段:
/// - mapping:    检测类别 → 音效标识
/// - vocabulary: 可用音效词表 (外部文本文件)
/// - tracker:    会话级去重 (每个音效只触发一次)
/// - dispatcher: 向音频引擎发送开始/停止事件
/// - osc:        OSC/UDP 传输
pub mod dispatcher;
pub mod mapping;
pub mod osc;
pub mod tracker;
pub mod vocabulary;

use std::fmt;

pub use dispatcher::TriggerDispatcher;
pub use osc::{MessageSink, UdpOscSink};
pub use tracker::SessionTriggerTracker;
pub use vocabulary::Vocabulary;

/// 音效标识: 统一小写, 按字符串精确比较
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundId(String);

impl SoundId {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SoundId {
    fn from(raw: &str) -> Self {
        SoundId::new(raw)
    }
}
