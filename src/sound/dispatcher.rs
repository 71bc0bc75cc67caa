// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 触发分发器 (Trigger Dispatcher)
//! 职责: 音效标识 → OSC 开始/停止消息 → 音频引擎. 发送即忘, 失败只记录.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use super::{MessageSink, SessionTriggerTracker, SoundId, Vocabulary};

/// 音频引擎消息路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscPaths {
    pub start: String,
    pub stop: String,
}

impl Default for OscPaths {
    fn default() -> Self {
        Self {
            start: "/class".to_string(),
            stop: "/stop".to_string(),
        }
    }
}

pub struct TriggerDispatcher {
    sink: Arc<dyn MessageSink>,
    vocabulary: Arc<Vocabulary>,
    tracker: Arc<SessionTriggerTracker>,
    paths: OscPaths,
    active: Mutex<BTreeSet<SoundId>>,
}

impl TriggerDispatcher {
    pub fn new(
        sink: Arc<dyn MessageSink>,
        vocabulary: Arc<Vocabulary>,
        tracker: Arc<SessionTriggerTracker>,
        paths: OscPaths,
    ) -> Self {
        Self {
            sink,
            vocabulary,
            tracker,
            paths,
            active: Mutex::new(BTreeSet::new()),
        }
    }

    fn active_set(&self) -> MutexGuard<'_, BTreeSet<SoundId>> {
        self.active.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn tracker(&self) -> &Arc<SessionTriggerTracker> {
        &self.tracker
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    /// 发送开始事件. 词表之外的音效不发送; 返回是否成功发出
    pub fn trigger(&self, id: &SoundId) -> bool {
        if !self.vocabulary.contains(id) {
            warn!("⚠️ 未知音效: {}", id);
            return false;
        }
        match self.sink.send(&self.paths.start, id.as_str()) {
            Ok(()) => {
                info!("🎵 触发音效: {}", id);
                self.active_set().insert(id.clone());
                true
            }
            Err(e) => {
                warn!("⚠️ 音效 {} 发送失败: {}", id, e);
                false
            }
        }
    }

    /// 依次触发多个音效 (调色板路径, 不经过去重)
    pub fn trigger_many<'a, I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a SoundId>,
    {
        ids.into_iter().filter(|id| self.trigger(id)).count()
    }

    /// 发送停止事件, 并允许该音效以后再次触发
    pub fn stop(&self, id: &SoundId) {
        if let Err(e) = self.sink.send(&self.paths.stop, id.as_str()) {
            warn!("⚠️ 音效 {} 停止消息发送失败: {}", id, e);
        }
        self.active_set().remove(id);
        self.tracker.reset(id);
    }

    /// 停止所有活跃音效 (包括去重器中登记过的)
    pub fn stop_all(&self) {
        let mut ids: BTreeSet<SoundId> = self.active_set().clone();
        ids.extend(self.tracker.triggered());
        for id in &ids {
            self.stop(id);
        }
        self.active_set().clear();
        self.tracker.reset_all();
        if !ids.is_empty() {
            info!("🔇 已停止 {} 个音效", ids.len());
        }
    }

    /// 当前处于播放状态的音效
    pub fn active(&self) -> Vec<SoundId> {
        self.active_set().iter().cloned().collect()
    }
}
