// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 会话触发去重器 (Session Trigger Tracker)
//!
//! "首次出现触发, 重复出现静默": 同一个音效在一次会话中只会被判定为新音效一次,
//! 直到被显式 `reset`. 多个采集线程并发调用 `propose` 时只有一个能拿到 `true`.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use super::SoundId;

#[derive(Debug, Default)]
pub struct SessionTriggerTracker {
    triggered: Mutex<BTreeSet<SoundId>>,
}

impl SessionTriggerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self) -> MutexGuard<'_, BTreeSet<SoundId>> {
        // 集合本身不会处于中间状态, 锁中毒时继续使用
        self.triggered.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// 第一次提出时返回 true, 之后返回 false
    pub fn propose(&self, id: &SoundId) -> bool {
        self.set().insert(id.clone())
    }

    /// 允许该音效再次触发 (仅由显式 stop 调用)
    pub fn reset(&self, id: &SoundId) -> bool {
        self.set().remove(id)
    }

    pub fn reset_all(&self) {
        self.set().clear();
    }

    pub fn contains(&self, id: &SoundId) -> bool {
        self.set().contains(id)
    }

    /// 已触发音效快照 (字典序)
    pub fn triggered(&self) -> Vec<SoundId> {
        self.set().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.set().len()
    }

    pub fn is_empty(&self) -> bool {
        self.set().is_empty()
    }
}
