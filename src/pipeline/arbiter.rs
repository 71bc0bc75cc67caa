// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 触发仲裁线程
//!
//! 各采集工作线程把候选音效发到同一个通道, 由单一线程依次
//! `propose → trigger`, 去重器是 "首次出现" 的唯一裁决者.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::sound::{SoundId, TriggerDispatcher};

/// 工作线程 → 仲裁线程
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerCandidate {
    /// 采集源在拓扑中的序号
    pub source: usize,
    pub frame_index: u64,
    pub class_label: String,
    pub sound: SoundId,
}

pub struct TriggerArbiter {
    tx: Option<Sender<TriggerCandidate>>,
    handle: Option<JoinHandle<usize>>,
}

impl TriggerArbiter {
    pub fn spawn(dispatcher: Arc<TriggerDispatcher>) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("trigger-arbiter".into())
            .spawn(move || arbitrate(rx, &dispatcher))?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> Option<Sender<TriggerCandidate>> {
        self.tx.clone()
    }

    /// 关闭通道, 处理完剩余候选后返回本次发出的触发数
    pub fn finish(mut self) -> usize {
        self.shutdown()
    }

    fn shutdown(&mut self) -> usize {
        self.tx.take();
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(n)) => n,
            Some(Err(_)) => {
                warn!("❌ 触发仲裁线程异常退出");
                0
            }
            None => 0,
        }
    }
}

impl Drop for TriggerArbiter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn arbitrate(rx: Receiver<TriggerCandidate>, dispatcher: &TriggerDispatcher) -> usize {
    let tracker = dispatcher.tracker();
    let mut dispatched = 0;
    for candidate in rx {
        if !tracker.propose(&candidate.sound) {
            continue;
        }
        debug!(
            "🔍 源#{} 帧#{} 首次发现 {} → {}",
            candidate.source, candidate.frame_index, candidate.class_label, candidate.sound
        );
        if dispatcher.trigger(&candidate.sound) {
            dispatched += 1;
        }
    }
    info!("✅ 触发仲裁结束, 共触发 {} 个音效", dispatched);
    dispatched
}
