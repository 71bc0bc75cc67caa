// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// 流水线状态机
///
/// `Idle → Running → Stopping → Stopped`, 或拓扑无法建立时 `Idle → Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Stopped | PipelineState::Failed)
    }

    /// 合法迁移
    pub fn can_transition(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Running) | (Idle, Failed) | (Running, Stopping) | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
            PipelineState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 停止信号 (操作员退出 / 流结束)
///
/// 触发后所有 `wait_timeout` 立即返回; 发送端被丢弃时接收端得到 Disconnected.
#[derive(Clone)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    tx: Arc<Mutex<Option<Sender<()>>>>,
    rx: Receiver<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(Mutex::new(Some(tx))),
            rx,
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
        let mut tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        tx.take();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 最多等待 `timeout`, 返回是否已触发
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            _ => self.is_triggered(),
        }
    }

    /// 供 `select!` 使用, 触发后可读 (Disconnected)
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_transitions() {
        use PipelineState::*;
        assert!(Idle.can_transition(Running));
        assert!(Idle.can_transition(Failed));
        assert!(Stopping.can_transition(Stopped));
        assert!(!Failed.can_transition(Running));
        assert!(!Running.can_transition(Stopped));
        assert!(Stopped.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn test_wait_times_out_when_idle() {
        let stop = StopSignal::new();
        assert!(!stop.wait_timeout(Duration::from_millis(10)));
        assert!(!stop.is_triggered());
    }

    #[test]
    fn test_trigger_wakes_waiter() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        let t0 = Instant::now();
        let h = std::thread::spawn(move || remote.wait_timeout(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        stop.trigger();
        assert!(h.join().unwrap());
        assert!(t0.elapsed() < Duration::from_secs(2));
        // 重复触发无副作用
        stop.trigger();
        assert!(stop.wait_timeout(Duration::from_millis(1)));
    }
}
