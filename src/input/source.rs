// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 采集源抽象 (Capture Source)
//!
//! 生命周期: Closed → Open → (Closed | Failed). 打开失败是启动时的正常情况,
//! 由回退策略处理; `release` 幂等, 所有退出路径都必须调用.

use std::fmt;
use std::path::PathBuf;

use crate::detection::Frame;
use crate::error::SourceError;
use crate::pipeline::StopSignal;

/// 采集源标识: 摄像头索引或视频文件
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceHandle {
    Camera(usize),
    File(PathBuf),
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceHandle::Camera(index) => write!(f, "camera#{}", index),
            SourceHandle::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Closed,
    Open,
    Failed,
}

/// 已打开的采集源, 由打开它的流水线独占
pub trait CaptureSource: Send {
    fn handle(&self) -> &SourceHandle;

    fn state(&self) -> SourceState;

    /// 取下一帧; `None` 表示流结束 (文件结束/设备断开) 或已请求停止.
    /// 实现必须周期性检查 `stop`, 不得无限期阻塞.
    fn next_frame(&mut self, stop: &StopSignal) -> Option<Frame>;

    /// 释放底层设备, 可重复调用
    fn release(&mut self);
}

/// 采集源工厂
pub trait SourceOpener: Send + Sync {
    fn open(&self, handle: &SourceHandle) -> Result<Box<dyn CaptureSource>, SourceError>;
}
