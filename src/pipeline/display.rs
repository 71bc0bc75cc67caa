// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 操作员画面出口

use crossbeam_channel::{Sender, TrySendError};
use image::RgbaImage;

use crate::sound::SoundId;

/// 一次迭代的合成画面
#[derive(Clone, Debug)]
pub struct DisplayFrame {
    pub image: RgbaImage,
    pub iteration: u64,
    /// 本会话已触发的音效
    pub triggered: Vec<SoundId>,
}

pub trait FrameSink: Send + Sync {
    fn present(&self, frame: DisplayFrame);
}

/// 通道出口 (渲染线程消费); 渲染跟不上时丢弃新帧
pub struct ChannelSink {
    tx: Sender<DisplayFrame>,
}

impl ChannelSink {
    pub fn new(tx: Sender<DisplayFrame>) -> Self {
        Self { tx }
    }
}

impl FrameSink for ChannelSink {
    fn present(&self, frame: DisplayFrame) {
        match self.tx.try_send(frame) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                tracing::trace!("display receiver closed");
            }
        }
    }
}

/// 不显示 (无窗口运行)
pub struct NullSink;

impl FrameSink for NullSink {
    fn present(&self, _frame: DisplayFrame) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(i: u64) -> DisplayFrame {
        DisplayFrame {
            image: RgbaImage::new(2, 2),
            iteration: i,
            triggered: vec![],
        }
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let sink = ChannelSink::new(tx);
        sink.present(frame(1));
        sink.present(frame(2));
        assert_eq!(rx.try_iter().map(|f| f.iteration).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        ChannelSink::new(tx).present(frame(1));
    }
}
