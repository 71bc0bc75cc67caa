/// 检测流水线 (Detection Pipeline)
///
/// 多线程架构,通过 crossbeam 通道通信:
/// - Worker:      每个采集源一个线程 (取帧 + 检测)
/// - Arbiter:     触发仲裁 (去重 + 发送)
/// - Coordinator: 逐迭代同步、画面合成、送显
pub mod arbiter;
pub mod compose;
pub mod display;
pub mod runner;
pub mod state;
pub mod topology;

pub use arbiter::{TriggerArbiter, TriggerCandidate};
pub use compose::{compose, compose_vertical};
pub use display::{ChannelSink, DisplayFrame, FrameSink, NullSink};
pub use runner::{MultiSourcePipeline, PipelineReport};
pub use state::{PipelineState, StopSignal};
pub use topology::{select_topology, OpenedTopology, PipelineTopology};
