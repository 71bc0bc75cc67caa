// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 多路采集流水线 (Multi-Source Pipeline)
//!
//! 线程模型:
//! - 每个采集源一个工作线程: 取帧 → 检测 → 候选音效, 连同画面交给协调线程
//! - 协调线程 (调用 `run` 的线程): 每次迭代给所有工作线程发一个节拍, 收齐结果后
//!   把候选转给仲裁线程并合成画面; 双路时两帧属于同一次迭代, 缺一帧则整次迭代作废
//! - 仲裁线程: 去重 + 触发
//!
//! 任一源流结束或收到停止信号 → Stopping, 所有源在各自工作线程退出时释放.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{select, Receiver, Sender};
use image::RgbaImage;
use tracing::{debug, error, info, warn};

use super::arbiter::{TriggerArbiter, TriggerCandidate};
use super::compose::compose;
use super::display::{DisplayFrame, FrameSink};
use super::state::{PipelineState, StopSignal};
use super::topology::{select_topology, PipelineTopology};
use crate::detection::{DetectorFactory, FrameDetector, Overlay};
use crate::error::SessionError;
use crate::input::{CaptureSource, SourceOpener};
use crate::sound::{mapping, SoundId, TriggerDispatcher};

/// 一次运行的结果
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub topology: PipelineTopology,
    pub iterations: u64,
    pub state: PipelineState,
    /// 本次运行中由检测触发的音效数
    pub dispatched: usize,
    /// 结束时已发给音频引擎的音效 (含调色板)
    pub triggered: Vec<SoundId>,
}

/// 工作线程 → 协调线程
enum WorkerMsg {
    Frame {
        source: usize,
        image: RgbaImage,
        candidates: Vec<TriggerCandidate>,
    },
    Ended {
        source: usize,
    },
    /// 工作线程 panic
    Failed {
        source: usize,
    },
}

enum Gather {
    /// 按源序号排列, 每路一帧
    Frames(Vec<(RgbaImage, Vec<TriggerCandidate>)>),
    Ended,
    Cancelled,
}

/// 持有采集源, 任何退出路径 (包括 panic 展开) 都会释放
struct SourceGuard(Box<dyn CaptureSource>);

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// 工作线程 panic 时通知协调线程, 另一路不必等到操作员退出
struct FailureNotice {
    source: usize,
    results: Sender<WorkerMsg>,
}

impl Drop for FailureNotice {
    fn drop(&mut self) {
        if thread::panicking() {
            let _ = self.results.send(WorkerMsg::Failed {
                source: self.source,
            });
        }
    }
}

pub struct MultiSourcePipeline {
    opener: Arc<dyn SourceOpener>,
    detectors: Arc<dyn DetectorFactory>,
    dispatcher: Arc<TriggerDispatcher>,
    overlay: Arc<Overlay>,
    display: Arc<dyn FrameSink>,
    stop: StopSignal,
    state: Mutex<PipelineState>,
}

impl MultiSourcePipeline {
    pub fn new(
        opener: Arc<dyn SourceOpener>,
        detectors: Arc<dyn DetectorFactory>,
        dispatcher: Arc<TriggerDispatcher>,
        overlay: Arc<Overlay>,
        display: Arc<dyn FrameSink>,
        stop: StopSignal,
    ) -> Self {
        Self {
            opener,
            detectors,
            dispatcher,
            overlay,
            display,
            stop,
            state: Mutex::new(PipelineState::Idle),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    fn set_state(&self, next: PipelineState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.can_transition(next) {
            warn!("⚠️ 非法状态迁移 {} → {}", *state, next);
        }
        info!("🔄 流水线状态: {} → {}", *state, next);
        *state = next;
    }

    fn fail(&self, e: SessionError) -> SessionError {
        error!("❌ 流水线启动失败: {}", e);
        self.set_state(PipelineState::Failed);
        e
    }

    /// 按请求的拓扑运行, 直到停止信号或流结束
    pub fn run(&self, requested: &PipelineTopology) -> Result<PipelineReport, SessionError> {
        if self.state() != PipelineState::Idle {
            return Err(SessionError::Config(format!(
                "pipeline already used (state {})",
                self.state()
            )));
        }

        let opened = select_topology(requested, self.opener.as_ref()).map_err(|e| self.fail(e))?;
        let topology = opened.topology;
        let sources: Vec<SourceGuard> = opened.sources.into_iter().map(SourceGuard).collect();

        // 检测器必须在进入运行态之前全部可用
        let mut detectors = Vec::with_capacity(sources.len());
        for _ in 0..sources.len() {
            let model = self
                .detectors
                .create()
                .map_err(|e| self.fail(SessionError::Inference(e)))?;
            detectors.push(FrameDetector::new(model, Arc::clone(&self.overlay)));
        }

        let arbiter = TriggerArbiter::spawn(Arc::clone(&self.dispatcher))
            .map_err(|e| self.fail(SessionError::Io(e)))?;
        let Some(candidates) = arbiter.sender() else {
            return Err(self.fail(SessionError::Config("arbiter closed".into())));
        };

        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let mut ticks = Vec::with_capacity(sources.len());
        let mut workers = Vec::with_capacity(sources.len());
        for (index, (source, detector)) in sources.into_iter().zip(detectors).enumerate() {
            let (tick_tx, tick_rx) = crossbeam_channel::bounded(1);
            let worker = Worker {
                index,
                source,
                detector,
                ticks: tick_rx,
                results: result_tx.clone(),
                stop: self.stop.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("capture-{}", index))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => {
                    ticks.push(tick_tx);
                    workers.push(handle);
                }
                Err(e) => {
                    self.stop.trigger();
                    drop(ticks);
                    join_workers(workers);
                    return Err(self.fail(SessionError::Io(e)));
                }
            }
        }
        drop(result_tx);

        self.set_state(PipelineState::Running);
        info!("🚀 流水线运行中: {}", topology);

        let iterations = self.coordinate(&ticks, &result_rx, &candidates);

        self.set_state(PipelineState::Stopping);
        self.stop.trigger();
        drop(ticks);
        join_workers(workers);
        drop(candidates);
        let dispatched = arbiter.finish();
        self.set_state(PipelineState::Stopped);

        let triggered = self.dispatcher.active();
        info!(
            "✅ 流水线结束: {} 次迭代, 本会话音效: [{}]",
            iterations,
            triggered.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        );

        Ok(PipelineReport {
            topology,
            iterations,
            state: PipelineState::Stopped,
            dispatched,
            triggered,
        })
    }

    /// 协调循环, 返回完成的迭代数
    fn coordinate(
        &self,
        ticks: &[Sender<()>],
        results: &Receiver<WorkerMsg>,
        arbiter: &Sender<TriggerCandidate>,
    ) -> u64 {
        let mut iterations = 0u64;
        let started = Instant::now();
        loop {
            if self.stop.is_triggered() {
                info!("🛑 收到停止信号");
                break;
            }
            if ticks.iter().any(|t| t.send(()).is_err()) {
                warn!("⚠️ 采集工作线程已退出");
                break;
            }
            match self.gather(results, ticks.len()) {
                Gather::Frames(results) => {
                    let mut frames = Vec::with_capacity(results.len());
                    for (image, candidates) in results {
                        for candidate in candidates {
                            if arbiter.send(candidate).is_err() {
                                warn!("⚠️ 触发仲裁通道已关闭");
                            }
                        }
                        frames.push(image);
                    }
                    let Some(image) = compose(frames) else {
                        break;
                    };
                    iterations += 1;
                    self.display.present(DisplayFrame {
                        image,
                        iteration: iterations,
                        triggered: self.dispatcher.active(),
                    });
                    if iterations % 300 == 0 {
                        debug!(
                            "📺 迭代 {} | {:.1} it/s",
                            iterations,
                            iterations as f64 / started.elapsed().as_secs_f64()
                        );
                    }
                }
                Gather::Ended => {
                    info!("📹 采集源流结束, 停止流水线");
                    break;
                }
                Gather::Cancelled => {
                    info!("🛑 迭代中收到停止信号");
                    break;
                }
            }
        }
        iterations
    }

    /// 收齐一次迭代中每个工作线程的结果; 任一路没有帧则整次迭代视为流结束
    fn gather(&self, results: &Receiver<WorkerMsg>, expected: usize) -> Gather {
        enum Incoming {
            Msg(Option<WorkerMsg>),
            Stop,
        }

        let mut slots: Vec<Option<(RgbaImage, Vec<TriggerCandidate>)>> =
            (0..expected).map(|_| None).collect();
        let mut pending = expected;
        let mut ended = false;
        while pending > 0 {
            let incoming = select! {
                recv(results) -> msg => Incoming::Msg(msg.ok()),
                recv(self.stop.receiver()) -> _ => Incoming::Stop,
            };
            match incoming {
                Incoming::Msg(Some(WorkerMsg::Frame {
                    source,
                    image,
                    candidates,
                })) => {
                    if let Some(slot) = slots.get_mut(source) {
                        *slot = Some((image, candidates));
                    }
                    pending -= 1;
                }
                Incoming::Msg(Some(WorkerMsg::Ended { source })) => {
                    debug!("📹 源#{} 无更多帧", source);
                    ended = true;
                    pending -= 1;
                    // 另一路不必再等待设备
                    self.stop.trigger();
                }
                Incoming::Msg(Some(WorkerMsg::Failed { source })) => {
                    error!("❌ 源#{} 工作线程异常退出", source);
                    ended = true;
                    pending -= 1;
                    self.stop.trigger();
                }
                Incoming::Msg(None) => return Gather::Ended,
                Incoming::Stop => {
                    return if ended {
                        Gather::Ended
                    } else {
                        Gather::Cancelled
                    }
                }
            }
        }
        if ended {
            return Gather::Ended;
        }
        Gather::Frames(slots.into_iter().flatten().collect())
    }
}

fn join_workers(workers: Vec<JoinHandle<u64>>) {
    for handle in workers {
        if handle.join().is_err() {
            error!("❌ 采集工作线程异常退出");
        }
    }
}

struct Worker {
    index: usize,
    source: SourceGuard,
    detector: FrameDetector,
    ticks: Receiver<()>,
    results: Sender<WorkerMsg>,
    stop: StopSignal,
}

impl Worker {
    /// 每个节拍处理一帧, 同一源内严格按到达顺序; 返回处理的帧数
    fn run(mut self) -> u64 {
        let handle = self.source.0.handle().clone();
        let _notice = FailureNotice {
            source: self.index,
            results: self.results.clone(),
        };
        info!("✅ [{}] 采集工作线程启动", handle);
        while self.ticks.recv().is_ok() {
            let Some(frame) = self.source.0.next_frame(&self.stop) else {
                let _ = self.results.send(WorkerMsg::Ended { source: self.index });
                break;
            };
            let frame_index = frame.index;
            let (annotated, detections) = self.detector.detect(frame);

            // 候选由协调线程在整次迭代收齐后才转给仲裁线程
            let candidates = detections
                .iter()
                .filter_map(|det| {
                    mapping::lookup(&det.class_label).map(|sound| TriggerCandidate {
                        source: self.index,
                        frame_index,
                        class_label: det.class_label.clone(),
                        sound,
                    })
                })
                .collect();

            let msg = WorkerMsg::Frame {
                source: self.index,
                image: annotated,
                candidates,
            };
            if self.results.send(msg).is_err() {
                break;
            }
        }
        let frames = self.detector.frames();
        drop(self.source);
        info!("✅ [{}] 采集工作线程退出, 共处理 {} 帧", handle, frames);
        frames
    }
}
