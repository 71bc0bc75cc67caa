// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 回退策略: 启动时根据实际能打开的采集源决定单路 / 双路 / 放弃

use std::fmt;

use tracing::{info, warn};

use crate::error::SessionError;
use crate::input::{CaptureSource, SourceHandle, SourceOpener};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineTopology {
    Single(SourceHandle),
    Dual(SourceHandle, SourceHandle),
}

impl PipelineTopology {
    /// 一个句柄 → 单路, 两个 → 双路; 其余为 None
    pub fn from_handles(handles: &[SourceHandle]) -> Option<Self> {
        match handles {
            [a] => Some(Self::Single(a.clone())),
            [a, b] => Some(Self::Dual(a.clone(), b.clone())),
            _ => None,
        }
    }

    pub fn handles(&self) -> Vec<&SourceHandle> {
        match self {
            Self::Single(a) => vec![a],
            Self::Dual(a, b) => vec![a, b],
        }
    }

    pub fn is_dual(&self) -> bool {
        matches!(self, Self::Dual(..))
    }
}

impl fmt::Display for PipelineTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(a) => write!(f, "single({})", a),
            Self::Dual(a, b) => write!(f, "dual({}, {})", a, b),
        }
    }
}

/// 已打开的拓扑, 源的顺序与拓扑中的句柄顺序一致
pub struct OpenedTopology {
    pub topology: PipelineTopology,
    pub sources: Vec<Box<dyn CaptureSource>>,
}

/// 打开请求的采集源; 双路只剩一路时降级为单路, 全部失败时报错
pub fn select_topology(
    requested: &PipelineTopology,
    opener: &dyn SourceOpener,
) -> Result<OpenedTopology, SessionError> {
    let mut opened = Vec::new();
    for handle in requested.handles() {
        match opener.open(handle) {
            Ok(source) => opened.push(source),
            Err(e) => warn!("⚠️ {}", e),
        }
    }

    let topology = match opened.as_slice() {
        [] => {
            return Err(SessionError::NoSourceAvailable {
                requested: requested.to_string(),
            })
        }
        [only] => {
            let t = PipelineTopology::Single(only.handle().clone());
            if requested.is_dual() {
                warn!("⚠️ 双路采集降级为单路: {}", t);
            }
            t
        }
        [a, b, ..] => PipelineTopology::Dual(a.handle().clone(), b.handle().clone()),
    };

    info!("✅ 采集拓扑: {}", topology);
    Ok(OpenedTopology {
        topology,
        sources: opened,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Frame;
    use crate::error::SourceError;
    use crate::input::SourceState;
    use crate::pipeline::StopSignal;
    use std::sync::Mutex;

    struct Dummy(SourceHandle);

    impl CaptureSource for Dummy {
        fn handle(&self) -> &SourceHandle {
            &self.0
        }
        fn state(&self) -> SourceState {
            SourceState::Open
        }
        fn next_frame(&mut self, _stop: &StopSignal) -> Option<Frame> {
            None
        }
        fn release(&mut self) {}
    }

    struct Opener {
        available: Vec<usize>,
        attempts: Mutex<Vec<SourceHandle>>,
    }

    impl SourceOpener for Opener {
        fn open(&self, handle: &SourceHandle) -> Result<Box<dyn CaptureSource>, SourceError> {
            self.attempts.lock().unwrap().push(handle.clone());
            match handle {
                SourceHandle::Camera(i) if self.available.contains(i) => {
                    Ok(Box::new(Dummy(handle.clone())))
                }
                _ => Err(SourceError::Unavailable {
                    handle: handle.clone(),
                    reason: "not connected".into(),
                }),
            }
        }
    }

    fn opener(available: &[usize]) -> Opener {
        Opener {
            available: available.to_vec(),
            attempts: Mutex::new(vec![]),
        }
    }

    fn dual() -> PipelineTopology {
        PipelineTopology::Dual(SourceHandle::Camera(0), SourceHandle::Camera(1))
    }

    #[test]
    fn test_dual_when_both_open() {
        let o = select_topology(&dual(), &opener(&[0, 1])).unwrap();
        assert_eq!(o.topology, dual());
        assert_eq!(o.sources.len(), 2);
    }

    #[test]
    fn test_downgrade_to_surviving_source() {
        let o = select_topology(&dual(), &opener(&[0])).unwrap();
        assert_eq!(o.topology, PipelineTopology::Single(SourceHandle::Camera(0)));
        assert_eq!(o.sources.len(), 1);

        let o = select_topology(&dual(), &opener(&[1])).unwrap();
        assert_eq!(o.topology, PipelineTopology::Single(SourceHandle::Camera(1)));
    }

    #[test]
    fn test_no_source_is_error() {
        let op = opener(&[]);
        match select_topology(&dual(), &op) {
            Err(SessionError::NoSourceAvailable { requested }) => {
                assert!(requested.contains("camera#0"));
            }
            _ => panic!("expected NoSourceAvailable"),
        }
        assert_eq!(op.attempts.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_from_handles() {
        assert_eq!(PipelineTopology::from_handles(&[]), None);
        assert!(PipelineTopology::from_handles(&[SourceHandle::Camera(3)])
            .is_some_and(|t| !t.is_dual()));
    }
}
