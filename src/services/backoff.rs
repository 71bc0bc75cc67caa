// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 有界轮询: 指数退避 + 总超时 + 可取消

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::UpstreamError;
use crate::pipeline::StopSignal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: f64,
    pub max: Duration,
    pub timeout: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            factor: 1.5,
            max: Duration::from_secs(30),
            timeout: Duration::from_secs(600),
        }
    }
}

impl Backoff {
    /// 第 n 次等待的时长 (从 0 开始)
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = self.initial.as_secs_f64() * self.factor.max(1.0).powi(attempt as i32);
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }

    /// 反复调用 `check` 直到返回 `Some`, 超时或取消则返回错误.
    /// `check` 自身的错误直接向上传递.
    pub fn poll<T, F>(&self, stop: &StopSignal, mut check: F) -> Result<T, UpstreamError>
    where
        F: FnMut(u32) -> Result<Option<T>, UpstreamError>,
    {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            if stop.is_triggered() {
                return Err(UpstreamError::Cancelled);
            }
            if let Some(value) = check(attempt)? {
                return Ok(value);
            }
            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                return Err(UpstreamError::Timeout(self.timeout));
            }
            let wait = self.delay(attempt).min(self.timeout - elapsed);
            debug!("⏳ 第{}次轮询未完成, {:?} 后重试", attempt + 1, wait);
            if stop.wait_timeout(wait) {
                return Err(UpstreamError::Cancelled);
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Backoff {
        Backoff {
            initial: Duration::from_millis(1),
            factor: 2.0,
            max: Duration::from_millis(4),
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let b = Backoff::default();
        assert_eq!(b.delay(0), Duration::from_secs(5));
        assert_eq!(b.delay(1), Duration::from_secs_f64(7.5));
        assert_eq!(b.delay(10), Duration::from_secs(30));
    }

    #[test]
    fn test_poll_until_done() {
        let stop = StopSignal::new();
        let result = fast().poll(&stop, |attempt| Ok((attempt == 3).then_some(attempt)));
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_poll_times_out() {
        let stop = StopSignal::new();
        let result: Result<(), _> = fast().poll(&stop, |_| Ok(None));
        assert!(matches!(result, Err(UpstreamError::Timeout(_))));
    }

    #[test]
    fn test_poll_cancelled() {
        let stop = StopSignal::new();
        stop.trigger();
        let result: Result<(), _> = fast().poll(&stop, |_| Ok(None));
        assert!(matches!(result, Err(UpstreamError::Cancelled)));
    }

    #[test]
    fn test_poll_propagates_errors() {
        let stop = StopSignal::new();
        let result: Result<(), _> =
            fast().poll(&stop, |_| Err(UpstreamError::Decode("bad".into())));
        assert!(matches!(result, Err(UpstreamError::Decode(_))));
    }
}
