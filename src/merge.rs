//! 서버측 병합 요청
//!
//! 마지막 청크가 수락된 뒤 태스크당 한 번만 호출된다. 병합은 재시도하지 않는다.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::transport::Transport;
use crate::{Error, Result};

/// 병합 코디네이터
pub struct MergeCoordinator {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl MergeCoordinator {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// 병합 요청, 실패는 모두 `Error::Merge`로
    pub async fn merge(&self, file_id: &str) -> Result<()> {
        let result = match tokio::time::timeout(self.timeout, self.transport.merge(file_id)).await {
            Ok(r) => r,
            Err(_) => Err(Error::Timeout {
                operation: "merge",
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(()) => {
                info!("Merge complete: {}", file_id);
                Ok(())
            }
            Err(Error::Merge { message }) => Err(Error::Merge { message }),
            Err(e) => {
                warn!("병합 실패 {}: {}", file_id, e);
                let message = match &e {
                    Error::Transport { message, .. } => message.clone(),
                    _ => None,
                };
                Err(Error::Merge { message })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::SimulatedTransport;

    #[tokio::test]
    async fn test_merge_success() {
        let sim = Arc::new(SimulatedTransport::new());
        let merge = MergeCoordinator::new(sim.clone(), Duration::from_secs(1));
        merge.merge("a").await.unwrap();
        assert_eq!(sim.merge_calls(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_merge_failure_keeps_server_message() {
        let sim = Arc::new(SimulatedTransport::new());
        sim.fail_merge("a", Some("missing a.part2"));
        let merge = MergeCoordinator::new(sim.clone(), Duration::from_secs(1));

        let err = merge.merge("a").await.unwrap_err();
        assert!(matches!(err, Error::Merge { .. }));
        assert_eq!(err.server_message(), "missing a.part2");
        // 자동 재시도 없음
        assert_eq!(sim.merge_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_timeout() {
        let sim = Arc::new(SimulatedTransport::new().with_latency(Duration::from_secs(5)));
        let merge = MergeCoordinator::new(sim, Duration::from_secs(1));
        let err = merge.merge("a").await.unwrap_err();
        assert_eq!(err.server_message(), crate::error::UNKNOWN_ERROR);
    }
}
