use crate::error::NodeError;
use crate::utils::error::compact_error_message;
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};

const RPC_ERR_MAX_LEN: usize = 260;
const RPC_CALL_TIMEOUT_MS: u64 = 5_000;

pub fn bounded_exponential_backoff_ms(base_ms: u64, streak: u32, cap_ms: u64) -> u64 {
    if base_ms == 0 {
        return 0;
    }
    let clamped = streak.min(8);
    base_ms
        .saturating_mul(1u64 << clamped)
        .min(cap_ms.max(base_ms))
}

fn retry_backoff_ms(attempt: usize) -> u64 {
    bounded_exponential_backoff_ms(100, attempt as u32, 1_800)
}

/// Reverts and malformed requests are deterministic; repeating them cannot help.
pub fn is_retryable_rpc_error(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    let non_retryable = [
        "method not found",
        "-32601",
        "invalid params",
        "-32602",
        "execution reverted",
        "revert",
        "parse error",
        "-32700",
        "insufficient funds",
        "nonce too low",
        "timestamp",
    ];
    !non_retryable.iter().any(|needle| msg.contains(needle))
}

pub fn compact_rpc_error_message(message: &str) -> String {
    compact_error_message(message, RPC_ERR_MAX_LEN)
}

/// Classify a transport-level error string into the node error taxonomy.
pub fn classify_rpc_error(message: &str) -> NodeError {
    let compact = compact_rpc_error_message(message);
    if let Some(reason) = crate::utils::error::extract_revert_reason(&compact) {
        return NodeError::Reverted { reason };
    }
    if is_retryable_rpc_error(&compact) {
        NodeError::Transport(compact)
    } else {
        NodeError::Rejected(compact)
    }
}

/// Runs an idempotent read with bounded retries on transport failures.
///
/// Each attempt is capped at five seconds. State-changing requests never go through here:
/// a resubmitted exploit transaction is not the same experiment.
pub async fn run_with_retry<T, Op, Fut>(
    retries: usize,
    context: &str,
    mut op: Op,
) -> Result<T, NodeError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NodeError>>,
{
    let max_attempts = retries.max(1);
    let mut last = NodeError::Transport(format!("{context}: no attempt made"));

    for attempt in 1..=max_attempts {
        match timeout(Duration::from_millis(RPC_CALL_TIMEOUT_MS), op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(NodeError::Transport(message))) => {
                tracing::warn!(
                    "[RPC] {} failed on attempt {}/{}: {}",
                    context,
                    attempt,
                    max_attempts,
                    message
                );
                last = NodeError::Transport(message);
            }
            Ok(Err(other)) => return Err(other),
            Err(_) => {
                tracing::warn!(
                    "[RPC] {} timed out on attempt {}/{}",
                    context,
                    attempt,
                    max_attempts
                );
                last = NodeError::Timeout {
                    waited_ms: RPC_CALL_TIMEOUT_MS,
                    context: context.to_string(),
                };
            }
        }
        if attempt < max_attempts {
            sleep(Duration::from_millis(retry_backoff_ms(attempt))).await;
        }
    }

    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_retry_classifier_non_retryable_patterns() {
        assert!(!is_retryable_rpc_error("execution reverted: nope"));
        assert!(!is_retryable_rpc_error("Method not found (-32601)"));
        assert!(!is_retryable_rpc_error(
            "Timestamp 10 is lower than or equal to previous block's timestamp 12"
        ));
        assert!(is_retryable_rpc_error("error sending request: connection reset"));
    }

    #[test]
    fn test_retry_backoff_is_bounded() {
        assert_eq!(bounded_exponential_backoff_ms(100, 0, 1_800), 100);
        assert_eq!(bounded_exponential_backoff_ms(100, 3, 1_800), 800);
        assert_eq!(bounded_exponential_backoff_ms(100, 30, 1_800), 1_800);
        assert_eq!(bounded_exponential_backoff_ms(0, 5, 1_800), 0);
    }

    #[test]
    fn test_classify_rpc_error_splits_reverts_from_transport() {
        assert_eq!(
            classify_rpc_error("execution reverted: not owner"),
            NodeError::Reverted {
                reason: "not owner".to_string()
            }
        );
        assert!(matches!(
            classify_rpc_error("connection refused"),
            NodeError::Transport(_)
        ));
        assert!(matches!(
            classify_rpc_error("insufficient funds for gas * price + value"),
            NodeError::Rejected(_)
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_run_with_retry_recovers_from_transport_error() {
        let calls = AtomicUsize::new(0);
        let value = run_with_retry(3, "eth_getBalance", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(NodeError::Transport("connection reset".to_string()))
                } else {
                    Ok(7u64)
                }
            }
        })
        .await
        .expect("second attempt succeeds");
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_run_with_retry_does_not_repeat_reverts() {
        let calls = AtomicUsize::new(0);
        let err = run_with_retry(3, "eth_call", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(NodeError::Reverted {
                    reason: "nope".to_string(),
                })
            }
        })
        .await
        .expect_err("revert is terminal");
        assert!(matches!(err, NodeError::Reverted { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
