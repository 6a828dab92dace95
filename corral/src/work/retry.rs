use corral_api::{RetryBehavior, RetryOption, WorkStatus};

/// What to do after an attempt's callbacks have run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// The attempt's status is final.
    Finish,
    /// Re-invoke the callback on the same thread.
    Immediate,
    /// Put the item back in the queue as a waiting item.
    Requeue,
}

/// Only `Failed` attempts are retried. `stop_requested` covers both the
/// stop-retry flag on the result and a cooperative stop of the item.
pub(crate) fn decide(
    retry: Option<&RetryOption>,
    status: WorkStatus,
    retries_done: u32,
    stop_requested: bool,
) -> RetryDecision {
    let Some(retry) = retry else {
        return RetryDecision::Finish;
    };
    if status != WorkStatus::Failed || !retry.should_retry(retries_done, stop_requested) {
        return RetryDecision::Finish;
    }
    match retry.behavior {
        RetryBehavior::Immediate => RetryDecision::Immediate,
        RetryBehavior::Requeue => RetryDecision::Requeue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_retry_option_finishes() {
        assert_eq!(decide(None, WorkStatus::Failed, 0, false), RetryDecision::Finish);
    }

    #[test]
    fn test_only_failures_are_retried() {
        let retry = RetryOption::limited(3);
        assert_eq!(decide(Some(&retry), WorkStatus::Succeed, 0, false), RetryDecision::Finish);
        assert_eq!(decide(Some(&retry), WorkStatus::Stopped, 0, false), RetryDecision::Finish);
        assert_eq!(decide(Some(&retry), WorkStatus::Failed, 0, false), RetryDecision::Immediate);
    }

    #[test]
    fn test_limit_and_behavior() {
        let retry = RetryOption::limited(1).with_behavior(RetryBehavior::Requeue);
        assert_eq!(decide(Some(&retry), WorkStatus::Failed, 0, false), RetryDecision::Requeue);
        assert_eq!(decide(Some(&retry), WorkStatus::Failed, 1, false), RetryDecision::Finish);
    }

    #[test]
    fn test_unlimited_ends_on_stop_flag() {
        let retry = RetryOption::unlimited();
        assert_eq!(decide(Some(&retry), WorkStatus::Failed, 500, false), RetryDecision::Immediate);
        assert_eq!(decide(Some(&retry), WorkStatus::Failed, 500, true), RetryDecision::Finish);
    }
}
