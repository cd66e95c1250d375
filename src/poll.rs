//! Status-polling state machine.
//!
//! ```text
//! Submitted ─▶ {Pending, WaitingFile} ─▶ Running ─▶ Converting ─▶ {Done, Failed}
//! ```
//!
//! One loop serves both the single-task and the batch protocol; the caller
//! supplies the status query as a closure. Each iteration:
//!
//! 1. checks the cancellation token,
//! 2. issues exactly one status query (raced against cancellation),
//! 3. returns on `done`, raises [`ParseError::TaskFailed`] on `failed`,
//! 4. otherwise reports progress and sleeps `interval` (raced against
//!    cancellation) unless the attempt budget is spent.
//!
//! A query error ends the loop immediately; the only repetition is the poll
//! itself. Unknown states keep the loop going, optionally bounded by
//! `max_consecutive_unknown`. An empty batch result neither extends nor
//! breaks an unknown streak.

use crate::config::ClientConfig;
use crate::error::ParseError;
use crate::progress::ParseProgressCallback;
use crate::task::{ParseTask, TaskState};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Loop bounds, taken from [`ClientConfig`].
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
    pub max_consecutive_unknown: Option<u32>,
}

impl From<&ClientConfig> for PollSettings {
    fn from(c: &ClientConfig) -> Self {
        Self {
            interval: c.poll_interval(),
            max_attempts: c.max_poll_attempts,
            max_consecutive_unknown: c.max_consecutive_unknown,
        }
    }
}

/// Poll `fetch` until the task is terminal, the budget is spent, or `cancel`
/// fires.
///
/// `fetch` returns `Ok(None)` when the service has no status for the job yet
/// (an empty batch result); that counts as a non-terminal poll.
pub async fn poll_until_terminal<F, Fut>(
    id: &str,
    settings: PollSettings,
    progress: Option<&dyn ParseProgressCallback>,
    cancel: &CancellationToken,
    mut fetch: F,
) -> Result<ParseTask, ParseError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<ParseTask>, ParseError>>,
{
    let cancelled = || ParseError::Cancelled { id: id.to_string() };
    let mut last_pages: Option<u32> = None;
    let mut unknown_streak: u32 = 0;

    for attempt in 1..=settings.max_attempts {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            result = fetch() => result?,
        };

        match snapshot {
            None => {
                debug!(
                    "Poll {}/{} for {}: no status yet",
                    attempt, settings.max_attempts, id
                );
            }
            Some(task) => match task.state {
                TaskState::Done => {
                    info!("Parse of {} finished after {} polls", id, attempt);
                    if let Some(cb) = progress {
                        cb.on_finished(&task);
                    }
                    return Ok(task);
                }
                TaskState::Failed => {
                    let message = task
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "parse failed".to_string());
                    warn!("Parse of {} failed: {}", id, message);
                    return Err(ParseError::TaskFailed {
                        id: id.to_string(),
                        message,
                    });
                }
                _ => {
                    let state = &task.state;
                    log_state(id, attempt, settings.max_attempts, &task);

                    if state.is_unknown() {
                        unknown_streak += 1;
                        if let Some(limit) = settings.max_consecutive_unknown {
                            if unknown_streak >= limit {
                                return Err(ParseError::UnrecognizedState {
                                    id: id.to_string(),
                                    state: state.as_str().to_string(),
                                    consecutive: unknown_streak,
                                });
                            }
                        }
                    } else {
                        unknown_streak = 0;
                    }

                    if let Some(cb) = progress {
                        cb.on_poll(attempt, settings.max_attempts, state);
                        report_progress(cb, &task, &mut last_pages);
                    }
                }
            },
        }

        if attempt < settings.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(settings.interval) => {}
            }
        }
    }

    warn!(
        "Parse of {} timed out after {} polls",
        id, settings.max_attempts
    );
    Err(ParseError::Timeout {
        id: id.to_string(),
        attempts: settings.max_attempts,
    })
}

/// Deliver page progress for a `running` snapshot, dropping regressions so
/// the callback sees a non-decreasing page count.
fn report_progress(
    cb: &dyn ParseProgressCallback,
    task: &ParseTask,
    last_pages: &mut Option<u32>,
) {
    if task.state != TaskState::Running {
        return;
    }
    let Some(p) = task.progress.as_ref() else {
        return;
    };
    if let Some(prev) = *last_pages {
        if p.extracted_pages < prev {
            debug!(
                "Ignoring progress regression for {}: {} < {}",
                task.task_id, p.extracted_pages, prev
            );
            return;
        }
    }
    *last_pages = Some(p.extracted_pages);
    cb.on_progress(p);
}

fn log_state(id: &str, attempt: u32, max: u32, task: &ParseTask) {
    match (&task.state, &task.progress) {
        (TaskState::WaitingFile, _) => debug!("Poll {}/{} for {}: waiting for file", attempt, max, id),
        (TaskState::Pending, _) => debug!("Poll {}/{} for {}: queued", attempt, max, id),
        (TaskState::Running, Some(p)) => debug!(
            "Poll {}/{} for {}: parsing {}/{} pages",
            attempt, max, id, p.extracted_pages, p.total_pages
        ),
        (TaskState::Running, None) => debug!("Poll {}/{} for {}: parsing", attempt, max, id),
        (TaskState::Converting, _) => debug!("Poll {}/{} for {}: converting output", attempt, max, id),
        (other, _) => warn!(
            "Poll {}/{} for {}: unrecognised state '{}'",
            attempt, max, id, other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ExtractProgress;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn settings(max_attempts: u32) -> PollSettings {
        PollSettings {
            interval: Duration::ZERO,
            max_attempts,
            max_consecutive_unknown: None,
        }
    }

    fn task(state: &str) -> ParseTask {
        ParseTask::new("t", TaskState::from(state), None, None, None)
    }

    fn running(pages: u32, total: u32) -> ParseTask {
        ParseTask::new(
            "t",
            TaskState::Running,
            Some(ExtractProgress {
                extracted_pages: pages,
                total_pages: total,
                start_time: String::new(),
            }),
            None,
            None,
        )
    }

    /// Replays `script` one snapshot per call, repeating the last entry.
    fn scripted(
        script: Vec<Option<ParseTask>>,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<Option<ParseTask>, ParseError>> {
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let mut s = script.lock().unwrap();
            let next = if s.len() > 1 {
                s.pop_front().unwrap()
            } else {
                s.front().cloned().unwrap()
            };
            std::future::ready(Ok(next))
        }
    }

    #[derive(Default)]
    struct Pages(Mutex<Vec<u32>>);

    impl ParseProgressCallback for Pages {
        fn on_progress(&self, p: &ExtractProgress) {
            self.0.lock().unwrap().push(p.extracted_pages);
        }
    }

    #[tokio::test]
    async fn stops_at_done() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetch = scripted(
            vec![Some(task("pending")), Some(task("running")), Some(task("done"))],
            calls.clone(),
        );
        let result = poll_until_terminal("t", settings(10), None, &CancellationToken::new(), fetch)
            .await
            .unwrap();
        assert!(result.is_done());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_state_carries_service_message() {
        let calls = Arc::new(AtomicU32::new(0));
        let failed = ParseTask::new("t", TaskState::Failed, None, None, Some("bad pdf".into()));
        let fetch = scripted(vec![Some(failed)], calls.clone());
        let err = poll_until_terminal("t", settings(10), None, &CancellationToken::new(), fetch)
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::TaskFailed { ref message, .. } if message == "bad pdf"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_is_timeout() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetch = scripted(vec![Some(task("pending"))], calls.clone());
        let err = poll_until_terminal("t", settings(4), None, &CancellationToken::new(), fetch)
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Timeout { attempts: 4, .. }), "got: {err:?}");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn unknown_states_keep_polling_by_default() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetch = scripted(
            vec![Some(task("warming-up")), Some(task("warming-up")), Some(task("done"))],
            calls.clone(),
        );
        let result =
            poll_until_terminal("t", settings(10), None, &CancellationToken::new(), fetch).await;
        assert!(result.unwrap().is_done());
    }

    #[tokio::test]
    async fn unknown_streak_bound_is_enforced() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetch = scripted(vec![Some(task("mystery"))], calls.clone());
        let bounded = PollSettings {
            max_consecutive_unknown: Some(3),
            ..settings(100)
        };
        let err = poll_until_terminal("t", bounded, None, &CancellationToken::new(), fetch)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnrecognizedState { consecutive: 3, ref state, .. } if state == "mystery"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn known_state_resets_unknown_streak() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetch = scripted(
            vec![
                Some(task("mystery")),
                Some(task("pending")),
                Some(task("mystery")),
                Some(task("done")),
            ],
            calls.clone(),
        );
        let bounded = PollSettings {
            max_consecutive_unknown: Some(2),
            ..settings(10)
        };
        let result = poll_until_terminal("t", bounded, None, &CancellationToken::new(), fetch).await;
        assert!(result.unwrap().is_done());
    }

    #[tokio::test]
    async fn missing_status_does_not_break_unknown_streak() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetch = scripted(
            vec![
                Some(task("mystery")),
                None,
                Some(task("mystery")),
                None,
                Some(task("done")),
            ],
            calls.clone(),
        );
        let bounded = PollSettings {
            max_consecutive_unknown: Some(2),
            ..settings(10)
        };
        let err = poll_until_terminal("B1", bounded, None, &CancellationToken::new(), fetch)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ParseError::UnrecognizedState { consecutive: 2, .. }),
            "got: {err:?}"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_status_counts_against_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetch = scripted(vec![None], calls.clone());
        let err = poll_until_terminal("B1", settings(3), None, &CancellationToken::new(), fetch)
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Timeout { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn progress_regressions_are_not_delivered() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetch = scripted(
            vec![
                Some(running(3, 10)),
                Some(running(2, 10)),
                Some(running(7, 10)),
                Some(task("converting")),
                Some(task("done")),
            ],
            calls,
        );
        let pages = Pages::default();
        poll_until_terminal("t", settings(10), Some(&pages), &CancellationToken::new(), fetch)
            .await
            .unwrap();
        assert_eq!(*pages.0.lock().unwrap(), vec![3, 7]);
    }

    #[tokio::test]
    async fn query_error_ends_loop() {
        let mut calls = 0;
        let fetch = || {
            calls += 1;
            std::future::ready(Err(ParseError::Query {
                id: "t".into(),
                reason: "HTTP 500".into(),
            }))
        };
        let err = poll_until_terminal("t", settings(10), None, &CancellationToken::new(), fetch)
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Query { .. }));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_query() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetch = scripted(vec![Some(task("pending"))], calls.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = poll_until_terminal("t", settings(10), None, &cancel, fetch)
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Cancelled { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_sleep() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetch = scripted(vec![Some(task("pending"))], calls.clone());
        let cancel = CancellationToken::new();
        let slow = PollSettings {
            interval: Duration::from_secs(3600),
            ..settings(10)
        };

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = poll_until_terminal("t", slow, None, &cancel, fetch)
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Cancelled { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
