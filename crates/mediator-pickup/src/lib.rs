//! Pickup State Machine: a FIFO mailbox of undelivered messages per
//! recipient, driving the `status`/`batch-pickup`/`list-pickup`/`noop`
//! operations of [`mediator_protocol::PickupOperation`].

use indexmap::IndexMap;
use mediator_protocol::{
    problem_codes, BasicMessageProblemReport, PickupBatchRequest, PickupBatchResponse,
    PickupListRequest, PickupListResponse, PickupMessage, PickupNoop, PickupOperation,
    PickupStatusRequest, PickupStatusResponse,
};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

struct QueuedItem {
    message: serde_json::Value,
    added_at: chrono::DateTime<chrono::Utc>,
}

struct Inner {
    messages: IndexMap<String, QueuedItem>,
    last_added_time: Option<chrono::DateTime<chrono::Utc>>,
    max_queue_size: Option<usize>,
}

/// One recipient's pending-message mailbox. Cheap to construct; intended
/// to live behind an `Arc` keyed by endpoint uid in the Session Controller.
pub struct PickupQueue {
    inner: Mutex<Inner>,
    filled: Notify,
    ready_to_put: Notify,
}

impl PickupQueue {
    pub fn new(max_queue_size: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                messages: IndexMap::new(),
                last_added_time: None,
                max_queue_size,
            }),
            filled: Notify::new(),
            ready_to_put: Notify::new(),
        }
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }

    /// Enqueues a message at the tail, blocking while the mailbox is at
    /// `max_queue_size`. Re-putting an existing `msg_id` moves it to the
    /// tail rather than duplicating it.
    pub async fn put(&self, message: serde_json::Value, msg_id: Option<String>) {
        loop {
            let notified = self.ready_to_put.notified();
            let at_capacity = {
                let inner = self.inner.lock().unwrap();
                inner
                    .max_queue_size
                    .is_some_and(|max| inner.messages.len() >= max)
            };
            if !at_capacity {
                break;
            }
            notified.await;
        }

        let id = msg_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        {
            let mut inner = self.inner.lock().unwrap();
            inner.messages.shift_remove(&id);
            let now = chrono::Utc::now();
            inner.messages.insert(
                id,
                QueuedItem {
                    message,
                    added_at: now,
                },
            );
            inner.last_added_time = Some(now);
        }
        self.filled.notify_waiters();
    }

    pub async fn process(&self, op: PickupOperation) -> PickupOperation {
        match op {
            PickupOperation::StatusRequest(req) => {
                let inner = self.inner.lock().unwrap();
                PickupOperation::StatusResponse(PickupStatusResponse {
                    message_count: inner.messages.len(),
                    duration_limit: 0,
                    last_added_time: inner.last_added_time.map(|t| t.to_rfc3339()),
                    thread: req.thread,
                })
            }
            PickupOperation::BatchRequest(req) => self.handle_batch(req).await,
            PickupOperation::ListRequest(req) => self.handle_list(req),
            PickupOperation::Noop(req) => self.handle_noop(req).await,
            _ => PickupOperation::ProblemReport(BasicMessageProblemReport {
                code: problem_codes::INVALID_REQUEST.to_owned(),
                explain: "unexpected pickup operation".to_owned(),
            }),
        }
    }

    async fn handle_batch(&self, req: PickupBatchRequest) -> PickupOperation {
        let deadline = req
            .delay_timeout
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        loop {
            let notified = self.filled.notified();
            let count = self.inner.lock().unwrap().messages.len();
            if count >= req.batch_size {
                break;
            }
            match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    if tokio::time::timeout(remaining, notified).await.is_err() {
                        break;
                    }
                }
                None => notified.await,
            }
        }

        let mut inner = self.inner.lock().unwrap();
        let take = req.batch_size.min(inner.messages.len());
        let mut messages = Vec::with_capacity(take);
        for _ in 0..take {
            if let Some((id, item)) = inner.messages.shift_remove_index(0) {
                messages.push(PickupMessage {
                    id,
                    message: item.message,
                    added_at: item.added_at.to_rfc3339(),
                });
            }
        }
        drop(inner);
        self.ready_to_put.notify_waiters();

        PickupOperation::BatchResponse(PickupBatchResponse {
            messages,
            thread: req.thread,
        })
    }

    fn handle_list(&self, req: PickupListRequest) -> PickupOperation {
        let inner = self.inner.lock().unwrap();
        let messages = req
            .message_ids
            .iter()
            .filter_map(|id| {
                inner.messages.get(id).map(|item| PickupMessage {
                    id: id.clone(),
                    message: item.message.clone(),
                    added_at: item.added_at.to_rfc3339(),
                })
            })
            .collect();
        PickupOperation::ListResponse(PickupListResponse {
            messages,
            thread: req.thread,
        })
    }

    /// A `noop` either reports the queue is empty (no wait requested), or
    /// behaves like a one-message batch pickup with the same delay.
    async fn handle_noop(&self, req: PickupNoop) -> PickupOperation {
        let count = self.inner.lock().unwrap().messages.len();
        if req.delay_timeout.is_none() && count == 0 {
            return PickupOperation::ProblemReport(BasicMessageProblemReport {
                code: problem_codes::EMPTY_QUEUE.to_owned(),
                explain: "message queue is empty".to_owned(),
            });
        }

        let batch = self
            .handle_batch(PickupBatchRequest {
                batch_size: 1,
                delay_timeout: req.delay_timeout,
                thread: req.thread.clone(),
            })
            .await;

        match batch {
            PickupOperation::BatchResponse(resp) if !resp.messages.is_empty() => {
                PickupOperation::BatchResponse(resp)
            }
            _ => PickupOperation::ProblemReport(BasicMessageProblemReport {
                code: problem_codes::TIMEOUT_OCCURRED.to_owned(),
                explain: "message queue is empty, timeout occurred".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediator_protocol::ThreadDecorator;

    fn thread() -> ThreadDecorator {
        ThreadDecorator::default()
    }

    #[tokio::test]
    async fn put_then_status_reports_count() {
        let queue = PickupQueue::new(None);
        queue.put(serde_json::json!({"hello": "world"}), None).await;
        let resp = queue
            .process(PickupOperation::StatusRequest(PickupStatusRequest {
                thread: thread(),
            }))
            .await;
        match resp {
            PickupOperation::StatusResponse(r) => assert_eq!(r.message_count, 1),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn batch_request_drains_fifo_order() {
        let queue = PickupQueue::new(None);
        queue
            .put(serde_json::json!({"n": 1}), Some("a".to_owned()))
            .await;
        queue
            .put(serde_json::json!({"n": 2}), Some("b".to_owned()))
            .await;

        let resp = queue
            .process(PickupOperation::BatchRequest(PickupBatchRequest {
                batch_size: 2,
                delay_timeout: None,
                thread: thread(),
            }))
            .await;
        match resp {
            PickupOperation::BatchResponse(r) => {
                assert_eq!(r.messages.len(), 2);
                assert_eq!(r.messages[0].id, "a");
                assert_eq!(r.messages[1].id, "b");
            }
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(queue.message_count(), 0);
    }

    #[tokio::test]
    async fn batch_request_with_zero_delay_returns_partial_immediately() {
        let queue = PickupQueue::new(None);
        queue.put(serde_json::json!({"n": 1}), None).await;

        let resp = queue
            .process(PickupOperation::BatchRequest(PickupBatchRequest {
                batch_size: 5,
                delay_timeout: Some(0),
                thread: thread(),
            }))
            .await;
        match resp {
            PickupOperation::BatchResponse(r) => assert_eq!(r.messages.len(), 1),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn noop_on_empty_queue_without_delay_reports_empty() {
        let queue = PickupQueue::new(None);
        let resp = queue
            .process(PickupOperation::Noop(PickupNoop {
                delay_timeout: None,
                thread: thread(),
            }))
            .await;
        match resp {
            PickupOperation::ProblemReport(r) => assert_eq!(r.code, problem_codes::EMPTY_QUEUE),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn noop_on_empty_queue_with_delay_times_out() {
        let queue = PickupQueue::new(None);
        let resp = queue
            .process(PickupOperation::Noop(PickupNoop {
                delay_timeout: Some(0),
                thread: thread(),
            }))
            .await;
        match resp {
            PickupOperation::ProblemReport(r) => {
                assert_eq!(r.code, problem_codes::TIMEOUT_OCCURRED)
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_request_returns_only_known_ids() {
        let queue = PickupQueue::new(None);
        queue
            .put(serde_json::json!({"n": 1}), Some("a".to_owned()))
            .await;
        let resp = queue
            .process(PickupOperation::ListRequest(PickupListRequest {
                message_ids: vec!["a".to_owned(), "missing".to_owned()],
                thread: thread(),
            }))
            .await;
        match resp {
            PickupOperation::ListResponse(r) => assert_eq!(r.messages.len(), 1),
            other => panic!("unexpected response: {other:?}"),
        }
        // list-pickup does not drain the queue
        assert_eq!(queue.message_count(), 1);
    }

    #[tokio::test]
    async fn re_put_same_id_moves_to_tail_without_duplicating() {
        let queue = PickupQueue::new(None);
        queue
            .put(serde_json::json!({"n": 1}), Some("a".to_owned()))
            .await;
        queue
            .put(serde_json::json!({"n": 2}), Some("b".to_owned()))
            .await;
        queue
            .put(serde_json::json!({"n": 3}), Some("a".to_owned()))
            .await;

        assert_eq!(queue.message_count(), 2);
        let resp = queue
            .process(PickupOperation::BatchRequest(PickupBatchRequest {
                batch_size: 2,
                delay_timeout: None,
                thread: thread(),
            }))
            .await;
        match resp {
            PickupOperation::BatchResponse(r) => {
                assert_eq!(r.messages[0].id, "b");
                assert_eq!(r.messages[1].id, "a");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn put_blocks_while_at_capacity_until_drained() {
        let queue = std::sync::Arc::new(PickupQueue::new(Some(1)));
        queue.put(serde_json::json!({"n": 1}), None).await;

        let putter = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue.put(serde_json::json!({"n": 2}), None).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!putter.is_finished());

        queue
            .process(PickupOperation::BatchRequest(PickupBatchRequest {
                batch_size: 1,
                delay_timeout: None,
                thread: thread(),
            }))
            .await;

        tokio::time::timeout(Duration::from_millis(200), putter)
            .await
            .expect("put should have unblocked")
            .unwrap();
        assert_eq!(queue.message_count(), 1);
    }
}
