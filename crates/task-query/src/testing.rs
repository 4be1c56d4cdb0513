//! Scripted executor for unit tests
//!
//! Replies are queued per `(method, path)` and consumed in call order. A
//! gated reply holds the request in flight until the test releases it.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::error::FetchError;
use crate::executor::{ApiRequest, FetchExecutor, Method};

type Reply = Result<Value, FetchError>;

enum Scripted {
    Ready(Reply),
    Gated(oneshot::Receiver<Reply>),
}

#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    replies: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, reply: Scripted) {
        self.replies
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn reply(&self, method: Method, path: &str, reply: Reply) {
        self.push(method, path, Scripted::Ready(reply));
    }

    pub(crate) fn reply_ok(&self, method: Method, path: &str, body: Value) {
        self.reply(method, path, Ok(body));
    }

    /// Queue a reply that is only delivered once the returned sender fires
    pub(crate) fn gate(&self, method: Method, path: &str) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.push(method, path, Scripted::Gated(rx));
        tx
    }

    pub(crate) fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().clone()
    }

    pub(crate) fn call_count(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    /// Yield until at least `n` requests have been issued
    pub(crate) async fn wait_for_calls(&self, n: usize) {
        for _ in 0..1000 {
            if self.calls.lock().len() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {} calls, saw {:?}", n, self.calls());
    }
}

#[async_trait]
impl FetchExecutor for ScriptedExecutor {
    async fn execute(&self, request: ApiRequest) -> Result<Value, FetchError> {
        let key = (request.method, request.path.clone());
        self.calls.lock().push(request.clone());
        let scripted = self
            .replies
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);

        match scripted {
            Some(Scripted::Ready(reply)) => reply,
            Some(Scripted::Gated(rx)) => match tokio::time::timeout(Duration::from_secs(5), rx).await {
                Ok(Ok(reply)) => reply,
                _ => Err(FetchError::network("gate dropped")),
            },
            None => Err(FetchError::network(format!("no scripted reply for {}", request))),
        }
    }
}

pub(crate) fn task_json(id: i64, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "status": "pending",
        "created_at": "2024-05-01T10:00:00Z"
    })
}

pub(crate) fn page_json(ids: &[i64], current_page: u32, total_pages: u32, page_size: u32) -> Value {
    json!({
        "success": true,
        "data": ids.iter().map(|&id| task_json(id, &format!("Task {}", id))).collect::<Vec<_>>(),
        "pagination": {
            "has_next": current_page < total_pages,
            "has_previous": current_page > 1,
            "current_page": current_page,
            "total_pages": total_pages,
            "total_items": total_pages * page_size,
            "page_size": page_size
        }
    })
}

pub(crate) fn data_json(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

pub(crate) fn stats_json(total: u64, completed: u64) -> Value {
    data_json(json!({
        "total_tasks": total,
        "modified_tasks": 0,
        "deleted_tasks": 0,
        "completed_tasks": completed
    }))
}

pub(crate) fn ack_json() -> Value {
    json!({ "success": true })
}
