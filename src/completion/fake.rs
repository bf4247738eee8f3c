use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{CompletionClient, CompletionRequest, RemoteCallError};

type Reply = Result<serde_json::Value, RemoteCallError>;

/// Scripted client keyed by schema name, since the two analyses of one
/// dialogue may be requested in either order. The last scripted reply for a
/// schema is repeated once the queue is down to one entry.
#[derive(Default)]
pub struct FakeCompletionClient {
    replies: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, schema: &'static str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(schema)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for FakeCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Reply {
        let schema = request.schema.name;
        self.requests.lock().unwrap().push(request);

        let mut replies = self.replies.lock().unwrap();
        let Some(queue) = replies.get_mut(schema) else {
            return Err(RemoteCallError::EmptyResponse);
        };

        match queue.len() {
            0 => Err(RemoteCallError::EmptyResponse),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or(Err(RemoteCallError::EmptyResponse)),
        }
    }
}
