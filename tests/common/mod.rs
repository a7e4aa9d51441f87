//! Shared test harness: a scripted transport and a recording notifier.
//!
//! Routes are keyed by `"METHOD target"`, e.g. `"GET /transaction?page=1&page_size=20"`.
//! Each route holds a queue of replies; the last ready reply is sticky so a
//! route can be read any number of times. Gated replies block until the test
//! releases them, which makes interleavings deterministic.
#![allow(dead_code)]

use async_trait::async_trait;
use finsync::api::{ApiRequest, ApiResponse, Transport};
use finsync::cache::RetryPolicy;
use finsync::core::{ApiError, Result};
use finsync::{ClientConfig, FinanceClient, Notification, Notifier};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

enum Reply {
    Ready(ApiResponse),
    NoResponse,
    Gated(oneshot::Receiver<ApiResponse>),
}

#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<ApiRequest>>,
}

/// Releases one gated reply.
pub struct Gate(oneshot::Sender<ApiResponse>);

impl Gate {
    pub fn release(self, response: ApiResponse) {
        // The waiting request may have been cancelled.
        let _ = self.0.send(response);
    }

    pub fn ok(self, data: Value) {
        self.release(ApiResponse::json(200, &json!({ "data": data })));
    }

    pub fn fail(self, status: u16, message: &str) {
        self.release(ApiResponse::json(status, &json!({ "error": message })));
    }
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, route: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn ok(&self, route: &str, data: Value) {
        self.respond(route, ApiResponse::json(200, &json!({ "data": data })));
    }

    pub fn fail(&self, route: &str, status: u16, message: &str) {
        self.respond(route, ApiResponse::json(status, &json!({ "error": message })));
    }

    pub fn respond(&self, route: &str, response: ApiResponse) {
        self.push(route, Reply::Ready(response));
    }

    pub fn no_response(&self, route: &str) {
        self.push(route, Reply::NoResponse);
    }

    pub fn gate(&self, route: &str) -> Gate {
        let (sender, receiver) = oneshot::channel();
        self.push(route, Reply::Gated(receiver));
        Gate(sender)
    }

    pub fn calls(&self, route: &str) -> usize {
        self.calls.lock().unwrap().get(route).copied().unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, route: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|request| route_of(request) == route)
            .collect()
    }

    /// Yield until `route` has been called `count` times.
    pub async fn wait_for_calls(&self, route: &str, count: usize) {
        for _ in 0..10_000 {
            if self.calls(route) >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("{} was called {} times, expected {}", route, self.calls(route), count);
    }

    fn next_reply(&self, route: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(route)?;
        match queue.front() {
            Some(Reply::Ready(response)) if queue.len() == 1 => {
                Some(Reply::Ready(response.clone()))
            }
            Some(Reply::NoResponse) if queue.len() == 1 => Some(Reply::NoResponse),
            _ => queue.pop_front(),
        }
    }
}

pub fn route_of(request: &ApiRequest) -> String {
    format!("{} {}", request.method.as_str(), request.target())
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let route = route_of(&request);
        let resource = request.resource.clone();
        *self.calls.lock().unwrap().entry(route.clone()).or_default() += 1;
        self.requests.lock().unwrap().push(request);

        match self.next_reply(&route) {
            Some(Reply::Ready(response)) => Ok(response),
            Some(Reply::NoResponse) => Err(ApiError::network(&resource, "connection reset")),
            Some(Reply::Gated(receiver)) => receiver
                .await
                .map_err(|_| ApiError::network(&resource, "gate dropped")),
            None => Ok(ApiResponse::json(
                404,
                &json!({ "error": format!("no route for {}", route) }),
            )),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seen(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig::default()
        .stale_time(Duration::from_secs(60))
        .retry(RetryPolicy::none())
}

pub fn client(mock: &Arc<MockTransport>) -> FinanceClient {
    FinanceClient::with_transport(test_config(), mock.clone()).unwrap()
}

pub fn client_with_notifier(
    mock: &Arc<MockTransport>,
) -> (FinanceClient, Arc<RecordingNotifier>) {
    let notifier = RecordingNotifier::new();
    let client = client(mock).with_notifier(notifier.clone());
    (client, notifier)
}

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

pub const TRANSACTIONS_PAGE_1: &str = "GET /transaction?page=1&page_size=20";
pub const TRANSACTIONS_PAGE_2: &str = "GET /transaction?page=2&page_size=20";

pub fn account(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "bank_type": "savings",
        "currency": "INR",
        "balance": 1000.0,
        "created_by": "tester"
    })
}

pub fn category(id: i64, name: &str) -> Value {
    json!({ "id": id, "name": name, "icon": "tag", "created_by": "tester" })
}

pub fn transaction(id: i64, amount: f64, category_ids: &[i64]) -> Value {
    json!({
        "id": id,
        "date": "2024-03-01",
        "name": format!("txn {}", id),
        "amount": amount,
        "category_ids": category_ids,
        "account_id": 1
    })
}

pub fn page(items: Vec<Value>, page: u32) -> Value {
    let total = items.len();
    json!({ "items": items, "total": total, "page": page, "page_size": 20 })
}
