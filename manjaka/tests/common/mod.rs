//! Scripted transport and instant sleeper shared by the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderValue;
use http::header::RETRY_AFTER;
use manjaka::{ApiError, ApiRequest, ApiResponse, Sleeper, StatusCode, Transport};
use serde_json::{Value, json};

/// What the transport does for one call.
pub struct Reply {
    pub delay: Duration,
    pub result: Result<ApiResponse, ApiError>,
}

impl Reply {
    /// `200` with a successful envelope around `data`.
    pub fn ok(data: Value) -> Self {
        Self::body(StatusCode::OK, json!({ "success": true, "data": data }))
    }

    /// Arbitrary status and JSON body.
    pub fn body(status: StatusCode, body: Value) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(ApiResponse::new(status, body.to_string())),
        }
    }

    /// Error status with a `message`.
    pub fn status(code: u16) -> Self {
        Self::body(
            StatusCode::from_u16(code).unwrap(),
            json!({ "success": false, "message": format!("status {code}") }),
        )
    }

    /// `429` with a `Retry-After` header.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        let mut reply = Self::status(429);
        if let Ok(response) = &mut reply.result {
            response.headers.insert(
                RETRY_AFTER,
                HeaderValue::from_str(&retry_after_secs.to_string()).unwrap(),
            );
        }
        reply
    }

    /// Answers after `delay`.
    pub fn after(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }
}

type Handler = dyn Fn(&ApiRequest, usize) -> Reply + Send + Sync;

/// Transport answering through a closure and recording every call.
///
/// The closure receives the request and the 0-based global call number.
pub struct MockTransport {
    handler: Box<Handler>,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&ApiRequest, usize) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every call answers with the path echoed back as data.
    pub fn echo() -> Self {
        Self::new(|request, _| Reply::ok(json!({ "path": request.path.as_str() })))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed on the wire at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.peak.fetch_max(active, Ordering::SeqCst);

        let reply = (self.handler)(&request, n);
        self.requests.lock().unwrap().push(request);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}

/// Sleeper that returns immediately and remembers what it was asked.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

pub fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_secs).collect()
}
