//! Stub generators shared by the transform tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::ai::{GenerationRequest, TextGenerator};
use crate::error::{GenerationError, GenerationResult};

type Respond = Box<dyn Fn(&GenerationRequest<'_>) -> GenerationResult<String> + Send + Sync>;
type Delay = Box<dyn Fn(&str) -> Duration + Send + Sync>;

pub(crate) struct StubGenerator {
    respond: Respond,
    delay: Option<Delay>,
    fail_first: usize,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubGenerator {
    pub(crate) fn new<F>(respond: F) -> Self
    where
        F: Fn(&GenerationRequest<'_>) -> GenerationResult<String> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            delay: None,
            fail_first: 0,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Answers `<SUMMARY:text>`.
    pub(crate) fn summarizer() -> Self {
        Self::new(|req| Ok(format!("<SUMMARY:{}>", req.text)))
    }

    /// Always fails with a transport error.
    pub(crate) fn failing() -> Self {
        Self::new(|_| Err(network_error()))
    }

    /// Sleep before answering, per request text.
    pub(crate) fn with_delay<D>(mut self, delay: D) -> Self
    where
        D: Fn(&str) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    /// Fail the first `n` calls with a transport error.
    pub(crate) fn fail_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// Texts received, in call order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Highest number of calls observed in flight at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub(crate) fn network_error() -> GenerationError {
    GenerationError::RequestFailed("simulated network error".into())
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationResult<String> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.text.to_string());
            calls.len()
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(request.text)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if call_number <= self.fail_first {
            return Err(network_error());
        }
        (self.respond)(request)
    }
}
