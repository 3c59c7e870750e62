#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use yalidine_client::http::{
    Sleeper, Transport, TransportError, TransportRequest, TransportResponse,
};

/// Replays a fixed list of outcomes and records every request it was given.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    seen: Mutex<Vec<TransportRequest>>,
    calls: AtomicUsize,
}

pub enum Outcome {
    Respond(TransportResponse),
    Fail(TransportError),
    Hang,
}

impl ScriptedTransport {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Outcome::Respond(r)) => Ok(r),
            Some(Outcome::Fail(e)) => Err(e),
            Some(Outcome::Hang) => std::future::pending().await,
            None => Err(TransportError::Network("script exhausted".into())),
        }
    }
}

#[derive(Default)]
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

pub fn response(status: u16, headers: &[(&'static str, &str)], body: &str) -> Outcome {
    let mut h = HeaderMap::new();
    for (k, v) in headers {
        h.insert(*k, v.parse().unwrap());
    }
    Outcome::Respond(TransportResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers: h,
        body: body.as_bytes().to_vec(),
    })
}

pub fn refused() -> Outcome {
    Outcome::Fail(TransportError::Network("connection refused".into()))
}
