//! Fixed-window request limiting per client address.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::lock::Mutex;
use tokio::time::Instant;

use crate::context::RequestContext;
use crate::error::AppError;

const PURGE_THRESHOLD: usize = 10_000;
const LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes
    pub reset: Duration,
}

impl Decision {
    fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert("ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert("ratelimit-reset", HeaderValue::from(self.reset.as_secs()));
    }
}

#[derive(Debug, Default)]
struct Clients {
    windows: HashMap<IpAddr, Window>,
    /// Earliest moment the next purge may run
    next_purge: Option<Instant>,
}

impl Clients {
    /// Drops expired windows at most once per window length.
    fn purge(&mut self, now: Instant, window: Duration) {
        if self.windows.len() <= PURGE_THRESHOLD || self.next_purge.is_some_and(|at| now < at) {
            return;
        }
        self.windows
            .retain(|_, w| now.duration_since(w.started) < window);
        self.next_purge = Some(now + window);
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max: u32,
    clients: Mutex<Clients>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            window,
            max,
            clients: Mutex::new(Clients::default()),
        }
    }

    pub async fn check(&self, ip: IpAddr, now: Instant) -> Decision {
        let mut clients = self.clients.lock().await;
        clients.purge(now, self.window);

        let window = clients.windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        let allowed = window.count < self.max;
        if allowed {
            window.count += 1;
        }
        Decision {
            allowed,
            limit: self.max,
            remaining: self.max.saturating_sub(window.count),
            reset: self.window.saturating_sub(now.duration_since(window.started)),
        }
    }
}

/// Middleware rejecting clients that exceeded their window with 429.
pub async fn limit(State(limiter): State<Arc<RateLimiter>>, request: Request, next: Next) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(addr)| addr.ip());

    let decision = limiter.check(ip, Instant::now()).await;
    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(client = %ip, "rate limit exceeded");
        RequestContext::from_extensions(request.extensions())
            .fail(AppError::RateLimited(LIMIT_MESSAGE.to_owned()))
            .into_response()
    };
    decision.write_headers(response.headers_mut());
    response
}
