//! Single-queue pacing of outbound catalog calls.
//!
//! Every call goes through one FIFO queue. A single drain task dispatches the
//! head of the queue once at least `min_delay` has passed since the previous
//! dispatch, waits for it to settle, and completes the caller's handle. The
//! throttler never interprets responses and never retries.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::http_client::{CatalogTransport, OutboundRequest, TransportResponse};

type Outcome = Result<TransportResponse, TransportError>;

struct QueuedRequest {
    request: OutboundRequest,
    responder: oneshot::Sender<Outcome>,
}

struct QueueState {
    queue: VecDeque<QueuedRequest>,
    /// Set while a drain task owns the queue.
    processing: bool,
    last_dispatch: Option<Instant>,
}

struct Inner {
    transport: Arc<dyn CatalogTransport>,
    min_delay: Duration,
    state: Mutex<QueueState>,
}

/// Handle to the paced FIFO queue. Clones share the same queue.
#[derive(Clone)]
pub struct RequestThrottler {
    inner: Arc<Inner>,
}

/// Completes once the queued request has been dispatched and settled.
///
/// Dropping the handle abandons the request: it is skipped if still queued
/// and cancelled if already in flight.
pub struct ResponseHandle {
    rx: oneshot::Receiver<Outcome>,
}

impl Future for ResponseHandle {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(TransportError::Closed)))
    }
}

impl RequestThrottler {
    pub fn new(transport: Arc<dyn CatalogTransport>, min_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                min_delay,
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    processing: false,
                    last_dispatch: None,
                }),
            }),
        }
    }

    /// Append a request to the queue, starting the drain task if idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, request: OutboundRequest) -> ResponseHandle {
        let (responder, rx) = oneshot::channel();

        let start_drain = {
            let mut state = self.inner.lock();
            state.queue.push_back(QueuedRequest { request, responder });
            !std::mem::replace(&mut state.processing, true)
        };

        if start_drain {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.drain());
        }

        ResponseHandle { rx }
    }

    /// Reject every request that has not been dispatched yet.
    pub fn clear(&self) -> usize {
        let pending: Vec<QueuedRequest> = self.inner.lock().queue.drain(..).collect();
        let cleared = pending.len();

        for entry in pending {
            let _ = entry.responder.send(Err(TransportError::QueueCleared));
        }

        if cleared > 0 {
            debug!(cleared, "Cleared catalog request queue");
        }
        cleared
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.lock().processing
    }

}

/// Hands the queue to a fresh drain task if the current one dies mid-queue.
struct DrainGuard {
    inner: Arc<Inner>,
    finished: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let mut state = self.inner.lock();
        if state.queue.is_empty() {
            state.processing = false;
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(queued = state.queue.len(), "Catalog drain task died, restarting");
                drop(state);
                handle.spawn(Arc::clone(&self.inner).drain());
            }
            Err(_) => state.processing = false,
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drain(self: Arc<Self>) {
        let mut guard = DrainGuard {
            inner: Arc::clone(&self),
            finished: false,
        };
        self.drain_queue().await;
        guard.finished = true;
    }

    async fn drain_queue(&self) {
        loop {
            let wait = {
                let mut state = self.lock();
                if state.queue.is_empty() {
                    state.processing = false;
                    return;
                }
                state
                    .last_dispatch
                    .map(|last| self.min_delay.saturating_sub(last.elapsed()))
                    .unwrap_or_default()
            };

            if !wait.is_zero() {
                sleep(wait).await;
                // The queue may have been cleared while pacing.
                continue;
            }

            let next = {
                let mut state = self.lock();
                match state.queue.pop_front() {
                    Some(next) if next.responder.is_closed() => {
                        debug!(url = %next.request.url, "Skipping abandoned catalog request");
                        continue;
                    }
                    Some(next) => {
                        state.last_dispatch = Some(Instant::now());
                        next
                    }
                    None => {
                        state.processing = false;
                        return;
                    }
                }
            };

            let QueuedRequest {
                request,
                mut responder,
            } = next;
            let url = request.url.clone();

            let outcome = tokio::select! {
                outcome = self.transport.get(request) => Some(outcome),
                _ = responder.closed() => None,
            };

            match outcome {
                Some(outcome) => {
                    let _ = responder.send(outcome);
                }
                None => debug!(url = %url, "Caller abandoned in-flight catalog request"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::mock::{MockTransport, Reply};
    use serde_json::json;

    fn throttler(transport: &Arc<MockTransport>, min_delay_ms: u64) -> RequestThrottler {
        RequestThrottler::new(
            Arc::clone(transport) as Arc<dyn CatalogTransport>,
            Duration::from_millis(min_delay_ms),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order_and_min_spacing() {
        let transport = Arc::new(MockTransport::new().respond("/volumes", 200, json!({})));
        let throttler = throttler(&transport, 400);

        let handles: Vec<_> = (0..5)
            .map(|i| throttler.enqueue(OutboundRequest::get(format!("https://x/volumes?n={i}"))))
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().status, 200);
        }

        let urls = transport.calls();
        let expected: Vec<String> = (0..5).map(|i| format!("https://x/volumes?n={i}")).collect();
        assert_eq!(urls, expected);

        let times = transport.call_times();
        for pair in times.windows(2) {
            assert!(pair[1] >= pair[0]);
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(400));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transport_panic() {
        let transport = Arc::new(
            MockTransport::new()
                .sequence("/crash", vec![Reply::Panic])
                .respond("/volumes", 200, json!({})),
        );
        let throttler = throttler(&transport, 100);

        let crashed = throttler.enqueue(OutboundRequest::get("https://x/crash"));
        let queued = throttler.enqueue(OutboundRequest::get("https://x/volumes?queued"));

        assert_eq!(crashed.await.unwrap_err(), TransportError::Closed);
        assert_eq!(queued.await.unwrap().status, 200);

        tokio::task::yield_now().await;
        assert!(!throttler.is_processing());

        let later = throttler.enqueue(OutboundRequest::get("https://x/volumes?later")).await;
        assert_eq!(later.unwrap().status, 200);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_after_going_idle() {
        let transport = Arc::new(MockTransport::new().respond("/volumes", 200, json!({})));
        let throttler = throttler(&transport, 300);

        throttler.enqueue(OutboundRequest::get("https://x/volumes?a")).await.unwrap();
        tokio::task::yield_now().await;
        assert!(!throttler.is_processing());

        throttler.enqueue(OutboundRequest::get("https://x/volumes?b")).await.unwrap();
        assert_eq!(transport.call_count(), 2);

        let times = transport.call_times();
        assert!(times[1].duration_since(times[0]) >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_raw_outcomes() {
        let transport = Arc::new(
            MockTransport::new()
                .respond("/server-error", 500, json!({ "error": "boom" }))
                .sequence(
                    "/offline",
                    vec![Reply::Fail(TransportError::Network("connection refused".into()))],
                ),
        );
        let throttler = throttler(&transport, 0);

        let response = throttler.enqueue(OutboundRequest::get("https://x/server-error")).await;
        assert_eq!(response.unwrap().status, 500);

        let failure = throttler.enqueue(OutboundRequest::get("https://x/offline")).await;
        assert_eq!(
            failure.unwrap_err(),
            TransportError::Network("connection refused".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_rejects_queued_not_in_flight() {
        let transport = Arc::new(
            MockTransport::new()
                .sequence(
                    "/slow",
                    vec![Reply::Delayed(
                        Duration::from_secs(2),
                        TransportResponse::new(200, "{}"),
                    )],
                )
                .respond("/queued", 200, json!({})),
        );
        let throttler = throttler(&transport, 1000);

        let first = throttler.enqueue(OutboundRequest::get("https://x/slow"));
        tokio::task::yield_now().await;
        assert_eq!(transport.call_count(), 1);
        let second = throttler.enqueue(OutboundRequest::get("https://x/queued?1"));
        let third = throttler.enqueue(OutboundRequest::get("https://x/queued?2"));

        assert_eq!(throttler.clear(), 2);
        assert_eq!(second.await.unwrap_err(), TransportError::QueueCleared);
        assert_eq!(third.await.unwrap_err(), TransportError::QueueCleared);
        assert_eq!(first.await.unwrap().status, 200);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(throttler.queue_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_is_skipped() {
        let transport = Arc::new(MockTransport::new().respond("/volumes", 200, json!({})));
        let throttler = throttler(&transport, 500);

        let first = throttler.enqueue(OutboundRequest::get("https://x/volumes?keep-1"));
        let abandoned = throttler.enqueue(OutboundRequest::get("https://x/volumes?drop"));
        let last = throttler.enqueue(OutboundRequest::get("https://x/volumes?keep-2"));
        drop(abandoned);

        first.await.unwrap();
        last.await.unwrap();

        assert_eq!(
            transport.calls(),
            vec![
                "https://x/volumes?keep-1".to_string(),
                "https://x/volumes?keep-2".to_string()
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_cancels_in_flight_call() {
        let transport = Arc::new(
            MockTransport::new()
                .sequence("/hang", vec![Reply::Hang])
                .respond("/after", 200, json!({})),
        );
        let throttler = throttler(&transport, 0);

        let hung = throttler.enqueue(OutboundRequest::get("https://x/hang"));
        let timed_out = tokio::time::timeout(Duration::from_secs(15), hung).await;
        assert!(timed_out.is_err());

        // The queue keeps moving once the abandoned call is cancelled.
        let next = tokio::time::timeout(
            Duration::from_secs(5),
            throttler.enqueue(OutboundRequest::get("https://x/after")),
        )
        .await;
        assert_eq!(next.unwrap().unwrap().status, 200);
    }
}
