//! The attempt loop.
//!
//! # State Machine
//! ```text
//! Deciding
//!     → ineligible / budget 0 / body unreplayable → single exchange, result verbatim
//!     → eligible → Attempting
//!
//! Attempting (attempt = 0 .. max_attempts - 1)
//!     → Waiting     backoff.delay(attempt), skipped for attempt 0, raced against the context
//!     → Replaying   source.obtain(), failure is terminal
//!     → Exchanging  send(request), raced against the context
//!     → Classifying
//!         interrupted          → Aborted
//!         transport error      → next attempt, or return it when the budget is spent
//!         accepted response    → Success
//!         discarded response   → release, next attempt, or return it when the budget is spent
//! ```
//!
//! # Design Decisions
//! - Attempts are strictly sequential; a new body is obtained only after the
//!   previous attempt has finished and its response has been released
//! - The caller's cancellation or deadline always wins over remaining budget
//! - On exhaustion the last observed outcome is returned, never a synthetic error

use std::error::Error as StdError;
use std::fmt::Display;
use std::future::Future;

use http::request::Parts;
use http::{Method, Request, Response, Uri};
use http_body::Body;

use crate::http::replay::{ReplaySource, Resolution};
use crate::http::request::RetryRequestExt;
use crate::http::response::{release, Released};
use crate::http::RetryBody;
use crate::lifecycle::{CallContext, Interrupt};
use crate::observability::metrics::{self, CallOutcome};
use crate::resilience::error::RetryError;
use crate::resilience::policy::RetryPolicy;
use crate::BoxError;

/// Classified result of one exchange that did not end the call.
enum AttemptOutcome<B> {
    Discarded(Response<B>),
    Failed(BoxError),
}

/// Execute `request` through `send`, retrying according to `policy`.
///
/// `send` performs exactly one exchange per invocation. The request's
/// [`CallContext`] (if any) bounds the whole call, waits included.
pub async fn execute<F, Fut, B, E>(
    policy: &RetryPolicy,
    request: Request<RetryBody>,
    mut send: F,
) -> Result<Response<B>, RetryError>
where
    F: FnMut(Request<RetryBody>) -> Fut,
    Fut: Future<Output = Result<Response<B>, E>>,
    B: Body,
    B::Error: Display,
    E: Into<BoxError>,
{
    let ctx = request.call_context().cloned().unwrap_or_default();
    let (parts, body) = request.into_parts();
    let call = Call::new(policy, &parts);

    if policy.max_attempts() == 0 || !policy.is_eligible(&parts) {
        return single(&call, &ctx, Request::from_parts(parts, body), send).await;
    }

    let source = match ctx.run(ReplaySource::resolve(body, policy.buffer_limit())).await {
        Ok(Resolution::Replayable(source)) => source,
        Ok(Resolution::Unreplayable(body)) => {
            tracing::debug!(
                method = %call.method,
                uri = %call.uri,
                "Request body cannot be replayed; sending a single attempt"
            );
            return single(&call, &ctx, Request::from_parts(parts, body), send).await;
        }
        Err(interrupt) => return Err(call.aborted(interrupt)),
    };

    let max_attempts = policy.max_attempts();
    for attempt in 0..max_attempts {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            tracing::debug!(
                method = %call.method,
                uri = %call.uri,
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Retrying request"
            );
            call.backoff(delay);
            if let Err(interrupt) = ctx.sleep(delay).await {
                return Err(call.aborted(interrupt));
            }
        }

        let body = match ctx.run(source.obtain()).await {
            Ok(Ok(body)) => body,
            Err(interrupt) => return Err(call.aborted(interrupt)),
            Ok(Err(e)) => {
                tracing::warn!(
                    method = %call.method,
                    uri = %call.uri,
                    attempt = attempt + 1,
                    error = %e,
                    "Failed to replay request body"
                );
                call.finish(CallOutcome::ReplayFailed);
                return Err(RetryError::BodyReplay(e));
            }
        };

        call.attempt();
        let request = Request::from_parts(parts.clone(), body);
        let outcome = match exchange(policy, &ctx, &mut send, request).await {
            Ok(Ok(response)) => {
                if attempt > 0 {
                    tracing::info!(
                        method = %call.method,
                        uri = %call.uri,
                        attempts = attempt + 1,
                        status = %response.status(),
                        "Request succeeded after retry"
                    );
                }
                call.finish(CallOutcome::Success);
                return Ok(response);
            }
            Ok(Err(outcome)) => outcome,
            Err(interrupt) => return Err(call.aborted(interrupt)),
        };

        if attempt + 1 == max_attempts {
            call.finish(CallOutcome::Exhausted);
            return match outcome {
                AttemptOutcome::Discarded(response) => {
                    tracing::warn!(
                        method = %call.method,
                        uri = %call.uri,
                        attempts = max_attempts,
                        status = %response.status(),
                        "Retry budget exhausted; returning last response"
                    );
                    Ok(response)
                }
                AttemptOutcome::Failed(e) => {
                    tracing::warn!(
                        method = %call.method,
                        uri = %call.uri,
                        attempts = max_attempts,
                        error = %e,
                        "Retry budget exhausted; returning last error"
                    );
                    Err(RetryError::Transport(e))
                }
            };
        }

        match outcome {
            AttemptOutcome::Discarded(response) => {
                tracing::debug!(
                    method = %call.method,
                    uri = %call.uri,
                    attempt = attempt + 1,
                    status = %response.status(),
                    "Discarding response"
                );
                match ctx.run(release(response, policy.drain_limit())).await {
                    Ok(Released::Drained(_)) => {}
                    Ok(Released::Abandoned(_)) => call.drain_failed(),
                    Err(interrupt) => return Err(call.aborted(interrupt)),
                }
            }
            AttemptOutcome::Failed(e) => {
                tracing::debug!(
                    method = %call.method,
                    uri = %call.uri,
                    attempt = attempt + 1,
                    error = %e,
                    "Attempt failed"
                );
            }
        }
    }

    // Every iteration returns on its last attempt.
    Err(RetryError::BudgetExhausted(max_attempts))
}

/// One exchange raced against the context.
///
/// `Ok(Ok(_))` is an accepted response, `Ok(Err(_))` a retryable outcome.
async fn exchange<F, Fut, B, E>(
    policy: &RetryPolicy,
    ctx: &CallContext,
    send: &mut F,
    request: Request<RetryBody>,
) -> Result<Result<Response<B>, AttemptOutcome<B>>, Interrupt>
where
    F: FnMut(Request<RetryBody>) -> Fut,
    Fut: Future<Output = Result<Response<B>, E>>,
    E: Into<BoxError>,
{
    match ctx.run(send(request)).await? {
        Ok(response) => {
            if policy.discards(response.status(), response.headers()) {
                Ok(Err(AttemptOutcome::Discarded(response)))
            } else {
                Ok(Ok(response))
            }
        }
        Err(e) => {
            let e = e.into();
            match interruption(&*e) {
                Some(interrupt) => Err(interrupt),
                None => Ok(Err(AttemptOutcome::Failed(e))),
            }
        }
    }
}

/// Send once and return the result verbatim.
async fn single<F, Fut, B, E>(
    call: &Call<'_>,
    ctx: &CallContext,
    request: Request<RetryBody>,
    mut send: F,
) -> Result<Response<B>, RetryError>
where
    F: FnMut(Request<RetryBody>) -> Fut,
    Fut: Future<Output = Result<Response<B>, E>>,
    E: Into<BoxError>,
{
    call.attempt();
    let result = match ctx.run(send(request)).await {
        Ok(result) => result,
        Err(interrupt) => return Err(call.aborted(interrupt)),
    };

    match result {
        Ok(response) => {
            call.finish(CallOutcome::Single);
            Ok(response)
        }
        Err(e) => {
            let e = e.into();
            if let Some(interrupt) = interruption(&*e) {
                return Err(call.aborted(interrupt));
            }
            call.finish(CallOutcome::Single);
            Err(RetryError::Transport(e))
        }
    }
}

/// Find a cancellation or deadline signal anywhere in an error's source chain.
pub(crate) fn interruption(err: &(dyn StdError + 'static)) -> Option<Interrupt> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(interrupt) = e.downcast_ref::<Interrupt>() {
            return Some(*interrupt);
        }
        if e.is::<tokio::time::error::Elapsed>() {
            return Some(Interrupt::DeadlineExceeded);
        }
        current = e.source();
    }
    None
}

/// Per-call bookkeeping shared by the single and retrying paths.
struct Call<'a> {
    policy: &'a RetryPolicy,
    method: Method,
    uri: Uri,
}

impl<'a> Call<'a> {
    fn new(policy: &'a RetryPolicy, parts: &Parts) -> Self {
        Self {
            policy,
            method: parts.method.clone(),
            uri: parts.uri.clone(),
        }
    }

    fn attempt(&self) {
        if self.policy.metrics_enabled() {
            metrics::record_attempt(&self.method);
        }
    }

    fn backoff(&self, delay: std::time::Duration) {
        if self.policy.metrics_enabled() {
            metrics::record_backoff(delay);
        }
    }

    fn drain_failed(&self) {
        if self.policy.metrics_enabled() {
            metrics::record_drain_failure(&self.method);
        }
    }

    fn finish(&self, outcome: CallOutcome) {
        if self.policy.metrics_enabled() {
            metrics::record_call(&self.method, outcome);
        }
    }

    fn aborted(&self, interrupt: Interrupt) -> RetryError {
        tracing::debug!(
            method = %self.method,
            uri = %self.uri,
            reason = %interrupt,
            "Request interrupted"
        );
        self.finish(CallOutcome::Aborted);
        interrupt.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};
    use std::time::Duration;

    use bytes::Bytes;
    use http::StatusCode;
    use http_body::Frame;
    use http_body_util::{BodyExt, Full, StreamBody};
    use tokio::time::Instant;

    use crate::http::replay::ReplayError;
    use crate::resilience::backoff::Linear;

    type TestResponse = Response<Full<Bytes>>;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(max_attempts)
            .backoff(Linear::new(Duration::from_millis(100)))
            .metrics_enabled(false)
            .build()
            .unwrap()
    }

    fn get() -> Request<RetryBody> {
        Request::get("http://backend.local/items")
            .body(RetryBody::empty())
            .unwrap()
    }

    fn post(body: impl Into<RetryBody>) -> Request<RetryBody> {
        Request::post("http://backend.local/orders")
            .body(body.into())
            .unwrap()
    }

    fn respond(status: StatusCode) -> TestResponse {
        Response::builder()
            .status(status)
            .body(Full::new(Bytes::from_static(b"payload")))
            .unwrap()
    }

    /// Answers with `script[n]` on the n-th call (last entry repeats), counting calls.
    fn scripted(
        calls: Arc<AtomicU32>,
        script: Vec<Result<StatusCode, &'static str>>,
    ) -> impl FnMut(Request<RetryBody>) -> futures_util::future::Ready<Result<TestResponse, BoxError>> {
        move |_req| {
            let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
            let step = script[n.min(script.len() - 1)];
            futures_util::future::ready(match step {
                Ok(status) => Ok(respond(status)),
                Err(msg) => Err(msg.into()),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_discarded_responses() {
        let calls = Arc::new(AtomicU32::new(0));
        let send = scripted(
            calls.clone(),
            vec![
                Ok(StatusCode::SERVICE_UNAVAILABLE),
                Ok(StatusCode::SERVICE_UNAVAILABLE),
                Ok(StatusCode::OK),
            ],
        );

        let start = Instant::now();
        let resp = execute(&policy(5), get(), send).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms before attempt 2, 200ms before attempt 3.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(310));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_response() {
        let calls = Arc::new(AtomicU32::new(0));
        let send = scripted(calls.clone(), vec![Ok(StatusCode::SERVICE_UNAVAILABLE)]);

        let resp = execute(&policy(3), get(), send).await.unwrap();

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"payload");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_transport_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let send = scripted(calls.clone(), vec![Err("refused 1"), Err("refused 2"), Err("refused 3")]);

        let err = execute(&policy(3), get(), send).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.to_string(), "transport error: refused 3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_is_sent_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let send = scripted(calls.clone(), vec![Err("connection reset"), Ok(StatusCode::OK)]);

        let err = execute(&policy(3), post("order"), send).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RetryError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_discardable_response_returned_verbatim() {
        let calls = Arc::new(AtomicU32::new(0));
        let send = scripted(calls.clone(), vec![Ok(StatusCode::SERVICE_UNAVAILABLE)]);

        let resp = execute(&policy(3), post("order"), send).await.unwrap();

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_post_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let send = scripted(
            calls.clone(),
            vec![Err("reset"), Ok(StatusCode::INTERNAL_SERVER_ERROR), Ok(StatusCode::CREATED)],
        );

        let resp = execute(&policy(3), post("order").force_retry(), send)
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_sends_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let send = scripted(calls.clone(), vec![Ok(StatusCode::SERVICE_UNAVAILABLE)]);

        let resp = execute(&policy(0), get(), send).await.unwrap();

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_attempt_k() {
        for k in 1..=4u32 {
            let calls = Arc::new(AtomicU32::new(0));
            let mut script = vec![Err("down"); (k - 1) as usize];
            script.push(Ok(StatusCode::OK));
            let send = scripted(calls.clone(), script);

            let resp = execute(&policy(4), get(), send).await.unwrap();

            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(calls.load(Ordering::SeqCst), k);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_the_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let send = scripted(calls.clone(), vec![Err("down")]);
        let ctx = CallContext::new().with_timeout(Duration::from_millis(200));

        let start = Instant::now();
        let err = execute(&policy(4), get().with_call_context(ctx), send)
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::DeadlineExceeded));
        // Attempt 1 at 0ms, attempt 2 at 100ms, the 200ms wait is cut by the deadline.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(210));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait() {
        let calls = Arc::new(AtomicU32::new(0));
        let send = scripted(calls.clone(), vec![Ok(StatusCode::SERVICE_UNAVAILABLE)]);
        let ctx = CallContext::new();

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            canceller.cancel();
        });

        let err = execute(&policy(5), get().with_call_context(ctx), send)
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Cancelled));
        // Cancelled during the wait before attempt 3.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_exchange_is_interrupted() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
        let send = |_req: Request<RetryBody>| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, BoxError>(respond(StatusCode::OK))
        };

        let err = execute(&policy(3), get().with_call_context(ctx), send)
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_timeout_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let send = move |_req: Request<RetryBody>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                let elapsed = tokio::time::timeout(Duration::from_millis(1), std::future::pending::<()>())
                    .await
                    .unwrap_err();
                Err::<TestResponse, BoxError>(Box::new(elapsed))
            }
        };

        let err = execute(&policy(3), get(), send).await.unwrap_err();

        assert!(matches!(err, RetryError::DeadlineExceeded));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrapped_interrupt_in_source_chain() {
        #[derive(Debug)]
        struct Wrapper(Interrupt);

        impl std::fmt::Display for Wrapper {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "client error")
            }
        }

        impl StdError for Wrapper {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(&self.0)
            }
        }

        let send = |_req: Request<RetryBody>| async {
            Err::<TestResponse, BoxError>(Box::new(Wrapper(Interrupt::Cancelled)))
        };

        let err = execute(&policy(3), get(), send).await.unwrap_err();
        assert!(matches!(err, RetryError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_sends_identical_body() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let send = move |req: Request<RetryBody>| {
            let log = log.clone();
            async move {
                let bytes = req.into_body().collect().await?.to_bytes();
                let mut log = log.lock().unwrap();
                log.push(bytes);
                let status = if log.len() < 3 {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::OK
                };
                Ok::<_, BoxError>(respond(status))
            }
        };

        let req = post(r#"{"sku":"A-1","qty":2}"#).force_retry();
        execute(&policy(3), req, send).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        for body in seen.iter() {
            assert_eq!(&body[..], br#"{"sku":"A-1","qty":2}"#);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_seekable_body_identical_on_every_attempt() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let send = move |req: Request<RetryBody>| {
            let log = log.clone();
            async move {
                let bytes = req.into_body().collect().await?.to_bytes();
                log.lock().unwrap().push(bytes);
                Ok::<_, BoxError>(respond(StatusCode::GATEWAY_TIMEOUT))
            }
        };

        let mut cursor = io::Cursor::new(b"HEADERpayload-bytes".to_vec());
        cursor.set_position(6);
        let req = Request::put("http://backend.local/blob")
            .body(RetryBody::from_reader(cursor))
            .unwrap()
            .force_retry();
        let resp = execute(&policy(3), req, send).await.unwrap();

        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|b| &b[..] == b"payload-bytes"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreplayable_stream_demotes_to_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let send = scripted(calls.clone(), vec![Ok(StatusCode::SERVICE_UNAVAILABLE)]);

        let frames = futures_util::stream::iter(vec![Ok::<_, io::Error>(Frame::data(
            Bytes::from_static(b"chunk"),
        ))]);
        let req = Request::get("http://backend.local/upload")
            .body(RetryBody::wrap(StreamBody::new(frames)))
            .unwrap();

        let no_buffering = RetryPolicy::builder()
            .max_attempts(3)
            .max_buffered_body_bytes(0)
            .metrics_enabled(false)
            .build()
            .unwrap();
        let resp = execute(&no_buffering, req, send).await.unwrap();

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_outgrowing_buffer_is_sent_whole_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let send = move |req: Request<RetryBody>| {
            let log = log.clone();
            async move {
                let bytes = req.into_body().collect().await?.to_bytes();
                log.lock().unwrap().push(bytes);
                Ok::<_, BoxError>(respond(StatusCode::SERVICE_UNAVAILABLE))
            }
        };

        let frames = futures_util::stream::iter(vec![
            Ok::<_, io::Error>(Frame::data(Bytes::from_static(b"01234567"))),
            Ok(Frame::data(Bytes::from_static(b"89abcdef"))),
        ]);
        let req = Request::put("http://backend.local/upload")
            .body(RetryBody::wrap(StreamBody::new(frames)))
            .unwrap()
            .force_retry();
        let small_buffer = RetryPolicy::builder()
            .max_attempts(3)
            .max_buffered_body_bytes(10)
            .metrics_enabled(false)
            .build()
            .unwrap();

        let resp = execute(&small_buffer, req, send).await.unwrap();

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(&seen[0][..], b"0123456789abcdef");
    }

    /// Response body that logs when it is read to the end and when it is dropped.
    #[derive(Debug)]
    struct Tracked {
        id: usize,
        events: Arc<Mutex<Vec<String>>>,
        chunk: Option<Bytes>,
        stall: bool,
    }

    impl Body for Tracked {
        type Data = Bytes;
        type Error = io::Error;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
            if let Some(chunk) = self.chunk.take() {
                return Poll::Ready(Some(Ok(Frame::data(chunk))));
            }
            if self.stall {
                return Poll::Pending;
            }
            let event = format!("drained {}", self.id);
            self.events.lock().unwrap().push(event);
            Poll::Ready(None)
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            let event = format!("dropped {}", self.id);
            self.events.lock().unwrap().push(event);
        }
    }

    /// Answers 503 with a tracked body until `ok_at`, then 200.
    fn tracking(
        events: Arc<Mutex<Vec<String>>>,
        ok_at: usize,
        stall: bool,
    ) -> impl FnMut(Request<RetryBody>) -> futures_util::future::Ready<Result<Response<Tracked>, BoxError>>
    {
        let mut sent = 0;
        move |_req| {
            sent += 1;
            events.lock().unwrap().push(format!("send {}", sent));
            let status = if sent >= ok_at {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            let body = Tracked {
                id: sent,
                events: events.clone(),
                chunk: Some(Bytes::from_static(b"Service Unavailable")),
                stall,
            };
            futures_util::future::ready(Ok(Response::builder().status(status).body(body).unwrap()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_discarded_response_released_before_next_send() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let send = tracking(events.clone(), 3, false);

        let resp = execute(&policy(3), get(), send).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let seen = events.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "send 1", "drained 1", "dropped 1",
                "send 2", "drained 2", "dropped 2",
                "send 3",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_drain() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let send = tracking(events.clone(), usize::MAX, true);
        let ctx = CallContext::new();

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = execute(&policy(3), get().with_call_context(ctx), send)
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Cancelled));
        let seen = events.lock().unwrap().clone();
        assert_eq!(seen, vec!["send 1", "dropped 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_failure_is_terminal() {
        let calls = Arc::new(AtomicU32::new(0));
        let send = scripted(calls.clone(), vec![Ok(StatusCode::SERVICE_UNAVAILABLE)]);

        let factory_calls = Arc::new(AtomicU32::new(0));
        let counter = factory_calls.clone();
        let body = RetryBody::with_replay("data", move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(RetryBody::from("data"))
            } else {
                Err(io::Error::new(io::ErrorKind::Other, "source closed"))
            }
        });

        let err = execute(&policy(3), post(body).force_retry(), send)
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RetryError::BodyReplay(ReplayError::Factory(_))));
        assert!(err.to_string().starts_with("failed reading body for retry: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interruption_detection() {
        let plain: BoxError = "boom".into();
        assert_eq!(interruption(&*plain), None);

        let direct: BoxError = Box::new(Interrupt::DeadlineExceeded);
        assert_eq!(interruption(&*direct), Some(Interrupt::DeadlineExceeded));
    }
}
