//! A stand-in for the HTTP client pool the core consumes (§6: `submit` and
//! `schedule`, neither of which the core ever blocks on). Not wired into the
//! demonstration step library — `DelayStep`'s `schedule_delay`/`Park` already
//! exercises the same timer/park/wake path a real HTTP step would use, and
//! `SessionContext` has no accessor for a transport handle, by design (§6
//! only requires that callbacks post onto the owning executor, which
//! `ExecutorMailbox` already provides). This module exists to give the
//! contract itself a concrete, tested implementation.

use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct HttpRequest {
    pub status_hint: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct HttpResponse {
    pub status: u16,
}

/// Fakes network latency with a background thread sleep, then invokes the
/// callback from that thread — deliberately not the caller's thread, so
/// anything downstream is forced to treat the callback as cross-thread
/// (§9: "do not assume transport callbacks run on the executor thread").
pub struct NoopHttpTransport {
    fake_latency: Duration,
}

impl NoopHttpTransport {
    pub fn new(fake_latency: Duration) -> Self {
        Self { fake_latency }
    }

    pub fn submit<F>(&self, request: HttpRequest, on_response: F)
    where
        F: FnOnce(HttpResponse) + Send + 'static,
    {
        let delay = self.fake_latency;
        let status = request.status_hint;
        thread::spawn(move || {
            thread::sleep(delay);
            on_response(HttpResponse { status });
        });
    }

    pub fn schedule<F>(&self, runnable: F, delay: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        thread::spawn(move || {
            thread::sleep(delay);
            runnable();
        });
    }
}
