//! The statistics-collector contract (§6): "the core exposes to the
//! statistics collector exactly these events: session-start, session-finish,
//! session-fail(error), session-blocked (saturation), phase-status-change."
//! Kept as a trait with no-op defaults so a collector only implements the
//! events it cares about — mirrors the teacher's `Session` trait shape in
//! its connection layer.

use std::time::Instant;

use volley_common::SessionError;

use crate::status::PhaseStatus;

pub trait BenchmarkObserver: Send + Sync {
    fn session_start(&self, _phase: &str) {}
    fn session_finish(&self, _phase: &str) {}
    fn session_fail(&self, _phase: &str, _err: &SessionError) {}
    fn session_blocked(&self, _phase: &str) {}
    fn phase_status_change(&self, _phase: &str, _from: PhaseStatus, _to: PhaseStatus, _at: Instant) {}
}

/// Discards every event. The default when a caller has no reporter wired
/// up (e.g. the property tests in this crate).
pub struct NullObserver;

impl BenchmarkObserver for NullObserver {}
