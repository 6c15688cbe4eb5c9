//! Per-thread codec scope.
//!
//! `serde` hands nested values an opaque error type, so `Versioned` records
//! the typed failure here and the enclosing `ValueCodec` call picks it up.
//! The scope also carries the fingerprint registry the codec was built with.
//! Codec calls never suspend, so a thread-local stack is sufficient.

use std::cell::RefCell;
use std::sync::Arc;

use crate::{CodecError, FingerprintRegistry};

struct Scope {
    fingerprints: Arc<FingerprintRegistry>,
    failure: Option<CodecError>,
}

thread_local! {
    static SCOPES: RefCell<Vec<Scope>> = const { RefCell::new(Vec::new()) };
}

struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPES.with(|scopes| {
            scopes.borrow_mut().pop();
        });
    }
}

/// Outcome of a failed scoped codec call.
pub(crate) enum ScopedFailure {
    /// A nested `Versioned` value recorded a typed failure.
    Nested(CodecError),
    /// Plain serde failure.
    Serde(serde_json::Error),
}

/// Run `f` with `fingerprints` as the active registry.
pub(crate) fn run<R>(
    fingerprints: &Arc<FingerprintRegistry>,
    f: impl FnOnce() -> Result<R, serde_json::Error>,
) -> Result<R, ScopedFailure> {
    SCOPES.with(|scopes| {
        scopes.borrow_mut().push(Scope {
            fingerprints: Arc::clone(fingerprints),
            failure: None,
        })
    });
    let _guard = ScopeGuard;

    let result = f();
    let failure = SCOPES.with(|scopes| {
        scopes
            .borrow_mut()
            .last_mut()
            .and_then(|scope| scope.failure.take())
    });

    match (result, failure) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(nested)) => Err(ScopedFailure::Nested(nested)),
        (Err(e), None) => Err(ScopedFailure::Serde(e)),
    }
}

/// Registry of the innermost scope, or the process-wide registry.
pub(crate) fn current_fingerprints() -> Arc<FingerprintRegistry> {
    SCOPES
        .with(|scopes| {
            scopes
                .borrow()
                .last()
                .map(|scope| Arc::clone(&scope.fingerprints))
        })
        .unwrap_or_else(FingerprintRegistry::global)
}

/// Record a typed failure; the first one recorded in a scope wins.
pub(crate) fn record_failure(err: CodecError) {
    SCOPES.with(|scopes| {
        if let Some(scope) = scopes.borrow_mut().last_mut() {
            scope.failure.get_or_insert(err);
        }
    });
}
