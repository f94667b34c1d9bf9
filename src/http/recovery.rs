//! Panic recovery stage.
//!
//! Outermost stage of the pipeline. A panic anywhere downstream becomes a
//! generic 500 for that request only; the process keeps serving.
//!
//! Handler panics are normally caught one stage further in, by the request
//! logger, so the 500 is logged with the request's context. This layer is
//! the backstop for anything that escapes it.

use std::any::Any;
use std::sync::Arc;

use axum::response::Response;
use tower_http::catch_panic::CatchPanicLayer;

use crate::http::response::internal_error;
use crate::observability::metrics;
use crate::security::SecurityHeaders;

/// Build the recovery layer. The 500 still carries the security headers.
pub fn recovery_layer(
    headers: Arc<SecurityHeaders>,
) -> CatchPanicLayer<impl Fn(Box<dyn Any + Send + 'static>) -> Response + Clone> {
    CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| {
        tracing::error!(panic = %panic_message(panic.as_ref()), "Request handler panicked");
        panic_response(&headers)
    })
}

/// The 500 returned for a panicked request.
pub fn panic_response(headers: &SecurityHeaders) -> Response {
    metrics::record_panic();
    let mut response = internal_error();
    headers.apply(response.headers_mut());
    response
}

pub fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else {
        "unknown panic"
    }
}
