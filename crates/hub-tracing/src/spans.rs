//! Span builder helpers for gateway instrumentation.

/// Create a tracing span for one inbound gateway request.
///
/// Usage: `let span = gateway_request_span!(correlation_id, mode, route);`
///
/// `status` is recorded once the handler has produced a response.
#[macro_export]
macro_rules! gateway_request_span {
    ($correlation_id:expr, $mode:expr, $route:expr) => {
        tracing::info_span!(
            "gateway_request",
            correlation_id = %$correlation_id,
            mode = %$mode,
            route = %$route,
            status = tracing::field::Empty,
        )
    };
}

/// Create a tracing span for the outbound call to the backend.
#[macro_export]
macro_rules! backend_forward_span {
    ($correlation_id:expr, $method:expr, $target:expr) => {
        tracing::info_span!(
            "backend_forward",
            correlation_id = %$correlation_id,
            method = %$method,
            target = %$target,
            status = tracing::field::Empty,
            content_type = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}
