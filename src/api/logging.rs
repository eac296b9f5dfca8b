use crate::util::parse_bool_flag;
use serde_json::Value;

const DEBUG_PAYLOAD_ENV: &str = "CODELOOP_DEBUG_PAYLOAD";

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(parse_bool_flag)
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    tracing::debug!(
        target: "codeloop::api",
        url = request_url,
        "payload_request\n{formatted_payload}"
    );
}

pub fn emit_sse_parse_error(
    event_type: Option<&str>,
    json_data: &str,
    parse_error: &serde_json::Error,
) {
    tracing::warn!(
        target: "codeloop::api",
        event_type = event_type.unwrap_or("<none>"),
        data = json_data,
        "sse_parse_failed: {parse_error}"
    );
}
