//! Reduction of a simulation trace to a [`SimulationResult`].

use serde_json::Value;
use userop_core::{AaCode, SimulationResult};

#[derive(Debug)]
struct FrameError {
    depth: usize,
    message: String,
}

/// Extracts the outcome of a simulated call from the endpoint's raw response.
///
/// A non-reverting top-level status is a success. Otherwise the first error message carrying
/// an `AAxx` code wins; without one, the error of the deepest failing frame becomes the reason.
pub fn extract_outcome(raw: Value) -> SimulationResult {
    let mut errors = Vec::new();
    if let Some(message) = frame_message(&raw) {
        errors.push(FrameError { depth: 0, message });
    }
    for root in ["trace", "call_trace", "calls"] {
        if let Some(frames) = raw.get(root) {
            collect_frames(frames, 0, &mut errors);
        }
    }
    if let Some(frames) = raw.get("transaction").and_then(|tx| tx.get("call_trace")) {
        collect_frames(frames, 0, &mut errors);
    }

    let succeeded = match reported_status(&raw) {
        Some(status) => status,
        None => errors.is_empty(),
    };
    if succeeded {
        return SimulationResult::success(raw);
    }

    let message = errors
        .iter()
        .find(|e| AaCode::find_in(&e.message).is_some())
        .or_else(|| errors.iter().rev().max_by_key(|e| e.depth))
        .map(|e| e.message.clone());
    SimulationResult::failure(message.as_deref(), raw)
}

fn reported_status(raw: &Value) -> Option<bool> {
    let status = raw.get("status").or_else(|| raw.get("transaction")?.get("status"))?;
    match status {
        Value::Bool(ok) => Some(*ok),
        Value::Number(n) => n.as_u64().map(|n| n == 1),
        Value::String(s) => match s.as_str() {
            "0x1" | "1" | "success" => Some(true),
            "0x0" | "0" | "reverted" | "failed" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// `errorReason` is preferred over the generic `error` of the same frame.
fn frame_message(frame: &Value) -> Option<String> {
    ["errorReason", "error_reason", "error"]
        .iter()
        .filter_map(|key| frame.get(*key)?.as_str())
        .find(|message| !message.is_empty())
        .map(str::to_string)
}

fn collect_frames(frames: &Value, nesting: usize, out: &mut Vec<FrameError>) {
    match frames {
        Value::Array(items) => {
            for item in items {
                collect_frames(item, nesting, out);
            }
        }
        Value::Object(_) => {
            let depth = frames
                .get("traceAddress")
                .or_else(|| frames.get("trace_address"))
                .and_then(Value::as_array)
                .map(Vec::len)
                .or_else(|| frames.get("depth").and_then(Value::as_u64).map(|d| d as usize))
                .unwrap_or(nesting);
            if let Some(message) = frame_message(frames) {
                out.push(FrameError { depth, message });
            }
            if let Some(children) = frames.get("calls") {
                collect_frames(children, nesting + 1, out);
            }
        }
        _ => {}
    }
}
