// Instagram private web API client: transport, pacing/retry, pagination,
// user lookups and session identity.
//
// Each submodule handles one layer; RateLimitedFetcher is shared (via Arc)
// by the pager and the resolver so all requests go through one throttle.

pub mod client;
pub mod fetcher;
pub mod friendships;
pub mod identity;
pub mod users;

use serde_json::Value;

/// Read an id that the API sends either as a string or as a number.
pub(crate) fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
