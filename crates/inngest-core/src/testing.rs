//! Test fixtures for building execution requests and asserting on engine
//! output, available behind the `testing` feature (or automatically under
//! `cfg(test)`), mirroring the teacher framework's `testing` module.

use std::collections::HashMap;

use crate::model::{IncomingOp, OutgoingOp};

/// Build a memoized-step map with V1/V2 `{type:"data", ...}` entries,
/// keyed by already-hashed id. Handy for constructing scenario C/D/E style
/// fixtures (spec §8) without hand-writing JSON.
pub fn memoized_data(entries: impl IntoIterator<Item = (String, serde_json::Value)>) -> HashMap<String, IncomingOp> {
    entries
        .into_iter()
        .map(|(id, data)| {
            (
                id.clone(),
                IncomingOp {
                    id,
                    data: Some(data),
                    error: None,
                    input: None,
                },
            )
        })
        .collect()
}

/// Build a memoized-step map with a single `{type:"error", ...}` entry.
pub fn memoized_error(id: impl Into<String>, error: crate::model::SerializedError) -> HashMap<String, IncomingOp> {
    let id = id.into();
    HashMap::from([(
        id.clone(),
        IncomingOp {
            id,
            data: None,
            error: Some(error),
            input: None,
        },
    )])
}

/// Assert a set of `OutgoingOp`s contains exactly one `StepPlanned`/`Sleep`/
/// etc. entry for the given hashed id, and return it for further checks.
pub fn find_op<'a>(ops: &'a [OutgoingOp], hashed_id: &str) -> &'a OutgoingOp {
    ops.iter()
        .find(|op| op.id == hashed_id)
        .unwrap_or_else(|| panic!("expected an OutgoingOp for id {hashed_id}, found none"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memoized_data_builds_v1_shape() {
        let map = memoized_data([("h1".to_string(), serde_json::json!(42))]);
        assert_eq!(map["h1"].data, Some(serde_json::json!(42)));
    }
}
