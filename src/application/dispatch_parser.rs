//! Extracts fenced tool-call blocks from supervisor output text (spec §4.1).
//!
//! The agent process adapter already turns raw child JSON lines into
//! [`AgentLine`](crate::domain::ports::AgentLine) events; this module picks
//! up from the `AgentMessage` text those events carry and finds the fenced
//! `spawn_agent` / `spawn_swarm` / `check_workers` / `merge_results` blocks
//! within it.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

use crate::domain::error::DispatchError;
use crate::domain::models::{
    CheckWorkersPayload, DispatchRequest, MergeResultsPayload, Priority, ResolveConflicts,
    ReturnFormat, SpawnAgentPayload, SpawnSwarmPayload, Strategy,
};

/// A dispatch request paired with the correlation id carried in its JSON
/// body, if any (spec §3: `request_id` is an opaque token echoed into the
/// response file's delimiter comments).
#[derive(Debug, Clone)]
pub struct ParsedDispatch {
    /// The validated, normalized request.
    pub request: DispatchRequest,
    /// The `request_id` field from the JSON body, when present.
    pub request_id: Option<String>,
}

fn block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"```(spawn_agent|spawn_swarm|check_workers|merge_results)\s*\n([\s\S]*?)```")
            .expect("static dispatch block regex is valid")
    })
}

fn trailing_comma_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("static trailing-comma regex is valid"))
}

/// Extract every well-formed dispatch in textual order, skipping and
/// logging (never raising) any block that fails to parse, schema-validate,
/// or normalize (spec §4.1, §7 `InvalidDispatch`).
#[must_use]
pub fn extract_dispatches(text: &str) -> Vec<ParsedDispatch> {
    let mut out = Vec::new();
    for captures in block_regex().captures_iter(text) {
        let tool = &captures[1];
        let body = captures[2].trim();
        match parse_block(tool, body) {
            Ok(parsed) => out.push(parsed),
            Err(e) => warn!(tool, error = %e, "skipping malformed dispatch block"),
        }
    }
    out
}

fn repair_json(body: &str) -> String {
    let no_trailing_commas = trailing_comma_regex().replace_all(body, "$1");
    if !no_trailing_commas.contains('"') && no_trailing_commas.contains('\'') {
        no_trailing_commas.replace('\'', "\"")
    } else {
        no_trailing_commas.into_owned()
    }
}

fn parse_block(tool: &str, body: &str) -> Result<ParsedDispatch, DispatchError> {
    let repaired = repair_json(body);
    let value: Value = serde_json::from_str(&repaired)
        .map_err(|e| DispatchError::NotAnObject(format!("{tool}: {e}")))?;
    let Value::Object(map) = value else {
        return Err(DispatchError::NotAnObject(tool.to_string()));
    };
    let request_id = map
        .get("request_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    let request = match tool {
        "spawn_agent" => DispatchRequest::SpawnAgent(normalize_spawn_agent(&map)?),
        "spawn_swarm" => DispatchRequest::SpawnSwarm(normalize_spawn_swarm(&map)?),
        "check_workers" => DispatchRequest::CheckWorkers(CheckWorkersPayload {}),
        "merge_results" => DispatchRequest::MergeResults(normalize_merge_results(&map)),
        other => return Err(DispatchError::UnknownTool(other.to_string())),
    };

    Ok(ParsedDispatch { request, request_id })
}

fn first_string(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| map.get(*k))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn first_string_list(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Vec<String> {
    for key in keys {
        let Some(value) = map.get(*key) else { continue };
        match value {
            Value::Array(items) => {
                return items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            }
            Value::String(s) => return vec![s.clone()],
            _ => {}
        }
    }
    Vec::new()
}

fn normalize_priority(map: &serde_json::Map<String, Value>) -> Priority {
    match map.get("priority").and_then(Value::as_str) {
        Some(s) => match s.to_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Normal,
        },
        None => Priority::Normal,
    }
}

fn normalize_return_format(map: &serde_json::Map<String, Value>) -> ReturnFormat {
    match map.get("return_format").and_then(Value::as_str) {
        Some(s) => {
            let lower = s.to_lowercase();
            if lower.contains("diff") {
                ReturnFormat::Diff
            } else {
                ReturnFormat::Summary
            }
        }
        None => ReturnFormat::Summary,
    }
}

fn normalize_strategy(map: &serde_json::Map<String, Value>) -> Strategy {
    match map.get("strategy").and_then(Value::as_str) {
        Some(s) => {
            let canon = s.to_lowercase().replace(['_', ' '], "-");
            match canon.as_str() {
                "pipeline" => Strategy::Pipeline,
                "map-reduce" => Strategy::MapReduce,
                "debate" => Strategy::Debate,
                _ => Strategy::FanOut,
            }
        }
        None => Strategy::FanOut,
    }
}

fn normalize_spawn_agent_from_map(
    map: &serde_json::Map<String, Value>,
) -> Result<SpawnAgentPayload, DispatchError> {
    let task = first_string(map, &["task", "objective", "description"])
        .ok_or_else(|| DispatchError::InvalidPayload("missing task/objective/description".to_string()))?;
    if task.trim().is_empty() {
        return Err(DispatchError::InvalidPayload("task must not be empty".to_string()));
    }
    Ok(SpawnAgentPayload {
        task,
        scope: first_string_list(map, &["scope", "files", "paths"]),
        context: first_string(map, &["context", "notes", "constraints"]).unwrap_or_default(),
        priority: normalize_priority(map),
        return_format: normalize_return_format(map),
    })
}

fn normalize_spawn_agent(
    map: &serde_json::Map<String, Value>,
) -> Result<SpawnAgentPayload, DispatchError> {
    normalize_spawn_agent_from_map(map)
}

fn normalize_spawn_swarm(
    map: &serde_json::Map<String, Value>,
) -> Result<SpawnSwarmPayload, DispatchError> {
    let raw_tasks = map.get("tasks").or_else(|| map.get("workers"));
    let tasks = match raw_tasks {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_object())
            .map(normalize_spawn_agent_from_map)
            .collect::<Result<Vec<_>, _>>()?,
        _ => {
            if first_string(map, &["task", "objective", "description"]).is_some() {
                vec![normalize_spawn_agent_from_map(map)?]
            } else {
                Vec::new()
            }
        }
    };
    if tasks.is_empty() {
        return Err(DispatchError::InvalidPayload("spawn_swarm requires at least one task".to_string()));
    }
    let wait = map.get("wait").and_then(Value::as_bool).unwrap_or(true);
    Ok(SpawnSwarmPayload {
        tasks,
        strategy: normalize_strategy(map),
        wait,
    })
}

fn normalize_merge_results(map: &serde_json::Map<String, Value>) -> MergeResultsPayload {
    let worker_ids = map.get("worker_ids").and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    });
    let resolve_conflicts = match map.get("resolve_conflicts").and_then(Value::as_str) {
        Some("ours") => ResolveConflicts::Ours,
        Some("theirs") => ResolveConflicts::Theirs,
        _ => ResolveConflicts::Abort,
    };
    MergeResultsPayload {
        worker_ids,
        resolve_conflicts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_spawn_agent_block() {
        let text = "preamble\n```spawn_agent\n{\"task\": \"fix bug\"}\n```\ntrailer";
        let parsed = extract_dispatches(text);
        assert_eq!(parsed.len(), 1);
        match &parsed[0].request {
            DispatchRequest::SpawnAgent(p) => assert_eq!(p.task, "fix bug"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn returns_requests_in_textual_order_and_skips_malformed() {
        let text = "\
```spawn_agent\n{\"task\": \"first\"}\n```\n\
```spawn_agent\n{not json at all}\n```\n\
```check_workers\n{}\n```\n";
        let parsed = extract_dispatches(text);
        assert_eq!(parsed.len(), 2);
        match &parsed[0].request {
            DispatchRequest::SpawnAgent(p) => assert_eq!(p.task, "first"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(parsed[1].request, DispatchRequest::CheckWorkers(_)));
    }

    #[test]
    fn tolerates_trailing_commas() {
        let text = "```spawn_agent\n{\"task\": \"fix bug\", \"scope\": [\"src/**\",],}\n```";
        let parsed = extract_dispatches(text);
        assert_eq!(parsed.len(), 1);
        match &parsed[0].request {
            DispatchRequest::SpawnAgent(p) => assert_eq!(p.scope, vec!["src/**".to_string()]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tolerates_single_quoted_json_when_no_double_quotes_present() {
        let text = "```spawn_agent\n{'task': 'fix bug'}\n```";
        let parsed = extract_dispatches(text);
        assert_eq!(parsed.len(), 1);
        match &parsed[0].request {
            DispatchRequest::SpawnAgent(p) => assert_eq!(p.task, "fix bug"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn accepts_synonym_fields_and_normalizes_priority_and_format() {
        let text = "```spawn_agent\n{\"objective\": \"do it\", \"files\": \"src/a.rs\", \"priority\": \"HIGH\", \"return_format\": \"unified-diff\"}\n```";
        let parsed = extract_dispatches(text);
        match &parsed[0].request {
            DispatchRequest::SpawnAgent(p) => {
                assert_eq!(p.task, "do it");
                assert_eq!(p.scope, vec!["src/a.rs".to_string()]);
                assert_eq!(p.priority, Priority::High);
                assert_eq!(p.return_format, ReturnFormat::Diff);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn spawn_swarm_wraps_bare_task_as_single_element() {
        let text = "```spawn_swarm\n{\"task\": \"solo\", \"strategy\": \"Map Reduce\"}\n```";
        let parsed = extract_dispatches(text);
        match &parsed[0].request {
            DispatchRequest::SpawnSwarm(p) => {
                assert_eq!(p.tasks.len(), 1);
                assert_eq!(p.strategy, Strategy::MapReduce);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn spawn_swarm_without_tasks_is_skipped() {
        let text = "```spawn_swarm\n{\"strategy\": \"fan-out\"}\n```";
        assert!(extract_dispatches(text).is_empty());
    }

    #[test]
    fn captures_request_id_when_present() {
        let text = "```check_workers\n{\"request_id\": \"corr-1\"}\n```";
        let parsed = extract_dispatches(text);
        assert_eq!(parsed[0].request_id.as_deref(), Some("corr-1"));
    }

    proptest::proptest! {
        /// Property: `normalize_priority` never produces anything but the
        /// three known variants, and is case-insensitive for the recognized
        /// ones (spec §4.1: "coerce priority to lowercase").
        #[test]
        fn prop_priority_normalization_is_total_and_case_insensitive(raw in "[A-Za-z]{0,10}") {
            let mut map = serde_json::Map::new();
            map.insert("priority".to_string(), Value::String(raw.clone()));
            let priority = normalize_priority(&map);
            match raw.to_lowercase().as_str() {
                "high" => proptest::prop_assert_eq!(priority, Priority::High),
                "low" => proptest::prop_assert_eq!(priority, Priority::Low),
                _ => proptest::prop_assert_eq!(priority, Priority::Normal),
            }
        }

        /// Property: any `return_format` containing "diff" (in any case)
        /// normalizes to `Diff`; everything else falls back to `Summary`
        /// (spec §4.1), and the function never panics on arbitrary input.
        #[test]
        fn prop_return_format_normalization_never_panics_and_is_total(raw in ".{0,20}") {
            let mut map = serde_json::Map::new();
            map.insert("return_format".to_string(), Value::String(raw.clone()));
            let format = normalize_return_format(&map);
            if raw.to_lowercase().contains("diff") {
                proptest::prop_assert_eq!(format, ReturnFormat::Diff);
            } else {
                proptest::prop_assert_eq!(format, ReturnFormat::Summary);
            }
        }

        /// Property: extraction never panics regardless of fence/body noise,
        /// and well-formed blocks interleaved with arbitrary junk text still
        /// yield exactly the well-formed ones, in order (spec §8 property 1).
        #[test]
        fn prop_extraction_is_robust_to_surrounding_noise(
            prefix in "[a-zA-Z0-9 ,.!?]{0,30}",
            suffix in "[a-zA-Z0-9 ,.!?]{0,30}",
            task in "[a-zA-Z ]{1,20}",
        ) {
            let text = format!(
                "{prefix}\n```spawn_agent\n{{\"task\": \"{task}\"}}\n```\n{suffix}"
            );
            let parsed = extract_dispatches(&text);
            proptest::prop_assert_eq!(parsed.len(), 1);
            match &parsed[0].request {
                DispatchRequest::SpawnAgent(p) => proptest::prop_assert_eq!(&p.task, &task),
                other => return Err(proptest::test_runner::TestCaseError::fail(format!(
                    "unexpected request: {other:?}"
                ))),
            }
        }
    }
}
