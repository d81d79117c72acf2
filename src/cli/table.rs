//! Table rendering for `workers`/`merge` IPC replies, in the teacher's
//! `comfy-table` style (colored status cells, UTF-8 borders, dynamic width).

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde_json::Value;

/// Render a `check_workers` reply's `workers` array as a table. Falls back to
/// a one-line placeholder when the payload shape is unexpected.
#[must_use]
pub fn format_workers(reply: &Value) -> String {
    let Some(workers) = reply
        .get("payload")
        .and_then(|p| p.get("workers"))
        .and_then(Value::as_array)
    else {
        return "(no worker data in reply)".to_string();
    };
    if workers.is_empty() {
        return "No workers have run yet.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Worker").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Running").add_attribute(Attribute::Bold),
            Cell::new("Approval").add_attribute(Attribute::Bold),
            Cell::new("Task").add_attribute(Attribute::Bold),
        ]);

    for worker in workers {
        let worker_id = worker.get("worker_id").and_then(Value::as_str).unwrap_or("?");
        let status = worker.get("status").and_then(Value::as_str).unwrap_or("unknown");
        let running = worker.get("running").and_then(Value::as_bool).unwrap_or(false);
        let requires_approval = worker
            .get("requires_approval")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let task = worker.get("task").and_then(Value::as_str).unwrap_or("");

        table.add_row(vec![
            Cell::new(worker_id),
            Cell::new(status).fg(status_color(status)),
            Cell::new(if running { "yes" } else { "no" }),
            Cell::new(if requires_approval { "pending" } else { "-" })
                .fg(if requires_approval { Color::Yellow } else { Color::Reset }),
            Cell::new(truncate(task, 48)),
        ]);
    }

    table.to_string()
}

fn status_color(status: &str) -> Color {
    match status {
        "completed" | "merged" => Color::Green,
        "running" | "queued" => Color::Cyan,
        "pending_approval" => Color::Yellow,
        "failed" | "merge_conflict" => Color::Red,
        "blocked" | "timed_out" => Color::Magenta,
        _ => Color::Reset,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_rows_for_each_worker() {
        let reply = json!({
            "payload": {
                "workers": [
                    {"worker_id": "w1", "status": "completed", "running": false, "requires_approval": false, "task": "fix the bug"},
                    {"worker_id": "w2", "status": "pending_approval", "running": false, "requires_approval": true, "task": "add feature"},
                ]
            }
        });
        let rendered = format_workers(&reply);
        assert!(rendered.contains("w1"));
        assert!(rendered.contains("w2"));
        assert!(rendered.contains("pending"));
    }

    #[test]
    fn empty_worker_list_is_a_plain_message() {
        let reply = json!({ "payload": { "workers": [] } });
        assert_eq!(format_workers(&reply), "No workers have run yet.");
    }

    #[test]
    fn missing_payload_is_a_plain_message() {
        let reply = json!({});
        assert_eq!(format_workers(&reply), "(no worker data in reply)");
    }

    #[test]
    fn truncate_respects_char_count_not_bytes() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a very long task description", 10), "this is...");
    }
}
