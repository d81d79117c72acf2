//! Dual human/JSON rendering for command results.
//!
//! Every command builds a small `*Output` struct implementing
//! [`CommandOutput`] and hands it to [`print_output`], which picks the
//! rendering based on the global `--json` flag.

use serde_json::Value;

/// A command's result, renderable either for a human terminal or as JSON
/// for scripting.
pub trait CommandOutput {
    /// Render for a human reading a terminal.
    fn to_human(&self) -> String;

    /// Render as a JSON value for `--json` mode.
    fn to_json(&self) -> Value;
}

/// Print `output` in the mode selected by `json_mode`.
pub fn print_output(output: &impl CommandOutput, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&output.to_json()).unwrap_or_default());
    } else {
        println!("{}", output.to_human());
    }
}

impl CommandOutput for Value {
    fn to_human(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    fn to_json(&self) -> Value {
        self.clone()
    }
}
