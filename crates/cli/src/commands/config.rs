use std::path::PathBuf;

use farebot_core::config::{AppConfig, LoadOptions};

/// Prints the effective configuration after file, environment, and default
/// resolution, with secrets masked.
pub fn run(config_path: Option<PathBuf>) -> String {
    let config = match AppConfig::load(LoadOptions { config_path, ..LoadOptions::default() }) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let summary = config.redacted_summary();
    let mut lines =
        vec!["effective config (source precedence: overrides > env > file > default):".to_string()];
    render_value(&mut lines, "", &summary);
    lines.join("\n")
}

fn render_value(lines: &mut Vec<String>, prefix: &str, value: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, nested) in map {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                render_value(lines, &path, nested);
            }
        }
        serde_json::Value::Null => lines.push(format!("  {prefix} = (unset)")),
        other => lines.push(format!("  {prefix} = {other}")),
    }
}
