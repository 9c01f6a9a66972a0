pub mod chat;
pub mod config;
pub mod doctor;
pub mod tools;

use serde::Serialize;

/// Terminal outcome of one CLI invocation: what to print and how to exit.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// One-line machine-readable status for non-interactive outcomes, e.g. a
/// chat session that could not start because the config did not validate.
#[derive(Debug, Serialize)]
struct StatusLine<'a> {
    command: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: &'a str,
}

impl CommandResult {
    pub fn success(command: &str, message: impl AsRef<str>) -> Self {
        Self { exit_code: 0, output: status_line(command, "ok", None, message.as_ref()) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl AsRef<str>,
        exit_code: u8,
    ) -> Self {
        Self {
            exit_code,
            output: status_line(command, "error", Some(error_class), message.as_ref()),
        }
    }
}

fn status_line(command: &str, status: &str, error_class: Option<&str>, message: &str) -> String {
    let line = StatusLine { command, status, error_class, message };
    // Plain text if the envelope itself will not serialize.
    serde_json::to_string(&line).unwrap_or_else(|_| format!("{command} {status}: {message}"))
}
