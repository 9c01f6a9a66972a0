use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use farebot_core::config::{AppConfig, LoadOptions};
use farebot_tools::{
    register_reservation_tools, HttpTransport, ReservationGateway, RetryPolicy, ToolRegistry, PING,
};

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
    duration_ms: u128,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool, config_path: Option<PathBuf>) -> CommandResult {
    let report = build_report(config_path);
    let exit_code = match report.overall_status {
        CheckStatus::Pass => 0,
        _ => 1,
    };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(config_path: Option<PathBuf>) -> DoctorReport {
    let mut checks = Vec::new();

    let config_started = Instant::now();
    match AppConfig::load(LoadOptions { config_path, ..LoadOptions::default() }) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
                duration_ms: config_started.elapsed().as_millis(),
            });
            checks.push(check_backend_ping(&config));
            checks.push(check_toolset());
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
                duration_ms: config_started.elapsed().as_millis(),
            });
            checks.push(DoctorCheck {
                name: "backend_ping",
                status: CheckStatus::Skipped,
                details: "skipped because config validation failed".to_string(),
                duration_ms: 0,
            });
            checks.push(check_toolset());
        }
    }

    let overall_status = if checks.iter().any(|check| check.status == CheckStatus::Fail) {
        CheckStatus::Fail
    } else {
        CheckStatus::Pass
    };
    let summary = match overall_status {
        CheckStatus::Pass => "all checks passed".to_string(),
        _ => "one or more checks failed".to_string(),
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_backend_ping(config: &AppConfig) -> DoctorCheck {
    let started = Instant::now();
    let outcome = ping_backend(config);
    let (status, details) = match outcome {
        Ok(()) => (CheckStatus::Pass, "reservation backend answered".to_string()),
        Err(details) => (CheckStatus::Fail, details),
    };
    DoctorCheck { name: "backend_ping", status, details, duration_ms: started.elapsed().as_millis() }
}

fn ping_backend(config: &AppConfig) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("tokio runtime: {error}"))?;

    runtime.block_on(async {
        let transport = HttpTransport::new(
            &config.backend.base_url,
            Duration::from_secs(config.backend.timeout_secs),
        )
        .map_err(|error| format!("http client: {error}"))?;
        let gateway = Arc::new(ReservationGateway::new(
            transport,
            RetryPolicy { max_attempts: 1, ..RetryPolicy::default() },
            config.backend.user_id,
        ));

        let mut registry = ToolRegistry::new();
        register_reservation_tools(&mut registry).map_err(|error| error.to_string())?;

        registry
            .dispatch(PING, &farebot_tools::ArgumentMap::new(), gateway.as_ref())
            .await
            .map(|_| ())
            .map_err(|error| error.to_string())
    })
}

fn check_toolset() -> DoctorCheck {
    let started = Instant::now();
    let mut registry = ToolRegistry::new();
    let (status, details) = match register_reservation_tools(&mut registry) {
        Ok(()) => (CheckStatus::Pass, format!("{} tools registered", registry.len())),
        Err(error) => (CheckStatus::Fail, error.to_string()),
    };
    DoctorCheck {
        name: "tool_registration",
        status,
        details,
        duration_ms: started.elapsed().as_millis(),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![format!("doctor: {}", report.summary)];
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!(
            "  [{marker}] {} ({} ms): {}",
            check.name, check.duration_ms, check.details
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{build_report, run, CheckStatus};

    #[test]
    fn invalid_config_fails_the_report_and_exit_code() {
        let path = std::env::temp_dir().join("farebot-doctor-bad-config.toml");
        fs::write(&path, "[backend]\ntimeout_secs = 0\n").expect("write config");

        let result = run(false, Some(path.clone()));
        fs::remove_file(&path).ok();

        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("FAIL"));
        assert!(result.output.contains("skipped because config validation failed"));
    }

    #[test]
    fn tool_registration_check_passes() {
        let report = build_report(None);
        let check = report
            .checks
            .iter()
            .find(|check| check.name == "tool_registration")
            .expect("check present");
        assert_eq!(check.status, CheckStatus::Pass);
    }

    #[test]
    fn report_always_carries_all_three_checks() {
        let report = build_report(None);
        let names: Vec<&str> = report.checks.iter().map(|check| check.name).collect();
        assert_eq!(names, vec!["config_validation", "backend_ping", "tool_registration"]);
    }
}
