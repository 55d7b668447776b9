//! Unit tests for `AppError` display formats.

use std::time::Duration;

use hook_runner::{AppError, TimeoutPhase};

#[test]
fn acp_error_display_includes_message() {
    let err = AppError::Acp("stream closed".into());
    assert_eq!(err.to_string(), "acp: stream closed");
}

#[test]
fn acp_error_is_distinct_from_io_error() {
    let acp = AppError::Acp("write failed".into());
    let io = AppError::Io("write failed".into());
    assert_ne!(acp.to_string(), io.to_string());
    assert!(io.to_string().starts_with("io:"));
}

#[test]
fn spawn_failed_names_the_literal_command() {
    let err = AppError::SpawnFailed {
        command: "missing-agent --acp".into(),
        reason: "No such file or directory (os error 2)".into(),
    };
    let s = err.to_string();
    assert!(s.starts_with("spawn failed:"), "{s}");
    assert!(s.contains("`missing-agent --acp`"), "{s}");
    assert!(s.contains("No such file"), "{s}");
}

#[test]
fn timeout_names_phase_and_pid() {
    let err = AppError::Timeout {
        phase: TimeoutPhase::Session,
        pid: Some(4242),
        after: Duration::from_secs(2),
    };
    assert_eq!(
        err.to_string(),
        "timeout: no response within 2s during session phase (pid 4242)"
    );
}

#[test]
fn timeout_without_pid_omits_it() {
    let err = AppError::Timeout {
        phase: TimeoutPhase::Handshake,
        pid: None,
        after: Duration::from_millis(500),
    };
    let s = err.to_string();
    assert!(s.contains("handshake phase"), "{s}");
    assert!(!s.contains("pid"), "{s}");
}

#[test]
fn protocol_error_carries_method_code_and_message() {
    let err = AppError::Protocol {
        method: "initialize".into(),
        code: -32603,
        message: "boom".into(),
    };
    assert_eq!(
        err.to_string(),
        "protocol error: initialize failed with code -32603: boom"
    );
}

#[test]
fn empty_response_names_stop_reason() {
    let err = AppError::EmptyResponse {
        stop_reason: "end_turn".into(),
    };
    assert!(err.to_string().contains("(end_turn)"));
    assert!(err.to_string().starts_with("empty response:"));
}

#[test]
fn error_messages_have_no_trailing_period() {
    let errors = [
        AppError::Config("bad".into()),
        AppError::Pool("pooled task failed".into()),
        AppError::EmptyResponse {
            stop_reason: "end_turn".into(),
        },
    ];
    for err in errors {
        let s = err.to_string();
        assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
    }
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err = AppError::from(io);
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("pipe closed")));
}
