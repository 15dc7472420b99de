#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use winbridge_commons::{PathError, PathTranslator, StaticHostProbe};
use winbridge_runner::{
    BridgeError, CommandExecutor, CommandSpec, HostBridgeExecutor, TextEncoding,
};

#[derive(Debug)]
struct BracketTranslator;

impl PathTranslator for BracketTranslator {
    fn to_host_path(&self, native_path: &str) -> Result<String, PathError> {
        if native_path.starts_with("/missing") {
            return Err(PathError::Translation {
                path: native_path.to_string(),
                reason: "not mounted".to_string(),
            });
        }
        Ok(format!("HOST[{native_path}]"))
    }

    fn to_native_path(&self, host_path: &str) -> Result<String, PathError> {
        Ok(host_path.to_string())
    }
}

fn executor() -> HostBridgeExecutor {
    HostBridgeExecutor::new(
        Arc::new(StaticHostProbe::available()),
        Arc::new(BracketTranslator),
    )
    .with_drain_grace(Duration::from_millis(100))
}

async fn run(spec: CommandSpec) -> Result<winbridge_runner::ExecutionResult, BridgeError> {
    executor().execute(&CancellationToken::new(), &spec).await
}

#[tokio::test]
async fn echo_is_captured_without_trailing_newline() {
    let result = run(CommandSpec::new("echo").arg("hello")).await.unwrap();
    assert_eq!(result.stdout, "hello");
    assert_eq!(result.stderr, "");
    assert_eq!(result.exit_code, 0);
    assert!(result.error.is_none());
    assert!(result.success());
}

#[tokio::test]
async fn non_zero_exit_is_a_normal_result() {
    let result = run(CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
        .await
        .unwrap();
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stdout, "out");
    assert_eq!(result.stderr, "err");
    assert!(result.error.is_none());
    assert!(!result.success());
}

#[tokio::test]
async fn stdin_payload_is_fed_to_the_child() {
    let result = run(CommandSpec::new("cat").stdin_bytes("line1\r\nline2\n"))
        .await
        .unwrap();
    assert_eq!(result.stdout, "line1\nline2");
}

#[tokio::test]
async fn large_output_and_input_do_not_deadlock() {
    let payload = "x".repeat(64).repeat(4096) + "\n";
    let result = run(CommandSpec::new("cat").stdin_bytes(payload.clone()))
        .await
        .unwrap();
    assert_eq!(result.stdout.len(), payload.len() - 1);
}

#[tokio::test]
async fn deadline_kills_the_child_and_keeps_partial_output() {
    let spec = CommandSpec::new("sh")
        .args(["-c", "echo started; exec sleep 5"])
        .timeout(Duration::from_millis(300));
    let result = run(spec).await.unwrap();

    assert!(matches!(result.error, Some(BridgeError::TimedOut { .. })));
    assert_eq!(result.stdout, "started");
    assert_eq!(result.exit_code, -1);
    assert!(result.duration < Duration::from_secs(4));
}

#[tokio::test]
async fn orphaned_pipe_holders_are_abandoned_after_the_grace_period() {
    let spec = CommandSpec::new("sh")
        .args(["-c", "echo partial; sleep 5; echo never"])
        .timeout(Duration::from_millis(200));
    let started = std::time::Instant::now();
    let result = run(spec).await.unwrap();

    assert!(matches!(result.error, Some(BridgeError::TimedOut { .. })));
    assert_eq!(result.stdout, "partial");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn cancellation_terminates_a_running_child() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = executor()
        .execute(&token, &CommandSpec::new("sleep").arg("5"))
        .await
        .unwrap();
    assert!(matches!(result.error, Some(BridgeError::Cancelled)));
    assert!(result.duration < Duration::from_secs(4));
}

#[tokio::test]
async fn already_cancelled_scope_never_launches() {
    let token = CancellationToken::new();
    token.cancel();
    let err = executor()
        .execute(&token, &CommandSpec::new("echo").arg("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Cancelled));
}

#[tokio::test]
async fn missing_binary_is_a_launch_error() {
    let err = run(CommandSpec::new("winbridge-definitely-missing-binary"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Launch { .. }));
    assert!(err.is_pre_launch());
}

#[tokio::test]
async fn unavailable_host_bridge_is_fatal() {
    let executor = executor().with_probe(Arc::new(StaticHostProbe::unavailable()));
    let err = executor
        .execute(&CancellationToken::new(), &CommandSpec::new("echo"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::EnvironmentUnavailable));
}

#[tokio::test]
async fn path_arguments_are_translated_when_requested() {
    let spec = CommandSpec::new("echo").args(["./file", "/abs", "plain"]);

    let untouched = run(spec.clone()).await.unwrap();
    assert_eq!(untouched.stdout, "./file /abs plain");

    let translated = run(spec.convert_paths(true)).await.unwrap();
    assert_eq!(translated.stdout, "HOST[./file] HOST[/abs] plain");
}

#[tokio::test]
async fn translation_failure_aborts_the_invocation() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let script = format!("touch '{}'", marker.display());
    let spec = CommandSpec::new("sh")
        .args(["-c", script.as_str(), "/missing/input"])
        .convert_paths(true);

    let err = run(spec).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::ArgumentTranslation { ref argument, .. } if argument == "/missing/input"
    ));
    assert!(!marker.exists());
}

#[tokio::test]
async fn overlay_variables_are_tunneled() {
    let spec = CommandSpec::new("sh")
        .args(["-c", "printf '%s|%s' \"$WB_TEST_VAR\" \"$WSLENV\""])
        .env("WB_TEST_VAR", "hello")
        .tunnel_env(true);
    let result = run(spec).await.unwrap();

    let (value, manifest) = result.stdout.split_once('|').unwrap();
    assert_eq!(value, "hello");
    assert!(manifest.ends_with("WB_TEST_VAR/u"), "manifest was {manifest:?}");
}

#[tokio::test]
async fn working_directory_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let result = run(CommandSpec::new("pwd").working_dir(dir.path()))
        .await
        .unwrap();
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(result.stdout, expected.display().to_string());
}

#[tokio::test]
async fn auto_encoding_decodes_utf16_output() {
    let spec = CommandSpec::new("printf")
        .arg(r"\377\376H\000i\000\n\000")
        .encoding(TextEncoding::Auto);
    let result = run(spec).await.unwrap();
    assert_eq!(result.stdout, "Hi");
}

#[tokio::test]
async fn code_page_output_is_decoded() {
    let spec = CommandSpec::new("printf")
        .arg(r"caf\351")
        .with_encoding_name("cp1252")
        .unwrap();
    let result = run(spec).await.unwrap();
    assert_eq!(result.stdout, "café");
}

#[tokio::test]
async fn interactive_mode_reports_exit_code_only() {
    let spec = CommandSpec::new("sh")
        .args(["-c", "exit 4"])
        .interactive(true);
    let result = run(spec).await.unwrap();
    assert_eq!(result.exit_code, 4);
    assert_eq!(result.stdout, "");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
async fn relative_arguments_follow_the_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let spec = CommandSpec::new("echo")
        .args(["./a.txt", "../b.txt"])
        .working_dir(dir.path())
        .convert_paths(true);
    let result = run(spec).await.unwrap();

    let parent = dir.path().parent().unwrap();
    assert_eq!(
        result.stdout,
        format!(
            "HOST[{}/a.txt] HOST[{}/b.txt]",
            dir.path().display(),
            parent.display()
        )
    );
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn interactive_child_reads_the_caller_input() {
    let Ok(caller_input) = std::fs::read_link("/proc/self/fd/0") else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("stdin");
    let spec = CommandSpec::new("sh")
        .args(["-c", "readlink /proc/self/fd/0 > \"$1\"", "sh"])
        .arg(report.display().to_string())
        .interactive(true);

    let result = run(spec).await.unwrap();
    assert_eq!(result.exit_code, 0);
    let child_input = std::fs::read_to_string(&report).unwrap();
    assert_eq!(child_input.trim_end(), caller_input.display().to_string());
}
