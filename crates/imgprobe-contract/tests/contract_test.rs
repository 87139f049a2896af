//! Contract runner and readiness strategy tests against a counting fake
//! lifecycle. No container runtime is needed.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use imgprobe_common::error::{ProbeError, Result};
use imgprobe_common::types::{ContainerId, PortBinding};
use imgprobe_contract::{
    CancelToken, Contract, ContractRunner, EvalPolicy, FailureKind, ReadinessCheck, RunState,
    catalog,
};
use imgprobe_image::{ImageReference, Resolver};
use imgprobe_runtime::{ContainerHandle, ExecOutput, Lifecycle, RuntimeConfig};

type ExecFn = Box<dyn Fn(&[String]) -> Result<ExecOutput> + Send + Sync>;

struct FakeLifecycle {
    fail_start: bool,
    logs: Mutex<VecDeque<String>>,
    exec: ExecFn,
    host_ports: Vec<PortBinding>,
    starts: AtomicUsize,
    terminates: AtomicUsize,
    log_fetches: AtomicUsize,
    execs: AtomicUsize,
    last_config: Mutex<Option<RuntimeConfig>>,
}

impl FakeLifecycle {
    fn new() -> Self {
        Self {
            fail_start: false,
            logs: Mutex::new(VecDeque::new()),
            exec: Box::new(|_| Ok(ExecOutput::new(0, "", ""))),
            host_ports: Vec::new(),
            starts: AtomicUsize::new(0),
            terminates: AtomicUsize::new(0),
            log_fetches: AtomicUsize::new(0),
            execs: AtomicUsize::new(0),
            last_config: Mutex::new(None),
        }
    }

    /// Successive `logs` calls return these, the last one repeating.
    fn with_logs(self, logs: &[&str]) -> Self {
        *self.logs.lock().unwrap() = logs.iter().map(ToString::to_string).collect();
        self
    }

    fn with_exec(mut self, exec: impl Fn(&[String]) -> Result<ExecOutput> + Send + Sync + 'static) -> Self {
        self.exec = Box::new(exec);
        self
    }

    fn with_port(mut self, container: u16, host: u16) -> Self {
        self.host_ports.push(PortBinding { container, host });
        self
    }

    fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    fn terminates(&self) -> usize {
        self.terminates.load(Ordering::SeqCst)
    }
}

impl Lifecycle for FakeLifecycle {
    fn start(&self, image: &ImageReference, config: Option<&RuntimeConfig>) -> Result<ContainerHandle> {
        let _ = self.starts.fetch_add(1, Ordering::SeqCst);
        *self.last_config.lock().unwrap() = config.cloned();
        if self.fail_start {
            return Err(ProbeError::StartFailure {
                image: image.to_string(),
                message: "manifest unknown".into(),
            });
        }
        let published = config.map(|c| c.ports.clone()).unwrap_or_default();
        let bindings = self
            .host_ports
            .iter()
            .copied()
            .filter(|b| published.contains(&b.container))
            .collect();
        Ok(ContainerHandle::new(
            ContainerId::new("0123456789abcdef"),
            "imgprobe-fake",
            image.clone(),
            bindings,
        ))
    }

    fn logs(&self, _handle: &ContainerHandle) -> Result<String> {
        let _ = self.log_fetches.fetch_add(1, Ordering::SeqCst);
        let mut logs = self.logs.lock().unwrap();
        if logs.len() > 1 {
            Ok(logs.pop_front().unwrap())
        } else {
            Ok(logs.front().cloned().unwrap_or_default())
        }
    }

    fn exec(&self, _handle: &ContainerHandle, argv: &[String]) -> Result<ExecOutput> {
        let _ = self.execs.fetch_add(1, Ordering::SeqCst);
        (self.exec)(argv)
    }

    fn terminate(&self, handle: &ContainerHandle) {
        let _ = self.terminates.fetch_add(1, Ordering::SeqCst);
        let _ = handle.mark_terminated();
    }
}

fn image() -> ImageReference {
    ImageReference::new("ghcr.io", "aedot/auto-m4b", "alpine").unwrap()
}

fn fast_policy() -> EvalPolicy {
    EvalPolicy::default()
        .with_settle_delay(Duration::from_millis(10))
        .with_http_timing(Duration::from_millis(200), Duration::from_millis(20))
}

fn run(lifecycle: &FakeLifecycle, checks: &[ReadinessCheck], policy: EvalPolicy) -> imgprobe_contract::ContractReport {
    ContractRunner::new(lifecycle, policy)
        .run(&image(), checks, None)
        .expect("container starts")
}

/// Serves 503 until `ready_after` has elapsed, then 200.
fn flaky_server(ready_after: Duration) -> u16 {
    slow_server(ready_after, Duration::ZERO)
}

/// Like [`flaky_server`], but holds every 200 response for `hold` first.
fn slow_server(ready_after: Duration, hold: Duration) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let started = Instant::now();
    let _ = thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            let status = if started.elapsed() >= ready_after {
                thread::sleep(hold);
                "200 OK"
            } else {
                "503 Service Unavailable"
            };
            let response = format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            let _ = stream.write_all(response.as_bytes());
        }
    });
    port
}

const AUTO_M4B_LOG: &str = "Created missing user\nUsing all CPU cores\nNo folders detected, sleeping";

fn auto_m4b_check() -> ReadinessCheck {
    ReadinessCheck::log_contains(["Created missing", "Using all CPU cores", "No folders detected"])
}

// ── LogContains ──────────────────────────────────────────────────────

#[test]
fn log_contains_passes_when_all_substrings_present() {
    let lifecycle = FakeLifecycle::new().with_logs(&[AUTO_M4B_LOG]);
    let report = run(&lifecycle, &[auto_m4b_check()], fast_policy());
    assert!(report.passed(), "{report}");
    assert_eq!(lifecycle.log_fetches.load(Ordering::SeqCst), 1);
}

#[test]
fn log_contains_fails_with_full_logs_when_any_substring_missing() {
    let lines: Vec<&str> = AUTO_M4B_LOG.lines().collect();
    for skip in 0..lines.len() {
        let log: Vec<&str> = lines
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .map(|(_, l)| *l)
            .collect();
        let log = log.join("\n");
        let lifecycle = FakeLifecycle::new().with_logs(&[log.as_str()]);

        let report = run(&lifecycle, &[auto_m4b_check()], fast_policy());
        assert!(!report.passed());
        let diagnostic = report.results[0].diagnostic().unwrap();
        assert!(diagnostic.contains(&log), "diagnostic lacks full logs: {diagnostic}");
        assert!(diagnostic.contains("missing from logs"));
        assert_eq!(lifecycle.log_fetches.load(Ordering::SeqCst), 2);
    }
}

#[test]
fn log_contains_refetches_after_settle_delay() {
    let lifecycle = FakeLifecycle::new().with_logs(&["Created missing user\n", AUTO_M4B_LOG]);
    let policy = fast_policy().with_settle_delay(Duration::from_millis(100));

    let started = Instant::now();
    let report = run(&lifecycle, &[auto_m4b_check()], policy);
    assert!(report.passed(), "{report}");
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(lifecycle.log_fetches.load(Ordering::SeqCst), 2);
}

// ── FileExists ───────────────────────────────────────────────────────

#[test]
fn file_exists_fails_for_missing_path() {
    let lifecycle = FakeLifecycle::new().with_exec(|argv| {
        assert_eq!(argv, ["test", "-e", "/usr/local/bin/yq"]);
        Ok(ExecOutput::new(1, "", ""))
    });
    let report = run(&lifecycle, &[ReadinessCheck::file_exists("/usr/local/bin/yq")], fast_policy());
    assert!(!report.passed());
    assert!(report.results[0]
        .diagnostic()
        .unwrap()
        .contains("/usr/local/bin/yq does not exist"));
}

#[test]
fn file_exists_passes_when_probe_exits_zero() {
    let lifecycle = FakeLifecycle::new();
    let report = run(&lifecycle, &[ReadinessCheck::file_exists("/runscript.sh")], fast_policy());
    assert!(report.passed(), "{report}");
}

#[test]
fn file_exists_reports_missing_probe_binary() {
    let lifecycle = FakeLifecycle::new()
        .with_exec(|_| Ok(ExecOutput::new(127, "", "exec: \"test\": executable file not found")));
    let report = run(&lifecycle, &[ReadinessCheck::file_exists("/runscript.sh")], fast_policy());
    let diagnostic = report.results[0].diagnostic().unwrap();
    assert!(diagnostic.contains("unavailable in the image"));
    assert!(diagnostic.contains("executable file not found"));
}

// ── CommandSucceeds ──────────────────────────────────────────────────

#[test]
fn command_succeeds_passes_on_zero_exit() {
    let lifecycle = FakeLifecycle::new();
    let check = ReadinessCheck::command_succeeds(["mkdir", "-p", "/temp/merge", "/temp/untagged"]);
    let report = run(&lifecycle, &[check], fast_policy());
    assert!(report.passed(), "{report}");
    assert_eq!(lifecycle.execs.load(Ordering::SeqCst), 1);
}

#[test]
fn command_succeeds_fails_with_combined_output() {
    let lifecycle = FakeLifecycle::new().with_exec(|_| {
        Ok(ExecOutput::new(
            1,
            "creating /temp/merge\n",
            "mkdir: can't create directory '/temp/untagged': Permission denied\n",
        ))
    });
    let check = ReadinessCheck::command_succeeds(["mkdir", "-p", "/temp/merge", "/temp/untagged"]);
    let report = run(&lifecycle, &[check], fast_policy());
    let diagnostic = report.results[0].diagnostic().unwrap();
    assert!(diagnostic.contains("exit code 1 (expected 0)"));
    assert!(diagnostic.contains("creating /temp/merge"));
    assert!(diagnostic.contains("Permission denied"));
}

#[test]
fn command_with_expected_non_zero_exit_passes() {
    let lifecycle = FakeLifecycle::new().with_exec(|_| Ok(ExecOutput::new(3, "", "")));
    let report = run(&lifecycle, &[ReadinessCheck::command_exits(["sh", "-c", "exit 3"], 3)], fast_policy());
    assert!(report.passed(), "{report}");
}

// ── HttpReady ────────────────────────────────────────────────────────

#[test]
fn http_ready_passes_when_deadline_outlasts_warmup() {
    let host = flaky_server(Duration::from_secs(3));
    let lifecycle = FakeLifecycle::new().with_port(8337, host);
    let policy = fast_policy().with_http_timing(Duration::from_secs(6), Duration::from_millis(200));

    let report = run(&lifecycle, &[ReadinessCheck::http_ready(8337)], policy);
    assert!(report.passed(), "{report}");
    assert!(report.results[0].elapsed() >= Duration::from_secs(2));
}

#[test]
fn http_ready_fails_with_last_status_when_deadline_too_short() {
    let host = flaky_server(Duration::from_secs(3));
    let lifecycle = FakeLifecycle::new().with_port(8337, host);
    let policy = fast_policy().with_http_timing(Duration::from_secs(1), Duration::from_millis(200));

    let report = run(&lifecycle, &[ReadinessCheck::http_ready(8337)], policy);
    assert!(!report.passed());
    let diagnostic = report.results[0].diagnostic().unwrap();
    assert!(diagnostic.contains("503"), "{diagnostic}");
}

#[test]
fn http_ready_never_passes_on_a_response_after_the_deadline() {
    let host = slow_server(Duration::from_millis(1800), Duration::from_millis(1500));
    let lifecycle = FakeLifecycle::new().with_port(8337, host);
    let policy = fast_policy().with_http_timing(Duration::from_secs(2), Duration::from_millis(100));

    let started = Instant::now();
    let report = run(&lifecycle, &[ReadinessCheck::http_ready(8337)], policy);
    let elapsed = started.elapsed();

    assert!(!report.passed(), "passed after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(2800), "overran the deadline: {elapsed:?}");
    assert!(report.results[0].diagnostic().unwrap().contains("did not return 200"));
}

#[test]
fn cancel_while_polling_http_aborts_promptly() {
    let host = flaky_server(Duration::from_secs(3600));
    let lifecycle = FakeLifecycle::new().with_port(8337, host);
    let cancel = CancelToken::new();
    let policy = fast_policy()
        .with_http_timing(Duration::from_secs(30), Duration::from_millis(100))
        .with_cancel(cancel.clone());
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        cancel.cancel();
    });

    let started = Instant::now();
    let checks = [ReadinessCheck::http_ready(8337), ReadinessCheck::file_exists("/a")];
    let report = run(&lifecycle, &checks, policy);
    canceller.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(6), "{:?}", started.elapsed());
    assert!(report.results[0].diagnostic().unwrap().contains("cancelled"));
    assert!(report.results[1].diagnostic().unwrap().starts_with("not evaluated"));
    assert!(report.aborted.as_deref().unwrap().contains("cancelled"));
    assert!(report.states.contains(&RunState::Failed(FailureKind::Infrastructure)));
    assert_eq!(lifecycle.execs.load(Ordering::SeqCst), 0);
    assert_eq!(lifecycle.terminates(), 1);
}

#[test]
fn run_timeout_cuts_http_polling_short() {
    let host = flaky_server(Duration::from_secs(3600));
    let lifecycle = FakeLifecycle::new().with_port(8337, host);
    let policy = fast_policy()
        .with_http_timing(Duration::from_secs(30), Duration::from_millis(100))
        .with_run_timeout(Duration::from_millis(500));

    let started = Instant::now();
    let checks = [ReadinessCheck::http_ready(8337), ReadinessCheck::file_exists("/a")];
    let report = run(&lifecycle, &checks, policy);

    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    let diagnostic = report.results[0].diagnostic().unwrap();
    assert!(diagnostic.contains("did not return 200"), "{diagnostic}");
    assert_eq!(
        report.results[1].diagnostic(),
        Some("not evaluated: run deadline expired")
    );
    assert_eq!(lifecycle.terminates(), 1);
}

#[test]
fn runner_publishes_http_check_ports() {
    let lifecycle = FakeLifecycle::new();
    let config = RuntimeConfig::new().env("PUID", "1000");
    let _ = ContractRunner::new(&lifecycle, fast_policy())
        .run(&image(), &[ReadinessCheck::http_ready(8337)], Some(&config))
        .unwrap();

    let seen = lifecycle.last_config.lock().unwrap().clone().unwrap();
    assert_eq!(seen.ports, vec![8337]);
    assert_eq!(seen.env.get("PUID").map(String::as_str), Some("1000"));
}

#[test]
fn http_ready_on_unpublished_port_fails_with_reason() {
    // The fake has no host mapping for 8337, so the handle carries no binding.
    let lifecycle = FakeLifecycle::new();
    let report = run(&lifecycle, &[ReadinessCheck::http_ready(8337)], fast_policy());
    assert!(report.results[0]
        .diagnostic()
        .unwrap()
        .contains("not published"));
}

// ── Runner ───────────────────────────────────────────────────────────

#[test]
fn every_check_gets_a_result_in_order_and_teardown_runs_once() {
    let lifecycle = FakeLifecycle::new()
        .with_logs(&["nothing useful"])
        .with_exec(|argv| {
            if argv[0] == "false" {
                Ok(ExecOutput::new(1, "", ""))
            } else {
                Ok(ExecOutput::new(0, "", ""))
            }
        });
    let checks = [
        ReadinessCheck::command_succeeds(["false"]),
        ReadinessCheck::file_exists("/runscript.sh"),
        ReadinessCheck::log_contains(["Sleeping"]),
        ReadinessCheck::command_succeeds(["true"]),
    ];
    let report = run(&lifecycle, &checks, fast_policy());

    assert_eq!(report.results.len(), checks.len());
    for (result, check) in report.results.iter().zip(&checks) {
        assert_eq!(result.description(), check.description());
    }
    let passed: Vec<bool> = report.results.iter().map(|r| r.passed()).collect();
    assert_eq!(passed, [false, true, false, true]);
    assert_eq!(lifecycle.terminates(), 1);
    assert_eq!(
        report.states,
        [
            RunState::Created,
            RunState::Starting,
            RunState::Ready,
            RunState::Evaluating,
            RunState::Terminating,
            RunState::Done,
        ]
    );
}

#[test]
fn exec_failure_is_recorded_and_run_continues() {
    let lifecycle = FakeLifecycle::new().with_logs(&["Sleeping"]).with_exec(|_| {
        Err(ProbeError::ExecFailure {
            id: "0123456789ab".into(),
            message: "container is restarting".into(),
        })
    });
    let checks = [
        ReadinessCheck::file_exists("/runscript.sh"),
        ReadinessCheck::log_contains(["Sleeping"]),
    ];
    let report = run(&lifecycle, &checks, fast_policy());

    assert!(report.aborted.is_none());
    assert!(report.results[0].diagnostic().unwrap().contains("container is restarting"));
    assert!(report.results[1].passed());
}

#[test]
fn infrastructure_error_marks_remaining_checks_not_evaluated() {
    let lifecycle = FakeLifecycle::new().with_exec(|_| {
        Err(ProbeError::RuntimeUnavailable {
            binary: "docker".into(),
            message: "Cannot connect to the Docker daemon".into(),
        })
    });
    let checks = [
        ReadinessCheck::file_exists("/a"),
        ReadinessCheck::file_exists("/b"),
        ReadinessCheck::file_exists("/c"),
    ];
    let report = run(&lifecycle, &checks, fast_policy());

    assert_eq!(report.results.len(), 3);
    assert!(report.results[0].diagnostic().unwrap().contains("Cannot connect"));
    for result in &report.results[1..] {
        assert!(result.diagnostic().unwrap().starts_with("not evaluated"));
    }
    assert_eq!(lifecycle.execs.load(Ordering::SeqCst), 1);
    assert_eq!(lifecycle.terminates(), 1);
    assert!(report.aborted.is_some());
    assert!(report.states.contains(&RunState::Failed(FailureKind::Infrastructure)));
    assert_eq!(report.states.last(), Some(&RunState::Done));
}

#[test]
fn start_failure_returns_error_without_terminate() {
    let lifecycle = FakeLifecycle::new().failing_start();
    let runner = ContractRunner::new(&lifecycle, fast_policy());
    let history = runner.history();

    let err = runner
        .run(&image(), &[ReadinessCheck::file_exists("/x")], None)
        .unwrap_err();
    assert!(matches!(err, ProbeError::StartFailure { .. }));
    assert_eq!(lifecycle.terminates(), 0);
    assert_eq!(
        history.snapshot(),
        [
            RunState::Created,
            RunState::Starting,
            RunState::Failed(FailureKind::Start),
            RunState::Terminating,
            RunState::Done,
        ]
    );
}

#[test]
fn cancelled_run_reports_not_evaluated_and_tears_down() {
    let lifecycle = FakeLifecycle::new();
    let cancel = CancelToken::new();
    cancel.cancel();
    let checks = [
        ReadinessCheck::file_exists("/a"),
        ReadinessCheck::log_contains(["x"]),
    ];
    let report = run(&lifecycle, &checks, fast_policy().with_cancel(cancel));

    assert_eq!(report.results.len(), 2);
    assert!(report
        .results
        .iter()
        .all(|r| r.diagnostic() == Some("not evaluated: run cancelled")));
    assert_eq!(lifecycle.execs.load(Ordering::SeqCst), 0);
    assert_eq!(lifecycle.terminates(), 1);
}

#[test]
fn cancel_during_settle_delay_aborts_promptly() {
    let lifecycle = FakeLifecycle::new().with_logs(&["nothing yet"]);
    let cancel = CancelToken::new();
    let policy = fast_policy()
        .with_settle_delay(Duration::from_secs(30))
        .with_cancel(cancel.clone());
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
    });

    let started = Instant::now();
    let report = run(&lifecycle, &[auto_m4b_check(), ReadinessCheck::file_exists("/a")], policy);
    canceller.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(report.results[0].diagnostic().unwrap().contains("cancelled"));
    assert!(report.results[1].diagnostic().unwrap().starts_with("not evaluated"));
    assert_eq!(lifecycle.terminates(), 1);
}

#[test]
fn expired_run_deadline_skips_remaining_checks() {
    let lifecycle = FakeLifecycle::new();
    let policy = fast_policy().with_run_timeout(Duration::ZERO);
    let report = run(&lifecycle, &[ReadinessCheck::file_exists("/a")], policy);
    assert_eq!(
        report.results[0].diagnostic(),
        Some("not evaluated: run deadline expired")
    );
    assert_eq!(lifecycle.terminates(), 1);
}

#[test]
fn panic_inside_evaluation_still_tears_down() {
    let lifecycle = FakeLifecycle::new().with_exec(|_| panic!("exec blew up"));
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        run(&lifecycle, &[ReadinessCheck::file_exists("/a")], fast_policy())
    }));
    assert!(result.is_err());
    assert_eq!(lifecycle.terminates(), 1);
}

// ── Contracts ────────────────────────────────────────────────────────

#[test]
fn catalog_contract_executes_through_resolver() {
    let lifecycle = FakeLifecycle::new().with_logs(&[AUTO_M4B_LOG]);
    let contract: Contract = catalog::find("auto-m4b").unwrap();
    let resolver = Resolver::new("ghcr.io/aedot", "rolling").unwrap();

    let report = contract.execute(&resolver, &lifecycle, &fast_policy()).unwrap();
    assert_eq!(report.image.to_string(), "ghcr.io/aedot/auto-m4b:alpine");
    assert!(report.into_result().is_ok());
    assert_eq!(lifecycle.starts.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_contract_error_message_carries_diagnostics() {
    let lifecycle = FakeLifecycle::new().with_logs(&["Created missing user"]);
    let contract = catalog::find("autom4b").unwrap();
    let resolver = Resolver::new("ghcr.io/aedot", "rolling").unwrap();

    let failure = contract
        .execute(&resolver, &lifecycle, &fast_policy())
        .unwrap()
        .into_result()
        .unwrap_err();
    let message = failure.to_string();
    assert!(message.contains("ghcr.io/aedot/autom4b:rolling: FAILED"));
    assert!(message.contains("\"Using\", \"Sleeping\""));
    assert!(message.contains("Created missing user"));
}
