//! Test sandbox: baseline/verify runs with failure fingerprinting.
//!
//! Autodetects the project's test runner, executes it in a subprocess with
//! merged output, a five-minute wall clock and a cleaned environment, then
//! parses the failing-test identifiers out of the output. A mutation is
//! accepted iff the post-mutation failure set minus the baseline set is
//! empty and the runner did not die collecting tests (pytest exit 2, or a
//! timeout, which is treated the same).

use std::collections::BTreeSet;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;

const TEST_TIMEOUT: Duration = Duration::from_secs(300);
/// Environment prefix of the tool itself; never leaks into the runner.
const ENV_PREFIX: &str = "JANITOR_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Ran,
    NoTestsFound,
    CollectionError,
    Timeout,
    MissingCommand,
}

/// One completed (or failed) test-suite execution.
#[derive(Debug, Clone)]
pub struct TestRun {
    pub command: String,
    pub exit_code: i32,
    pub status: TestStatus,
    pub failures: BTreeSet<String>,
    pub output: String,
}

impl TestRun {
    /// Collection errors invalidate the fingerprint: the runner never got
    /// far enough to tell us which tests fail.
    pub fn is_collection_error(&self) -> bool {
        matches!(self.status, TestStatus::CollectionError | TestStatus::Timeout)
    }
}

/// Verdict of comparing a verify run against the baseline.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub accepted: bool,
    pub new_failures: BTreeSet<String>,
    pub collection_error: bool,
}

pub struct TestSandbox {
    project_root: PathBuf,
    custom_command: Option<String>,
    timeout: Duration,
}

impl TestSandbox {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            custom_command: None,
            timeout: TEST_TIMEOUT,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.custom_command = Some(command.into());
        self
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Conventional runner probe: package-manager test script for JS/TS
    /// projects, pytest otherwise.
    pub fn detect_command(&self) -> String {
        if let Some(custom) = &self.custom_command {
            return custom.clone();
        }
        let package_json = self.project_root.join("package.json");
        if let Ok(content) = std::fs::read_to_string(&package_json) {
            let has_test_script = serde_json::from_str::<serde_json::Value>(&content)
                .ok()
                .and_then(|doc| {
                    doc.get("scripts")
                        .and_then(|s| s.get("test"))
                        .map(|_| true)
                })
                .unwrap_or(false);
            if has_test_script {
                return "npm test".to_string();
            }
        }
        "pytest".to_string()
    }

    /// Run once before mutation to capture the allowed failure set.
    pub fn baseline(&self) -> TestRun {
        self.run()
    }

    /// Run after mutation.
    pub fn verify(&self) -> TestRun {
        self.run()
    }

    /// Accept iff no failure is new and the verify run collected tests.
    pub fn compare(baseline: &TestRun, verify: &TestRun) -> TestOutcome {
        let collection_error = verify.is_collection_error();
        let new_failures: BTreeSet<String> = verify
            .failures
            .difference(&baseline.failures)
            .cloned()
            .collect();
        TestOutcome {
            accepted: new_failures.is_empty() && !collection_error,
            new_failures,
            collection_error,
        }
    }

    fn run(&self) -> TestRun {
        let command_line = self.detect_command();
        let parts: Vec<&str> = command_line.split_whitespace().collect();
        let Some((program, args)) = parts.split_first() else {
            return failed_run(command_line, TestStatus::MissingCommand);
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, _) in std::env::vars() {
            if key.starts_with(ENV_PREFIX) {
                command.env_remove(&key);
            }
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(command = %command_line, %err, "test command failed to start");
                return failed_run(command_line, TestStatus::MissingCommand);
            }
        };

        // Drain pipes on threads so a chatty suite cannot deadlock us.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_handle = std::thread::spawn(move || read_all(stdout));
        let stderr_handle = std::thread::spawn(move || read_all(stderr));

        let deadline = Instant::now() + self.timeout;
        let exit_code = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status.code().unwrap_or(-1),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        child.kill().ok();
                        child.wait().ok();
                        let mut output = stdout_handle.join().unwrap_or_default();
                        output.push_str(&stderr_handle.join().unwrap_or_default());
                        return TestRun {
                            command: command_line,
                            exit_code: -1,
                            status: TestStatus::Timeout,
                            failures: parse_failures(&output),
                            output,
                        };
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(_) => break -1,
            }
        };

        let mut output = stdout_handle.join().unwrap_or_default();
        output.push_str(&stderr_handle.join().unwrap_or_default());

        let is_pytest = command_line.contains("pytest");
        let status = match exit_code {
            2 if is_pytest => TestStatus::CollectionError,
            5 if is_pytest => TestStatus::NoTestsFound,
            _ => TestStatus::Ran,
        };

        TestRun {
            command: command_line,
            exit_code,
            status,
            failures: parse_failures(&output),
            output,
        }
    }
}

fn failed_run(command: String, status: TestStatus) -> TestRun {
    TestRun {
        command,
        exit_code: -1,
        status,
        failures: BTreeSet::new(),
        output: String::new(),
    }
}

fn read_all(pipe: Option<impl Read>) -> String {
    let mut output = String::new();
    if let Some(mut pipe) = pipe {
        let mut bytes = Vec::new();
        pipe.read_to_end(&mut bytes).ok();
        output = String::from_utf8_lossy(&bytes).into_owned();
    }
    output
}

fn pytest_failure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:FAILED|ERROR) ([^\s]+::[^\s]+)").expect("static regex"))
}

fn pytest_collection_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:FAILED|ERROR) ([^\s]+\.py)(?:\s|$)").expect("static regex"))
}

fn js_failure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(?:\d+\)|✖|●)\s+(.+?)\s*$").expect("static regex"))
}

/// Failure fingerprint: test identifiers for pytest, file-level collection
/// errors, and leading-bullet test names for mocha/jest.
pub fn parse_failures(output: &str) -> BTreeSet<String> {
    let mut failures = BTreeSet::new();

    for capture in pytest_failure_re().captures_iter(output) {
        failures.insert(capture[1].to_string());
    }
    for capture in pytest_collection_re().captures_iter(output) {
        failures.insert(capture[1].to_string());
    }
    for capture in js_failure_re().captures_iter(output) {
        failures.insert(capture[1].trim_end_matches(':').to_string());
    }

    failures
}
