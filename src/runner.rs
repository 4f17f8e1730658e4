//! Provider CLI execution.
//!
//! Every provider API call goes through a [`CommandRunner`], which runs a
//! CLI (`aws`, `az`, `gcloud`) with JSON output and turns failures into
//! classified [`CensusError`]s. The pipeline only ever sees the trait so
//! that enumeration can be driven by a scripted runner in tests.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::error::{CensusError, Result};

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and parse its stdout as JSON.
    async fn run_json(&self, program: &str, args: &[String]) -> Result<Value>;
}

/// Runs provider CLIs as child processes.
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run_json(&self, program: &str, args: &[String]) -> Result<Value> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!("Running: {} {}", program, args.join(" "));

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) if err.kind() == ErrorKind::NotFound => {
                return Err(CensusError::Authentication(format!(
                    "`{program}` was not found on PATH; install and log in to the provider CLI"
                )));
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                return Err(CensusError::Transient(format!(
                    "`{program} {}` timed out after {}s",
                    args.first().map_or("", String::as_str),
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(program, &stderr));
        }

        parse_json_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse CLI stdout. Empty output means an empty listing.
pub fn parse_json_output(stdout: &str) -> Result<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    serde_json::from_str(trimmed).map_err(|e| CensusError::Parse(e.to_string()))
}

const AUTHENTICATION_SIGNATURES: &[&str] = &[
    "expiredtoken",
    "invalidclienttokenid",
    "unable to locate credentials",
    "the security token included in the request is invalid",
    "signaturedoesnotmatch",
    "authfailure",
    "az login",
    "refresh token has expired",
    "unauthenticated",
    "gcloud auth login",
    "no credentialed accounts",
    "reauthentication",
];

const PERMISSION_SIGNATURES: &[&str] = &[
    "accessdenied",
    "access denied",
    "unauthorizedoperation",
    "authorizationfailed",
    "permission_denied",
    "permission denied",
    "does not have permission",
    "forbidden",
    "not authorized",
    "(403)",
];

const TRANSIENT_SIGNATURES: &[&str] = &[
    "throttling",
    "requestlimitexceeded",
    "toomanyrequests",
    "too many requests",
    "rate exceeded",
    "(429)",
    "resource_exhausted",
    "serviceunavailable",
    "service unavailable",
    "(503)",
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "could not connect",
    "temporary failure in name resolution",
];

/// Map a failed CLI invocation to an error class using its stderr.
pub fn classify_failure(program: &str, stderr: &str) -> CensusError {
    let lowered = stderr.to_ascii_lowercase();
    let message = format!("{program}: {}", first_line(stderr));

    let matches = |signatures: &[&str]| signatures.iter().any(|s| lowered.contains(s));

    if matches(AUTHENTICATION_SIGNATURES) {
        CensusError::Authentication(message)
    } else if matches(PERMISSION_SIGNATURES) {
        CensusError::Permission(message)
    } else if matches(TRANSIENT_SIGNATURES) {
        CensusError::Transient(message)
    } else {
        CensusError::Api(message)
    }
}

fn first_line(stderr: &str) -> &str {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("command failed without output")
}

#[cfg(test)]
pub mod mock {
    //! Scripted runner for pipeline tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    pub enum Reply {
        Json(Value),
        Permission(&'static str),
        Transient(&'static str),
        Auth(&'static str),
        Api(&'static str),
    }

    impl Reply {
        fn into_result(self) -> Result<Value> {
            match self {
                Self::Json(value) => Ok(value),
                Self::Permission(msg) => Err(CensusError::Permission(msg.to_string())),
                Self::Transient(msg) => Err(CensusError::Transient(msg.to_string())),
                Self::Auth(msg) => Err(CensusError::Authentication(msg.to_string())),
                Self::Api(msg) => Err(CensusError::Api(msg.to_string())),
            }
        }
    }

    struct Rule {
        tokens: Vec<String>,
        replies: VecDeque<Reply>,
    }

    /// Answers invocations from rules checked in insertion order.
    ///
    /// A rule matches when every token appears in `program args...`. Its
    /// replies are consumed in order; the last one repeats. Unmatched
    /// invocations receive `null`, which extractors treat as empty.
    #[derive(Default)]
    pub struct MockRunner {
        rules: Mutex<Vec<Rule>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockRunner {
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn on(self, tokens: &[&str], reply: Reply) -> Self {
            self.on_sequence(tokens, vec![reply])
        }

        #[must_use]
        pub fn on_sequence(self, tokens: &[&str], replies: Vec<Reply>) -> Self {
            self.rules.lock().unwrap().push(Rule {
                tokens: tokens.iter().map(ToString::to_string).collect(),
                replies: replies.into(),
            });
            self
        }

        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_matching(&self, tokens: &[&str]) -> usize {
            self.calls()
                .iter()
                .filter(|call| tokens.iter().all(|t| call.iter().any(|c| c == t)))
                .count()
        }
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        async fn run_json(&self, program: &str, args: &[String]) -> Result<Value> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().cloned());
            self.calls.lock().unwrap().push(call.clone());

            let mut rules = self.rules.lock().unwrap();
            let rule = rules
                .iter_mut()
                .find(|rule| rule.tokens.iter().all(|t| call.contains(t)));

            let reply = match rule {
                Some(rule) if rule.replies.len() > 1 => rule.replies.pop_front(),
                Some(rule) => rule.replies.front().cloned(),
                None => None,
            };
            reply.map_or(Ok(Value::Null), Reply::into_result)
        }
    }
}
