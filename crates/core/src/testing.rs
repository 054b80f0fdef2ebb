//! Scripted collaborators for exercising the services without a network:
//! a [`ScriptedRunner`] that answers commands from canned outputs and records
//! every invocation, and a [`RecordingSleeper`] that records backoff waits.

use crate::backoff::Sleeper;
use crate::exec::{CommandOutput, CommandRunner, Invocation, SPAWN_FAILURE};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut w) = self.waits.lock() {
            w.push(duration);
        }
    }
}

struct Rule {
    program: String,
    needle: String,
    /// Popped in order; the last response repeats.
    responses: VecDeque<CommandOutput>,
}

#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
    fallback: Option<Arc<dyn CommandRunner>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer invocations of `program` whose command line contains `needle`.
    /// Rules are matched in registration order; repeated calls with the same
    /// `(program, needle)` queue further responses.
    pub fn respond(self, program: &str, needle: &str, output: CommandOutput) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            match rules.iter_mut().find(|r| r.program == program && r.needle == needle) {
                Some(rule) => rule.responses.push_back(output),
                None => rules.push(Rule {
                    program: program.to_string(),
                    needle: needle.to_string(),
                    responses: VecDeque::from([output]),
                }),
            }
        }
        self
    }

    /// Delegate unmatched invocations (e.g. real `git`) to another runner.
    pub fn with_fallback(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.fallback = Some(runner);
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count_calls(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.display().contains(needle)).count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> CommandOutput {
        let line = invocation.display();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        let scripted = self.rules.lock().ok().and_then(|mut rules| {
            let rule = rules
                .iter_mut()
                .find(|r| r.program == invocation.program && line.contains(&r.needle))?;
            if rule.responses.len() > 1 {
                rule.responses.pop_front()
            } else {
                rule.responses.front().cloned()
            }
        });
        if let Some(output) = scripted {
            return output;
        }
        if let Some(fallback) = &self.fallback {
            return fallback.run(invocation);
        }
        CommandOutput {
            status: SPAWN_FAILURE,
            stdout: Vec::new(),
            stderr: format!("no scripted response for `{line}`"),
        }
    }
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput { status: 0, stdout: stdout.as_bytes().to_vec(), stderr: String::new() }
}

pub fn fail(status: i32, stderr: &str) -> CommandOutput {
    CommandOutput { status, stdout: Vec::new(), stderr: stderr.to_string() }
}

/// Output shaped like `gh api -i`: status line, headers, blank line, body.
/// Statuses outside 2xx exit 1 with gh's `(HTTP nnn)` error text.
pub fn http(status: u16, headers: &[(&str, &str)], body: &str) -> CommandOutput {
    let mut raw = format!("HTTP/2.0 {status} {}\r\n", reason(status));
    for (name, value) in headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str("\r\n");
    raw.push_str(body);
    let success = (200..300).contains(&status);
    CommandOutput {
        status: if success { 0 } else { 1 },
        stdout: raw.into_bytes(),
        stderr: if success {
            String::new()
        } else {
            format!("gh: {} (HTTP {status})", reason(status))
        },
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        304 => "Not Modified",
        403 => "Forbidden",
        404 => "Not Found",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Status",
    }
}
