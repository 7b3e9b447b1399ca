//! Completion backend that shells out to a local LM command.
//!
//! The rendered prompt is written to the command's stdin and its stdout is
//! the completion. Exit codes in the sysexits range (64-78) mark permanent
//! failures such as bad credentials or configuration; any other non-zero
//! exit is treated as transient.

use super::{CompletionService, Prompt, ServiceError};
use anyhow::{anyhow, Context, Result};
use std::io::{ErrorKind, Write};
use std::ops::RangeInclusive;
use std::process::{Command, Stdio};
use std::time::Instant;

const PERMANENT_EXIT_CODES: RangeInclusive<i32> = 64..=78;

#[derive(Debug, Clone)]
pub struct CommandService {
    argv: Vec<String>,
}

impl CommandService {
    /// Split a command line with shell quoting rules.
    pub fn parse(command: &str) -> Result<Self> {
        let argv =
            shell_words::split(command).with_context(|| format!("parse LM command: {command}"))?;
        if argv.is_empty() {
            return Err(anyhow!("LM command is empty"));
        }
        Ok(Self { argv })
    }
}

impl CompletionService for CommandService {
    fn complete(&self, prompt: &Prompt) -> Result<String, ServiceError> {
        let program = &self.argv[0];
        let start = Instant::now();
        let mut child = Command::new(program)
            .args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ServiceError::permanent(format!("spawn LM command {program}: {err}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            let rendered = prompt.render();
            if let Err(err) = stdin.write_all(rendered.as_bytes()) {
                // A command may answer without reading its input.
                if err.kind() != ErrorKind::BrokenPipe {
                    return Err(ServiceError::transient(format!(
                        "write prompt to LM stdin: {err}"
                    )));
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|err| ServiceError::transient(format!("wait for LM command: {err}")))?;
        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            response_bytes = output.stdout.len(),
            "lm command complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = format!("LM command failed with {}: {}", output.status, stderr.trim());
            return Err(match output.status.code() {
                Some(code) if PERMANENT_EXIT_CODES.contains(&code) => ServiceError::permanent(message),
                _ => ServiceError::transient(message),
            });
        }

        String::from_utf8(output.stdout)
            .map(|text| text.trim().to_string())
            .map_err(|err| ServiceError::transient(format!("decode LM stdout as UTF-8: {err}")))
    }

    fn describe(&self) -> String {
        format!("command `{}`", self.argv.join(" "))
    }
}
