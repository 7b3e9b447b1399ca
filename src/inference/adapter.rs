//! Retrying adapter between the enrichment loop and a completion service.
//!
//! Transient service errors and unparseable replies are retried with
//! exponential backoff. A permanent service error is returned at once.
//! When the retry budget is spent the row degrades to sentinel values
//! instead of failing the run.

use super::prompt::build_prompt;
use super::response::{parse_response, EnrichmentResult};
use super::{CompletionService, ServiceError};
use crate::schema::TargetSchema;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a row costs at most `max_retries + 1` calls.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt + 1`: `base * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Per-call retry bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryContext {
    /// Retries performed so far.
    pub attempt: u32,
    /// Total time spent waiting between attempts.
    pub waited: Duration,
}

impl RetryContext {
    fn record_retry(&mut self, delay: Duration) {
        self.attempt += 1;
        self.waited += delay;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    Parsed(EnrichmentResult),
    /// Retries exhausted; carries the sentinel fields and the last failure.
    Sentinel {
        result: EnrichmentResult,
        last_error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub outcome: EnrichmentOutcome,
    pub retry: RetryContext,
}

impl Enrichment {
    pub fn result(&self) -> &EnrichmentResult {
        match &self.outcome {
            EnrichmentOutcome::Parsed(result) => result,
            EnrichmentOutcome::Sentinel { result, .. } => result,
        }
    }
}

pub struct Enricher {
    service: Box<dyn CompletionService>,
    schema: TargetSchema,
    policy: RetryPolicy,
}

impl Enricher {
    pub fn new(service: Box<dyn CompletionService>, schema: TargetSchema, policy: RetryPolicy) -> Self {
        Self {
            service,
            schema,
            policy,
        }
    }

    pub fn schema(&self) -> TargetSchema {
        self.schema
    }

    pub fn describe(&self) -> String {
        self.service.describe()
    }

    /// Derive the schema's fields for one title/author pair.
    pub fn enrich(&self, title: &str, author: &str) -> Result<Enrichment, ServiceError> {
        let prompt = build_prompt(self.schema, title, author);
        let mut retry = RetryContext::default();

        loop {
            let failure = match self.service.complete(&prompt) {
                Ok(text) => match parse_response(&text, self.schema, title, author) {
                    Ok(result) => {
                        if retry.attempt > 0 {
                            tracing::debug!(title, retries = retry.attempt, "retry succeeded");
                        }
                        return Ok(Enrichment {
                            outcome: EnrichmentOutcome::Parsed(result),
                            retry,
                        });
                    }
                    Err(mismatch) => {
                        tracing::debug!(
                            title,
                            response = %crate::util::truncate_string(&text, 200),
                            "unparseable response: {mismatch}"
                        );
                        format!("parse mismatch: {mismatch}")
                    }
                },
                Err(err) if err.is_transient() => err.to_string(),
                Err(err) => {
                    tracing::error!(title, "{err}");
                    return Err(err);
                }
            };

            if retry.attempt >= self.policy.max_retries {
                tracing::warn!(
                    title,
                    attempts = retry.attempt + 1,
                    "giving up; writing sentinel values: {failure}"
                );
                return Ok(Enrichment {
                    outcome: EnrichmentOutcome::Sentinel {
                        result: EnrichmentResult::sentinel(self.schema),
                        last_error: failure,
                    },
                    retry,
                });
            }

            let delay = self.policy.backoff(retry.attempt);
            tracing::info!(
                title,
                attempt = retry.attempt + 1,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                "retrying after: {failure}"
            );
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            retry.record_retry(delay);
        }
    }
}
