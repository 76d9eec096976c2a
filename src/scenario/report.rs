//! Scenario reports and console output

use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;

use crate::common::{truncate_for_display, Error};
use crate::http::Response;

use super::runner::ScenarioState;

/// Result of one named assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionOutcome {
    pub name: String,
    pub passed: bool,
    /// Why the assertion failed
    pub message: Option<String>,
}

impl AssertionOutcome {
    pub fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    pub fn fail(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// One request/response pair, kept for diagnostics
#[derive(Debug, Clone)]
pub struct Exchange {
    pub phase: ScenarioState,
    pub label: String,
    pub method: String,
    pub url: String,
    pub request_headers: Vec<(String, String)>,
    pub request_body: Option<String>,
    pub status: u16,
    pub etag: Option<String>,
    pub response_body: String,
    pub elapsed: Duration,
}

impl Exchange {
    pub fn record(phase: ScenarioState, label: &str, response: &Response) -> Self {
        Self {
            phase,
            label: label.to_string(),
            method: response.request.method.to_string(),
            url: response.url.clone(),
            request_headers: response.request.headers.clone(),
            request_body: response.request.body.clone(),
            status: response.status,
            etag: response.etag().map(str::to_string),
            response_body: truncate_for_display(&response.body_text(), 2000),
            elapsed: response.elapsed,
        }
    }
}

/// The phase that aborted a scenario and why
#[derive(Debug)]
pub struct PhaseFailure {
    pub phase: ScenarioState,
    pub error: Error,
}

/// Everything observed while running one scenario
#[derive(Debug)]
pub struct ScenarioReport {
    pub name: String,
    /// Scenario file, when loaded from disk
    pub path: Option<PathBuf>,
    /// States visited, ending in `Done`
    pub trace: Vec<ScenarioState>,
    pub failure: Option<PhaseFailure>,
    pub assertions: Vec<AssertionOutcome>,
    pub exchanges: Vec<Exchange>,
    /// Teardown errors are recorded but never change the outcome
    pub teardown_errors: Vec<String>,
    pub duration: Duration,
}

impl ScenarioReport {
    /// No phase failed and every assertion held
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.assertions.iter().all(|a| a.passed)
    }

    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionOutcome> {
        self.assertions.iter().filter(|a| !a.passed)
    }

    /// Outcome of the assertion with this name
    pub fn assertion(&self, name: &str) -> Option<&AssertionOutcome> {
        self.assertions.iter().find(|a| a.name == name)
    }

    /// Print the report in the console format
    pub fn print(&self, verbose: bool) {
        println!(
            "\n{} {}",
            "Scenario:".blue().bold(),
            self.name.white().bold()
        );
        if let Some(path) = &self.path {
            println!("  {}", path.display().to_string().dimmed());
        }

        if let Some(failure) = &self.failure {
            println!(
                "  {} {} failed: {}",
                "✗".red(),
                failure.phase,
                failure.error
            );
        }

        for outcome in &self.assertions {
            if outcome.passed {
                println!("  {} {}", "✓".green(), outcome.name);
            } else {
                println!("  {} {}", "✗".red(), outcome.name);
                if let Some(message) = &outcome.message {
                    println!("      {}", message.red());
                }
            }
        }

        for error in &self.teardown_errors {
            println!("  {} teardown: {}", "!".yellow(), error.yellow());
        }

        // Exchanges are the main diagnostic for a failure
        if verbose || !self.passed() {
            for exchange in &self.exchanges {
                println!(
                    "    {} {} {} {} {}",
                    format!("[{}]", exchange.phase).dimmed(),
                    exchange.label.dimmed(),
                    exchange.method,
                    exchange.url,
                    status_colored(exchange.status)
                );
                if verbose {
                    if let Some(body) = &exchange.request_body {
                        println!("      > {}", truncate_for_display(body, 300).dimmed());
                    }
                    if let Some(etag) = &exchange.etag {
                        println!("      < etag: {}", etag.dimmed());
                    }
                    if !exchange.response_body.is_empty() {
                        println!(
                            "      < {}",
                            truncate_for_display(&exchange.response_body, 300).dimmed()
                        );
                    }
                }
            }
        }

        if self.passed() {
            println!(
                "  {} {} ({} ms)",
                "✓".green().bold(),
                "Passed".green().bold(),
                self.duration.as_millis()
            );
        } else {
            println!(
                "  {} {} ({} ms)",
                "✗".red().bold(),
                "Failed".red().bold(),
                self.duration.as_millis()
            );
        }
    }
}

fn status_colored(status: u16) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        200..=399 => text.green(),
        400..=499 => text.yellow(),
        _ => text.red(),
    }
}

/// Reports for a whole run, in scenario order
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub reports: Vec<ScenarioReport>,
    pub duration: Duration,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(ScenarioReport::passed)
    }

    /// Print the totals line and the names of failed scenarios
    pub fn print_summary(&self) {
        println!();
        let failed: Vec<_> = self.reports.iter().filter(|r| !r.passed()).collect();
        if failed.is_empty() {
            println!(
                "{} {} scenarios passed ({:.1}s)",
                "✓".green().bold(),
                self.reports.len(),
                self.duration.as_secs_f64()
            );
            return;
        }
        println!("{}", "Failed scenarios:".red().bold());
        for report in &failed {
            println!("  {} {}", "✗".red(), report.name);
        }
        println!(
            "\n{} passed, {} failed ({:.1}s)",
            self.passed().to_string().green(),
            self.failed().to_string().red(),
            self.duration.as_secs_f64()
        );
    }
}
