//! Terminal output for the diagnostic binary

use crate::cli::args::VerbosityLevel;
use crate::error::SliceError;
use crate::js::{ExtractionReport, TargetStatus};
use crate::platform::{PlayerData, TokenResults};
use colored::{ColoredString, Colorize};
use std::time::Duration;

/// Output formatter for sigslice
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        self.verbosity
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            println!("{} {}", "info:".cyan().bold(), message);
        }
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            println!("{} {}", "ok:".green().bold(), message);
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "error:".red().bold(), message);
    }

    /// Print debug message
    pub fn debug(&self, message: &str) {
        if self.verbosity == VerbosityLevel::Verbose {
            println!("{} {}", "debug:".dimmed(), message);
        }
    }

    /// Print the player summary and its extraction report
    pub fn print_player(&self, data: &PlayerData, elapsed: Duration) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        println!("{} {}", "Player".bold(), data.version.bold());
        println!("  script     {}", data.script_url);
        let timestamp = if data.signature_timestamp == 0 {
            "missing".red()
        } else {
            data.signature_timestamp.to_string().normal()
        };
        println!("  timestamp  {}", timestamp);
        println!("  exports    {}", data.script.exported.join(", "));
        println!("  time       {}", format_duration(elapsed));
        println!();
        self.print_report(&data.report);
    }

    /// Print per-target extraction status
    pub fn print_report(&self, report: &ExtractionReport) {
        if self.verbosity == VerbosityLevel::Quiet {
            return;
        }

        if !report.module_found {
            self.warning(&SliceError::NoModuleWrapper.to_string());
        }
        let wrapper = report
            .module_parameter
            .as_deref()
            .unwrap_or("<none>");
        println!(
            "Scanned {}/{} statements (module parameter {}, {} declarations{})",
            report.statements_scanned,
            report.statements_total,
            wrapper,
            report.declarations,
            if report.stopped_early { ", stopped early" } else { "" }
        );

        for target in &report.targets {
            let declaration = target.declaration.as_deref().unwrap_or("-");
            println!(
                "  {:<10} {:<24} {}",
                status_label(target.status),
                target.name,
                declaration
            );
            if !target.unresolved.is_empty() && self.verbosity == VerbosityLevel::Verbose {
                println!("             unresolved: {}", target.unresolved.join(", "));
            }
        }
        println!();
    }

    /// Print transformed tokens
    pub fn print_tokens(&self, results: &TokenResults) {
        if let Some(sig) = &results.sig {
            self.print_value("sig", sig);
        }
        if let Some(n) = &results.n {
            self.print_value("n", n);
        }
    }

    /// Print the rewritten format URL
    pub fn print_url(&self, url: &str) {
        self.print_value("url", url);
    }

    // Quiet mode keeps bare values so the output stays scriptable
    fn print_value(&self, label: &str, value: &str) {
        if self.verbosity == VerbosityLevel::Quiet {
            println!("{}", value);
        } else {
            println!("{} {}", format!("{}:", label).bold(), value);
        }
    }
}

fn status_label(status: TargetStatus) -> ColoredString {
    match status {
        TargetStatus::Ready => "ready".green(),
        TargetStatus::Matched => "incomplete".yellow(),
        TargetStatus::Unmatched => "unmatched".red(),
    }
}

/// Format duration as human-readable string
fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();

    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let minutes = duration.as_secs() / 60;
        let seconds = duration.as_secs() % 60;
        if seconds == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    }
}
