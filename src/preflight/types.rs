//! Preflight check results and the printed report.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// The build will fail.
    Fail,
    /// The build may work, but something the user asked for will not.
    Warn,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Warn => "WARN",
        })
    }
}

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            details,
        }
    }

    pub fn pass(name: &str) -> Self {
        Self::new(name, CheckStatus::Pass, None)
    }

    pub fn pass_with(name: &str, details: impl fmt::Display) -> Self {
        Self::new(name, CheckStatus::Pass, Some(details.to_string()))
    }

    pub fn fail(name: &str, details: impl fmt::Display) -> Self {
        Self::new(name, CheckStatus::Fail, Some(details.to_string()))
    }

    pub fn warn(name: &str, details: impl fmt::Display) -> Self {
        Self::new(name, CheckStatus::Warn, Some(details.to_string()))
    }
}

/// Results of all preflight checks.
#[derive(Debug, Default)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    /// No check failed. Warnings are allowed.
    pub fn all_passed(&self) -> bool {
        self.fail_count() == 0
    }

    pub fn fail_count(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    pub fn warn_count(&self) -> usize {
        self.count(CheckStatus::Warn)
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let icon = match check.status {
                CheckStatus::Pass => "✓",
                CheckStatus::Fail => "✗",
                CheckStatus::Warn => "⚠",
            };
            match &check.details {
                Some(details) => println!("  {} [{}] {}: {}", icon, check.status, check.name, details),
                None => println!("  {} [{}] {}", icon, check.status, check.name),
            }
        }

        println!();
        println!(
            "Summary: {}/{} passed",
            self.count(CheckStatus::Pass),
            self.checks.len()
        );
        if self.fail_count() > 0 {
            println!("         {} FAILED - build will not succeed", self.fail_count());
        }
        if self.warn_count() > 0 {
            println!("         {} warnings", self.warn_count());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_do_not_fail_report() {
        let report = PreflightReport {
            checks: vec![
                CheckResult::pass("curl"),
                CheckResult::warn("qemu-system-aarch64", "not found"),
            ],
        };
        assert!(report.all_passed());
        assert_eq!(report.warn_count(), 1);
    }

    #[test]
    fn test_failure_counts() {
        let report = PreflightReport {
            checks: vec![CheckResult::fail("init", "missing"), CheckResult::pass("kernel")],
        };
        assert!(!report.all_passed());
        assert_eq!(report.fail_count(), 1);
    }
}
