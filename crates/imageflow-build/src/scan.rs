//! Vulnerability gate
//!
//! Runs trivy against a built image and decides whether the pipeline may
//! continue, based on the scanner's exit code.

use crate::engine::DockerCli;
use crate::error::{BuildError, Result};
use crate::image::ImageReference;
use crate::runner::{CommandRunner, CommandSpec};
use colored::Colorize;
use imageflow_config::{ScannerConfig, Severity};

/// Exit code trivy is told to use when it finds vulnerabilities
pub const VULNERABILITIES_EXIT_CODE: i32 = 15;

/// Exit code of trivy's "unknown OS" failure, tolerated with a warning
pub const UNKNOWN_OS_EXIT_CODE: i32 = 1;

/// Comma separated severities at or above `minimum`
pub fn severity_filter(minimum: Severity) -> String {
    minimum
        .and_above()
        .iter()
        .map(Severity::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// What gets handed to the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTarget {
    Image(ImageReference),
    Archive(String),
}

/// Outcome of a scan that did not fail the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanVerdict {
    Passed,
    /// The scanner hit its unknown OS error; nothing was decided
    ScannerErrorTolerated,
}

/// Map a scanner exit code to a verdict
pub fn evaluate(code: Option<i32>, image: &ImageReference, filter: &str) -> Result<ScanVerdict> {
    match code {
        Some(0) => Ok(ScanVerdict::Passed),
        Some(VULNERABILITIES_EXIT_CODE) => Err(BuildError::VulnerabilitiesFound {
            image: image.to_string(),
            severities: filter.to_string(),
        }),
        Some(UNKNOWN_OS_EXIT_CODE) => {
            tracing::warn!("Ignoring unknown OS error of the vulnerability scanner");
            Ok(ScanVerdict::ScannerErrorTolerated)
        }
        code => Err(BuildError::ScannerFailed { code }),
    }
}

pub struct VulnerabilityGate<'a> {
    runner: &'a dyn CommandRunner,
    scanner: &'a ScannerConfig,
    github_token: Option<&'a str>,
    db_repository: Option<&'a str>,
}

impl<'a> VulnerabilityGate<'a> {
    pub fn new(runner: &'a dyn CommandRunner, scanner: &'a ScannerConfig) -> Self {
        Self {
            runner,
            scanner,
            github_token: None,
            db_repository: None,
        }
    }

    /// Forwarded as `GITHUB_TOKEN` to avoid GitHub API rate limits
    pub fn with_github_token(mut self, token: Option<&'a str>) -> Self {
        self.github_token = token;
        self
    }

    /// Alternative location of the vulnerability database
    pub fn with_db_repository(mut self, repository: Option<&'a str>) -> Self {
        self.db_repository = repository;
        self
    }

    fn command(&self) -> CommandSpec {
        let mut command = CommandSpec::new(self.scanner.binary.display().to_string());
        if let Some(token) = self.github_token {
            command = command.env("GITHUB_TOKEN", token);
        }
        command
    }

    pub fn refresh_args(&self) -> Vec<String> {
        let mut args = vec![
            "image".to_string(),
            "--cache-dir".to_string(),
            self.scanner.cache_dir.display().to_string(),
            "--download-db-only".to_string(),
        ];
        if let Some(repository) = self.db_repository {
            args.push("--db-repository".to_string());
            args.push(repository.to_string());
        }
        args
    }

    pub fn scan_args(&self, target: &ScanTarget) -> Vec<String> {
        let mut args = vec![
            "image".to_string(),
            "--cache-dir".to_string(),
            self.scanner.cache_dir.display().to_string(),
            "--severity".to_string(),
            severity_filter(self.scanner.minimum_severity_to_fail),
            "--skip-db-update".to_string(),
            "--no-progress".to_string(),
            "--exit-code".to_string(),
            VULNERABILITIES_EXIT_CODE.to_string(),
            "--ignore-unfixed".to_string(),
        ];
        match target {
            ScanTarget::Image(image) => args.push(image.to_string()),
            ScanTarget::Archive(path) => {
                args.push("--input".to_string());
                args.push(path.clone());
            }
        }
        args
    }

    /// Best-effort database refresh; failures are logged and ignored
    pub async fn refresh_database(&self) {
        tracing::info!("Updating vulnerability database");
        match self.runner.run(&self.command().args(self.refresh_args())).await {
            Ok(outcome) if outcome.success() => {}
            Ok(outcome) => tracing::warn!(
                "Vulnerability database refresh failed ({:?}), using cached database",
                outcome.code
            ),
            Err(e) => tracing::warn!("Vulnerability database refresh failed: {}", e),
        }
    }

    /// Refresh the database, scan the image and apply the exit policy
    pub async fn check(&self, docker: &DockerCli<'_>, image: &ImageReference) -> Result<ScanVerdict> {
        self.refresh_database().await;

        let filter = severity_filter(self.scanner.minimum_severity_to_fail);

        // keeps the exported archive alive until the scan finished
        let archive = if self.scanner.scan_archive {
            let file = tempfile::Builder::new().suffix(".tar").tempfile()?;
            tracing::info!("Saving image {} to {} for scanning", image, file.path().display());
            docker.save(image, file.path()).await?;
            Some(file)
        } else {
            None
        };
        let target = match &archive {
            Some(file) => ScanTarget::Archive(file.path().display().to_string()),
            None => ScanTarget::Image(image.clone()),
        };

        println!(
            "{} Scanning {} for vulnerabilities of severity {}",
            "→".cyan(),
            image.to_string().cyan(),
            filter
        );
        let outcome = self.runner.run(&self.command().args(self.scan_args(&target))).await?;

        let verdict = evaluate(outcome.code, image, &filter)?;
        if verdict == ScanVerdict::Passed {
            println!("{} No vulnerabilities of severity {} found", "✓".green(), filter);
        }
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use std::path::PathBuf;

    fn scanner(minimum: Severity) -> ScannerConfig {
        ScannerConfig {
            binary: PathBuf::from("trivy"),
            cache_dir: PathBuf::from("/trivy-cache"),
            scan_archive: false,
            minimum_severity_to_fail: minimum,
        }
    }

    fn image() -> ImageReference {
        ImageReference::new("extensions/docker", "1.2.3")
    }

    #[test]
    fn test_severity_filter() {
        assert_eq!(severity_filter(Severity::High), "HIGH,CRITICAL");
        assert_eq!(severity_filter(Severity::Critical), "CRITICAL");
        assert_eq!(
            severity_filter(Severity::Unknown),
            "UNKNOWN,LOW,MEDIUM,HIGH,CRITICAL"
        );
    }

    #[test]
    fn test_exit_policy() {
        assert_eq!(
            evaluate(Some(0), &image(), "CRITICAL").unwrap(),
            ScanVerdict::Passed
        );
        assert_eq!(
            evaluate(Some(1), &image(), "CRITICAL").unwrap(),
            ScanVerdict::ScannerErrorTolerated
        );
        assert!(matches!(
            evaluate(Some(15), &image(), "HIGH,CRITICAL"),
            Err(BuildError::VulnerabilitiesFound { .. })
        ));
        assert!(matches!(
            evaluate(Some(2), &image(), "CRITICAL"),
            Err(BuildError::ScannerFailed { code: Some(2) })
        ));
        assert!(matches!(
            evaluate(None, &image(), "CRITICAL"),
            Err(BuildError::ScannerFailed { code: None })
        ));
    }

    #[tokio::test]
    async fn test_scan_with_high_threshold() {
        let runner = RecordingRunner::new();
        let docker = DockerCli::new(&runner);
        let config = scanner(Severity::High);
        let gate = VulnerabilityGate::new(&runner, &config)
            .with_github_token(Some("ghp_token"))
            .with_db_repository(Some("eu.gcr.io/org/trivy-db"));

        let verdict = gate.check(&docker, &image()).await.unwrap();
        assert_eq!(verdict, ScanVerdict::Passed);

        let calls = runner.calls();
        assert_eq!(
            calls[0].to_string(),
            "trivy image --cache-dir /trivy-cache --download-db-only \
             --db-repository eu.gcr.io/org/trivy-db"
        );
        assert_eq!(
            calls[1].to_string(),
            "trivy image --cache-dir /trivy-cache --severity HIGH,CRITICAL --skip-db-update \
             --no-progress --exit-code 15 --ignore-unfixed extensions/docker:1.2.3"
        );
        assert!(
            calls[1]
                .envs
                .contains(&("GITHUB_TOKEN".to_string(), "ghp_token".to_string()))
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_is_ignored_but_findings_are_not() {
        let runner = RecordingRunner::new()
            .exit_with("--download-db-only", 2)
            .exit_with("--severity", 15);
        let docker = DockerCli::new(&runner);
        let config = scanner(Severity::High);

        let err = VulnerabilityGate::new(&runner, &config)
            .check(&docker, &image())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::VulnerabilitiesFound { ref severities, .. } if severities == "HIGH,CRITICAL"));
    }

    #[tokio::test]
    async fn test_scan_archive() {
        let runner = RecordingRunner::new();
        let docker = DockerCli::new(&runner);
        let mut config = scanner(Severity::Critical);
        config.scan_archive = true;

        VulnerabilityGate::new(&runner, &config)
            .check(&docker, &image())
            .await
            .unwrap();

        let lines = runner.command_lines();
        assert!(lines[1].starts_with("docker save extensions/docker:1.2.3 -o "));
        assert!(lines[1].ends_with(".tar"));
        assert!(lines[2].contains("--ignore-unfixed --input "));
    }
}
