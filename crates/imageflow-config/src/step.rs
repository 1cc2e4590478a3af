//! Immutable step configuration
//!
//! Everything the pipeline step needs is collected into one [`StepConfig`]
//! at startup and passed by reference from there on.

use crate::credentials::CredentialSet;
use crate::error::{ConfigError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Snapshot of the process environment taken at startup
pub type Environment = BTreeMap<String, String>;

/// The action a single step invocation runs to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Build,
    Push,
    Tag,
    History,
    Scan,
    Dive,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Build => "build",
            Action::Push => "push",
            Action::Tag => "tag",
            Action::History => "history",
            Action::Scan => "scan",
            Action::Dive => "dive",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "build" => Ok(Action::Build),
            "push" => Ok(Action::Push),
            "tag" => Ok(Action::Tag),
            "history" => Ok(Action::History),
            "scan" => Ok(Action::Scan),
            "dive" => Ok(Action::Dive),
            _ => Err(ConfigError::UnknownAction(s.to_string())),
        }
    }
}

/// Vulnerability severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    #[default]
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Unknown,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "UNKNOWN",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    /// This severity and every severity above it, least severe first
    pub fn and_above(self) -> Vec<Severity> {
        Self::ALL.into_iter().filter(|s| *s >= self).collect()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNKNOWN" => Ok(Severity::Unknown),
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(ConfigError::UnknownSeverity(s.to_string())),
        }
    }
}

/// How build layers are persisted between pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// One `dlc[-<alias>]` cache image per aliased stage plus the final stage
    #[default]
    Stages,
    /// A single `cache-<branch>` image per git branch
    Branch,
}

impl FromStr for CacheStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stages" => Ok(CacheStrategy::Stages),
            "branch" => Ok(CacheStrategy::Branch),
            _ => Err(ConfigError::UnknownCacheStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStrategy::Stages => f.write_str("stages"),
            CacheStrategy::Branch => f.write_str("branch"),
        }
    }
}

/// Identity of the pipeline running this step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineInfo {
    pub git_source: String,
    pub git_owner: String,
    pub git_name: String,
    pub git_branch: String,
    pub app_label: String,
    pub build_version: String,
}

impl PipelineInfo {
    /// `<source>/<owner>/<name>`, matched against push allow-lists
    pub fn full_path(&self) -> String {
        format!("{}/{}/{}", self.git_source, self.git_owner, self.git_name)
    }

    /// Container name fallback: explicit name, then app label, then git repository name
    pub fn container_name(&self, explicit: Option<&str>) -> Option<String> {
        [explicit.unwrap_or_default(), &self.app_label, &self.git_name]
            .into_iter()
            .map(str::trim)
            .find(|name| !name.is_empty())
            .map(str::to_string)
    }
}

/// Vulnerability scanner settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    pub binary: PathBuf,
    pub cache_dir: PathBuf,
    /// Export the image to a tar archive and scan that instead of the reference
    pub scan_archive: bool,
    pub minimum_severity_to_fail: Severity,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("trivy"),
            cache_dir: PathBuf::from("/trivy-cache"),
            scan_archive: false,
            minimum_severity_to_fail: Severity::Critical,
        }
    }
}

/// Complete configuration of one step invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepConfig {
    pub action: Action,
    pub repositories: Vec<String>,
    pub container: String,
    pub tags: Vec<String>,
    pub path: PathBuf,
    pub dockerfile: PathBuf,
    pub inline_dockerfile: Option<String>,
    /// Fallback location used by images inheriting from this step
    pub template_dockerfile: PathBuf,
    pub copy: Vec<PathBuf>,
    pub target: Option<String>,
    /// Names of environment variables forwarded as build arguments
    pub args: Vec<String>,
    pub push_version_tag: bool,
    pub version_tag_prefix: Option<String>,
    pub version_tag_suffix: Option<String>,
    pub no_cache: bool,
    pub no_cache_push: bool,
    pub cache_strategy: CacheStrategy,
    pub expand_environment_variables: bool,
    pub dont_expand: Vec<String>,
    pub scanner: ScannerConfig,
    pub pipeline: PipelineInfo,
    pub credentials: CredentialSet,
    pub environment: Environment,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            action: Action::Build,
            repositories: Vec::new(),
            container: String::new(),
            tags: Vec::new(),
            path: PathBuf::from("."),
            dockerfile: PathBuf::from("Dockerfile"),
            inline_dockerfile: None,
            template_dockerfile: PathBuf::from("/template/Dockerfile"),
            copy: Vec::new(),
            target: None,
            args: Vec::new(),
            push_version_tag: true,
            version_tag_prefix: None,
            version_tag_suffix: None,
            no_cache: false,
            no_cache_push: false,
            cache_strategy: CacheStrategy::Stages,
            expand_environment_variables: true,
            dont_expand: vec!["PATH".to_string()],
            scanner: ScannerConfig::default(),
            pipeline: PipelineInfo::default(),
            credentials: CredentialSet::default(),
            environment: Environment::new(),
        }
    }
}

impl StepConfig {
    /// Reject configurations that can never reach a valid end state
    pub fn validate(&self) -> Result<()> {
        if self.repositories.is_empty() && self.action != Action::History {
            return Err(ConfigError::MissingRepositories);
        }

        if self.container.trim().is_empty() {
            return Err(ConfigError::MissingContainer);
        }

        if self.action == Action::Push && !self.push_version_tag && self.tags.is_empty() {
            return Err(ConfigError::NoTagToPush);
        }

        Ok(())
    }

    /// Whether layer caching is in effect for this invocation
    pub fn caching_enabled(&self) -> bool {
        !self.no_cache
    }

    /// Look up a variable in the captured environment
    pub fn env(&self, name: &str) -> Option<&str> {
        self.environment.get(name).map(String::as_str)
    }

    /// Capture the current process environment
    pub fn capture_environment() -> Environment {
        std::env::vars().collect()
    }
}

/// Split a comma separated list, dropping empty entries
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(action: Action) -> StepConfig {
        StepConfig {
            action,
            repositories: vec!["extensions".to_string()],
            container: "docker".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Unknown < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_and_above() {
        assert_eq!(
            Severity::High.and_above(),
            vec![Severity::High, Severity::Critical]
        );
        assert_eq!(Severity::Critical.and_above(), vec![Severity::Critical]);
        assert_eq!(Severity::Unknown.and_above().len(), 5);
    }

    #[test]
    fn test_severity_parse_is_case_insensitive() {
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(" Critical ".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("severe".parse::<Severity>().is_err());
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("build".parse::<Action>().unwrap(), Action::Build);
        assert_eq!("HISTORY".parse::<Action>().unwrap(), Action::History);
        assert!(matches!(
            "deploy".parse::<Action>(),
            Err(ConfigError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_validate_requires_repositories() {
        let mut cfg = config(Action::Build);
        cfg.repositories.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingRepositories)));

        cfg.action = Action::History;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_push_without_any_tag() {
        let mut cfg = config(Action::Push);
        cfg.push_version_tag = false;
        assert!(matches!(cfg.validate(), Err(ConfigError::NoTagToPush)));

        cfg.tags = vec!["dev".to_string()];
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_container() {
        let mut cfg = config(Action::Build);
        cfg.container = " ".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingContainer)));
    }

    #[test]
    fn test_container_name_fallback() {
        let mut pipeline = PipelineInfo {
            git_name: "estafette-ci-api".to_string(),
            ..Default::default()
        };
        assert_eq!(
            pipeline.container_name(None).as_deref(),
            Some("estafette-ci-api")
        );

        pipeline.app_label = "api".to_string();
        assert_eq!(pipeline.container_name(None).as_deref(), Some("api"));
        assert_eq!(pipeline.container_name(Some("web")).as_deref(), Some("web"));
        assert_eq!(pipeline.container_name(Some("")).as_deref(), Some("api"));
    }

    #[test]
    fn test_pipeline_full_path() {
        let pipeline = PipelineInfo {
            git_source: "github.com".to_string(),
            git_owner: "estafette".to_string(),
            git_name: "estafette-ci-api".to_string(),
            ..Default::default()
        };
        assert_eq!(pipeline.full_path(), "github.com/estafette/estafette-ci-api");
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b,,c"), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_capture_environment() {
        temp_env::with_var("IMAGEFLOW_TEST_CAPTURE", Some("yes"), || {
            let env = StepConfig::capture_environment();
            assert_eq!(env.get("IMAGEFLOW_TEST_CAPTURE").map(String::as_str), Some("yes"));
        });
    }
}
