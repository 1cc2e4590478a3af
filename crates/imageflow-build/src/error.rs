use imageflow_config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Where to learn how to fix reported vulnerabilities
pub const REMEDIATION_URL: &str = "https://estafette.io/security/vulnerabilities/";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No Dockerfile found (searched: {})", display_paths(.searched))]
    DockerfileNotFound { searched: Vec<PathBuf> },

    #[error("Copy source not found: {0}")]
    CopySourceNotFound(PathBuf),

    #[error("Copy source is neither a file nor a directory: {0}")]
    UnsupportedCopySource(PathBuf),

    #[error("Build version produces an empty image tag")]
    EmptyVersionTag,

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` failed with {}", display_code(.code))]
    CommandFailed { command: String, code: Option<i32> },

    #[error("Image {image} has vulnerabilities of severity {severities}")]
    VulnerabilitiesFound { image: String, severities: String },

    #[error("Vulnerability scanner failed with {}", display_code(.code))]
    ScannerFailed { code: Option<i32> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

impl BuildError {
    /// User facing message, with a hint on how to resolve the error where one exists
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DockerfileNotFound { .. } => {
                format!(
                    "{}\n\
                     \n\
                     How to fix:\n\
                     1. Set `inline:` with the Dockerfile content\n\
                     2. Set `dockerfile:` to the path of an existing Dockerfile\n\
                     3. Inherit from this image and store a Dockerfile at /template/Dockerfile",
                    self
                )
            }
            BuildError::VulnerabilitiesFound { .. } => {
                format!(
                    "{}!\n\
                     \n\
                     Look at {} to learn how to fix vulnerabilities in your image.",
                    self, REMEDIATION_URL
                )
            }
            BuildError::Config(err) => format!("Invalid configuration: {}", err),
            _ => format!("{}", self),
        }
    }

    /// Process exit code reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Config(_) | BuildError::DockerfileNotFound { .. } => 2,
            BuildError::VulnerabilitiesFound { .. } => 3,
            _ => 1,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            BuildError::Config(ConfigError::MissingRepositories).exit_code(),
            2
        );
        assert_eq!(
            BuildError::VulnerabilitiesFound {
                image: "extensions/docker:1.0.0".to_string(),
                severities: "CRITICAL".to_string(),
            }
            .exit_code(),
            3
        );
        assert_eq!(
            BuildError::CommandFailed {
                command: "docker push".to_string(),
                code: Some(1),
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_vulnerability_message_links_remediation() {
        let err = BuildError::VulnerabilitiesFound {
            image: "extensions/docker:1.0.0".to_string(),
            severities: "HIGH,CRITICAL".to_string(),
        };
        let message = err.user_message();
        assert!(message.contains("HIGH,CRITICAL"));
        assert!(message.contains(REMEDIATION_URL));
    }

    #[test]
    fn test_command_failed_without_code() {
        let err = BuildError::CommandFailed {
            command: "docker build".to_string(),
            code: None,
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
