//! Dockerfile lookup and materialization
//!
//! Lookup order: inline content, the configured path, the template path.
//! The selected content gets environment variables expanded and is written
//! into the build directory under the configured file name.

use crate::error::{BuildError, Result};
use imageflow_config::{Environment, StepConfig};
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("variable pattern is valid")
});

/// Where the Dockerfile content comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerfileSource {
    Inline(String),
    File(PathBuf),
}

impl DockerfileSource {
    /// Pick the first available source
    pub fn locate(config: &StepConfig) -> Result<Self> {
        if let Some(inline) = config.inline_dockerfile.as_ref().filter(|s| !s.trim().is_empty()) {
            return Ok(DockerfileSource::Inline(inline.clone()));
        }

        let candidates = [&config.dockerfile, &config.template_dockerfile];
        for candidate in candidates {
            if candidate.is_file() {
                return Ok(DockerfileSource::File(candidate.clone()));
            }
        }

        Err(BuildError::DockerfileNotFound {
            searched: candidates.into_iter().cloned().collect(),
        })
    }

    pub fn read(&self) -> Result<String> {
        match self {
            DockerfileSource::Inline(content) => Ok(content.clone()),
            DockerfileSource::File(path) => {
                tracing::info!("Reading Dockerfile content from {}", path.display());
                Ok(std::fs::read_to_string(path)?)
            }
        }
    }
}

/// The Dockerfile as written into the build directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedDockerfile {
    pub path: PathBuf,
    pub content: String,
}

/// Locate, expand and write the Dockerfile for a build
pub fn materialize(config: &StepConfig) -> Result<MaterializedDockerfile> {
    let source = DockerfileSource::locate(config)?;
    let mut content = source.read()?;

    if config.expand_environment_variables {
        tracing::info!("Expanding environment variables in Dockerfile");
        content = expand_environment_variables(&content, &config.environment, &config.dont_expand);
    }

    let path = target_path(&config.path, &config.dockerfile);
    tracing::info!("Writing Dockerfile to {}", path.display());
    std::fs::write(&path, &content)?;

    Ok(MaterializedDockerfile { path, content })
}

/// `<build dir>/<file name of the configured dockerfile>`
pub fn target_path(build_dir: &Path, dockerfile: &Path) -> PathBuf {
    let file_name = dockerfile
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Dockerfile"));
    build_dir.join(file_name)
}

/// Replace `${NAME}` and `$NAME` with values from `env`
///
/// Names listed in `dont_expand`, unset names and names with an empty value
/// are written back as `${NAME}`.
pub fn expand_environment_variables(
    text: &str,
    env: &Environment,
    dont_expand: &[String],
) -> String {
    VARIABLE
        .replace_all(text, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();

            let skipped = dont_expand.iter().any(|d| d == name);
            match env.get(name).filter(|v| !v.is_empty()) {
                Some(value) if !skipped => value.clone(),
                _ => format!("${{{}}}", name),
            }
        })
        .into_owned()
}
