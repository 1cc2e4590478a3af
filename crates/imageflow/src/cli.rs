use clap::{ArgAction, Parser, ValueEnum};
use imageflow_config::{
    Action, CacheStrategy, CredentialSet, Environment, PipelineInfo, ScannerConfig, Severity,
    StepConfig,
};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "imageflow", version)]
#[command(
    about = "Build, tag, push and scan container images from a CI pipeline step",
    long_about = None
)]
pub struct Cli {
    /// Action to run: build, push, tag, history, scan or dive
    #[arg(long, env = "IMAGEFLOW_ACTION")]
    pub action: Action,

    /// Repositories to push to; the first one is the primary repository
    #[arg(long, env = "IMAGEFLOW_REPOSITORIES", value_delimiter = ',')]
    pub repositories: Vec<String>,

    /// Container (image) name; defaults to the app label or git repository name
    #[arg(long, env = "IMAGEFLOW_CONTAINER")]
    pub container: Option<String>,

    /// Additional tags besides the version tag
    #[arg(long, env = "IMAGEFLOW_TAGS", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Build directory
    #[arg(long, env = "IMAGEFLOW_PATH", default_value = ".")]
    pub path: PathBuf,

    /// Path to the Dockerfile
    #[arg(long, env = "IMAGEFLOW_DOCKERFILE", default_value = "Dockerfile")]
    pub dockerfile: PathBuf,

    /// Dockerfile content, used instead of --dockerfile
    #[arg(long, env = "IMAGEFLOW_INLINE")]
    pub inline: Option<String>,

    /// Fallback Dockerfile for images inheriting from this one
    #[arg(
        long,
        env = "IMAGEFLOW_TEMPLATE_DOCKERFILE",
        default_value = "/template/Dockerfile"
    )]
    pub template_dockerfile: PathBuf,

    /// Files and directories to copy into the build directory
    #[arg(long, env = "IMAGEFLOW_COPY", value_delimiter = ',')]
    pub copy: Vec<PathBuf>,

    /// Stage to build in a multi-stage Dockerfile
    #[arg(long, env = "IMAGEFLOW_TARGET")]
    pub target: Option<String>,

    /// Environment variables passed as build arguments
    #[arg(long, env = "IMAGEFLOW_ARGS", value_delimiter = ',')]
    pub args: Vec<String>,

    /// Push the version tag
    #[arg(long, env = "IMAGEFLOW_PUSH_VERSION_TAG", default_value_t = true, action = ArgAction::Set)]
    pub push_version_tag: bool,

    #[arg(long, env = "IMAGEFLOW_VERSION_TAG_PREFIX")]
    pub version_tag_prefix: Option<String>,

    #[arg(long, env = "IMAGEFLOW_VERSION_TAG_SUFFIX")]
    pub version_tag_suffix: Option<String>,

    /// Build without layer cache and without cache images
    #[arg(long, env = "IMAGEFLOW_NO_CACHE")]
    pub no_cache: bool,

    /// Keep cache images local
    #[arg(long, env = "IMAGEFLOW_NO_CACHE_PUSH")]
    pub no_cache_push: bool,

    /// Cache images per stage or per git branch
    #[arg(long, env = "IMAGEFLOW_CACHE_STRATEGY", default_value = "stages")]
    pub cache_strategy: CacheStrategy,

    /// Expand environment variables in the Dockerfile
    #[arg(long, env = "IMAGEFLOW_EXPAND_ENVVARS", default_value_t = true, action = ArgAction::Set)]
    pub expand_envvars: bool,

    /// Environment variables never expanded in the Dockerfile
    #[arg(
        long,
        env = "IMAGEFLOW_DONT_EXPAND",
        value_delimiter = ',',
        default_value = "PATH"
    )]
    pub dont_expand: Vec<String>,

    /// Lowest vulnerability severity that fails the build
    #[arg(long, env = "IMAGEFLOW_MINIMUM_SEVERITY_TO_FAIL", default_value = "CRITICAL")]
    pub minimum_severity_to_fail: Severity,

    /// Export the image to a tar archive and scan the archive
    #[arg(long, env = "IMAGEFLOW_SCAN_ARCHIVE")]
    pub scan_archive: bool,

    #[arg(long, env = "IMAGEFLOW_SCANNER_BINARY", default_value = "trivy")]
    pub scanner_binary: PathBuf,

    #[arg(long, env = "IMAGEFLOW_SCANNER_CACHE_DIR", default_value = "/trivy-cache")]
    pub scanner_cache_dir: PathBuf,

    #[arg(long, env = "IMAGEFLOW_GIT_SOURCE", default_value = "")]
    pub git_source: String,

    #[arg(long, env = "IMAGEFLOW_GIT_OWNER", default_value = "")]
    pub git_owner: String,

    #[arg(long, env = "IMAGEFLOW_GIT_NAME", default_value = "")]
    pub git_name: String,

    #[arg(long, env = "IMAGEFLOW_GIT_BRANCH", default_value = "")]
    pub git_branch: String,

    /// Application label, the preferred default container name
    #[arg(long, env = "IMAGEFLOW_APP_NAME", default_value = "")]
    pub app_name: String,

    /// CI build version, the source of the version tag
    #[arg(long, env = "IMAGEFLOW_BUILD_VERSION", default_value = "")]
    pub build_version: String,

    /// Container registry credentials (JSON)
    #[arg(long, env = "IMAGEFLOW_CREDENTIALS", hide_env_values = true)]
    pub credentials: Option<String>,

    /// GitHub API token credentials (JSON)
    #[arg(long, env = "IMAGEFLOW_GITHUB_API_TOKEN", hide_env_values = true)]
    pub github_api_token: Option<String>,

    #[arg(long, env = "IMAGEFLOW_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

fn clean(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Cli {
    /// Build the immutable step configuration
    pub fn into_config(self, environment: Environment) -> imageflow_config::Result<StepConfig> {
        let mut credentials = CredentialSet::default();
        if let Some(json) = &self.credentials {
            credentials.extend_from_json(json)?;
        }
        if let Some(json) = &self.github_api_token {
            credentials.extend_from_json(json)?;
        }

        let pipeline = PipelineInfo {
            git_source: self.git_source,
            git_owner: self.git_owner,
            git_name: self.git_name,
            git_branch: self.git_branch,
            app_label: self.app_name,
            build_version: self.build_version,
        };
        let container = pipeline
            .container_name(self.container.as_deref())
            .unwrap_or_default();

        let copy = self
            .copy
            .into_iter()
            .filter(|p| !p.as_os_str().is_empty())
            .collect();

        Ok(StepConfig {
            action: self.action,
            repositories: clean(self.repositories),
            container,
            tags: clean(self.tags),
            path: self.path,
            dockerfile: self.dockerfile,
            inline_dockerfile: non_empty(self.inline),
            template_dockerfile: self.template_dockerfile,
            copy,
            target: non_empty(self.target),
            args: clean(self.args),
            push_version_tag: self.push_version_tag,
            version_tag_prefix: non_empty(self.version_tag_prefix),
            version_tag_suffix: non_empty(self.version_tag_suffix),
            no_cache: self.no_cache,
            no_cache_push: self.no_cache_push,
            cache_strategy: self.cache_strategy,
            expand_environment_variables: self.expand_envvars,
            dont_expand: clean(self.dont_expand),
            scanner: ScannerConfig {
                binary: self.scanner_binary,
                cache_dir: self.scanner_cache_dir,
                scan_archive: self.scan_archive,
                minimum_severity_to_fail: self.minimum_severity_to_fail,
            },
            pipeline,
            credentials,
            environment,
        })
    }
}
