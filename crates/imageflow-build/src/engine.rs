//! docker CLI wrapper

use crate::error::{BuildError, Result};
use crate::image::ImageReference;
use crate::runner::{CommandOutcome, CommandRunner, CommandSpec};
use std::path::{Path, PathBuf};

const DOCKER: &str = "docker";

/// Build argument that embeds cache metadata into pushed images
pub const INLINE_CACHE_ARG: &str = "BUILDKIT_INLINE_CACHE=1";

/// Options of a single `docker build`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInvocation {
    pub dockerfile: PathBuf,
    pub context: PathBuf,
    pub tags: Vec<ImageReference>,
    pub cache_from: Vec<ImageReference>,
    pub target: Option<String>,
    pub build_args: Vec<(String, String)>,
    pub no_cache: bool,
    pub inline_cache: bool,
}

impl BuildInvocation {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec!["build".to_string()];
        if self.no_cache {
            args.push("--no-cache".to_string());
        }
        for tag in &self.tags {
            args.push("--tag".to_string());
            args.push(tag.to_string());
        }
        if let Some(target) = &self.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }
        for (name, value) in &self.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", name, value));
        }
        if self.inline_cache {
            args.push("--build-arg".to_string());
            args.push(INLINE_CACHE_ARG.to_string());
        }
        for cache in &self.cache_from {
            args.push("--cache-from".to_string());
            args.push(cache.to_string());
        }
        args.push("--file".to_string());
        args.push(self.dockerfile.display().to_string());
        args.push(self.context.display().to_string());
        args
    }
}

/// Typed docker commands on top of a [`CommandRunner`]
pub struct DockerCli<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> DockerCli<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Run a command and turn a non-zero exit into [`BuildError::CommandFailed`]
    async fn run_checked(&self, command: CommandSpec) -> Result<()> {
        let outcome = self.runner.run(&command).await?;
        if !outcome.success() {
            return Err(BuildError::CommandFailed {
                command: command.to_string(),
                code: outcome.code,
            });
        }
        Ok(())
    }

    pub async fn build(&self, invocation: &BuildInvocation) -> Result<()> {
        self.run_checked(CommandSpec::new(DOCKER).args(invocation.to_args()))
            .await
    }

    pub async fn pull(&self, image: &str) -> Result<()> {
        self.run_checked(CommandSpec::new(DOCKER).args(["pull", image]))
            .await
    }

    /// Pull that is allowed to fail, e.g. for cache images that do not exist yet
    pub async fn try_pull(&self, image: &ImageReference) -> bool {
        let command = CommandSpec::new(DOCKER).args(["pull".to_string(), image.to_string()]);
        match self.runner.run(&command).await {
            Ok(outcome) if outcome.success() => true,
            Ok(outcome) => {
                tracing::debug!("Ignoring failed pull of {} ({:?})", image, outcome.code);
                false
            }
            Err(e) => {
                tracing::debug!("Ignoring failed pull of {}: {}", image, e);
                false
            }
        }
    }

    pub async fn push(&self, image: &ImageReference) -> Result<()> {
        self.run_checked(CommandSpec::new(DOCKER).args(["push".to_string(), image.to_string()]))
            .await
    }

    pub async fn tag(&self, source: &ImageReference, target: &ImageReference) -> Result<()> {
        self.run_checked(CommandSpec::new(DOCKER).args([
            "tag".to_string(),
            source.to_string(),
            target.to_string(),
        ]))
        .await
    }

    /// `docker history`; the raw outcome lets the caller decide on a retry
    pub async fn history(&self, image: &ImageReference) -> Result<CommandOutcome> {
        self.runner
            .run(&CommandSpec::new(DOCKER).args(["history".to_string(), image.to_string()]))
            .await
    }

    pub async fn save(&self, image: &ImageReference, output: &Path) -> Result<()> {
        self.run_checked(CommandSpec::new(DOCKER).args([
            "save".to_string(),
            image.to_string(),
            "-o".to_string(),
            output.display().to_string(),
        ]))
        .await
    }

    /// `docker login`, password on stdin; host omitted for the default registry
    pub async fn login(&self, username: &str, password: &str, host: Option<&str>) -> Result<()> {
        let mut command = CommandSpec::new(DOCKER)
            .args(["login", "--username", username, "--password-stdin"])
            .stdin(password);
        if let Some(host) = host {
            command = command.arg(host);
        }
        self.run_checked(command).await
    }

    /// Run an arbitrary external tool through the same runner
    pub async fn run_tool(&self, command: CommandSpec) -> Result<()> {
        self.run_checked(command).await
    }
}
