//! Action state machine
//!
//! Each invocation runs exactly one [`Action`] to completion. Commands run
//! strictly one after another; the local image and credential stores are not
//! safe for concurrent use.

use crate::auth::{RegistryLogin, resolve};
use crate::context::{list_directory, prepare_build_directory};
use crate::dockerfile::{materialize, target_path};
use crate::engine::DockerCli;
use crate::error::{BuildError, Result};
use crate::image::ImageReference;
use crate::plan::BuildPlan;
use crate::runner::{CommandRunner, CommandSpec};
use crate::scan::{ScanVerdict, VulnerabilityGate};
use crate::stages::{FromLineExtractor, StageExtractor, pullable_images};
use colored::Colorize;
use imageflow_config::{Action, StepConfig};

/// Layer inspection tool run by the dive action
const DIVE: &str = "dive";

/// Docker client plus the logins performed so far
struct Session<'a> {
    docker: DockerCli<'a>,
    login: RegistryLogin<'a>,
}

impl Session<'_> {
    async fn login(&mut self, push: bool, images: &[ImageReference]) -> Result<()> {
        self.login
            .login_if_required(&self.docker, push, images)
            .await
    }

    /// Tag from the canonical source (unless it is the source), log in, push
    async fn publish(&mut self, source: &ImageReference, target: &ImageReference) -> Result<()> {
        if source != target {
            self.docker.tag(source, target).await?;
        }
        self.login(true, std::slice::from_ref(target)).await?;
        println!("  {} {}", "→".cyan(), target.to_string().cyan());
        self.docker.push(target).await?;
        tracing::info!("Pushed {}", target);
        Ok(())
    }
}

pub struct Orchestrator<'a> {
    config: &'a StepConfig,
    runner: &'a dyn CommandRunner,
    extractor: Box<dyn StageExtractor>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a StepConfig, runner: &'a dyn CommandRunner) -> Self {
        Self {
            config,
            runner,
            extractor: Box::new(FromLineExtractor),
        }
    }

    /// Replace the `FROM` line matcher
    pub fn with_extractor(mut self, extractor: Box<dyn StageExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    fn session(&self) -> Session<'a> {
        Session {
            docker: DockerCli::new(self.runner),
            login: RegistryLogin::new(
                &self.config.credentials.registries,
                self.config.pipeline.full_path(),
            ),
        }
    }

    fn plan(&self) -> Result<BuildPlan> {
        BuildPlan::new(
            self.config,
            Vec::new(),
            target_path(&self.config.path, &self.config.dockerfile),
        )
    }

    /// Validate the configuration and run the configured action
    pub async fn run(&self) -> Result<()> {
        self.config.validate()?;
        tracing::info!(action = %self.config.action, container = %self.config.container, "Starting");

        let mut session = self.session();
        match self.config.action {
            Action::Build => self.build(&mut session).await,
            Action::Push => self.push(&mut session).await,
            Action::Tag => self.tag(&mut session).await,
            Action::History => self.history(&mut session).await,
            Action::Scan => {
                let plan = self.plan()?;
                self.scan(&session, &plan.source_image()).await.map(|_| ())
            }
            Action::Dive => self.dive(&session).await,
        }
    }

    async fn build(&self, session: &mut Session<'_>) -> Result<()> {
        let config = self.config;

        prepare_build_directory(&config.path, &config.copy)?;
        let dockerfile = materialize(config)?;

        tracing::info!("Listing directory {} content", config.path.display());
        for entry in list_directory(&config.path)? {
            tracing::info!("- {}", entry);
        }

        let stages = self.extractor.extract(&dockerfile.content);
        tracing::debug!("Found {} stage(s)", stages.len());

        // base images first: each may need its own login on a shared host
        for image in pullable_images(&stages) {
            session.login(false, &[ImageReference::parse(&image)]).await?;
            tracing::info!("Pulling base image {}", image);
            session.docker.pull(&image).await?;
        }

        let plan = BuildPlan::new(config, stages, dockerfile.path)?;
        let source = plan.source_image();
        session.login(false, std::slice::from_ref(&source)).await?;

        for cache in plan.cache_images() {
            tracing::info!("Pulling {} to use as cache during build", cache);
            session.docker.try_pull(&cache).await;
        }

        println!("{} Building {}", "→".cyan(), source.to_string().cyan());
        println!("{}", dockerfile.content.dimmed());

        for step in plan.build_steps() {
            if let Some(target) = &step.invocation.target {
                tracing::info!("Building stage {}", target);
            }
            session.docker.build(&step.invocation).await?;

            if let Some(cache) = step.push_cache {
                if let Err(e) = session.publish(&cache, &cache).await {
                    tracing::warn!("Failed to push cache image {}: {}", cache, e);
                }
            }
        }
        println!("{} Built {}", "✓".green(), source.to_string().green());

        self.scan(session, &source).await?;
        Ok(())
    }

    async fn push(&self, session: &mut Session<'_>) -> Result<()> {
        let plan = self.plan()?;
        let source = plan.source_image();

        if self.config.push_version_tag {
            for repository in &plan.repositories {
                let target = plan.image(repository, &plan.tag_set.version_tag);
                session.publish(&source, &target).await?;
            }
        } else {
            println!(
                "{} Skipping push of version tag {}",
                "!".yellow(),
                plan.tag_set.version_tag
            );
        }

        if !self.config.no_cache_push
            && let Some(cache) = plan.cache_image()
        {
            session.publish(&cache, &cache).await?;
        }

        for tag in &plan.tag_set.additional_tags {
            for repository in &plan.repositories {
                let target = plan.image(repository, tag);
                session.publish(&source, &target).await?;
            }
        }

        println!("{} Pushed {}", "✓".green(), source.to_string().green());
        Ok(())
    }

    async fn tag(&self, session: &mut Session<'_>) -> Result<()> {
        let plan = self.plan()?;
        let source = plan.source_image();

        session.login(false, std::slice::from_ref(&source)).await?;
        tracing::info!("Pulling {}", source);
        session.docker.pull(&source.to_string()).await?;

        for repository in plan.repositories.iter().skip(1) {
            let target = plan.image(repository, &plan.tag_set.version_tag);
            session.publish(&source, &target).await?;
        }

        for tag in &plan.tag_set.additional_tags {
            for repository in &plan.repositories {
                let target = plan.image(repository, tag);
                session.publish(&source, &target).await?;
            }
        }

        println!("{} Tagged {}", "✓".green(), source.to_string().green());
        Ok(())
    }

    async fn history(&self, session: &mut Session<'_>) -> Result<()> {
        let plan = self.plan()?;
        let image = plan.source_image();

        session.login(false, std::slice::from_ref(&image)).await?;
        if session.docker.history(&image).await?.success() {
            return Ok(());
        }

        tracing::info!("Image {} not available locally, pulling before retrying", image);
        session.docker.pull(&image.to_string()).await?;

        let outcome = session.docker.history(&image).await?;
        if !outcome.success() {
            return Err(BuildError::CommandFailed {
                command: format!("docker history {}", image),
                code: outcome.code,
            });
        }
        Ok(())
    }

    async fn scan(&self, session: &Session<'_>, image: &ImageReference) -> Result<ScanVerdict> {
        let credentials = &self.config.credentials;
        let resolved = resolve(&credentials.registries, std::slice::from_ref(image));
        let db_repository = resolved
            .values()
            .find_map(|c| c.vulnerability_db_bucket.as_deref());

        VulnerabilityGate::new(self.runner, &self.config.scanner)
            .with_github_token(credentials.github_token())
            .with_db_repository(db_repository)
            .check(&session.docker, image)
            .await
    }

    async fn dive(&self, session: &Session<'_>) -> Result<()> {
        let image = self.plan()?.source_image();
        tracing::info!("Inspecting layers of {}", image);
        session
            .docker
            .run_tool(CommandSpec::new(DIVE).arg(image.to_string()).env("CI", "true"))
            .await
    }
}
