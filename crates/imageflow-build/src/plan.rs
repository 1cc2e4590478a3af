//! Build plan: the images, tags and docker builds one invocation works with

use crate::engine::BuildInvocation;
use crate::error::{BuildError, Result};
use crate::image::ImageReference;
use crate::stages::{Stage, cache_stages, final_stage};
use crate::tag::{FINAL_STAGE_CACHE_TAG, TagSet, branch_cache_tag, cache_tag_for_stage};
use imageflow_config::{CacheStrategy, StepConfig};
use std::path::PathBuf;

/// One `docker build`, optionally followed by an immediate cache push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    pub invocation: BuildInvocation,
    pub push_cache: Option<ImageReference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub stages: Vec<Stage>,
    /// First entry is the primary repository all read-back operations use
    pub repositories: Vec<String>,
    pub container: String,
    pub tag_set: TagSet,
    pub build_args: Vec<(String, String)>,
    pub no_cache: bool,
    pub no_cache_push: bool,
    pub cache_strategy: CacheStrategy,
    pub target_stage: Option<String>,
    pub dockerfile_path: PathBuf,
    pub context_dir: PathBuf,
}

impl BuildPlan {
    pub fn new(config: &StepConfig, stages: Vec<Stage>, dockerfile_path: PathBuf) -> Result<Self> {
        let cache_tag = match (config.caching_enabled(), config.cache_strategy) {
            (false, _) => None,
            (true, CacheStrategy::Stages) => Some(FINAL_STAGE_CACHE_TAG.to_string()),
            (true, CacheStrategy::Branch) => Some(branch_cache_tag(&config.pipeline.git_branch)),
        };

        let tag_set = TagSet::new(
            &config.pipeline.build_version,
            config.version_tag_prefix.as_deref(),
            config.version_tag_suffix.as_deref(),
            &config.tags,
            cache_tag,
        );
        if tag_set.version_tag.is_empty() {
            return Err(BuildError::EmptyVersionTag);
        }

        let build_args = config
            .args
            .iter()
            .map(|name| (name.clone(), config.env(name).unwrap_or_default().to_string()))
            .collect();

        Ok(Self {
            stages,
            repositories: config.repositories.clone(),
            container: config.container.clone(),
            tag_set,
            build_args,
            no_cache: config.no_cache,
            no_cache_push: config.no_cache_push,
            cache_strategy: config.cache_strategy,
            target_stage: config.target.clone().filter(|t| !t.is_empty()),
            dockerfile_path,
            context_dir: config.path.clone(),
        })
    }

    fn image_in(&self, repository: Option<&str>, tag: &str) -> ImageReference {
        match repository {
            Some(repository) => ImageReference::for_container(repository, &self.container, tag),
            None => ImageReference::new(self.container.clone(), tag),
        }
    }

    /// Image in the primary repository; just the container name without repositories
    pub fn primary_image(&self, tag: &str) -> ImageReference {
        self.image_in(self.repositories.first().map(String::as_str), tag)
    }

    /// `<repo0>/<container>:<version>`, the canonical source of push and tag
    pub fn source_image(&self) -> ImageReference {
        self.primary_image(&self.tag_set.version_tag)
    }

    pub fn image(&self, repository: &str, tag: &str) -> ImageReference {
        self.image_in(Some(repository), tag)
    }

    /// Every repository × release tag, repository by repository
    pub fn release_images(&self) -> Vec<ImageReference> {
        self.repositories
            .iter()
            .flat_map(|repository| {
                self.tag_set
                    .release_tags()
                    .map(move |tag| self.image(repository, tag))
            })
            .collect()
    }

    /// The final cache image the push action publishes, when caching is on
    pub fn cache_image(&self) -> Option<ImageReference> {
        self.tag_set
            .cache_tag
            .as_deref()
            .map(|tag| self.primary_image(tag))
    }

    /// Stages up to an aliased target override, with the build target for the last one
    fn effective_stages(&self) -> (&[Stage], Option<String>) {
        if let Some(target) = &self.target_stage
            && let Some(index) = self
                .stages
                .iter()
                .position(|s| s.alias.as_deref() == Some(target.as_str()))
        {
            return (&self.stages[..=index], Some(target.clone()));
        }
        (&self.stages, self.target_stage.clone())
    }

    /// Cache images worth pulling before the build, intermediate stages first
    pub fn cache_images(&self) -> Vec<ImageReference> {
        if self.no_cache {
            return Vec::new();
        }
        match self.cache_strategy {
            CacheStrategy::Branch => self.cache_image().into_iter().collect(),
            CacheStrategy::Stages => {
                let (stages, _) = self.effective_stages();
                cache_stages(stages)
                    .into_iter()
                    .map(|s| self.primary_image(&cache_tag_for_stage(s.alias.as_deref())))
                    .chain(self.cache_image())
                    .collect()
            }
        }
    }

    fn base_invocation(&self) -> BuildInvocation {
        BuildInvocation {
            dockerfile: self.dockerfile_path.clone(),
            context: self.context_dir.clone(),
            build_args: self.build_args.clone(),
            ..Default::default()
        }
    }

    /// The docker builds to run, in order
    pub fn build_steps(&self) -> Vec<BuildStep> {
        let release = self.release_images();

        let Some(final_cache) = self.cache_image().filter(|_| !self.no_cache) else {
            return vec![BuildStep {
                invocation: BuildInvocation {
                    tags: release,
                    target: self.target_stage.clone(),
                    no_cache: true,
                    ..self.base_invocation()
                },
                push_cache: None,
            }];
        };

        match self.cache_strategy {
            CacheStrategy::Branch => vec![BuildStep {
                invocation: BuildInvocation {
                    tags: std::iter::once(final_cache.clone()).chain(release).collect(),
                    cache_from: vec![final_cache],
                    target: self.target_stage.clone(),
                    inline_cache: true,
                    ..self.base_invocation()
                },
                push_cache: None,
            }],
            CacheStrategy::Stages => {
                let (stages, target) = self.effective_stages();
                let mut steps = Vec::new();
                let mut cache_from: Vec<ImageReference> = Vec::new();

                for stage in cache_stages(stages) {
                    let cache = self.primary_image(&cache_tag_for_stage(stage.alias.as_deref()));
                    cache_from.push(cache.clone());
                    steps.push(BuildStep {
                        invocation: BuildInvocation {
                            tags: vec![cache.clone()],
                            cache_from: cache_from.clone(),
                            target: stage.alias.clone(),
                            inline_cache: true,
                            ..self.base_invocation()
                        },
                        push_cache: (!self.no_cache_push).then_some(cache),
                    });
                }

                cache_from.push(final_cache.clone());
                steps.push(BuildStep {
                    invocation: BuildInvocation {
                        tags: std::iter::once(final_cache).chain(release).collect(),
                        cache_from,
                        target,
                        inline_cache: true,
                        ..self.base_invocation()
                    },
                    push_cache: None,
                });
                steps
            }
        }
    }

    /// The last stage of the build, if the Dockerfile has any `FROM`
    pub fn final_stage(&self) -> Option<&Stage> {
        final_stage(self.effective_stages().0)
    }
}
