//! Dockerfile stage graph
//!
//! Only `FROM` lines are interpreted. Stages are returned in file order, which
//! is the only valid build order.

use regex::Regex;
use std::sync::LazyLock;

static FROM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*FROM[ \t]+(?:--\S+[ \t]+)*([^\s]+)(?:[ \t]+AS[ \t]+([a-zA-Z0-9_.\-]+))?[ \t]*\r?$",
    )
    .expect("FROM line pattern is valid")
});

const BYTE_ORDER_MARK: char = '\u{feff}';

/// One `FROM` clause of a (multi-stage) Dockerfile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub image: String,
    pub alias: Option<String>,
    /// No registry host segment, or an unexpanded `$` placeholder
    pub is_official: bool,
    pub ordinal: usize,
}

impl Stage {
    fn new(image: &str, alias: Option<&str>, ordinal: usize) -> Self {
        Self {
            image: image.to_string(),
            alias: alias.map(str::to_string),
            is_official: !image.contains('/') || image.contains('$'),
            ordinal,
        }
    }
}

/// Turns Dockerfile text into its ordered stages
pub trait StageExtractor: Send + Sync {
    fn extract(&self, dockerfile: &str) -> Vec<Stage>;
}

/// Line oriented `FROM` matcher
#[derive(Debug, Default, Clone, Copy)]
pub struct FromLineExtractor;

impl StageExtractor for FromLineExtractor {
    fn extract(&self, dockerfile: &str) -> Vec<Stage> {
        let text = dockerfile.strip_prefix(BYTE_ORDER_MARK).unwrap_or(dockerfile);

        FROM_LINE
            .captures_iter(text)
            .filter_map(|caps| {
                let image = caps.get(1)?.as_str();
                let alias = caps.get(2).map(|m| m.as_str());
                Some((image, alias))
            })
            .enumerate()
            .map(|(ordinal, (image, alias))| Stage::new(image, alias, ordinal))
            .collect()
    }
}

/// Extract stages with the default line matcher
pub fn extract_stages(dockerfile: &str) -> Vec<Stage> {
    FromLineExtractor.extract(dockerfile)
}

/// The stage that produces the image
pub fn final_stage(stages: &[Stage]) -> Option<&Stage> {
    stages.last()
}

/// Aliased stages before the final one, each of which gets its own cache image
pub fn cache_stages(stages: &[Stage]) -> Vec<&Stage> {
    let Some((_, intermediate)) = stages.split_last() else {
        return Vec::new();
    };
    intermediate.iter().filter(|s| s.alias.is_some()).collect()
}

/// Distinct base images that must be pulled from a registry, in file order
pub fn pullable_images(stages: &[Stage]) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();
    for stage in stages.iter().filter(|s| !s.is_official) {
        if !images.contains(&stage.image) {
            images.push(stage.image.clone());
        }
    }
    images
}
