//! Image tag normalization
//!
//! Registry tags may contain `[A-Za-z0-9_.-]`, must not start with `.` or `-`
//! and are at most 128 characters long.

use regex::Regex;
use std::sync::LazyLock;

pub const MAX_TAG_LENGTH: usize = 128;

/// Cache tag of the final stage under the stages strategy
pub const FINAL_STAGE_CACHE_TAG: &str = "dlc";

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_.\-]+").expect("tag character class is valid"));

/// Turn an arbitrary string into a valid registry tag
pub fn sanitize_tag(raw: &str) -> String {
    let replaced = DISALLOWED.replace_all(raw, "-");
    let trimmed = replaced.trim_start_matches(['.', '-']);

    // only ASCII survives the replacement, so byte and char lengths agree
    trimmed.chars().take(MAX_TAG_LENGTH).collect()
}

/// Compose `prefix-version-suffix` and sanitize the result as a whole
pub fn version_tag(version: &str, prefix: Option<&str>, suffix: Option<&str>) -> String {
    let mut composed = String::new();
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        composed.push_str(prefix);
        composed.push('-');
    }
    composed.push_str(version);
    if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
        composed.push('-');
        composed.push_str(suffix);
    }
    sanitize_tag(&composed)
}

/// `dlc` for the final stage, `dlc-<alias>` for an aliased intermediate stage
pub fn cache_tag_for_stage(alias: Option<&str>) -> String {
    match alias.filter(|a| !a.is_empty()) {
        Some(alias) => sanitize_tag(&format!("{}-{}", FINAL_STAGE_CACHE_TAG, alias)),
        None => FINAL_STAGE_CACHE_TAG.to_string(),
    }
}

/// Cache tag shared by every build of one git branch
pub fn branch_cache_tag(branch: &str) -> String {
    sanitize_tag(&format!("cache-{}", branch))
}

/// Every tag a built image carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet {
    pub version_tag: String,
    pub additional_tags: Vec<String>,
    pub cache_tag: Option<String>,
}

impl TagSet {
    /// Build the tag set, sanitizing every entry
    ///
    /// Additional tags keep their order; empty entries, duplicates and entries
    /// equal to the version or cache tag are dropped.
    pub fn new(
        version: &str,
        prefix: Option<&str>,
        suffix: Option<&str>,
        tags: &[String],
        cache_tag: Option<String>,
    ) -> Self {
        let version_tag = version_tag(version, prefix, suffix);

        let mut additional_tags: Vec<String> = Vec::new();
        for tag in tags.iter().map(|t| sanitize_tag(t)) {
            if tag.is_empty()
                || tag == version_tag
                || cache_tag.as_deref() == Some(tag.as_str())
                || additional_tags.contains(&tag)
            {
                continue;
            }
            additional_tags.push(tag);
        }

        Self {
            version_tag,
            additional_tags,
            cache_tag,
        }
    }

    /// Version tag followed by the additional tags
    pub fn release_tags(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.version_tag.as_str())
            .chain(self.additional_tags.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_runs_of_invalid_characters() {
        assert_eq!(
            sanitize_tag("0.0.187-release/release-x"),
            "0.0.187-release-release-x"
        );
        assert_eq!(sanitize_tag("feature//a b"), "feature-a-b");
    }

    #[test]
    fn test_sanitize_keeps_valid_tags() {
        assert_eq!(sanitize_tag("1.0.23-beta_B"), "1.0.23-beta_B");
    }

    #[test]
    fn test_sanitize_strips_leading_separators() {
        assert_eq!(sanitize_tag(".hidden"), "hidden");
        assert_eq!(sanitize_tag("-x"), "x");
        assert_eq!(sanitize_tag("/refs/heads/main"), "refs-heads-main");
        assert_eq!(sanitize_tag("..-.a"), "a");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "a".repeat(300);
        assert_eq!(sanitize_tag(&long).len(), MAX_TAG_LENGTH);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "",
            "///",
            "0.0.187-release/release-x",
            "-.-x..y",
            "émoji 🚀 tag",
            "feature/ABC-123_fix",
            &"é/".repeat(200),
        ];
        for input in inputs {
            let once = sanitize_tag(input);
            assert_eq!(sanitize_tag(&once), once, "input: {:?}", input);
            assert!(once.len() <= MAX_TAG_LENGTH);
        }
    }

    #[test]
    fn test_version_tag_composition() {
        assert_eq!(version_tag("1.2.3", None, None), "1.2.3");
        assert_eq!(version_tag("1.2.3", Some("v"), None), "v-1.2.3");
        assert_eq!(
            version_tag("1.2.3", Some("pre/fix"), Some("linux amd64")),
            "pre-fix-1.2.3-linux-amd64"
        );
        assert_eq!(version_tag("1.2.3", Some(""), Some("")), "1.2.3");
    }

    #[test]
    fn test_cache_tags() {
        assert_eq!(cache_tag_for_stage(None), "dlc");
        assert_eq!(cache_tag_for_stage(Some("builder")), "dlc-builder");
        assert_eq!(branch_cache_tag("feature/x"), "cache-feature-x");
    }

    #[test]
    fn test_tag_set_suppresses_duplicates() {
        let tags = vec![
            "dev".to_string(),
            "1.2.3".to_string(),
            "dev".to_string(),
            "dlc".to_string(),
            "feature/x".to_string(),
            "".to_string(),
        ];
        let set = TagSet::new("1.2.3", None, None, &tags, Some("dlc".to_string()));

        assert_eq!(set.version_tag, "1.2.3");
        assert_eq!(set.additional_tags, vec!["dev", "feature-x"]);
        assert_eq!(
            set.release_tags().collect::<Vec<_>>(),
            vec!["1.2.3", "dev", "feature-x"]
        );
    }
}
