//! Registry credential resolution and login
//!
//! Credentials are matched to images by repository prefix. The local docker
//! credential store keeps one login per registry host, so logins are tracked
//! per host and redone only when another prefix used that host last.

use crate::engine::DockerCli;
use crate::error::Result;
use crate::image::ImageReference;
use colored::Colorize;
use imageflow_config::ContainerRegistryCredential;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

/// Host key used for prefixes without a registry host segment
const DEFAULT_REGISTRY: &str = "docker.io";

/// Map every image to the credential with the longest matching prefix
///
/// A credential matches when its repository equals one of the image's
/// `/`-bounded repository prefixes; the result is keyed and deduplicated by
/// that prefix.
pub fn resolve<'c>(
    credentials: &'c [ContainerRegistryCredential],
    images: &[ImageReference],
) -> BTreeMap<String, &'c ContainerRegistryCredential> {
    let mut resolved = BTreeMap::new();

    for image in images {
        let matched = image.repository_prefixes().into_iter().find_map(|prefix| {
            credentials
                .iter()
                .find(|c| c.repository.trim_end_matches('/') == prefix)
        });

        if let Some(credential) = matched {
            resolved
                .entry(credential.repository.trim_end_matches('/').to_string())
                .or_insert(credential);
        }
    }

    resolved
}

/// Whether the pipeline at `pipeline_path` may push with this credential
///
/// An empty allow-list allows every pipeline; an invalid pattern allows none.
pub fn is_allowed_to_push(credential: &ContainerRegistryCredential, pipeline_path: &str) -> bool {
    let pattern = credential.allowed_pipelines_to_push.trim();
    if pattern.is_empty() {
        return true;
    }

    match Regex::new(&format!("^(?:{})$", pattern)) {
        Ok(re) => re.is_match(pipeline_path),
        Err(e) => {
            tracing::warn!(
                "Invalid allowedPipelinesToPush pattern for credential '{}': {}",
                credential.name,
                e
            );
            false
        }
    }
}

/// Registry host of a repository prefix: the segment before the first `/`
pub fn registry_host(prefix: &str) -> Option<&str> {
    prefix.split_once('/').map(|(host, _)| host)
}

/// Performs the logins an action needs, once per registry host
pub struct RegistryLogin<'a> {
    credentials: &'a [ContainerRegistryCredential],
    pipeline_path: String,
    /// registry host -> prefix whose credential is currently stored
    active: HashMap<String, String>,
}

impl<'a> RegistryLogin<'a> {
    pub fn new(credentials: &'a [ContainerRegistryCredential], pipeline_path: impl Into<String>) -> Self {
        Self {
            credentials,
            pipeline_path: pipeline_path.into(),
            active: HashMap::new(),
        }
    }

    /// Log in to every registry the images need
    ///
    /// With `push` set, credentials whose allow-list rejects this pipeline are
    /// skipped; pushing to those targets then fails at the registry instead.
    pub async fn login_if_required(
        &mut self,
        docker: &DockerCli<'_>,
        push: bool,
        images: &[ImageReference],
    ) -> Result<()> {
        let resolved = resolve(self.credentials, images);
        tracing::debug!(
            "Filtered {} container-registry credentials down to {} for {} image(s)",
            self.credentials.len(),
            resolved.len(),
            images.len()
        );

        for (prefix, credential) in resolved {
            if push && !is_allowed_to_push(credential, &self.pipeline_path) {
                println!(
                    "{} Pushing to repository '{}' is not allowed for {}, skipping login",
                    "!".yellow(),
                    prefix,
                    self.pipeline_path
                );
                tracing::info!(repository = %prefix, "push not allowed, skipping login");
                continue;
            }

            let host = registry_host(&prefix);
            let host_key = host.unwrap_or(DEFAULT_REGISTRY).to_string();
            if self.active.get(&host_key) == Some(&prefix) {
                tracing::debug!("Already logged in to '{}' for {}", host_key, prefix);
                continue;
            }

            tracing::info!("Logging in to repository '{}'", prefix);
            docker
                .login(&credential.username, &credential.password, host)
                .await?;
            self.active.insert(host_key, prefix);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;

    fn credential(repository: &str) -> ContainerRegistryCredential {
        ContainerRegistryCredential {
            name: format!("container-registry-{}", repository.replace('/', "-")),
            repository: repository.to_string(),
            username: format!("{}-user", repository),
            password: format!("{}-password", repository),
            allowed_pipelines_to_push: String::new(),
            vulnerability_db_bucket: None,
            service_account_keyfile: None,
        }
    }

    fn images(references: &[&str]) -> Vec<ImageReference> {
        references.iter().map(|r| ImageReference::parse(r)).collect()
    }

    #[test]
    fn test_resolve_picks_matching_prefix() {
        let credentials = vec![credential("estafette"), credential("extensions")];
        let resolved = resolve(&credentials, &images(&["extensions/docker:stable"]));

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["extensions"].repository, "extensions");
    }

    #[test]
    fn test_resolve_is_prefix_exact() {
        let credentials = vec![credential("estafette")];
        let resolved = resolve(&credentials, &images(&["estafette-internal/foo:1.0"]));

        assert!(resolved.is_empty());
    }

    #[test]
    fn test_resolve_deduplicates() {
        let credentials = vec![credential("estafette")];
        let resolved = resolve(
            &credentials,
            &images(&["estafette/ci-api:1.0", "estafette/ci-web:2.0"]),
        );

        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_resolve_prefers_longest_prefix() {
        let credentials = vec![credential("eu.gcr.io"), credential("eu.gcr.io/org")];
        let resolved = resolve(
            &credentials,
            &images(&["eu.gcr.io/org/app:1", "eu.gcr.io/other/app:1"]),
        );

        assert_eq!(
            resolved.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["eu.gcr.io", "eu.gcr.io/org"]
        );
    }

    #[test]
    fn test_registry_host() {
        assert_eq!(registry_host("eu.gcr.io/org"), Some("eu.gcr.io"));
        assert_eq!(registry_host("extensions"), None);
    }

    #[test]
    fn test_allow_list() {
        let mut c = credential("extensions");
        assert!(is_allowed_to_push(&c, "github.com/anyone/anything"));

        c.allowed_pipelines_to_push = " github.com/estafette/.+ ".to_string();
        assert!(is_allowed_to_push(&c, "github.com/estafette/estafette-ci-api"));
        assert!(!is_allowed_to_push(&c, "github.com/other/estafette-ci-api"));
        assert!(!is_allowed_to_push(&c, "x/github.com/estafette/a"));

        c.allowed_pipelines_to_push = "github.com/estafette/a|github.com/estafette/b".to_string();
        assert!(is_allowed_to_push(&c, "github.com/estafette/b"));
        assert!(!is_allowed_to_push(&c, "github.com/estafette/bc"));

        c.allowed_pipelines_to_push = "([".to_string();
        assert!(!is_allowed_to_push(&c, "github.com/estafette/a"));
    }

    #[tokio::test]
    async fn test_push_login_skips_disallowed_credentials() {
        let mut denied = credential("eu.gcr.io/private");
        denied.allowed_pipelines_to_push = "github.com/private/.+".to_string();
        let credentials = vec![credential("extensions"), denied];

        let runner = RecordingRunner::new();
        let docker = DockerCli::new(&runner);
        let mut login = RegistryLogin::new(&credentials, "github.com/estafette/app");

        login
            .login_if_required(
                &docker,
                true,
                &images(&["extensions/app:1", "eu.gcr.io/private/app:1"]),
            )
            .await
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec!["docker login --username extensions-user --password-stdin"]
        );

        // pulling does not consult the allow-list
        login
            .login_if_required(&docker, false, &images(&["eu.gcr.io/private/app:1"]))
            .await
            .unwrap();
        assert_eq!(
            runner.command_lines()[1],
            "docker login --username eu.gcr.io/private-user --password-stdin eu.gcr.io"
        );
    }

    #[tokio::test]
    async fn test_login_tracked_per_host() {
        let credentials = vec![credential("eu.gcr.io/a"), credential("eu.gcr.io/b")];
        let runner = RecordingRunner::new();
        let docker = DockerCli::new(&runner);
        let mut login = RegistryLogin::new(&credentials, "github.com/o/n");

        for image in ["eu.gcr.io/a/x:1", "eu.gcr.io/a/y:1", "eu.gcr.io/b/x:1", "eu.gcr.io/a/x:2"] {
            login
                .login_if_required(&docker, false, &images(&[image]))
                .await
                .unwrap();
        }

        let users: Vec<String> = runner
            .calls()
            .iter()
            .map(|c| c.args[2].clone())
            .collect();
        assert_eq!(
            users,
            vec!["eu.gcr.io/a-user", "eu.gcr.io/b-user", "eu.gcr.io/a-user"]
        );
    }
}
