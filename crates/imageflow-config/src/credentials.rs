//! Registry credentials injected by the CI server
//!
//! The CI server hands trusted steps a JSON array of loosely typed records
//! (`name`, `type`, `additionalProperties`). They are decoded once into
//! [`Credential`] variants so the rest of imageflow never looks at raw keys.

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

const CONTAINER_REGISTRY: &str = "container-registry";
const GITHUB_API_TOKEN: &str = "github-api-token";

/// A credential record after validation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawCredential")]
pub enum Credential {
    ContainerRegistry(ContainerRegistryCredential),
    GithubApiToken(ApiTokenCredential),
}

/// Login details for one repository prefix of a container registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRegistryCredential {
    pub name: String,
    /// Registry host plus namespace, e.g. `eu.gcr.io/myorg` or `extensions`
    pub repository: String,
    pub username: String,
    pub password: String,
    /// Regular expression over the full pipeline path; empty allows every pipeline
    pub allowed_pipelines_to_push: String,
    pub vulnerability_db_bucket: Option<String>,
    pub service_account_keyfile: Option<String>,
}

/// GitHub API token, used by the scanner to avoid rate limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTokenCredential {
    pub name: String,
    pub token: String,
}

/// Wire shape of an injected credential
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCredential {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    additional_properties: Map<String, Value>,
}

impl RawCredential {
    fn required(&self, property: &'static str) -> Result<String> {
        self.optional(property)
            .ok_or_else(|| ConfigError::MissingCredentialProperty {
                name: self.name.clone(),
                property,
            })
    }

    fn optional(&self, property: &str) -> Option<String> {
        self.additional_properties
            .get(property)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

impl TryFrom<RawCredential> for Credential {
    type Error = ConfigError;

    fn try_from(raw: RawCredential) -> Result<Self> {
        match raw.kind.as_str() {
            CONTAINER_REGISTRY => Ok(Credential::ContainerRegistry(ContainerRegistryCredential {
                repository: raw.required("repository")?,
                username: raw.required("username")?,
                password: raw.required("password")?,
                allowed_pipelines_to_push: raw
                    .optional("allowedPipelinesToPush")
                    .unwrap_or_default(),
                vulnerability_db_bucket: raw.optional("trivyVulnerabilityDBGCSBucket"),
                service_account_keyfile: raw.optional("serviceAccountKeyfile"),
                name: raw.name,
            })),
            GITHUB_API_TOKEN => Ok(Credential::GithubApiToken(ApiTokenCredential {
                token: raw.required("token")?,
                name: raw.name,
            })),
            _ => Err(ConfigError::UnsupportedCredentialType {
                name: raw.name,
                kind: raw.kind,
            }),
        }
    }
}

/// All credentials available to the step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    pub registries: Vec<ContainerRegistryCredential>,
    pub github_tokens: Vec<ApiTokenCredential>,
}

impl CredentialSet {
    /// Decode one JSON array of credential records and sort them by kind
    ///
    /// An empty or whitespace-only document yields no credentials.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut set = Self::default();
        set.extend_from_json(json)?;
        Ok(set)
    }

    /// Decode another JSON array into this set
    pub fn extend_from_json(&mut self, json: &str) -> Result<()> {
        if json.trim().is_empty() {
            return Ok(());
        }

        let credentials: Vec<Credential> = serde_json::from_str(json)?;
        for credential in credentials {
            match credential {
                Credential::ContainerRegistry(c) => self.registries.push(c),
                Credential::GithubApiToken(c) => self.github_tokens.push(c),
            }
        }
        Ok(())
    }

    /// The token handed to the scanner, if any was injected
    pub fn github_token(&self) -> Option<&str> {
        self.github_tokens.first().map(|c| c.token.as_str())
    }
}
