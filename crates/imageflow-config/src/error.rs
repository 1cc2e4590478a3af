use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown action '{0}'; use one of: build, push, tag, history, scan, dive")]
    UnknownAction(String),

    #[error("Unknown severity '{0}'; use one of: UNKNOWN, LOW, MEDIUM, HIGH, CRITICAL")]
    UnknownSeverity(String),

    #[error("Unknown cache strategy '{0}'; use one of: stages, branch")]
    UnknownCacheStrategy(String),

    #[error(
        "Set `repositories:` to list at least one `- <repository>` (for example `- extensions`)"
    )]
    MissingRepositories,

    #[error("No container name; set `container:` or provide an app label or git repository name")]
    MissingContainer,

    #[error("When setting pushVersionTag to false you need at least one tag")]
    NoTagToPush,

    #[error("Unsupported credential type '{kind}' for credential '{name}'")]
    UnsupportedCredentialType { name: String, kind: String },

    #[error("Credential '{name}' is missing required property '{property}'")]
    MissingCredentialProperty { name: String, property: &'static str },

    #[error("Failed to decode injected credentials: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
