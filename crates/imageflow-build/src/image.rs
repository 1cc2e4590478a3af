//! Image references

use std::fmt;

/// `repository:tag`, where the repository includes registry host and namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageReference {
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// `<repository prefix>/<container>:<tag>`
    pub fn for_container(prefix: &str, container: &str, tag: &str) -> Self {
        Self::new(format!("{}/{}", prefix.trim_end_matches('/'), container), tag)
    }

    /// Parse `repository[:tag]`; a reference without tag gets `latest`
    ///
    /// A `:` followed by a port number belongs to the registry host, not the tag.
    pub fn parse(reference: &str) -> Self {
        if let Some(pos) = reference.rfind(':') {
            let potential_tag = &reference[pos + 1..];
            if !potential_tag.contains('/') && !potential_tag.chars().all(|c| c.is_ascii_digit())
            {
                return Self::new(&reference[..pos], potential_tag);
            }
        }
        Self::new(reference, "latest")
    }

    /// Same repository, different tag
    pub fn with_tag(&self, tag: &str) -> Self {
        Self::new(self.repository.clone(), tag)
    }

    /// Registry path prefixes of the repository, longest first
    ///
    /// `eu.gcr.io/org/app` yields `eu.gcr.io/org/app`, `eu.gcr.io/org`, `eu.gcr.io`.
    pub fn repository_prefixes(&self) -> Vec<&str> {
        let mut prefixes = vec![self.repository.as_str()];
        let mut rest = self.repository.as_str();
        while let Some(pos) = rest.rfind('/') {
            rest = &rest[..pos];
            prefixes.push(rest);
        }
        prefixes
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
