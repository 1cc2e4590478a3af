use imageflow_config::{Action, ContainerRegistryCredential, PipelineInfo, StepConfig};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestWorkspace {
    pub root: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_dockerfile(&self, content: &str) -> PathBuf {
        let path = self.root.path().join("Dockerfile");
        fs::write(&path, content).unwrap();
        path
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// Step configuration building into `<root>/build`
    pub fn config(&self, action: Action, repositories: &[&str]) -> StepConfig {
        StepConfig {
            action,
            repositories: repositories.iter().map(|r| r.to_string()).collect(),
            container: "app".to_string(),
            path: self.path().join("build"),
            dockerfile: self.path().join("Dockerfile"),
            template_dockerfile: self.path().join("template/Dockerfile"),
            pipeline: PipelineInfo {
                git_source: "github.com".to_string(),
                git_owner: "estafette".to_string(),
                git_name: "app".to_string(),
                git_branch: "main".to_string(),
                app_label: String::new(),
                build_version: "1.2.3".to_string(),
            },
            ..Default::default()
        }
    }
}

pub fn registry_credential(repository: &str, allowed: &str) -> ContainerRegistryCredential {
    let name = repository.replace(['/', '.'], "-");
    ContainerRegistryCredential {
        name: format!("container-registry-{}", name),
        repository: repository.to_string(),
        username: format!("{}-user", name),
        password: format!("{}-password", name),
        allowed_pipelines_to_push: allowed.to_string(),
        vulnerability_db_bucket: None,
        service_account_keyfile: None,
    }
}
