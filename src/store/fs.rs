use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::trace;

use crate::{ProvisionError, Result, model::WorkflowTemplate, store::TemplateStore};

/// Reads `<dir>/<template_id>.json` on every request.
#[derive(Debug, Clone)]
pub struct FsTemplateStore {
    dir: PathBuf,
}

impl FsTemplateStore {
    pub fn new<T: AsRef<Path>>(dir: T) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(
        &self,
        template_id: &str,
    ) -> Result<PathBuf> {
        // ids are file stems, never paths
        if template_id.is_empty() || template_id.contains(['/', '\\']) || template_id.starts_with('.') {
            return Err(ProvisionError::TemplateNotFound(template_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", template_id)))
    }
}

#[async_trait]
impl TemplateStore for FsTemplateStore {
    async fn get_template(
        &self,
        template_id: &str,
    ) -> Result<WorkflowTemplate> {
        let path = self.path(template_id)?;
        trace!("fs store: reading {:?}", path);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(ProvisionError::TemplateNotFound(template_id.to_string())),
            Err(err) => return Err(err.into()),
        };
        WorkflowTemplate::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("flowprov-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_reads_template_file() {
        let dir = temp_dir("fs-read");
        std::fs::write(dir.join("mail.json"), r#"{"name":"Mail","nodes":[]}"#).unwrap();

        let store = FsTemplateStore::new(&dir);
        assert_eq!(store.get_template("mail").await.unwrap().name, "Mail");
        assert!(matches!(store.get_template("missing").await, Err(ProvisionError::TemplateNotFound(_))));
        assert!(matches!(store.get_template("../mail").await, Err(ProvisionError::TemplateNotFound(_))));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_invalid_template_is_a_convert_error() {
        let dir = temp_dir("fs-invalid");
        std::fs::write(dir.join("broken.json"), r#"{"nodes":"nope"}"#).unwrap();

        let store = FsTemplateStore::new(&dir);
        assert!(matches!(store.get_template("broken").await, Err(ProvisionError::Convert(_))));

        std::fs::remove_dir_all(dir).unwrap();
    }
}
