use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use crate::{ProvisionError, Result, ShareLock, model::WorkflowTemplate, store::TemplateStore};

#[derive(Debug, Clone, Default)]
pub struct MemTemplateStore {
    templates: ShareLock<HashMap<String, WorkflowTemplate>>,
}

impl MemTemplateStore {
    pub fn new() -> Self {
        Self {
            templates: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn insert(
        &self,
        template_id: &str,
        template: WorkflowTemplate,
    ) {
        let mut templates = self.templates.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        templates.insert(template_id.to_string(), template);
    }
}

#[async_trait]
impl TemplateStore for MemTemplateStore {
    async fn get_template(
        &self,
        template_id: &str,
    ) -> Result<WorkflowTemplate> {
        let templates = self.templates.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        templates.get(template_id).cloned().ok_or_else(|| ProvisionError::TemplateNotFound(template_id.to_string()))
    }
}
