//! Template store: where deploy requests fetch their workflow templates from.
//!
//! - `MemTemplateStore`: in-memory map, for tests and embedding
//! - `FsTemplateStore`: `<dir>/<template_id>.json` files

mod fs;
mod mem;

use async_trait::async_trait;

use crate::{Result, model::WorkflowTemplate};

pub use fs::FsTemplateStore;
pub use mem::MemTemplateStore;

/// Read-only access to workflow templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Fetches a template, failing with `TemplateNotFound` for unknown ids.
    async fn get_template(
        &self,
        template_id: &str,
    ) -> Result<WorkflowTemplate>;
}
