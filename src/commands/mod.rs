pub mod apply;
pub mod destroy;
pub mod graph;
pub mod plan;
pub mod state;
pub mod unlock;
pub mod validate;

use crate::config::Config;
use anyhow::{Context as AnyhowContext, Result};
use converge_document::Document;

pub(crate) fn load_document(config: &Config) -> Result<Document> {
    converge_document::load_dir(&config.document_dir).with_context(|| {
        format!(
            "loading declarations from {}",
            config.document_dir.display()
        )
    })
}
