//! Hooks invoked after reference list documents are committed.

use crate::{models::ReferenceListDocument, Result};
use async_trait::async_trait;

/// Observer of committed reference list documents.
///
/// Called after the document has been persisted, with the committed version.
#[async_trait]
pub trait ReferenceListHook: Send + Sync {
    async fn on_committed(&self, document: &ReferenceListDocument) -> Result<()>;
}
