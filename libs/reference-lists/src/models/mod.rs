//! Data model: reference list documents, their items, referencing records and audit entries.

mod audit;
mod document;
mod item;
mod record;

pub use audit::{Actor, AuditAction, AuditEntry};
pub use document::{ReferenceListDocument, ReferenceLists};
pub use item::{ItemChanges, ListItem, FALLBACK_COLOR};
pub use record::{DomainRecord, RecordRef};
