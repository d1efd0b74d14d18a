pub mod access;
pub mod cascade;
pub mod reference_lists;
pub mod rewrite;

pub use access::{ListSnapshot, ReferenceListAccess, SubscriptionId};
pub use cascade::{
    CascadeEngine, CascadeReport, DeletePolicy, FailedBatch, ListCommit, StrayReference,
};
pub use reference_lists::{Mutation, ReferenceListStore};
