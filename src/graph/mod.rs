mod store;
mod types;

pub use store::GraphStore;
pub use types::{
    AnnotationSource, Boundaries, Decision, DecisionStatus, DependencyEdge, HotspotSnapshot,
    Module, ModuleRename, OwnershipEvent, OwnershipHistoryEntry, OwnershipRule, OwnershipScope,
    OwnershipSource, Responsibility, ResponsibilitySource, TargetType,
};
