//! The snapshot engine: resolving branches to trees, deriving new snapshots
//! from single-file changes, and bulk snapshot management.

pub mod branches;
pub mod locks;
pub mod manifests;
pub mod mime;
pub mod mutator;
pub mod tree;

pub use branches::{BranchHeads, DEFAULT_BRANCH};
pub use locks::ProjectLocks;
pub use manifests::{NewSnapshot, NewSnapshotFile, SnapshotCatalog};
pub use mutator::{
    BlobPolicy, FOLDER_PLACEHOLDER, FileChange, MutationContext, MutationOutcome, SnapshotMutator,
    apply_change,
};
pub use tree::{BlobView, EntryKind, TreeEntry, TreeResolver, build_tree};
