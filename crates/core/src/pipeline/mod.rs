//! Top-items reconciliation: compare two dated snapshots, attach live metadata and
//! assemble the ranked response.

pub mod changes;
pub mod collector;
pub mod compare;
pub mod enrich;
pub mod orchestrator;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;

pub use changes::{compute_changes, MissingPreviousPolicy};
pub use collector::{CollectionReport, SnapshotCollector};
pub use compare::{mark_common, ComparisonService, TasteComparison, UserPair};
pub use enrich::{assemble_from_snapshot, enrich};
pub use orchestrator::{PipelineState, TopItemsRequest, TopItemsResponse, TopItemsService};
pub use tokens::AccessTokenProvider;
