/// Per-file keyword scanning.
///
/// Every input file gets its own [`ScanTask`]. A task reads its file line by
/// line, keeps the non-empty lines containing the keyword, and appends them to
/// a private [`IntermediateStore`] named after an index handed out when the
/// task is created:
///
/// ```text
///   a.txt ──ScanTask #1──▶ log1.txt ┐
///   b.txt ──ScanTask #2──▶ log2.txt ├──▶ aggregate (ascending index)
///   c.txt ──ScanTask #3──▶ log3.txt ┘
/// ```
///
/// No two tasks ever write to the same store, so the only state tasks share is
/// the atomic index counter and the metrics counters. Stores become visible to
/// the aggregator when the task's result travels back through its pool handle.
pub mod matcher;
pub mod store;
pub mod task;

pub use matcher::KeywordMatcher;
pub use store::{IntermediateStore, StoreIndexer};
pub use task::{ScanContext, ScanOutcome, ScanTask};

pub(crate) use task::trim_line_ending;
