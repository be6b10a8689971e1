pub mod aggregate;
pub mod config;
pub mod dedup;
pub mod errors;
pub mod filters;
pub mod metrics;
pub mod pipeline;
pub mod pool;
pub mod results;
pub mod scan;

pub use config::{EncodingMode, PipelineConfig};
pub use errors::{FetchError, FetchResult, Stage};
pub use pipeline::{run_pipeline, Pipeline};
pub use pool::{TaskHandle, WorkerPool};
pub use results::{PipelineReport, SkippedFile};
