//! Progress-callback trait for stage-level pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to follow a run
//! as it moves through page selection, extraction, normalization and
//! summarization. The CLI uses it to drive a spinner; a service could forward
//! events to a job record instead.
//!
//! # Example
//!
//! ```rust
//! use deck2md::{PipelineConfig, PipelineProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl PipelineProgressCallback for Printer {
//!     fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
//!         eprintln!("{stage} finished in {elapsed_ms}ms");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::RunOutcome;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    SelectPages,
    Extract,
    Unpack,
    Normalize,
    Store,
    Flatten,
    Summarize,
}

impl Stage {
    /// Short human label used in logs and the CLI.
    pub fn label(self) -> &'static str {
        match self {
            Stage::SelectPages => "select pages",
            Stage::Extract => "extract",
            Stage::Unpack => "unpack",
            Stage::Normalize => "normalize",
            Stage::Store => "store",
            Stage::Flatten => "flatten",
            Stage::Summarize => "summarize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the pipeline as a run progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Stages run one after another; events for one run
/// never overlap.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called when a cached extraction replaces the select → normalize stages.
    fn on_cache_hit(&self, path: &Path) {
        let _ = path;
    }

    /// Called once when the run ends without a fatal error.
    fn on_run_complete(&self, outcome: &RunOutcome) {
        let _ = outcome;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl PipelineProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start {stage}"));
        }

        fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
            self.events.lock().unwrap().push(format!("done {stage}"));
        }

        fn on_cache_hit(&self, path: &Path) {
            self.events
                .lock()
                .unwrap()
                .push(format!("hit {}", path.display()));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Extract);
        cb.on_stage_complete(Stage::Extract, 12);
        cb.on_cache_hit(Path::new("data/x.json"));
        cb.on_run_complete(&RunOutcome::NoData(crate::output::NoDataReason::NoStructuredData));
    }

    #[test]
    fn recorder_sees_events_in_order() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::SelectPages);
        rec.on_stage_complete(Stage::SelectPages, 3);
        rec.on_cache_hit(Path::new("deck.json"));
        let events = rec.events.lock().unwrap();
        assert_eq!(
            *events,
            vec!["start select pages", "done select pages", "hit deck.json"]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Summarize);
    }
}
