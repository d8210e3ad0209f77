//! Pipeline stages, one module per step.
//!
//! ```text
//! input ─▶ select ─▶ extract ─▶ unpack ─▶ normalize ─▶ cache ─▶ flatten ─▶ summarize
//! (path)   (lopdf)   (HTTP)     (zip)     (geometry)   (JSON)   (table)    (LLM)
//! ```
//!
//! 1. [`input`]: check the file is a readable PDF and derive its base name
//! 2. [`select`]: write the head/tail page window to a new PDF and record
//!    page sizes; runs in `spawn_blocking`
//! 3. [`extract`]: the extraction-service seam and its REST client; the
//!    only stage with network I/O besides the model request
//! 4. [`unpack`]: persist the result archive and parse `structuredData.json`
//! 5. [`normalize`]: add percentile boxes to every element with `Bounds`
//! 6. [`cache`]: look up and store normalized documents
//! 7. [`flatten`]: dotted-column table, short-text rows dropped
//! 8. [`summarize`]: one chat request, reply cleaned by [`postprocess`]

pub mod cache;
pub mod extract;
pub mod flatten;
pub mod input;
pub mod normalize;
pub mod postprocess;
pub mod select;
pub mod summarize;
pub mod unpack;
