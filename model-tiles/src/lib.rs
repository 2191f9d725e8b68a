//! Model Tiles - background lifecycle manager for 3D model tiles
//!
//! This library turns tile requests from a rendering layer into fetched,
//! decoded and styled geometry buckets. It tracks each request from
//! `Fetching` through `Parsing` to `Done`, and handles abort and reload
//! requests that race with work already in progress.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐   load / reload / abort / remove   ┌─────────────────┐
//! │ Render layer  │ ─────────────────────────────────► │ ModelTileWorker │
//! │               │ ◄───────── TileReceiver ────────── │  (TileRegistry) │
//! └───────────────┘                                    └────────┬────────┘
//!                                                               │
//!                     ┌──────────────┬──────────────┬───────────┴──┐
//!                     ▼              ▼              ▼              ▼
//!               TileFetcher    SceneDecoder   StyleRuleIndex  FeatureIndexFactory
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use model_tiles::{HttpFetcher, ModelTileWorker, TileCoord, TileRequest};
//!
//! let worker = ModelTileWorker::builder(
//!     Arc::new(HttpFetcher::new(30, "model-tiles/0.1")?),
//!     Arc::new(my_glb_decoder),
//!     Arc::new(my_style),
//! )
//! .build()?;
//!
//! let request = TileRequest::new(1, TileCoord::new(14, 8192, 5461), "https://tiles.example/14/8192/5461.glb")
//!     .with_source("landmarks", "buildings");
//! let outcome = worker.load_tile(request)?.await?;
//! ```

pub mod bucket;
pub mod config;
pub mod coord;
pub mod decode;
pub mod error;
pub mod feature_index;
pub mod fetch;
pub mod handle;
pub mod logging;
pub mod parse;
pub mod registry;
pub mod style;
pub mod telemetry;
pub mod tile;
pub mod worker;

pub use bucket::ModelBucket;
pub use config::{ConfigError, ConfigFile, LoggingConfig, WorkerConfig};
pub use coord::{CoordError, TileCoord};
pub use decode::{DecodeError, DecodedScene, ModelCapabilities, SceneDecoder};
pub use error::TileError;
pub use feature_index::{FeatureIndex, FeatureIndexFactory, PromoteId};
pub use fetch::{FetchError, HttpFetcher, TileFetcher};
pub use handle::{ReloadOutcome, TileOutcome, TileReceiver, TileResult};
pub use logging::{init_logging, LoggingGuard};
pub use parse::TilePayload;
pub use style::{RuleFamily, StyleRule, StyleRuleIndex};
pub use telemetry::MetricsSnapshot;
pub use tile::{Projection, TileId, TileRequest, TileStatus};
pub use worker::{ModelTileWorker, WorkerBuilder};
