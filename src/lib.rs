pub mod batch;
pub mod cancel;
pub mod cli;
pub mod codec;
pub mod config;
pub mod constants;
pub mod discover;
pub mod error;
pub mod formats;
pub mod gifsicle;
pub mod logger;
pub mod processing;
pub mod remote;
pub mod router;
pub mod staging;
pub mod utils;

pub use batch::{Backends, BatchCompressor, BatchOptions, BatchReport};
pub use cancel::CancelToken;
pub use codec::{Compressor, LocalCodecs};
pub use config::{ConfigStore, StoredConfig};
pub use discover::collect_image_files;
pub use error::{RemoteError, Result, SqueezeError};
pub use formats::{is_image_file, ImageKind};
pub use gifsicle::GifsicleOptimizer;
pub use processing::{CompressionParams, ImageTask, Outcome, OutcomeStatus, OutputMode};
pub use remote::{RemoteCompressor, RemoteSettings};
pub use router::{BackendKind, Codec, Route, RouteStep, Router};
pub use staging::{StagedWriter, StagingSlot};
