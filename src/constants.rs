pub const DEFAULT_QUALITY: u8 = 80;
pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

pub const DEFAULT_PALETTE_SIZE: u16 = 128;
pub const MIN_PALETTE_SIZE: u16 = 2;
pub const MAX_PALETTE_SIZE: u16 = 256;

pub const DEFAULT_LOSSY_LEVEL: u32 = 0;

/// oxipng preset used for every PNG; 6 is the slowest, most thorough preset.
pub const PNG_OPTIMIZATION_PRESET: u8 = 6;
pub const LIBDEFLATER_MAX_LEVEL: u8 = 12;

pub const GIFSICLE_OPTIMIZE_LEVEL: u8 = 3;
pub const GIFSICLE_BINARY: &str = "gifsicle";

pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const MAX_IMAGE_DIMENSION: u32 = 16384;

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tiff", "gif"];

pub const APP_NAME: &str = "squeeze-dir";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const SCRATCH_DIR_PREFIX: &str = "squeeze-dir-";

pub const DEFAULT_REMOTE_ENDPOINT: &str = "https://api.tinify.com";
pub const REMOTE_SHRINK_PATH: &str = "/shrink";
pub const REMOTE_USER: &str = "api";
pub const REMOTE_WORKER_THREADS: usize = 2;

pub const PROGRESS_BAR_TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

pub const SUCCESS_PREFIX: &str = "✅";
pub const WARNING_PREFIX: &str = "⚠️";
pub const ERROR_PREFIX: &str = "❌";
pub const INFO_PREFIX: &str = "📋";
