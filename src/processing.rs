use crate::constants::{
    DEFAULT_LOSSY_LEVEL, DEFAULT_PALETTE_SIZE, DEFAULT_QUALITY, MAX_FILE_SIZE,
    MAX_IMAGE_DIMENSION, MAX_PALETTE_SIZE, MAX_QUALITY, MIN_PALETTE_SIZE, MIN_QUALITY,
};
use crate::error::{Result, SqueezeError};
use crate::formats::{normalized_extension, ImageKind};
use image::{DynamicImage, GenericImageView};
use std::fs;
use std::path::{Path, PathBuf};

/// Batch-wide encoder parameters, validated once and shared read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionParams {
    pub quality: u8,
    pub palette_size: u16,
    pub lossy_level: u32,
}

impl CompressionParams {
    pub fn new(
        quality: Option<u8>,
        palette_size: Option<u16>,
        lossy_level: Option<u32>,
    ) -> Result<Self> {
        let quality = quality.unwrap_or(DEFAULT_QUALITY);
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
            return Err(SqueezeError::InvalidQuality(quality));
        }

        let palette_size = palette_size.unwrap_or(DEFAULT_PALETTE_SIZE);
        if !(MIN_PALETTE_SIZE..=MAX_PALETTE_SIZE).contains(&palette_size) {
            return Err(SqueezeError::InvalidPaletteSize(palette_size));
        }

        Ok(Self {
            quality,
            palette_size,
            lossy_level: lossy_level.unwrap_or(DEFAULT_LOSSY_LEVEL),
        })
    }
}

impl Default for CompressionParams {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            palette_size: DEFAULT_PALETTE_SIZE,
            lossy_level: DEFAULT_LOSSY_LEVEL,
        }
    }
}

/// Where a successful result lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Rename over the source file.
    Replace,
    /// Write `<dir>/<basename>`, creating `dir` when needed.
    WriteToDir(PathBuf),
}

impl OutputMode {
    pub fn from_output_dir(output_dir: Option<PathBuf>) -> Self {
        match output_dir {
            Some(dir) => OutputMode::WriteToDir(dir),
            None => OutputMode::Replace,
        }
    }
}

/// One discovered file and where its result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTask {
    pub source_path: PathBuf,
    pub extension: String,
    pub kind: ImageKind,
    pub output_mode: OutputMode,
}

impl ImageTask {
    pub fn new(source_path: PathBuf, output_mode: OutputMode) -> Self {
        let extension = normalized_extension(&source_path).unwrap_or_default();
        let kind = ImageKind::from_extension(&extension);
        Self {
            source_path,
            extension,
            kind,
            output_mode,
        }
    }

    pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.source_path.file_name()
    }

    /// Final location of the compressed file.
    ///
    /// Replacing a symlinked source replaces the file it points to; the
    /// link itself is left in place.
    pub fn commit_target(&self) -> Result<PathBuf> {
        match &self.output_mode {
            OutputMode::Replace => {
                let is_link = fs::symlink_metadata(&self.source_path)
                    .map(|meta| meta.file_type().is_symlink())
                    .unwrap_or(false);
                if is_link {
                    Ok(fs::canonicalize(&self.source_path)?)
                } else {
                    Ok(self.source_path.clone())
                }
            }
            OutputMode::WriteToDir(dir) => {
                let name = self
                    .file_name()
                    .ok_or_else(|| SqueezeError::InvalidFileName(self.source_path.clone()))?;
                Ok(dir.join(name))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success {
        final_path: PathBuf,
        original_size: u64,
        compressed_size: u64,
        backend: &'static str,
    },
    Failure {
        reason: String,
    },
}

/// Result of one pipeline run; produced exactly once per task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub path: PathBuf,
    pub status: OutcomeStatus,
}

impl Outcome {
    pub fn failure(path: &Path, err: &SqueezeError) -> Self {
        Self {
            path: path.to_path_buf(),
            status: OutcomeStatus::Failure {
                reason: err.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }
}

/// Reads a source file, refusing anything over [`MAX_FILE_SIZE`].
pub fn read_source(input_path: &Path) -> Result<Vec<u8>> {
    let file_size = fs::metadata(input_path)?.len();
    if file_size > MAX_FILE_SIZE {
        return Err(SqueezeError::FileTooLarge(file_size, MAX_FILE_SIZE));
    }
    Ok(fs::read(input_path)?)
}

/// Decodes a raster image with the decoder its extension names.
///
/// The extension decides the decoder; a file whose content does not match
/// its extension fails here with a decode error.
pub fn decode_image(bytes: &[u8], kind: ImageKind) -> Result<DynamicImage> {
    let format = kind
        .image_format()
        .ok_or_else(|| SqueezeError::UnsupportedFormat(kind.to_string()))?;
    let img = image::load_from_memory_with_format(bytes, format)?;

    let (width, height) = img.dimensions();
    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        return Err(SqueezeError::InvalidDimensions(
            width,
            height,
            MAX_IMAGE_DIMENSION,
        ));
    }

    Ok(img)
}
