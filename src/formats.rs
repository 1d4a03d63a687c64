/// Image kinds recognised by extension.
///
/// Dispatch throughout the crate matches on this enum instead of comparing
/// extension strings, so every supported extension has exactly one arm.
use crate::constants::SUPPORTED_IMAGE_EXTENSIONS;
use image::ImageFormat;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    WebP,
    Bmp,
    Tiff,
    Gif,
    /// Anything outside the supported extension set.
    Unsupported,
}

impl ImageKind {
    /// Case-insensitive lookup; `jpg` and `jpeg` are the same kind.
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_lowercase().as_str() {
            "jpg" | "jpeg" => ImageKind::Jpeg,
            "png" => ImageKind::Png,
            "webp" => ImageKind::WebP,
            "bmp" => ImageKind::Bmp,
            "tiff" => ImageKind::Tiff,
            "gif" => ImageKind::Gif,
            _ => ImageKind::Unsupported,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(ImageKind::from_extension)
            .unwrap_or(ImageKind::Unsupported)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, ImageKind::Unsupported)
    }

    /// Decoder hint for the `image` crate.
    pub fn image_format(&self) -> Option<ImageFormat> {
        match self {
            ImageKind::Jpeg => Some(ImageFormat::Jpeg),
            ImageKind::Png => Some(ImageFormat::Png),
            ImageKind::WebP => Some(ImageFormat::WebP),
            ImageKind::Bmp => Some(ImageFormat::Bmp),
            ImageKind::Tiff => Some(ImageFormat::Tiff),
            ImageKind::Gif => Some(ImageFormat::Gif),
            ImageKind::Unsupported => None,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageKind::Jpeg => "JPEG",
            ImageKind::Png => "PNG",
            ImageKind::WebP => "WebP",
            ImageKind::Bmp => "BMP",
            ImageKind::Tiff => "TIFF",
            ImageKind::Gif => "GIF",
            ImageKind::Unsupported => "unsupported",
        };
        write!(f, "{}", name)
    }
}

/// Lowercased extension of `path`, if it has a UTF-8 one.
pub fn normalized_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Check if a file path carries one of the supported image extensions.
pub fn is_image_file(path: &Path) -> bool {
    normalized_extension(path)
        .map(|ext| SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
