use crate::error::{Result, SqueezeError};
use crate::formats::ImageKind;
use crate::processing::CompressionParams;
use std::fmt;

/// Which service performs a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Remote compression API.
    Remote,
    /// In-process codecs.
    Local,
    /// External `gifsicle` process.
    GifOptimizer,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Remote => "remote",
            BackendKind::Local => "local",
            BackendKind::GifOptimizer => "gifsicle",
        };
        write!(f, "{}", name)
    }
}

/// Encoder selection together with the parameters that encoder uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Jpeg { quality: u8 },
    /// Lossless, always at maximum effort.
    Png,
    WebP { quality: u8 },
    Bmp,
    Tiff { quality: u8 },
    GifPalette { colors: u16 },
    GifOptimized { colors: u16, lossy: u32 },
}

impl Codec {
    pub fn kind(&self) -> ImageKind {
        match self {
            Codec::Jpeg { .. } => ImageKind::Jpeg,
            Codec::Png => ImageKind::Png,
            Codec::WebP { .. } => ImageKind::WebP,
            Codec::Bmp => ImageKind::Bmp,
            Codec::Tiff { .. } => ImageKind::Tiff,
            Codec::GifPalette { .. } | Codec::GifOptimized { .. } => ImageKind::Gif,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteStep {
    pub backend: BackendKind,
    pub codec: Codec,
}

/// Ordered fallback chain for one extension. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: ImageKind,
    pub steps: Vec<RouteStep>,
}

/// Maps an extension to the backends able to compress it.
///
/// Selection is a pure function of the lowercased extension, the batch
/// parameters, and whether the remote service is enabled.
#[derive(Debug, Clone, Copy)]
pub struct Router {
    params: CompressionParams,
    remote_enabled: bool,
}

impl Router {
    pub fn new(params: CompressionParams, remote_enabled: bool) -> Self {
        Self {
            params,
            remote_enabled,
        }
    }

    pub fn params(&self) -> &CompressionParams {
        &self.params
    }

    pub fn remote_enabled(&self) -> bool {
        self.remote_enabled
    }

    pub fn select(&self, extension: &str) -> Result<Route> {
        self.select_kind(ImageKind::from_extension(extension))
            .ok_or_else(|| SqueezeError::UnsupportedFormat(extension.to_string()))
    }

    fn select_kind(&self, kind: ImageKind) -> Option<Route> {
        let CompressionParams {
            quality,
            palette_size,
            lossy_level,
        } = self.params;

        let local = |codec| RouteStep {
            backend: BackendKind::Local,
            codec,
        };
        // Remote first, local codec as fallback.
        let remote_then_local = |codec| {
            let mut steps = Vec::with_capacity(2);
            if self.remote_enabled {
                steps.push(RouteStep {
                    backend: BackendKind::Remote,
                    codec,
                });
            }
            steps.push(local(codec));
            steps
        };

        let steps = match kind {
            ImageKind::Jpeg => remote_then_local(Codec::Jpeg { quality }),
            ImageKind::Png => remote_then_local(Codec::Png),
            ImageKind::WebP => remote_then_local(Codec::WebP { quality }),
            ImageKind::Bmp => vec![local(Codec::Bmp)],
            ImageKind::Tiff => vec![local(Codec::Tiff { quality })],
            ImageKind::Gif if lossy_level > 0 => vec![
                RouteStep {
                    backend: BackendKind::GifOptimizer,
                    codec: Codec::GifOptimized {
                        colors: palette_size,
                        lossy: lossy_level,
                    },
                },
                local(Codec::GifPalette {
                    colors: palette_size,
                }),
            ],
            ImageKind::Gif => vec![local(Codec::GifPalette {
                colors: palette_size,
            })],
            ImageKind::Unsupported => return None,
        };

        Some(Route { kind, steps })
    }
}
