//! GIF optimization through an external `gifsicle` process.

use crate::codec::Compressor;
use crate::constants::{GIFSICLE_BINARY, GIFSICLE_OPTIMIZE_LEVEL};
use crate::error::{Result, SqueezeError};
use crate::router::Codec;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct GifsicleOptimizer {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl GifsicleOptimizer {
    pub fn new(binary: PathBuf, timeout: Option<Duration>) -> Self {
        Self { binary, timeout }
    }

    /// Looks `gifsicle` up on `PATH`.
    pub fn locate(timeout: Option<Duration>) -> Result<Self> {
        let binary = which::which(GIFSICLE_BINARY)
            .map_err(|e| SqueezeError::OptimizerMissing(format!("{}: {}", GIFSICLE_BINARY, e)))?;
        Ok(Self::new(binary, timeout))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn arguments(source: &Path, colors: u16, lossy: u32) -> Vec<String> {
        let mut args = vec![format!("--optimize={}", GIFSICLE_OPTIMIZE_LEVEL)];
        if lossy > 0 {
            args.push(format!("--lossy={}", lossy));
        }
        args.push("--colors".to_string());
        args.push(colors.to_string());
        args.push(source.to_string_lossy().into_owned());
        args
    }

    fn wait(&self, mut child: Child) -> Result<Vec<u8>> {
        // Drain both pipes on their own threads so a chatty child cannot
        // block on a full pipe while we poll for exit.
        let mut stdout = child.stdout.take().ok_or_else(|| {
            SqueezeError::OptimizerFailed {
                status: "spawn".to_string(),
                stderr: "stdout not captured".to_string(),
            }
        })?;
        let mut stderr = child.stderr.take();

        let stdout_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });
        let stderr_reader = thread::spawn(move || {
            let mut buf = String::new();
            if let Some(stderr) = stderr.as_mut() {
                let _ = stderr.read_to_string(&mut buf);
            }
            buf
        });

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SqueezeError::Timeout(self.timeout.unwrap_or_default()));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = stdout_reader
            .join()
            .map_err(|_| SqueezeError::CodecPanicked)??;
        let stderr = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(SqueezeError::OptimizerFailed {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        if output.is_empty() {
            return Err(SqueezeError::OptimizerFailed {
                status: status.to_string(),
                stderr: "no output produced".to_string(),
            });
        }

        Ok(output)
    }
}

impl Compressor for GifsicleOptimizer {
    fn name(&self) -> &'static str {
        "gifsicle"
    }

    fn compress(&self, source: &Path, codec: &Codec) -> Result<Vec<u8>> {
        let Codec::GifOptimized { colors, lossy } = *codec else {
            return Err(SqueezeError::UnsupportedFormat(format!(
                "gifsicle cannot produce {:?}",
                codec
            )));
        };

        let args = Self::arguments(source, colors, lossy);
        tracing::debug!(binary = %self.binary.display(), ?args, "spawning gif optimizer");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SqueezeError::OptimizerMissing(format!("{}: {}", self.binary.display(), e))
            })?;

        self.wait(child)
    }
}
