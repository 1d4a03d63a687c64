use crate::constants::{DEFAULT_LOSSY_LEVEL, DEFAULT_PALETTE_SIZE, DEFAULT_QUALITY, DEFAULT_TIMEOUT_SECS};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "squeeze-dir",
    about = "Compress every image in a directory, replacing originals only on success",
    long_about = "squeeze-dir compresses the JPEG, PNG, WebP, BMP, TIFF and GIF files in a directory. \
                  Each file is compressed into a private temp file first and moved over the original \
                  with an atomic rename, so a failed or interrupted run never corrupts an image. \
                  JPEG, PNG and WebP can optionally go through a TinyPNG-compatible remote service.",
    version,
    after_help = "EXAMPLES:\n  \
    squeeze-dir                          compress images in the current directory\n  \
    squeeze-dir -q 70 -o ./compressed    write results to ./compressed\n  \
    squeeze-dir -c 64 -l 40              lossy GIFs with a 64 color palette\n  \
    squeeze-dir config --key <KEY>       store the remote API key\n  \
    squeeze-dir --remote --dir ./photos  prefer the remote service"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub compress: CompressArgs,

    #[arg(
        long,
        global = true,
        env = "SQUEEZE_CONFIG",
        help = "Path of the config file",
        long_help = "Override the config file location. \
                     Default: <platform config dir>/squeeze-dir/config.json"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, conflicts_with = "verbose", help = "Only print errors")]
    pub quiet: bool,

    #[arg(short = 'v', long, global = true, help = "Print per-stage details")]
    pub verbose: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CompressArgs {
    #[arg(
        short = 'q',
        long,
        default_value_t = DEFAULT_QUALITY,
        value_parser = clap::value_parser!(u8).range(1..=100),
        help = "Compression quality for JPEG, WebP and TIFF (1-100)"
    )]
    pub quality: u8,

    #[arg(
        short = 'c',
        long,
        default_value_t = DEFAULT_PALETTE_SIZE,
        value_parser = clap::value_parser!(u16).range(2..=256),
        help = "Maximum GIF palette size (2-256)"
    )]
    pub colors: u16,

    #[arg(
        short = 'l',
        long,
        default_value_t = DEFAULT_LOSSY_LEVEL,
        help = "Lossy GIF level, 0 disables",
        long_help = "Lossy GIF compression level passed to gifsicle. \
                     0 keeps GIFs on local palette quantization only."
    )]
    pub lossy: u32,

    #[arg(
        short = 'o',
        long,
        help = "Write results here instead of replacing originals",
        long_help = "Write each compressed file to <DIR>/<file name>. \
                     The directory is created when missing; originals are left untouched."
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(
        short = 'j',
        long,
        value_parser = parse_jobs,
        help = "Number of parallel workers (default: CPU count)"
    )]
    pub jobs: Option<usize>,

    #[arg(
        long,
        default_value_t = DEFAULT_TIMEOUT_SECS,
        help = "Per-file timeout in seconds, 0 disables"
    )]
    pub timeout: u64,

    #[arg(
        long,
        help = "Prefer the remote service for JPEG, PNG and WebP",
        long_help = "Send JPEG, PNG and WebP files to the remote compression service first, \
                     falling back to local codecs when it fails. Requires an API key."
    )]
    pub remote: bool,

    #[arg(
        long,
        env = "SQUEEZE_API_KEY",
        hide_env_values = true,
        help = "Remote API key, overrides the stored key"
    )]
    pub api_key: Option<String>,

    #[arg(
        long,
        env = "SQUEEZE_REMOTE_ENDPOINT",
        help = "Remote service base URL (default: https://api.tinify.com)"
    )]
    pub remote_endpoint: Option<String>,

    #[arg(long, help = "Directory for temp files (default: a private system temp dir)")]
    pub scratch_dir: Option<PathBuf>,

    #[arg(long, help = "Directory to process (default: current directory)")]
    pub dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Store or show the remote API key",
        long_about = "Persist the remote compression service API key, or print the stored one."
    )]
    Config {
        #[arg(
            long,
            conflicts_with = "show",
            required_unless_present = "show",
            help = "API key to store"
        )]
        key: Option<String>,

        #[arg(long, help = "Print the stored API key")]
        show: bool,
    },
}

fn parse_jobs(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["squeeze-dir"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.compress.quality, 80);
        assert_eq!(args.compress.colors, 128);
        assert_eq!(args.compress.lossy, 0);
        assert_eq!(args.compress.timeout, 300);
        assert!(!args.compress.remote);
        assert!(args.compress.output_dir.is_none());
    }

    #[test]
    fn test_compress_flags() {
        let args = Args::try_parse_from([
            "squeeze-dir", "-q", "55", "-c", "16", "-l", "30", "-o", "out", "-j", "3", "--timeout", "0",
        ])
        .unwrap();
        assert_eq!(args.compress.quality, 55);
        assert_eq!(args.compress.colors, 16);
        assert_eq!(args.compress.lossy, 30);
        assert_eq!(args.compress.output_dir, Some(PathBuf::from("out")));
        assert_eq!(args.compress.jobs, Some(3));
        assert_eq!(args.compress.timeout, 0);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        assert!(Args::try_parse_from(["squeeze-dir", "-q", "0"]).is_err());
        assert!(Args::try_parse_from(["squeeze-dir", "-q", "101"]).is_err());
        assert!(Args::try_parse_from(["squeeze-dir", "-c", "1"]).is_err());
        assert!(Args::try_parse_from(["squeeze-dir", "-c", "257"]).is_err());
        assert!(Args::try_parse_from(["squeeze-dir", "-j", "0"]).is_err());
    }

    #[test]
    fn test_config_subcommand() {
        let args = Args::try_parse_from(["squeeze-dir", "config", "--key", "abc"]).unwrap();
        match args.command {
            Some(Commands::Config { key, show }) => {
                assert_eq!(key.as_deref(), Some("abc"));
                assert!(!show);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Args::try_parse_from(["squeeze-dir", "config"]).is_err());
        assert!(Args::try_parse_from(["squeeze-dir", "config", "--key", "a", "--show"]).is_err());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Args::try_parse_from(["squeeze-dir", "--quiet", "-v"]).is_err());
    }
}
