use clap::Parser;
use clap::builder::FalseyValueParser;
use prebuilts::config::{
    Config, DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_PRIVATE_PREFIX, DEFAULT_TOOL_TIMEOUT_SECS,
    DEFAULT_URL_PREFIX, DEFAULT_VERSIONS, Mode, Options,
};
use prebuilts::platform::PlatformId;
use std::path::PathBuf;
use std::process::ExitCode;

/// prebuilts - fetch the prebuilt packages a build depends on
///
/// Reads a versions manifest and makes the download root match it, using
/// cipd when available and direct downloads otherwise. Packages whose
/// installed version already matches are left alone.
///
/// Exit status: 0 success, 1 usage error, 2 package failure or verify
/// mismatch, 3 unsupported platform, 4 cipd failure.
#[derive(Parser, Debug)]
#[command(author, version = env!("PREBUILTS_VERSION"), about)]
struct Cli {
    #[command(flatten)]
    mode: ModeArgs,

    /// Never use cipd; download packages directly (also via PREBUILTS_NO_CIPD)
    #[arg(long, env = "PREBUILTS_NO_CIPD", value_parser = FalseyValueParser::new())]
    no_cipd: bool,

    /// Versions file listing the pinned packages
    #[arg(long, env = "PREBUILTS_VERSIONS", value_name = "FILE", default_value = DEFAULT_VERSIONS)]
    versions: PathBuf,

    /// Ensure file the versions were resolved from (defaults to the .ensure sibling)
    #[arg(long, value_name = "FILE")]
    ensure: Option<PathBuf>,

    /// Versions file of an access-restricted package set
    #[arg(long, value_name = "FILE")]
    private_versions: Option<PathBuf>,

    /// Ensure file of an access-restricted package set
    #[arg(long, value_name = "FILE")]
    private_ensure: Option<PathBuf>,

    /// Package prefix checked for read access before using the private set
    #[arg(long, value_name = "PREFIX", default_value = DEFAULT_PRIVATE_PREFIX)]
    private_prefix: String,

    /// Download root (defaults to <versions dir>/downloads)
    #[arg(long, short = 'r', env = "PREBUILTS_ROOT", value_name = "DIR")]
    root: Option<PathBuf>,

    /// Base URL packages are downloaded from
    #[arg(long, env = "PREBUILTS_URL_PREFIX", value_name = "URL", default_value = DEFAULT_URL_PREFIX)]
    url_prefix: String,

    /// cipd executable (defaults to <versions dir>/../.cipd/cipd, then PATH)
    #[arg(long, env = "PREBUILTS_CIPD", value_name = "PATH")]
    cipd: Option<PathBuf>,

    /// Platform to fetch for instead of the host's
    #[arg(long, env = "PREBUILTS_PLATFORM", value_name = "ID")]
    platform: Option<PlatformId>,

    /// Per-request download timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_DOWNLOAD_TIMEOUT_SECS)]
    timeout: u64,

    /// Timeout for each cipd invocation in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TOOL_TIMEOUT_SECS)]
    tool_timeout: u64,

    /// Build-config fragment written after an update (defaults to <root>/config.mk)
    #[arg(long, value_name = "FILE")]
    config_out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
#[group(multiple = false)]
struct ModeArgs {
    /// Check installed versions against the manifest without changing anything
    #[arg(long)]
    verify: bool,

    /// Print the installed and pinned version of every package
    #[arg(long)]
    list: bool,

    /// Regenerate the versions files from the ensure files (requires cipd)
    #[arg(long, conflicts_with = "no_cipd")]
    resolve: bool,
}

impl ModeArgs {
    fn mode(&self) -> Mode {
        if self.verify {
            Mode::Verify
        } else if self.list {
            Mode::List
        } else if self.resolve {
            Mode::Resolve
        } else {
            Mode::Update
        }
    }
}

impl From<Cli> for Options {
    fn from(cli: Cli) -> Self {
        Options {
            mode: cli.mode.mode(),
            no_cipd: cli.no_cipd,
            versions: cli.versions,
            ensure: cli.ensure,
            private_versions: cli.private_versions,
            private_ensure: cli.private_ensure,
            private_prefix: cli.private_prefix,
            root: cli.root,
            url_prefix: cli.url_prefix,
            cipd: cli.cipd,
            platform: cli.platform,
            timeout_secs: cli.timeout,
            tool_timeout_secs: cli.tool_timeout,
            config_out: cli.config_out,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let runtime = prebuilts::runtime::RealRuntime;
    let result = match Config::new(&runtime, cli.into()) {
        Ok(config) => prebuilts::commands::run(&runtime, &config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(prebuilts::error::exit_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("prebuilts").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_defaults() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.mode.mode(), Mode::Update);
        assert_eq!(cli.private_prefix, "fuchsia_internal");
        assert_eq!(cli.timeout, 600);
        assert_eq!(cli.tool_timeout, 1800);
        assert_eq!(cli.config_out, None);
    }

    #[test]
    fn test_cli_modes() {
        assert_eq!(parse(&["--verify"]).unwrap().mode.mode(), Mode::Verify);
        assert_eq!(parse(&["--list"]).unwrap().mode.mode(), Mode::List);
        assert_eq!(parse(&["--resolve"]).unwrap().mode.mode(), Mode::Resolve);
    }

    #[test]
    fn test_cli_modes_are_exclusive() {
        assert!(parse(&["--verify", "--list"]).is_err());
        assert!(parse(&["--list", "--resolve"]).is_err());
    }

    #[test]
    fn test_cli_resolve_conflicts_with_no_cipd() {
        assert!(parse(&["--resolve", "--no-cipd"]).is_err());
        assert!(parse(&["--verify", "--no-cipd"]).is_ok());
    }

    #[test]
    fn test_cli_platform_override() {
        let cli = parse(&["--platform", "linux-arm64"]).unwrap();
        assert_eq!(cli.platform, Some(PlatformId::LinuxArm64));
        assert!(parse(&["--platform", "windows-amd64"]).is_err());
    }

    #[test]
    fn test_cli_into_options() {
        let cli = parse(&[
            "--list",
            "--versions",
            "/src/prebuilt/prebuilts.versions",
            "--root",
            "/cache",
            "--timeout",
            "30",
        ])
        .unwrap();
        let options = Options::from(cli);
        assert_eq!(options.mode, Mode::List);
        assert_eq!(options.versions, PathBuf::from("/src/prebuilt/prebuilts.versions"));
        assert_eq!(options.root, Some(PathBuf::from("/cache")));
        assert_eq!(options.timeout_secs, 30);
    }
}
