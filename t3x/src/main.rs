mod cli;

use anyhow::{Context, Result};
use cli::{Invocation, LOCAL_CONFIG_FILE, SCRIPT_NAME, SETTINGS};
use log::LevelFilter;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use t3x_core::{
    ArchiveFetcher, Config, Error, GLOBAL_CONFIG_FILE, Printer, Resolver, Source, TerFetcher,
    UnknownKeys, Updater, archive_file_name, decode, materialize,
};

fn main() -> ExitCode {
    init_logging();

    let invocation = match cli::parse(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::FAILURE,
            };
        }
    };

    match run(invocation) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(invocation: Invocation) -> Result<ExitCode> {
    let Invocation { cli, overrides } = invocation;

    // Honour --verbose/--quiet while the configuration files are read
    set_log_level(cli.verbose, cli.quiet);

    if cli.export_config {
        print!("{}", t3x_core::export(SETTINGS));
        return Ok(ExitCode::SUCCESS);
    }

    let config = resolve_config(Path::new("."), &overrides)?;
    set_log_level(config.flag("VERBOSE")?, config.flag("QUIET")?);
    for (key, value) in config.iter() {
        log::debug!("{}={}", key, value);
    }

    if cli.update_check {
        return cmd_update_check(&config);
    }
    if cli.update {
        cmd_update(&config)?;
        return Ok(ExitCode::SUCCESS);
    }

    let fetcher = TerFetcher::new(config.string("REPOSITORY"));
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let derived_file_dir = cli.derive_output_file().then_some(Path::new("."));
    cmd_extract(&config, derived_file_dir, &fetcher, &mut handle)?;
    Ok(ExitCode::SUCCESS)
}

/// Install the logger. The effective level is adjusted later through
/// `log::set_max_level` unless `RUST_LOG` is set.
fn init_logging() {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Trace)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .parse_default_env()
        .init();
    log::set_max_level(LevelFilter::Info);
    if std::env::var_os("RUST_LOG").is_some() {
        log::set_max_level(LevelFilter::Trace);
    }
}

fn set_log_level(verbose: bool, quiet: bool) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    log::set_max_level(log_level(verbose, quiet));
}

fn log_level(verbose: bool, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Layer defaults, the global file, the script's file and the command line.
fn resolve_config(dir: &Path, overrides: &[(&'static str, String)]) -> t3x_core::Result<Config> {
    let mut resolver = Resolver::new(SETTINGS);
    resolver.source_file(&dir.join(GLOBAL_CONFIG_FILE), UnknownKeys::Ignore)?;
    resolver.source_file(&dir.join(LOCAL_CONFIG_FILE), UnknownKeys::Reject)?;
    resolver.apply(overrides.iter().cloned());
    Ok(resolver.finish())
}

fn cmd_update_check(config: &Config) -> Result<ExitCode> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    let status = Updater::new(config.string("UPDATE_BASE"), SCRIPT_NAME)
        .check(&exe)
        .context("Failed to check for updates")?;
    Ok(ExitCode::from(status.exit_code()))
}

fn cmd_update(config: &Config) -> Result<()> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    Updater::new(config.string("UPDATE_BASE"), SCRIPT_NAME)
        .update(&exe)
        .with_context(|| format!("Failed to update {}", exe.display()))
}

/// Acquire, decode, dump and extract one archive.
///
/// `derived_file_dir` is set when `--output-file` was given without a name;
/// the archive is then stored there as `<key>_<version>.t3x`.
fn cmd_extract<W: Write>(
    config: &Config,
    derived_file_dir: Option<&Path>,
    fetcher: &dyn ArchiveFetcher,
    out: &mut W,
) -> Result<()> {
    let dump = config.flag("DUMP")?;
    let extract = config.flag("EXTRACT")?;
    let force = config.flag("FORCE")?;
    let string_limit = config.usize("STRING_LIMIT")?;

    let source = Source::locate(
        config.string("EXTENSION"),
        Path::new(config.string("BASE")),
        config.non_empty("FORCE_VERSION"),
    )?;

    let output_dir = config
        .non_empty("OUTPUTDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| source.default_output_dir());
    if extract && output_dir.exists() {
        return Err(Error::destination_exists(&output_dir).into());
    }

    let bytes = source
        .load(fetcher)
        .with_context(|| format!("Failed to retrieve {}", source.archive_name()))?;

    let output_file = if let Some(dir) = derived_file_dir {
        match &source {
            Source::File(path) => {
                log::warn!("{} is already a local file; not storing it", path.display());
                None
            }
            Source::Repository { key, version } => {
                Some(dir.join(archive_file_name(key, version)))
            }
        }
    } else {
        config.non_empty("OUTPUTFILE").map(PathBuf::from)
    };
    if let Some(path) = output_file {
        save_archive(&path, &bytes, force)?;
    }

    let manifest =
        decode(&bytes).with_context(|| format!("Failed to decode {}", source.archive_name()))?;

    if dump {
        Printer::new(string_limit)
            .print(out, &manifest)
            .context("Failed to write dump")?;
        out.flush()?;
    }

    if extract {
        let report = materialize(&manifest, &output_dir)
            .with_context(|| format!("Failed to extract to {}", output_dir.display()))?;
        if !report.is_success() {
            anyhow::bail!(
                "{} files could not be written to {}",
                report.failures.len(),
                output_dir.display()
            );
        }
    }

    Ok(())
}

/// Store the raw archive, refusing to replace a file unless forced.
fn save_archive(path: &Path, bytes: &[u8], force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Output file {} already exists; use --force to overwrite it",
            path.display()
        );
    }
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Stored archive as {}", path.display());
    Ok(())
}
