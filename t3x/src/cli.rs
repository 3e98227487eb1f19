//! Command line parsing.
//!
//! Flags are turned into configuration overrides. Overrides are applied in
//! the order the flags appear, so `--dump --extract` extracts while
//! `--extract --dump` only dumps.

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use t3x_core::{DEFAULT_REPOSITORY, DEFAULT_UPDATE_BASE, Setting};

/// Name the script is published under.
pub const SCRIPT_NAME: &str = "t3x-extract";

/// Script-specific configuration file, read after the global one.
pub const LOCAL_CONFIG_FILE: &str = "t3x-extract.conf";

/// Every setting the script understands, with its default.
pub const SETTINGS: &[Setting] = &[
    Setting::new("BASE", "typo3", "The base directory where TYPO3 is installed."),
    Setting::new(
        "EXTENSION",
        "",
        "The extension key or .t3x file to extract.",
    ),
    Setting::new(
        "FORCE_VERSION",
        "",
        "The version to retrieve instead of the installed one.",
    ),
    Setting::new(
        "OUTPUTDIR",
        "",
        "The directory to extract to. Derived from the archive name when empty.",
    ),
    Setting::new(
        "OUTPUTFILE",
        "",
        "Where to store the retrieved archive. Not stored when empty.",
    ),
    Setting::new("DUMP", "false", "Print the contents of the archive."),
    Setting::new("EXTRACT", "true", "Extract the files of the archive."),
    Setting::new(
        "STRING_LIMIT",
        "60",
        "Longer strings are printed as String[length] in dumps. 0 prints everything.",
    ),
    Setting::new(
        "REPOSITORY",
        DEFAULT_REPOSITORY,
        "The extension repository to retrieve archives from.",
    ),
    Setting::new(
        "UPDATE_BASE",
        DEFAULT_UPDATE_BASE,
        "The location new versions of this script are retrieved from.",
    ),
    Setting::new("VERBOSE", "false", "Print debugging output."),
    Setting::new("QUIET", "false", "Only print errors."),
    Setting::new(
        "FORCE",
        "false",
        "Perform actions that would otherwise abort, like overwriting OUTPUTFILE.",
    ),
];

/// Extract the contents of a TYPO3 extension archive (.t3x)
#[derive(Parser, Debug)]
#[command(name = "t3x-extract")]
#[command(about = "Extract the contents of a TYPO3 extension archive", long_about = None)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Extension key or .t3x file (same as --extension)
    #[arg(value_name = "EXTENSION", allow_hyphen_values = true)]
    pub key: Option<String>,

    /// Base directory of the TYPO3 installation
    #[arg(long, value_name = "PATH")]
    pub base: Option<String>,

    /// Extension key or .t3x file
    #[arg(long, value_name = "KEY")]
    pub extension: Option<String>,

    /// Retrieve this version instead of the installed one
    #[arg(long, value_name = "VERSION")]
    pub force_version: Option<String>,

    /// Directory to extract to
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<String>,

    /// Store the retrieved archive (as <key>_<version>.t3x without NAME)
    #[arg(
        long,
        value_name = "NAME",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ""
    )]
    pub output_file: Option<String>,

    /// Print the archive contents instead of extracting them
    #[arg(long)]
    pub dump: bool,

    /// Extract the files (undoes an earlier --dump)
    #[arg(long)]
    pub extract: bool,

    /// Longest string printed literally in dumps (0 = no limit)
    #[arg(long, value_name = "N")]
    pub string_limit: Option<String>,

    /// Print debugging output
    #[arg(long)]
    pub verbose: bool,

    /// Only print errors
    #[arg(long)]
    pub quiet: bool,

    /// Overwrite an existing output file
    #[arg(long)]
    pub force: bool,

    /// Update the script to the latest version
    #[arg(long)]
    pub update: bool,

    /// Check whether a newer version of the script is available
    #[arg(long)]
    pub update_check: bool,

    /// Print the default configuration
    #[arg(long)]
    pub export_config: bool,
}

impl Cli {
    /// True if `--output-file` was given without a name.
    pub fn derive_output_file(&self) -> bool {
        self.output_file.as_deref() == Some("")
    }
}

/// A parsed command line.
#[derive(Debug)]
pub struct Invocation {
    pub cli: Cli,
    /// Setting overrides in command line order.
    pub overrides: Vec<(&'static str, String)>,
}

/// Parse a command line, program name included.
pub fn parse<I, T>(args: I) -> Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = Cli::command().try_get_matches_from(args)?;
    let cli = Cli::from_arg_matches(&matches)?;
    let overrides = overrides(&cli, &matches);
    Ok(Invocation { cli, overrides })
}

/// Turn the given flags into setting overrides, ordered by position.
fn overrides(cli: &Cli, matches: &ArgMatches) -> Vec<(&'static str, String)> {
    let position = |id: &str| matches.index_of(id).unwrap_or(0);
    let mut found: Vec<(usize, &'static str, String)> = Vec::new();

    let values = [
        ("key", "EXTENSION", &cli.key),
        ("base", "BASE", &cli.base),
        ("extension", "EXTENSION", &cli.extension),
        ("force_version", "FORCE_VERSION", &cli.force_version),
        ("output_dir", "OUTPUTDIR", &cli.output_dir),
        ("string_limit", "STRING_LIMIT", &cli.string_limit),
    ];
    for (id, setting, value) in values {
        if let Some(value) = value {
            found.push((position(id), setting, value.clone()));
        }
    }
    if let Some(name) = cli.output_file.as_deref().filter(|name| !name.is_empty()) {
        found.push((position("output_file"), "OUTPUTFILE", name.to_string()));
    }

    let flags = [
        ("dump", cli.dump, &[("DUMP", "true"), ("EXTRACT", "false")][..]),
        ("extract", cli.extract, &[("EXTRACT", "true")][..]),
        ("verbose", cli.verbose, &[("VERBOSE", "true")][..]),
        ("quiet", cli.quiet, &[("QUIET", "true")][..]),
        ("force", cli.force, &[("FORCE", "true")][..]),
    ];
    for (id, set, assignments) in flags {
        if set {
            for &(setting, value) in assignments {
                found.push((position(id), setting, value.to_string()));
            }
        }
    }

    // Stable, so multi-setting flags keep their internal order
    found.sort_by_key(|(index, _, _)| *index);
    found
        .into_iter()
        .map(|(_, setting, value)| (setting, value))
        .collect()
}
