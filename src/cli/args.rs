//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::application::services::{BundleSource, FilterTiming};
use crate::domain::ProfileKind;

/// Validate layer-ordering instructions and restructure a map layer tree
#[derive(Parser, Debug)]
#[command(name = "layersort")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output: -d info, -dd debug, -ddd trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Project directory (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check instructions against the map without changing anything
    Validate {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Validate, filter bundle layers and restructure the map
    Apply {
        #[command(flatten)]
        source: SourceArgs,

        /// When to run the domain bundle filter (default: from config)
        #[arg(long, value_enum)]
        filter: Option<TimingArg>,

        /// Print the resulting tree instead of writing it
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Write the result here (default: overwrite the map file)
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },

    /// Show the map layer tree
    Tree {
        #[command(flatten)]
        map: MapArgs,
    },

    /// List layers per configured domain bundle
    Classify {
        #[command(flatten)]
        map: MapArgs,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Where the live tree comes from.
#[derive(Args, Debug, Clone)]
pub struct MapArgs {
    /// Map document (default: map_file from config)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub map: Option<PathBuf>,

    /// Domain bundle file merged into the map (repeatable)
    #[arg(short, long = "bundle", value_name = "ID=FILE")]
    pub bundles: Vec<BundleSource>,
}

/// Live tree plus instructions.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    #[command(flatten)]
    pub map: MapArgs,

    /// Instruction list (default: instructions_file from config)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub instructions: Option<PathBuf>,

    /// Validation profile (default: from config)
    #[arg(short, long, value_enum)]
    pub profile: Option<ProfileArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileArg {
    Strict,
    Permissive,
}

impl From<ProfileArg> for ProfileKind {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Strict => ProfileKind::Strict,
            ProfileArg::Permissive => ProfileKind::Permissive,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingArg {
    Before,
    After,
}

impl From<TimingArg> for FilterTiming {
    fn from(arg: TimingArg) -> Self {
        match arg {
            TimingArg::Before => FilterTiming::Before,
            TimingArg::After => FilterTiming::After,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
    },

    /// Show config paths
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn given_cli_definition_when_asserted_then_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn given_apply_args_when_parsed_then_collects_bundles_and_overrides() {
        let cli = Cli::parse_from([
            "layersort", "-dd", "apply", "-m", "map.json", "-i", "sort.json", "-b", "a=a.json",
            "-b", "b=b.json", "--profile", "permissive", "--filter", "before", "-n",
        ]);
        assert_eq!(cli.debug, 2);
        match cli.command {
            Some(Commands::Apply {
                source,
                filter,
                dry_run,
                output,
            }) => {
                assert_eq!(source.map.bundles.len(), 2);
                assert_eq!(source.map.bundles[1].id, "b");
                assert_eq!(source.profile, Some(ProfileArg::Permissive));
                assert_eq!(filter, Some(TimingArg::Before));
                assert!(dry_run);
                assert!(output.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
