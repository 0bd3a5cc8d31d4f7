use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{DEFAULT_SEARCH_DEPTH, DEFAULT_THREADS, DEFAULT_TIMEOUT_MINUTES};

#[derive(Debug, Clone, Parser)]
#[command(name = "tpl-analyzer")]
#[command(about = "Build a class/jar dependency graph from compiled artifacts and search it")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Graph store directory
    #[arg(long, value_name = "DIR", global = true)]
    pub db: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Extract classes and archives and populate the graph store
    Build {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Find user classes affected by archives matching each term
    Search {
        #[arg(required = true, value_name = "TERM")]
        terms: Vec<String>,

        #[command(flatten)]
        search: SearchArgs,

        #[command(flatten)]
        source: SourceArgs,
    },
    /// Find archives reached by user classes matching each term
    Deps {
        #[arg(required = true, value_name = "TERM")]
        terms: Vec<String>,

        #[command(flatten)]
        search: SearchArgs,

        #[command(flatten)]
        source: SourceArgs,
    },
    /// List archives no user class reaches
    Unused {
        #[arg(long, value_name = "MINUTES", default_value_t = DEFAULT_TIMEOUT_MINUTES)]
        timeout_minutes: u64,

        #[command(flatten)]
        archive_filters: ArchiveFilterArgs,
    },
    Stats,
    Clear,
}

/// Where to read artifacts from. When given to a search, the graph is
/// rebuilt first.
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Directory of compiled codebase classes
    #[arg(long, value_name = "DIR", requires = "jars")]
    pub classes: Option<PathBuf>,

    /// Directory of library jars
    #[arg(long, value_name = "DIR", requires = "classes")]
    pub jars: Option<PathBuf>,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_THREADS)]
    pub threads: usize,

    #[arg(long)]
    pub exclude_test_dirs: bool,

    /// Skip jar paths fully matching this pattern
    #[arg(long = "dep-exclusion", value_name = "REGEX")]
    pub dep_exclusions: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    /// Maximum reference hops explored from each target
    #[arg(long, value_name = "N", default_value_t = DEFAULT_SEARCH_DEPTH)]
    pub depth: u32,

    #[arg(long, value_name = "MINUTES", default_value_t = DEFAULT_TIMEOUT_MINUTES)]
    pub timeout_minutes: u64,

    /// Run one search at a time instead of two
    #[arg(long)]
    pub single_thread: bool,

    /// Match terms against whole names instead of substrings
    #[arg(long)]
    pub exact: bool,

    /// Keep one chain per user class/archive pair
    #[arg(long)]
    pub filter: bool,

    #[command(flatten)]
    pub archive_filters: ArchiveFilterArgs,

    #[arg(short = 'o', long, value_name = "DIR", default_value = "tpla-report")]
    pub output: PathBuf,

    #[arg(long = "reporter", value_enum, default_values_t = [ReporterKind::Json])]
    pub reporters: Vec<ReporterKind>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ArchiveFilterArgs {
    /// Only archives fully matching one of these patterns are searched
    #[arg(long = "search-include", value_name = "REGEX")]
    pub search_include: Vec<String>,

    /// Archives fully matching any of these patterns are never searched
    #[arg(long = "search-exclude", value_name = "REGEX")]
    pub search_exclude: Vec<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ReporterKind {
    Json,
    Text,
    Viz,
}
