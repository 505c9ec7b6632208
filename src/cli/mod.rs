//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "clipbrain",
    version,
    about = "Content intelligence for short-form video catalogs",
    long_about = "clipbrain indexes a creator's own video catalog into searchable embedded fragments, \
                  ranks them by similarity, engagement and recency, and derives thematic clusters, \
                  viral-potential predictions and insights from the index."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/clipbrain/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a JSON array of video records into the catalog
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },

    /// Index (or reindex) a single video
    Index {
        /// Video id
        video_id: String,
    },

    /// Rebuild the index for every video of an owner
    Reindex {
        /// Owner id
        owner: String,
    },

    /// Search an owner's content
    Search {
        /// Owner id
        owner: String,

        /// Search query text
        query: String,

        /// Maximum number of results to return
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,

        /// Restrict to content types (hook, script, cta)
        #[arg(short = 't', long = "type", value_delimiter = ',')]
        content_types: Vec<String>,

        /// Only videos with this theme tag
        #[arg(long)]
        theme: Option<String>,

        /// Only videos with at least this many views
        #[arg(long)]
        min_views: Option<u64>,

        /// Only videos published on or after this date (YYYY-MM-DD)
        #[arg(long)]
        after: Option<String>,

        /// Only videos published on or before this date (YYYY-MM-DD)
        #[arg(long)]
        before: Option<String>,

        /// Drop near-duplicate hits
        #[arg(short, long)]
        diversify: bool,

        /// Similarity above which a hit counts as a near-duplicate
        #[arg(long)]
        diversity_threshold: Option<f32>,
    },

    /// Thematic clusters of an owner's videos
    Clusters {
        /// Owner id
        owner: String,
    },

    /// Viral-potential predictions
    Predict {
        /// Owner id
        owner: String,

        /// Videos to predict (defaults to every indexed video)
        videos: Vec<String>,
    },

    /// Generate and list insights
    Insights {
        /// Owner id
        owner: String,

        /// List stored insights instead of running a new scan
        #[arg(short, long)]
        list: bool,

        /// Include dismissed insights when listing
        #[arg(long)]
        all: bool,

        /// Dismiss the insight with this id
        #[arg(long, value_name = "INSIGHT_ID")]
        dismiss: Option<String>,
    },

    /// Record the outcome of a content idea
    Outcome {
        /// Owner id
        owner: String,

        /// Idea title
        title: String,

        /// Outcome status
        #[arg(short, long, value_parser = ["success", "failure", "pending"])]
        status: String,

        /// Measured retention percentage
        #[arg(long)]
        retention: Option<f64>,

        /// Measured saves per 1000 views
        #[arg(long)]
        saves: Option<f64>,

        /// Measured follows per 1000 views
        #[arg(long)]
        follows: Option<f64>,
    },

    /// List recorded idea outcomes, newest first
    Outcomes {
        /// Owner id
        owner: String,
    },

    /// Show or edit an owner's account context
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Catalog and index statistics for an owner
    Stats {
        /// Owner id
        owner: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum AccountAction {
    /// Show the account context
    Show {
        /// Owner id
        owner: String,
    },

    /// Create or update the account context
    Set {
        /// Owner id
        owner: String,

        /// Mission statement
        #[arg(long)]
        mission: Option<String>,

        /// Content themes (replaces the current list)
        #[arg(long, value_delimiter = ',')]
        themes: Option<Vec<String>>,

        /// Strategic bets (replaces the current list)
        #[arg(long, value_delimiter = ',')]
        bets: Option<Vec<String>>,

        /// Metric weights as retention,saves,follows (must sum to 1)
        #[arg(long, value_delimiter = ',')]
        weights: Option<Vec<f64>>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_arguments() {
        let cli = Cli::try_parse_from([
            "clipbrain",
            "search",
            "alice",
            "productivity tips",
            "-k",
            "5",
            "--type",
            "hook,cta",
            "--diversify",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Search {
                owner,
                top_k,
                content_types,
                diversify,
                ..
            } => {
                assert_eq!(owner, "alice");
                assert_eq!(top_k, 5);
                assert_eq!(content_types, vec!["hook", "cta"]);
                assert!(diversify);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_outcomes_listing() {
        let cli = Cli::try_parse_from(["clipbrain", "outcomes", "alice", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Outcomes { owner } if owner == "alice"));
    }

    #[test]
    fn test_account_weights_split() {
        let cli = Cli::try_parse_from([
            "clipbrain", "account", "set", "alice", "--weights", "0.5,0.3,0.2",
        ])
        .unwrap();

        match cli.command {
            Commands::Account {
                action: AccountAction::Set { weights, .. },
            } => assert_eq!(weights, Some(vec![0.5, 0.3, 0.2])),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
