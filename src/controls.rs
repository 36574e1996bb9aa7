//! Stage toggles and the command-line surface of the preprocessor.

use std::path::PathBuf;

use clap::Parser;

use crate::error::ConfigurationError;
use crate::roster::{ResolverConfig, DEFAULT_THRESHOLD};

/// Which pipeline stages run and persist their output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageToggles {
    /// Link graph extraction.
    pub links: bool,
    /// Cleaned text persistence.
    pub text: bool,
    /// Researcher recognition and resolution.
    pub researchers: bool,
}

impl StageToggles {
    /// Every stage enabled.
    pub fn all() -> Self {
        Self {
            links: true,
            text: true,
            researchers: true,
        }
    }

    /// Whether any stage is enabled.
    pub fn any(&self) -> bool {
        self.links || self.text || self.researchers
    }

    /// Whether a relational store is needed.
    pub fn needs_graph_store(&self) -> bool {
        self.links || self.researchers
    }
}

/// Runtime knobs handed to the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineControls {
    stages: StageToggles,
    resolver: ResolverConfig,
    strip_entities: bool,
}

impl PipelineControls {
    /// Constructs a new set of pipeline controls.
    pub fn new(stages: StageToggles, resolver: ResolverConfig, strip_entities: bool) -> Self {
        Self {
            stages,
            resolver,
            strip_entities,
        }
    }

    /// Enabled stages.
    pub fn stages(&self) -> StageToggles {
        self.stages
    }

    /// Resolver settings.
    pub fn resolver(&self) -> ResolverConfig {
        self.resolver
    }

    /// Whether persisted text has named entities removed.
    pub fn strip_entities(&self) -> bool {
        self.strip_entities
    }
}

impl Default for PipelineControls {
    fn default() -> Self {
        Self::new(StageToggles::all(), ResolverConfig::default(), false)
    }
}

/// Command-line interface of `ecomap-preprocess`.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ecomap-preprocess",
    about = "Clean crawled pages, build the host link graph and match researcher names"
)]
pub struct Cli {
    /// Run every stage (same as -l -t -r)
    #[arg(short = 'a', long)]
    pub all: bool,

    /// Build the host-to-host link graph
    #[arg(short = 'l', long)]
    pub link: bool,

    /// Persist boilerplate-free text for topic modeling
    #[arg(short = 't', long)]
    pub text: bool,

    /// Extract researcher names and match them against the roster
    #[arg(short = 'r', long)]
    pub researchers: bool,

    /// JSONL dump of crawled pages
    #[arg(
        long,
        env = "ECOMAP_INPUT",
        default_value = "data/html_collection.jsonl"
    )]
    pub input: PathBuf,

    /// Newline-delimited list of known researcher names
    #[arg(long, env = "ECOMAP_ROSTER", default_value = "researchers.csv")]
    pub roster: PathBuf,

    /// JSONL file receiving cleaned text records
    #[arg(
        long,
        env = "ECOMAP_TEXT_OUTPUT",
        default_value = "data/filtered_collection.jsonl"
    )]
    pub text_output: PathBuf,

    /// Postgres connection string for the link graph and researcher tables
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Postgres schema holding the output tables
    #[arg(long, env = "ECOMAP_SCHEMA", default_value = "public")]
    pub schema: String,

    /// Create output tables automatically if missing
    #[arg(
        long,
        env = "ECOMAP_PREPARE_TABLES",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub prepare_tables: bool,

    /// Minimum similarity (0-100) for a name to match the roster
    #[arg(long, env = "ECOMAP_THRESHOLD", default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: u8,

    /// Remove named entities from the persisted text
    #[arg(long, env = "ECOMAP_STRIP_ENTITIES", default_value_t = false)]
    pub strip_entities: bool,

    /// Run the enabled stages without writing any output
    #[arg(long, env = "ECOMAP_DRY_RUN", default_value_t = false)]
    pub dry_run: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "ECOMAP_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Cli {
    /// Resolves the stage flags; `--all` turns every stage on.
    pub fn stages(&self) -> StageToggles {
        if self.all {
            return StageToggles::all();
        }
        StageToggles {
            links: self.link,
            text: self.text,
            researchers: self.researchers,
        }
    }

    /// Validates the flags and converts them into `PipelineControls`.
    pub fn build_controls(&self) -> Result<PipelineControls, ConfigurationError> {
        let stages = self.stages();
        if !stages.any() {
            return Err(ConfigurationError::Invalid(
                "no stage selected; pass --all, --link, --text or --researchers".to_string(),
            ));
        }
        if self.threshold > 100 {
            return Err(ConfigurationError::Invalid(format!(
                "threshold must be between 0 and 100, got {}",
                self.threshold
            )));
        }
        if stages.needs_graph_store() && !self.dry_run && self.database_url.is_none() {
            return Err(ConfigurationError::Invalid(
                "--database-url (or DATABASE_URL) is required for --link and --researchers"
                    .to_string(),
            ));
        }
        Ok(PipelineControls::new(
            stages,
            ResolverConfig {
                threshold: self.threshold,
            },
            self.strip_entities,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ecomap-preprocess").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn all_enables_every_stage() {
        assert_eq!(parse(&["-a"]).stages(), StageToggles::all());
    }

    #[test]
    fn flags_combine_independently() {
        let stages = parse(&["-l", "-t"]).stages();
        assert_eq!(
            stages,
            StageToggles {
                links: true,
                text: true,
                researchers: false,
            }
        );
    }

    #[test]
    fn requires_a_stage() {
        assert!(matches!(
            parse(&[]).build_controls(),
            Err(ConfigurationError::Invalid(_))
        ));
    }

    #[test]
    fn text_only_runs_without_database() {
        let controls = parse(&["--text"]).build_controls().unwrap();
        assert!(controls.stages().text);
        assert_eq!(controls.resolver().threshold, 85);
    }

    #[test]
    fn graph_stages_need_database_unless_dry_run() {
        let mut cli = parse(&["-r"]);
        cli.database_url = None;
        assert!(cli.build_controls().is_err());
        cli.dry_run = true;
        assert!(cli.build_controls().is_ok());
        assert!(parse(&["-r", "--database-url", "postgres://localhost/eco"])
            .build_controls()
            .is_ok());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(parse(&["-t", "--threshold", "101"]).build_controls().is_err());
    }
}
