#![warn(missing_docs)]
//! Core library for the ecomap preprocessor: boilerplate removal, host link
//! graph extraction and researcher name resolution over crawled pages.

pub mod controls;
pub mod entities;
pub mod error;
pub mod html;
pub mod normalizer;
pub mod page;
pub mod pg_store;
pub mod roster;
pub mod runtime;
mod stoplist;
pub mod store;

pub use controls::{Cli, PipelineControls, StageToggles};
pub use entities::{Chunk, EntityLabel, EntityRecognizer, PosTag, TaggedToken};
pub use error::{ConfigurationError, PageError, ParseError, PersistenceError, RecognitionError};
pub use html::{extract_edges, link_host};
pub use normalizer::{BlockClass, NormalizationConfig, Normalizer, TextBlock};
pub use page::{CleanedPage, LinkEdge, Page, ResolvedResearcher, SiteAggregate};
pub use pg_store::{PgGraphStore, TableName};
pub use roster::{similarity, ResolverConfig, Roster, RosterResolver, DEFAULT_THRESHOLD};
pub use runtime::{PageOutcome, Pipeline, RunFailure, RunSummary, Stage};
pub use store::{
    FanoutSink, JsonlPageSource, JsonlTextStore, MemorySink, PageSource, ReversibleSink, SiteSink,
};
