//! Per-site batch orchestration: normalize, extract edges, recognize, resolve,
//! then commit one aggregate per site.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::controls::PipelineControls;
use crate::entities::{
    CapitalizationChunker, EntityChunker, EntityRecognizer, LexiconTagger, PosTagger,
    RuleTokenizer, Tokenizer,
};
use crate::error::{ConfigurationError, PageError, PersistenceError};
use crate::html::extract_edges;
use crate::normalizer::Normalizer;
use crate::page::{CleanedPage, Page, SiteAggregate};
use crate::roster::RosterResolver;
use crate::store::{PageSource, SiteSink};

/// Pipeline stage a page has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Loaded, nothing done yet.
    Raw,
    /// Boilerplate removed.
    Normalized,
    /// Outbound hosts collected.
    GraphExtracted,
    /// PERSON spans extracted.
    Recognized,
    /// Spans matched against the roster.
    Resolved,
    /// Site aggregate committed.
    Persisted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raw => "raw",
            Self::Normalized => "normalized",
            Self::GraphExtracted => "graph_extracted",
            Self::Recognized => "recognized",
            Self::Resolved => "resolved",
            Self::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// Terminal state of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Every enabled stage succeeded.
    Completed {
        /// Page URL.
        source_url: String,
        /// Last stage reached.
        stage: Stage,
    },
    /// A stage failed; the page contributes nothing from that stage onward.
    Failed {
        /// Page URL.
        source_url: String,
        /// Stage that failed.
        stage: Stage,
        /// Triggering error.
        reason: PageError,
    },
}

impl PageOutcome {
    fn failed(page: &Page, reason: PageError) -> Self {
        Self::Failed {
            source_url: page.source_url.clone(),
            stage: reason.stage(),
            reason,
        }
    }

    /// Page URL.
    pub fn source_url(&self) -> &str {
        match self {
            Self::Completed { source_url, .. } | Self::Failed { source_url, .. } => source_url,
        }
    }

    /// Whether the page failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Promotes a completed page once its site has been committed.
    fn persisted(self) -> Self {
        match self {
            Self::Completed { source_url, .. } => Self::Completed {
                source_url,
                stage: Stage::Persisted,
            },
            failed => failed,
        }
    }
}

/// A page that failed, kept for the end-of-run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    /// Page URL.
    pub source_url: String,
    /// Triggering error.
    pub reason: PageError,
}

/// Counters gathered over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Pages that completed every enabled stage and were committed.
    pub pages_processed: usize,
    /// Pages that completed every stage but whose site commit failed.
    pub pages_unpersisted: usize,
    /// Pages that failed, with reasons.
    pub failures: Vec<PageFailure>,
    /// Sites whose aggregate was committed.
    pub sites_aggregated: usize,
    /// Cleaned pages committed.
    pub cleaned_pages: usize,
    /// Link edges committed.
    pub edges: usize,
    /// Resolved researchers committed.
    pub researchers: usize,
    /// Whether the run stopped early on request.
    pub interrupted: bool,
}

impl RunSummary {
    /// Number of failed pages.
    pub fn pages_failed(&self) -> usize {
        self.failures.len()
    }

    fn record_outcomes(&mut self, outcomes: &[PageOutcome], committed: bool) {
        for outcome in outcomes {
            match outcome {
                PageOutcome::Completed { .. } if committed => self.pages_processed += 1,
                PageOutcome::Completed { .. } => self.pages_unpersisted += 1,
                PageOutcome::Failed {
                    source_url, reason, ..
                } => self.failures.push(PageFailure {
                    source_url: source_url.clone(),
                    reason: reason.clone(),
                }),
            }
        }
    }

    fn record_site(&mut self, site: &SiteAggregate) {
        self.sites_aggregated += 1;
        self.cleaned_pages += site.cleaned_pages.len();
        self.edges += site.destinations.len();
        self.researchers += site.researchers.len();
    }

    /// Prints the summary block to stdout.
    pub fn report(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f32().max(f32::EPSILON);
        println!("--- preprocess summary ({secs:.2}s) ---");
        println!("pages processed: {}", self.pages_processed);
        if self.pages_unpersisted > 0 {
            println!("pages not persisted: {}", self.pages_unpersisted);
        }
        println!("pages failed: {}", self.pages_failed());
        for failure in &self.failures {
            println!("  {} ({})", failure.source_url, failure.reason);
        }
        println!("sites aggregated: {}", self.sites_aggregated);
        println!("cleaned pages: {}", self.cleaned_pages);
        println!("link edges: {}", self.edges);
        println!("researchers: {}", self.researchers);
        if self.interrupted {
            println!("run interrupted before all sites were processed");
        }
    }
}

/// Error that ended a run early.
#[derive(Debug)]
pub enum RunError {
    /// The page source failed.
    Source(ConfigurationError),
    /// A site aggregate could not be committed.
    Persistence {
        /// Site that was being committed.
        host: String,
        /// Underlying error.
        source: PersistenceError,
    },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(err) => write!(f, "{err}"),
            Self::Persistence { host, source } => {
                write!(f, "failed to commit site {host}: {source}")
            }
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source(err) => Some(err),
            Self::Persistence { source, .. } => Some(source),
        }
    }
}

/// A run that stopped on an error, with what it had done so far.
#[derive(Debug)]
pub struct RunFailure {
    /// Work completed before the error.
    pub summary: RunSummary,
    /// What went wrong.
    pub error: RunError,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl Error for RunFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// The configured pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline<T = RuleTokenizer, P = LexiconTagger, C = CapitalizationChunker> {
    normalizer: Normalizer,
    recognizer: EntityRecognizer<T, P, C>,
    resolver: RosterResolver,
    controls: PipelineControls,
}

impl Pipeline {
    /// Pipeline with the default normalizer and rule-based recognizer.
    pub fn new(resolver: RosterResolver, controls: PipelineControls) -> Self {
        Self::with_parts(
            Normalizer::default(),
            EntityRecognizer::new(),
            resolver,
            controls,
        )
    }
}

impl<T, P, C> Pipeline<T, P, C>
where
    T: Tokenizer,
    P: PosTagger,
    C: EntityChunker,
{
    /// Pipeline over explicit components.
    pub fn with_parts(
        normalizer: Normalizer,
        recognizer: EntityRecognizer<T, P, C>,
        resolver: RosterResolver,
        controls: PipelineControls,
    ) -> Self {
        Self {
            normalizer,
            recognizer,
            resolver,
            controls,
        }
    }

    /// Active controls.
    pub fn controls(&self) -> &PipelineControls {
        &self.controls
    }

    /// Runs one page through the enabled stages and folds whatever it
    /// contributes into `site`.
    pub fn process_page(&self, page: &Page, site: &mut SiteAggregate) -> PageOutcome {
        let stages = self.controls.stages();
        let text = match self.normalizer.normalize(&page.body) {
            Ok(text) => text,
            Err(source) => {
                return PageOutcome::failed(
                    page,
                    PageError::Parse {
                        stage: Stage::Normalized,
                        source,
                    },
                )
            }
        };
        site.note_tier(page.tier);
        let strip = stages.text && self.controls.strip_entities();
        if stages.text && !strip {
            site.cleaned_pages
                .push(CleanedPage::from_page(page, text.clone()));
        }
        let mut stage = Stage::Normalized;

        if stages.links {
            match extract_edges(&page.body, &site.host) {
                Ok(destinations) => site.destinations.extend(destinations),
                Err(source) => {
                    return PageOutcome::failed(
                        page,
                        PageError::Parse {
                            stage: Stage::GraphExtracted,
                            source,
                        },
                    )
                }
            }
            stage = Stage::GraphExtracted;
        }

        if stages.researchers || strip {
            let candidates = if stages.researchers {
                match self
                    .recognizer
                    .extract_person_spans(&text)
                    .collect::<Result<Vec<_>, _>>()
                {
                    Ok(candidates) => candidates,
                    Err(err) => return PageOutcome::failed(page, err.into()),
                }
            } else {
                Vec::new()
            };
            let stripped = if strip {
                match self.recognizer.strip_named_entities(&text) {
                    Ok(stripped) => Some(stripped),
                    Err(err) => return PageOutcome::failed(page, err.into()),
                }
            } else {
                None
            };
            stage = Stage::Recognized;

            if let Some(stripped) = stripped {
                site.cleaned_pages
                    .push(CleanedPage::from_page(page, stripped));
            }
            if stages.researchers {
                debug!(url = %page.source_url, candidates = candidates.len(), "recognized person spans");
                site.researchers.extend(self.resolver.resolve(&candidates));
                stage = Stage::Resolved;
            }
        }

        PageOutcome::Completed {
            source_url: page.source_url.clone(),
            stage,
        }
    }

    /// Processes every page of one site. Failed pages are logged and skipped;
    /// the aggregate is returned once all pages are done.
    pub fn aggregate_site(&self, host: &str, pages: &[Page]) -> (SiteAggregate, Vec<PageOutcome>) {
        let mut site = SiteAggregate::new(host);
        let mut outcomes = Vec::with_capacity(pages.len());
        for page in pages {
            let outcome = self.process_page(page, &mut site);
            if let PageOutcome::Failed { reason, .. } = &outcome {
                warn!(host = %host, url = %page.source_url, error = %reason, "page failed");
            }
            outcomes.push(outcome);
        }
        (site, outcomes)
    }

    /// Sweeps every site in `source`, committing each aggregate to `sink`.
    ///
    /// `stop` is checked between sites. A commit failure ends the run; sites
    /// committed before it stay committed.
    pub async fn run<S, K>(
        &self,
        source: &S,
        sink: &mut K,
        stop: &AtomicBool,
    ) -> Result<RunSummary, RunFailure>
    where
        S: PageSource,
        K: SiteSink,
    {
        let mut summary = RunSummary::default();
        let hosts = match source.hosts() {
            Ok(hosts) => hosts,
            Err(err) => {
                return Err(RunFailure {
                    summary,
                    error: RunError::Source(err),
                })
            }
        };
        info!(sites = hosts.len(), "starting preprocess run");

        for host in hosts {
            if stop.load(Ordering::Relaxed) {
                info!("stop requested; leaving remaining sites untouched");
                summary.interrupted = true;
                break;
            }
            let pages = match source.pages(&host) {
                Ok(pages) => pages,
                Err(err) => {
                    return Err(RunFailure {
                        summary,
                        error: RunError::Source(err),
                    })
                }
            };
            let (site, outcomes) = self.aggregate_site(&host, &pages);
            if let Err(source) = sink.commit_site(&site).await {
                error!(host = %host, error = %source, "site commit failed");
                summary.record_outcomes(&outcomes, false);
                return Err(RunFailure {
                    summary,
                    error: RunError::Persistence { host, source },
                });
            }
            let outcomes: Vec<PageOutcome> =
                outcomes.into_iter().map(PageOutcome::persisted).collect();
            summary.record_outcomes(&outcomes, true);
            summary.record_site(&site);
            info!(
                host = %host,
                pages = pages.len(),
                failed = outcomes.iter().filter(|outcome| outcome.is_failed()).count(),
                edges = site.destinations.len(),
                researchers = site.researchers.len(),
                "site committed"
            );
        }

        Ok(summary)
    }
}
