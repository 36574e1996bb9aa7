//! Input and output collaborators: where pages come from and where site
//! aggregates go.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::controls::StageToggles;
use crate::error::{ConfigurationError, PersistenceError};
use crate::page::{Page, SiteAggregate};

/// Read-only access to crawled pages grouped by base host.
pub trait PageSource {
    /// Distinct base hosts.
    fn hosts(&self) -> Result<Vec<String>, ConfigurationError>;
    /// Every page filed under `host`.
    fn pages(&self, host: &str) -> Result<Vec<Page>, ConfigurationError>;
}

/// Receives one aggregate per site. An implementation either stores the whole
/// aggregate or returns an error; it never leaves part of it behind.
#[allow(async_fn_in_trait)]
pub trait SiteSink {
    /// Persists everything `site` contributes.
    async fn commit_site(&mut self, site: &SiteAggregate) -> Result<(), PersistenceError>;
}

/// A sink that can take back its most recent commit.
#[allow(async_fn_in_trait)]
pub trait ReversibleSink: SiteSink {
    /// Removes what the last successful `commit_site` of `site` wrote. Reverting
    /// a site that was not the last one committed is a no-op.
    async fn revert_site(&mut self, site: &SiteAggregate) -> Result<(), PersistenceError>;
}

impl<S: SiteSink> SiteSink for Option<S> {
    async fn commit_site(&mut self, site: &SiteAggregate) -> Result<(), PersistenceError> {
        match self {
            Some(sink) => sink.commit_site(site).await,
            None => Ok(()),
        }
    }
}

impl<S: ReversibleSink> ReversibleSink for Option<S> {
    async fn revert_site(&mut self, site: &SiteAggregate) -> Result<(), PersistenceError> {
        match self {
            Some(sink) => sink.revert_site(site).await,
            None => Ok(()),
        }
    }
}

/// Routes each site to the text sink and the graph sink enabled for this run.
///
/// The text sink commits first and the transactional graph sink last. When the
/// graph commit fails the text commit is reverted, so a site lands in both
/// stores or in neither.
#[derive(Debug)]
pub struct FanoutSink<T, G> {
    text: Option<T>,
    graph: Option<G>,
}

impl<T: ReversibleSink, G: SiteSink> FanoutSink<T, G> {
    /// Keeps `text` only when the text stage is on and `graph` only when the
    /// link or researcher stage is on.
    pub fn new(stages: StageToggles, text: Option<T>, graph: Option<G>) -> Self {
        Self {
            text: text.filter(|_| stages.text),
            graph: graph.filter(|_| stages.needs_graph_store()),
        }
    }

    /// Fanout with no sinks; every commit succeeds without writing.
    pub fn discard() -> Self {
        Self {
            text: None,
            graph: None,
        }
    }

    /// Text sink, if enabled.
    pub fn text(&self) -> Option<&T> {
        self.text.as_ref()
    }

    /// Graph sink, if enabled.
    pub fn graph(&self) -> Option<&G> {
        self.graph.as_ref()
    }
}

impl<T: ReversibleSink, G: SiteSink> SiteSink for FanoutSink<T, G> {
    async fn commit_site(&mut self, site: &SiteAggregate) -> Result<(), PersistenceError> {
        self.text.commit_site(site).await?;
        if let Err(err) = self.graph.commit_site(site).await {
            if let Err(revert) = self.text.revert_site(site).await {
                error!(host = %site.host, error = %revert, "failed to revert text output");
            }
            return Err(err);
        }
        Ok(())
    }
}

/// Pages loaded from the crawler's JSON Lines dump.
#[derive(Debug, Clone, Default)]
pub struct JsonlPageSource {
    by_host: BTreeMap<String, Vec<Page>>,
}

impl JsonlPageSource {
    /// Reads and groups every page in `path`. Undecodable lines are fatal.
    pub fn open(path: &Path) -> Result<Self, ConfigurationError> {
        let source_error = |message: String| ConfigurationError::Source {
            path: path.to_path_buf(),
            message,
        };
        let file = File::open(path).map_err(|err| source_error(err.to_string()))?;
        let reader = BufReader::new(file);
        let mut pages = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| source_error(format!("line {}: {err}", idx + 1)))?;
            if line.trim().is_empty() {
                continue;
            }
            let page: Page = serde_json::from_str(&line)
                .map_err(|err| source_error(format!("invalid page record at line {}: {err}", idx + 1)))?;
            pages.push(page);
        }
        Ok(Self::from_pages(pages))
    }

    /// Groups already-loaded pages.
    pub fn from_pages(pages: impl IntoIterator<Item = Page>) -> Self {
        let mut by_host: BTreeMap<String, Vec<Page>> = BTreeMap::new();
        for page in pages {
            by_host.entry(page.base_host.clone()).or_default().push(page);
        }
        Self { by_host }
    }

    /// Total number of pages.
    pub fn page_count(&self) -> usize {
        self.by_host.values().map(Vec::len).sum()
    }
}

impl PageSource for JsonlPageSource {
    fn hosts(&self) -> Result<Vec<String>, ConfigurationError> {
        Ok(self.by_host.keys().cloned().collect())
    }

    fn pages(&self, host: &str) -> Result<Vec<Page>, ConfigurationError> {
        Ok(self.by_host.get(host).cloned().unwrap_or_default())
    }
}

/// Append-only JSON Lines sink for cleaned pages.
#[derive(Debug)]
pub struct JsonlTextStore {
    path: PathBuf,
    file: File,
    /// Host and file length before the most recent commit.
    last_commit: Option<(String, u64)>,
}

impl JsonlTextStore {
    /// Opens (creating if needed) `path` for appending.
    pub fn open(path: &Path) -> Result<Self, ConfigurationError> {
        let open = || -> io::Result<File> {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            OpenOptions::new().create(true).append(true).open(path)
        };
        let file = open().map_err(|err| {
            ConfigurationError::Invalid(format!(
                "cannot open text output {}: {err}",
                path.display()
            ))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            last_commit: None,
        })
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SiteSink for JsonlTextStore {
    async fn commit_site(&mut self, site: &SiteAggregate) -> Result<(), PersistenceError> {
        self.last_commit = None;
        if site.cleaned_pages.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for page in &site.cleaned_pages {
            buf.push_str(&serde_json::to_string(page)?);
            buf.push('\n');
        }
        let io_error = |source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        };
        let start = self.file.metadata().map_err(io_error)?.len();
        let written = self
            .file
            .write_all(buf.as_bytes())
            .and_then(|()| self.file.flush());
        if let Err(err) = written {
            // Drop any partial record so the file stays line-aligned.
            if let Err(truncate) = self.file.set_len(start) {
                error!(path = %self.path.display(), error = %truncate, "failed to truncate text output");
            }
            return Err(io_error(err));
        }
        self.last_commit = Some((site.host.clone(), start));
        Ok(())
    }
}

impl ReversibleSink for JsonlTextStore {
    async fn revert_site(&mut self, site: &SiteAggregate) -> Result<(), PersistenceError> {
        match self.last_commit.take() {
            Some((host, start)) if host == site.host => {
                self.file.set_len(start).map_err(|source| PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                })?;
                debug!(host = %site.host, "reverted text output");
                Ok(())
            }
            other => {
                self.last_commit = other;
                Ok(())
            }
        }
    }
}

/// Keeps committed aggregates in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    sites: Vec<SiteAggregate>,
    fail_host: Option<String>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that refuses to commit `host`.
    pub fn failing_on(host: impl Into<String>) -> Self {
        Self {
            sites: Vec::new(),
            fail_host: Some(host.into()),
        }
    }

    /// Committed aggregates in commit order.
    pub fn sites(&self) -> &[SiteAggregate] {
        &self.sites
    }

    /// Committed aggregate for `host`.
    pub fn site(&self, host: &str) -> Option<&SiteAggregate> {
        self.sites.iter().find(|site| site.host == host)
    }
}

impl SiteSink for MemorySink {
    async fn commit_site(&mut self, site: &SiteAggregate) -> Result<(), PersistenceError> {
        if self.fail_host.as_deref() == Some(site.host.as_str()) {
            return Err(PersistenceError::Io {
                path: PathBuf::from("memory"),
                source: io::Error::other(format!("refusing to commit {}", site.host)),
            });
        }
        self.sites.push(site.clone());
        Ok(())
    }
}

impl ReversibleSink for MemorySink {
    async fn revert_site(&mut self, site: &SiteAggregate) -> Result<(), PersistenceError> {
        if self.sites.last().is_some_and(|last| last.host == site.host) {
            self.sites.pop();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::CleanedPage;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    #[test]
    fn groups_pages_by_host() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for (host, url) in [
            ("b.org", "http://b.org/1"),
            ("a.edu", "http://a.edu/1"),
            ("b.org", "http://b.org/2"),
        ] {
            let page = Page::new(host, url, "<p>x</p>", 1, 0);
            writeln!(file, "{}", serde_json::to_string(&page).unwrap()).unwrap();
        }
        writeln!(file).unwrap();

        let source = JsonlPageSource::open(file.path()).unwrap();
        assert_eq!(source.hosts().unwrap(), vec!["a.edu", "b.org"]);
        assert_eq!(source.pages("b.org").unwrap().len(), 2);
        assert!(source.pages("c.net").unwrap().is_empty());
        assert_eq!(source.page_count(), 3);
    }

    #[test]
    fn corrupt_dump_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{not json").unwrap();
        assert!(matches!(
            JsonlPageSource::open(file.path()),
            Err(ConfigurationError::Source { .. })
        ));
    }

    #[tokio::test]
    async fn text_store_appends_cleaned_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/filtered.jsonl");
        let page = Page::new("a.edu", "http://a.edu/1", "<p>x</p>", 2, 7);
        let mut site = SiteAggregate::new("a.edu");
        site.cleaned_pages
            .push(CleanedPage::from_page(&page, "x".to_string()));

        for _ in 0..2 {
            let mut store = JsonlTextStore::open(&path).unwrap();
            store.commit_site(&site).await.unwrap();
        }

        let written = std::fs::read_to_string(&path).unwrap();
        let records: Vec<CleanedPage> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], site.cleaned_pages[0]);
        assert!(written.contains(r#""src_url":"http://a.edu/1""#));
    }

    #[tokio::test]
    async fn fanout_honours_stage_toggles() {
        let site = SiteAggregate::new("a.edu");
        let stages = StageToggles {
            links: true,
            text: false,
            researchers: false,
        };
        let mut sink = FanoutSink::new(stages, Some(MemorySink::new()), Some(MemorySink::new()));
        sink.commit_site(&site).await.unwrap();
        assert!(sink.text().is_none());
        assert_eq!(sink.graph().unwrap().sites().len(), 1);
    }

    #[tokio::test]
    async fn fanout_reverts_text_when_graph_commit_fails() {
        let kept = SiteAggregate::new("a.edu");
        let site = SiteAggregate::new("b.edu");
        let mut sink = FanoutSink::new(
            StageToggles::all(),
            Some(MemorySink::new()),
            Some(MemorySink::failing_on("b.edu")),
        );
        sink.commit_site(&kept).await.unwrap();
        assert!(sink.commit_site(&site).await.is_err());

        let hosts = |sink: &MemorySink| {
            sink.sites()
                .iter()
                .map(|site| site.host.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(hosts(sink.text().unwrap()), vec!["a.edu"]);
        assert_eq!(hosts(sink.graph().unwrap()), vec!["a.edu"]);
    }

    #[tokio::test]
    async fn fanout_skips_graph_when_text_commit_fails() {
        let site = SiteAggregate::new("a.edu");
        let mut sink = FanoutSink::new(
            StageToggles::all(),
            Some(MemorySink::failing_on("a.edu")),
            Some(MemorySink::new()),
        );
        assert!(sink.commit_site(&site).await.is_err());
        assert!(sink.text().unwrap().sites().is_empty());
        assert!(sink.graph().unwrap().sites().is_empty());
    }

    #[tokio::test]
    async fn text_store_revert_removes_only_the_last_site() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filtered.jsonl");
        let site = |host: &str| {
            let page = Page::new(host, &format!("http://{host}/"), "<p>x</p>", 1, 0);
            let mut site = SiteAggregate::new(host);
            site.cleaned_pages
                .push(CleanedPage::from_page(&page, format!("text from {host}")));
            site
        };
        let (first, second) = (site("a.edu"), site("b.edu"));

        let mut store = JsonlTextStore::open(&path).unwrap();
        store.commit_site(&first).await.unwrap();
        store.commit_site(&second).await.unwrap();
        store.revert_site(&first).await.unwrap();
        store.revert_site(&second).await.unwrap();

        let records: Vec<CleanedPage> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records, first.cleaned_pages);
    }
}
