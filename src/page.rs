//! Records flowing into and out of the pipeline.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Raw crawled page as supplied by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Host the crawler filed this page under.
    #[serde(alias = "base_url")]
    pub base_host: String,
    /// URL the body was fetched from.
    #[serde(alias = "url")]
    pub source_url: String,
    /// Raw HTML body.
    pub body: String,
    /// Crawl tier; lower is more authoritative.
    pub tier: u8,
    /// Fetch time in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl Page {
    /// Builds a page record.
    pub fn new(
        base_host: impl Into<String>,
        source_url: impl Into<String>,
        body: impl Into<String>,
        tier: u8,
        timestamp: u64,
    ) -> Self {
        Self {
            base_host: base_host.into(),
            source_url: source_url.into(),
            body: body.into(),
            tier,
            timestamp,
        }
    }

    /// CRC32 of the raw body.
    pub fn checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.body.as_bytes());
        hasher.finalize()
    }
}

/// Boilerplate-free prose for one page, destined for the filtered text store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedPage {
    /// Owning host.
    #[serde(rename = "base_url")]
    pub base_host: String,
    /// Page URL.
    #[serde(rename = "src_url")]
    pub source_url: String,
    /// Cleaned text.
    pub text: String,
    /// Crawl tier copied from the page.
    pub tier: u8,
    /// Fetch timestamp copied from the page.
    pub timestamp: u64,
    /// CRC32 of the raw body, for deduplicating repeated runs downstream.
    pub checksum: u32,
}

impl CleanedPage {
    /// Pairs a page with its cleaned text.
    pub fn from_page(page: &Page, text: String) -> Self {
        Self {
            base_host: page.base_host.clone(),
            source_url: page.source_url.clone(),
            text,
            tier: page.tier,
            timestamp: page.timestamp,
            checksum: page.checksum(),
        }
    }
}

/// Directed host-to-host edge. Never a self-loop.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkEdge {
    /// Linking host.
    pub source: String,
    /// Linked host.
    pub destination: String,
}

/// Roster name confirmed on a host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolvedResearcher {
    /// Name exactly as spelled in the roster.
    pub name: String,
    /// Host the name was found on.
    pub host: String,
}

/// Everything one site contributes to the output stores in a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteAggregate {
    /// Base host of the site.
    pub host: String,
    /// Lowest crawl tier among successfully normalized pages.
    pub tier: Option<u8>,
    /// Cleaned pages in processing order.
    pub cleaned_pages: Vec<CleanedPage>,
    /// Destination hosts linked from this site.
    pub destinations: BTreeSet<String>,
    /// Canonical roster names found on this site.
    pub researchers: BTreeSet<String>,
}

impl SiteAggregate {
    /// Empty aggregate for `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Outbound edges as records.
    pub fn edges(&self) -> impl Iterator<Item = LinkEdge> + '_ {
        self.destinations.iter().map(|destination| LinkEdge {
            source: self.host.clone(),
            destination: destination.clone(),
        })
    }

    /// Resolved researchers as records.
    pub fn resolved(&self) -> impl Iterator<Item = ResolvedResearcher> + '_ {
        self.researchers.iter().map(|name| ResolvedResearcher {
            name: name.clone(),
            host: self.host.clone(),
        })
    }

    pub(crate) fn note_tier(&mut self, tier: u8) {
        self.tier = Some(self.tier.map_or(tier, |current| current.min(tier)));
    }
}
