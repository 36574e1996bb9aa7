//! Known-researcher roster and fuzzy resolution of recognized names against it.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::ConfigurationError;

/// Default acceptance threshold on the 0..=100 similarity scale.
pub const DEFAULT_THRESHOLD: u8 = 85;

/// Ordered, immutable list of canonical researcher names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    names: Vec<String>,
}

impl Roster {
    /// Builds a roster from names, dropping blanks and trimming whitespace.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Self { names }
    }

    /// Loads a newline-delimited roster file. Invalid UTF-8 is fatal.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let bytes = fs::read(path).map_err(|source| ConfigurationError::RosterUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|err| {
            let valid = &err.as_bytes()[..err.utf8_error().valid_up_to()];
            ConfigurationError::RosterEncoding {
                path: path.to_path_buf(),
                line: valid.iter().filter(|&&byte| byte == b'\n').count() + 1,
            }
        })?;
        Ok(Self::new(text.trim_start_matches('\u{feff}').lines()))
    }

    /// Names in file order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the roster has no names.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Best roster entry for a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterMatch<'r> {
    /// Canonical roster spelling.
    pub name: &'r str,
    /// Similarity score, 0..=100.
    pub score: u8,
}

/// Resolver tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Minimum accepted score (inclusive).
    pub threshold: u8,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Maps recognized person names onto canonical roster names.
#[derive(Debug, Clone)]
pub struct RosterResolver {
    roster: Arc<Roster>,
    /// Roster names folded once, index-aligned with `roster.names()`.
    processed: Arc<[Processed]>,
    config: ResolverConfig,
}

impl RosterResolver {
    /// Builds a resolver over a shared roster.
    pub fn new(roster: Arc<Roster>, config: ResolverConfig) -> Self {
        let processed = roster.names().iter().map(|name| Processed::new(name)).collect();
        Self {
            roster,
            processed,
            config,
        }
    }

    /// Shared roster.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Acceptance threshold.
    pub fn threshold(&self) -> u8 {
        self.config.threshold
    }

    /// Highest-scoring roster entry for `candidate`; ties go to the earliest entry.
    pub fn best_match(&self, candidate: &str) -> Option<RosterMatch<'_>> {
        let candidate = Processed::new(candidate);
        let mut best: Option<RosterMatch<'_>> = None;
        for (name, entry) in self.roster.names().iter().zip(self.processed.iter()) {
            let score = candidate.similarity(entry);
            if best.as_ref().map_or(true, |current| score > current.score) {
                best = Some(RosterMatch {
                    name: name.as_str(),
                    score,
                });
            }
        }
        best
    }

    /// Accepted canonical name for `candidate`, if its best score meets the threshold.
    pub fn resolve_one(&self, candidate: &str) -> Option<&str> {
        self.best_match(candidate)
            .filter(|found| found.score >= self.config.threshold)
            .map(|found| found.name)
    }

    /// Resolves every candidate, deduplicating by canonical name.
    pub fn resolve<I, S>(&self, candidates: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        candidates
            .into_iter()
            .filter_map(|candidate| self.resolve_one(candidate.as_ref()).map(str::to_string))
            .collect()
    }
}

/// Similarity of two names on a 0..=100 scale.
///
/// Both sides are lowercased with punctuation folded to spaces; the score is the
/// better of the plain and token-sorted Levenshtein ratios.
pub fn similarity(a: &str, b: &str) -> u8 {
    Processed::new(a).similarity(&Processed::new(b))
}

#[derive(Debug, Clone)]
struct Processed {
    plain: String,
    sorted: String,
}

impl Processed {
    fn new(raw: &str) -> Self {
        let folded: String = raw
            .chars()
            .map(|ch| {
                if ch.is_alphanumeric() {
                    ch.to_lowercase().next().unwrap_or(ch)
                } else {
                    ' '
                }
            })
            .collect();
        let mut tokens: Vec<&str> = folded.split_whitespace().collect();
        let plain = tokens.join(" ");
        tokens.sort_unstable();
        let sorted = tokens.join(" ");
        Self { plain, sorted }
    }

    fn similarity(&self, other: &Self) -> u8 {
        if self.plain.is_empty() || other.plain.is_empty() {
            return 0;
        }
        ratio(&self.plain, &other.plain).max(ratio(&self.sorted, &other.sorted))
    }
}

/// `round(100 * (1 - distance / longest))`, rounding halves up, in integers.
fn ratio(a: &str, b: &str) -> u8 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 100;
    }
    let distance = strsim::levenshtein(a, b).min(longest);
    let score = ((longest - distance) * 200 + longest) / (2 * longest);
    score.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn resolver(names: &[&str]) -> RosterResolver {
        RosterResolver::new(Arc::new(Roster::new(names)), ResolverConfig::default())
    }

    #[test]
    fn exact_names_score_full_marks() {
        assert_eq!(similarity("Jane Smith", "Jane Smith"), 100);
        assert_eq!(similarity("jane  SMITH", "Jane Smith"), 100);
        assert_eq!(similarity("Smith, Jane", "Jane Smith"), 100);
    }

    #[test]
    fn empty_input_scores_zero() {
        assert_eq!(similarity("", "Jane Smith"), 0);
        assert_eq!(similarity("...", "Jane Smith"), 0);
    }

    #[test]
    fn accepts_score_of_exactly_eighty_five() {
        // 20 characters, three substitutions.
        assert_eq!(similarity("Maximilian Fearbonks", "Maximilian Fairbanks"), 85);
        let resolver = resolver(&["Maximilian Fairbanks"]);
        assert_eq!(
            resolver.resolve_one("Maximilian Fearbonks"),
            Some("Maximilian Fairbanks")
        );
    }

    #[test]
    fn rejects_score_of_eighty_four() {
        // 25 characters, four substitutions.
        assert_eq!(
            similarity("Alexandria Mantgamary-Roy", "Alexandria Montgomery-Ray"),
            84
        );
        let resolver = resolver(&["Alexandria Montgomery-Ray"]);
        assert_eq!(resolver.resolve_one("Alexandria Mantgamary-Roy"), None);
    }

    #[test]
    fn canonicalizes_and_deduplicates() {
        let resolver = resolver(&["Jane Smith", "Ravi Patel"]);
        let found = resolver.resolve(["jane smith", "Jane Smith", "Ravi Patel", "Nobody Known"]);
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["Jane Smith".to_string(), "Ravi Patel".to_string()]
        );
    }

    #[test]
    fn ties_go_to_first_roster_entry() {
        let resolver = resolver(&["Jane Smith", "Smith Jane"]);
        let found = resolver.best_match("Jane Smith").unwrap();
        assert_eq!(found.name, "Jane Smith");
        let found = resolver.best_match("Smith, Jane").unwrap();
        assert_eq!((found.name, found.score), ("Jane Smith", 100));
    }

    #[test]
    fn best_match_scores_agree_with_similarity() {
        let names = ["Jane Smith", "Ravi Patel", "María González", "Smith, J."];
        let matcher = resolver(&names);
        for candidate in ["jane smith", "Maria Gonzalez", "R. Patel", "Nobody Known"] {
            let expected = names
                .iter()
                .map(|name| similarity(candidate, name))
                .max()
                .unwrap();
            let found = matcher.best_match(candidate).unwrap();
            assert_eq!(found.score, expected, "{candidate}");
            assert_eq!(similarity(candidate, found.name), expected, "{candidate}");
        }
        assert!(resolver(&[]).best_match("Jane Smith").is_none());
    }

    #[test]
    fn loads_roster_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Jane Smith\n\n  Ravi Patel  \nJosé Núñez").unwrap();
        let roster = Roster::load(file.path()).unwrap();
        assert_eq!(roster.names(), ["Jane Smith", "Ravi Patel", "José Núñez"]);
    }

    #[test]
    fn invalid_utf8_roster_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"Jane Smith\nBad \xff Name\n").unwrap();
        match Roster::load(file.path()) {
            Err(ConfigurationError::RosterEncoding { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected encoding error, got {other:?}"),
        }
    }

    #[test]
    fn missing_roster_is_fatal() {
        let result = Roster::load(Path::new("/nonexistent/researchers.csv"));
        assert!(matches!(
            result,
            Err(ConfigurationError::RosterUnreadable { .. })
        ));
    }
}
