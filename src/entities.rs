//! Person-name recognition over cleaned text.
//!
//! The recognizer is a three-stage chain: [`Tokenizer`] splits sentences and
//! tokens, [`PosTagger`] assigns a part of speech to every token, and
//! [`EntityChunker`] groups tagged tokens into [`Chunk`]s. Each stage is a trait
//! so a statistical backend can replace the rule-based defaults shipped here.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

use crate::error::RecognitionError;

const HONORIFICS: &[&str] = &[
    "Dr", "Dr.", "Prof", "Prof.", "Professor", "Mr", "Mr.", "Mrs", "Mrs.", "Ms", "Ms.", "Mx.",
    "Sir", "Dame", "Rev.", "Fr.",
];

const ABBREVIATIONS: &[&str] = &[
    "dr.", "prof.", "mr.", "mrs.", "ms.", "mx.", "st.", "jr.", "sr.", "rev.", "fr.", "e.g.",
    "i.e.", "etc.", "vs.", "inc.", "ltd.", "co.", "corp.", "univ.", "dept.", "no.", "fig.",
    "al.", "ph.d.", "u.s.",
];

const ORG_KEYWORDS: &[&str] = &[
    "Academy", "Agency", "Association", "Center", "Centre", "College", "Company", "Corp",
    "Corp.", "Corporation", "Council", "Department", "Foundation", "Group", "Hospital", "Inc",
    "Inc.", "Institute", "Journal", "Lab", "Laboratory", "Library", "Ltd.", "Museum", "Press",
    "School", "Society", "University",
];

const PLACE_KEYWORDS: &[&str] = &[
    "Avenue", "City", "County", "Lake", "Mount", "Mountain", "Province", "River", "State",
    "Street",
];

const CALENDAR_WORDS: &[&str] = &[
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday", "January",
    "February", "March", "April", "June", "July", "August", "September", "October",
    "November", "December",
];

const NAME_PARTICLES: &[&str] = &["van", "von", "de", "da", "del", "der", "di", "la", "le"];

const LOCATIVE_PREPOSITIONS: &[&str] = &["in", "at", "from", "near", "across", "throughout"];

const DETERMINERS: &[&str] = &[
    "a", "an", "the", "this", "that", "these", "those", "each", "every", "some", "any", "no",
    "all", "both",
];

const PREPOSITIONS: &[&str] = &[
    "about", "above", "across", "after", "against", "along", "among", "around", "at", "before",
    "behind", "below", "between", "by", "during", "for", "from", "in", "inside", "into", "near",
    "of", "off", "on", "onto", "over", "per", "since", "through", "throughout", "to", "toward",
    "under", "until", "upon", "via", "with", "within", "without",
];

const PRONOUNS: &[&str] = &[
    "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them", "my", "your",
    "his", "its", "our", "their", "who", "whom", "whose", "which", "what",
];

const CONJUNCTIONS: &[&str] = &["and", "or", "but", "nor", "yet", "so", "if", "because", "while"];

const AUXILIARIES: &[&str] = &[
    "is", "are", "was", "were", "be", "been", "being", "am", "has", "have", "had", "do", "does",
    "did", "will", "would", "can", "could", "shall", "should", "may", "might", "must",
];

const ADVERBS: &[&str] = &[
    "also", "not", "very", "too", "just", "now", "then", "here", "there", "often", "always",
    "never", "still", "again", "more", "most",
];

/// Coarse part-of-speech tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PosTag {
    /// Proper noun (NNP).
    ProperNoun,
    /// Common noun (NN).
    Noun,
    /// Verb or auxiliary (VB*, MD).
    Verb,
    /// Adjective (JJ).
    Adjective,
    /// Adverb (RB).
    Adverb,
    /// Determiner (DT).
    Determiner,
    /// Preposition (IN).
    Preposition,
    /// Pronoun (PRP, WP).
    Pronoun,
    /// Conjunction (CC).
    Conjunction,
    /// Cardinal number (CD).
    Number,
    /// Possessive marker (POS).
    Possessive,
    /// URL or e-mail address.
    Address,
    /// Punctuation.
    Punctuation,
}

/// Named-entity category assigned by a chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntityLabel {
    /// A person's name.
    Person,
    /// Company, university, agency.
    Organization,
    /// Geo-political entity.
    Gpe,
    /// Other location.
    Location,
}

impl fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Person => "PERSON",
            Self::Organization => "ORGANIZATION",
            Self::Gpe => "GPE",
            Self::Location => "LOCATION",
        };
        f.write_str(label)
    }
}

/// Token with its part-of-speech tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedToken {
    /// Surface text.
    pub text: String,
    /// Assigned tag.
    pub tag: PosTag,
}

impl TaggedToken {
    /// Pairs `text` with `tag`.
    pub fn new(text: impl Into<String>, tag: PosTag) -> Self {
        Self {
            text: text.into(),
            tag,
        }
    }
}

/// Chunker output: either a plain word or a labelled entity span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Chunk {
    /// Token outside any entity.
    Word(TaggedToken),
    /// Contiguous entity span.
    Entity {
        /// Entity category.
        label: EntityLabel,
        /// Tokens in the span.
        tokens: Vec<TaggedToken>,
    },
}

impl Chunk {
    /// Tokens re-joined with single spaces, original casing preserved.
    pub fn surface(&self) -> String {
        match self {
            Self::Word(token) => token.text.clone(),
            Self::Entity { tokens, .. } => tokens
                .iter()
                .map(|token| token.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Whether this is an entity labelled exactly PERSON.
    pub fn is_person(&self) -> bool {
        matches!(
            self,
            Self::Entity {
                label: EntityLabel::Person,
                ..
            }
        )
    }
}

/// Sentence and token splitting.
pub trait Tokenizer {
    /// Splits text into sentences.
    fn sentences(&self, text: &str) -> Vec<String>;
    /// Splits one sentence into tokens.
    fn tokens(&self, sentence: &str) -> Vec<String>;
}

/// Part-of-speech tagging; must return exactly one tag per token.
pub trait PosTagger {
    /// Tags a tokenized sentence.
    fn tag(&self, tokens: &[String]) -> Result<Vec<PosTag>, RecognitionError>;
}

/// Groups a tagged sentence into words and entity spans.
pub trait EntityChunker {
    /// Chunks one tagged sentence.
    fn chunk(&self, tagged: Vec<TaggedToken>) -> Vec<Chunk>;
}

/// Abbreviation-aware, Treebank-flavoured splitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleTokenizer;

impl Tokenizer for RuleTokenizer {
    fn sentences(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut sentences = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for (idx, word) in words.iter().enumerate() {
            current.push(word);
            let next_starts_upper = words
                .get(idx + 1)
                .and_then(|next| next.trim_start_matches(is_opening).chars().next())
                .map_or(true, |ch| ch.is_uppercase() || ch.is_numeric());
            if ends_sentence(word) && next_starts_upper {
                sentences.push(current.join(" "));
                current.clear();
            }
        }
        if !current.is_empty() {
            sentences.push(current.join(" "));
        }
        sentences
    }

    fn tokens(&self, sentence: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for word in sentence.split_whitespace() {
            split_word(word, &mut tokens);
        }
        tokens
    }
}

/// Closed-class lexicon plus capitalization and suffix heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconTagger;

impl PosTagger for LexiconTagger {
    fn tag(&self, tokens: &[String]) -> Result<Vec<PosTag>, RecognitionError> {
        let first_word = tokens
            .iter()
            .position(|token| token.chars().any(char::is_alphanumeric));
        let tags = tokens
            .iter()
            .enumerate()
            .map(|(idx, token)| {
                let next = tokens.get(idx + 1).map(String::as_str);
                tag_token(token, Some(idx) == first_word, next)
            })
            .collect();
        Ok(tags)
    }
}

/// Labels runs of proper nouns by honorifics, keywords and context.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapitalizationChunker;

impl EntityChunker for CapitalizationChunker {
    fn chunk(&self, tagged: Vec<TaggedToken>) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut idx = 0;
        while idx < tagged.len() {
            if !starts_run(&tagged[idx]) {
                chunks.push(Chunk::Word(tagged[idx].clone()));
                idx += 1;
                continue;
            }

            let end = run_end(&tagged, idx);
            let preceding = idx
                .checked_sub(1)
                .map(|prev| tagged[prev].text.to_lowercase());
            label_run(&tagged[idx..end], preceding.as_deref(), &mut chunks);
            idx = end;
        }
        chunks
    }
}

/// Tokenize, tag and chunk pipeline over cleaned text.
#[derive(Debug, Clone, Default)]
pub struct EntityRecognizer<T = RuleTokenizer, P = LexiconTagger, C = CapitalizationChunker> {
    tokenizer: T,
    tagger: P,
    chunker: C,
}

impl EntityRecognizer {
    /// Recognizer with the rule-based backends.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T, P, C> EntityRecognizer<T, P, C>
where
    T: Tokenizer,
    P: PosTagger,
    C: EntityChunker,
{
    /// Recognizer over custom backends.
    pub fn with_backends(tokenizer: T, tagger: P, chunker: C) -> Self {
        Self {
            tokenizer,
            tagger,
            chunker,
        }
    }

    /// Chunks a single sentence.
    pub fn chunk_sentence(&self, sentence: &str) -> Result<Vec<Chunk>, RecognitionError> {
        if let Some(bad) = sentence
            .chars()
            .find(|ch| ch.is_control() && !ch.is_whitespace())
        {
            return Err(RecognitionError::MalformedInput(format!(
                "control character U+{:04X}",
                bad as u32
            )));
        }
        let tokens = self.tokenizer.tokens(sentence);
        let tags = self.tagger.tag(&tokens)?;
        if tags.len() != tokens.len() {
            return Err(RecognitionError::TagCountMismatch {
                tokens: tokens.len(),
                tags: tags.len(),
            });
        }
        let tagged = tokens
            .into_iter()
            .zip(tags)
            .map(|(text, tag)| TaggedToken { text, tag })
            .collect();
        Ok(self.chunker.chunk(tagged))
    }

    /// Lazily yields the surface form of every PERSON chunk in `text`.
    ///
    /// Sentences are tagged one at a time as the iterator advances. After the
    /// first error the iterator is exhausted.
    pub fn extract_person_spans<'a>(&'a self, text: &str) -> PersonSpans<'a, T, P, C> {
        PersonSpans {
            recognizer: self,
            sentences: self.tokenizer.sentences(text).into(),
            pending: VecDeque::new(),
            failed: false,
        }
    }

    /// Drops every entity chunk and re-joins the remaining tokens with spaces.
    pub fn strip_named_entities(&self, text: &str) -> Result<String, RecognitionError> {
        let mut words = Vec::new();
        for sentence in self.tokenizer.sentences(text) {
            for chunk in self.chunk_sentence(&sentence)? {
                if let Chunk::Word(token) = chunk {
                    words.push(token.text);
                }
            }
        }
        Ok(words.join(" "))
    }
}

/// Iterator returned by [`EntityRecognizer::extract_person_spans`].
pub struct PersonSpans<'a, T, P, C> {
    recognizer: &'a EntityRecognizer<T, P, C>,
    sentences: VecDeque<String>,
    pending: VecDeque<String>,
    failed: bool,
}

impl<T, P, C> Iterator for PersonSpans<'_, T, P, C>
where
    T: Tokenizer,
    P: PosTagger,
    C: EntityChunker,
{
    type Item = Result<String, RecognitionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.failed {
                return None;
            }
            if let Some(span) = self.pending.pop_front() {
                return Some(Ok(span));
            }
            let sentence = self.sentences.pop_front()?;
            match self.recognizer.chunk_sentence(&sentence) {
                Ok(chunks) => self.pending.extend(
                    chunks
                        .iter()
                        .filter(|chunk| chunk.is_person())
                        .map(Chunk::surface),
                ),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

fn is_opening(ch: char) -> bool {
    matches!(ch, '"' | '\'' | '(' | '[' | '“' | '‘')
}

fn is_closing(ch: char) -> bool {
    matches!(ch, '"' | '\'' | ')' | ']' | '”' | '’')
}

fn is_abbreviation(word: &str) -> bool {
    let lower = word.to_lowercase();
    if ABBREVIATIONS.contains(&lower.as_str()) {
        return true;
    }
    // Initials such as "J." or "A.B."
    let mut chars = word.chars();
    matches!((chars.next(), chars.next(), chars.next()), (Some(c), Some('.'), None) if c.is_alphabetic())
        || (word.len() > 2
            && word.ends_with('.')
            && word
                .split('.')
                .filter(|part| !part.is_empty())
                .all(|part| part.chars().count() == 1))
}

fn is_address(word: &str) -> bool {
    word.contains("://") || word.starts_with("www.") || (word.contains('@') && word.contains('.'))
}

fn ends_sentence(word: &str) -> bool {
    let core = word.trim_end_matches(is_closing);
    if !core.ends_with(['.', '!', '?']) {
        return false;
    }
    !(core.ends_with('.') && is_abbreviation(core.trim_start_matches(is_opening)))
}

fn split_word(word: &str, out: &mut Vec<String>) {
    let mut rest = word;
    while let Some(ch) = rest.chars().next().filter(|ch| is_opening(*ch)) {
        out.push(ch.to_string());
        rest = &rest[ch.len_utf8()..];
    }

    let mut trailing = Vec::new();
    loop {
        if rest.is_empty() || is_abbreviation(rest) {
            break;
        }
        if let Some(stripped) = rest.strip_suffix("'s").or_else(|| rest.strip_suffix("’s")) {
            if !stripped.is_empty() && !is_address(rest) {
                trailing.push(rest[stripped.len()..].to_string());
                rest = stripped;
                continue;
            }
        }
        match rest.chars().last() {
            Some(ch) if matches!(ch, '.' | ',' | ';' | ':' | '!' | '?') || is_closing(ch) => {
                trailing.push(ch.to_string());
                rest = &rest[..rest.len() - ch.len_utf8()];
            }
            _ => break,
        }
    }

    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out.extend(trailing.into_iter().rev());
}

fn is_capitalized(token: &str) -> bool {
    token.chars().next().is_some_and(char::is_uppercase)
}

fn tag_token(token: &str, sentence_initial: bool, next: Option<&str>) -> PosTag {
    if !token.chars().any(char::is_alphanumeric) {
        return PosTag::Punctuation;
    }
    if is_address(token) {
        return PosTag::Address;
    }
    if token == "'s" || token == "’s" {
        return PosTag::Possessive;
    }
    if token
        .chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | ',' | '-' | '%'))
    {
        return PosTag::Number;
    }
    if HONORIFICS.contains(&token) {
        return PosTag::ProperNoun;
    }

    let lower = token.to_lowercase();
    if is_capitalized(token) {
        if !sentence_initial {
            return PosTag::ProperNoun;
        }
        if let Some(tag) = closed_class(&lower) {
            return tag;
        }
        if next.is_some_and(is_capitalized) {
            return PosTag::ProperNoun;
        }
        return open_class(&lower);
    }
    closed_class(&lower).unwrap_or_else(|| open_class(&lower))
}

fn closed_class(lower: &str) -> Option<PosTag> {
    if DETERMINERS.contains(&lower) {
        Some(PosTag::Determiner)
    } else if PREPOSITIONS.contains(&lower) {
        Some(PosTag::Preposition)
    } else if PRONOUNS.contains(&lower) {
        Some(PosTag::Pronoun)
    } else if CONJUNCTIONS.contains(&lower) {
        Some(PosTag::Conjunction)
    } else if AUXILIARIES.contains(&lower) {
        Some(PosTag::Verb)
    } else if ADVERBS.contains(&lower) {
        Some(PosTag::Adverb)
    } else {
        None
    }
}

fn open_class(lower: &str) -> PosTag {
    if lower.ends_with("ly") {
        PosTag::Adverb
    } else if lower.ends_with("ed") || lower.ends_with("ing") {
        PosTag::Verb
    } else if ["ous", "ful", "ive", "able", "ible", "ic", "al"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        PosTag::Adjective
    } else {
        PosTag::Noun
    }
}

fn starts_run(token: &TaggedToken) -> bool {
    token.tag == PosTag::ProperNoun && !CALENDAR_WORDS.contains(&token.text.as_str())
}

/// End (exclusive) of the proper-noun run starting at `start`.
fn run_end(tagged: &[TaggedToken], start: usize) -> usize {
    let mut end = start + 1;
    while end < tagged.len() {
        if starts_run(&tagged[end]) {
            end += 1;
            continue;
        }
        // "Ludwig van Beethoven", "University of Michigan"
        let joins = NAME_PARTICLES.contains(&tagged[end].text.as_str())
            || (tagged[end].text == "of"
                && tagged[start..end]
                    .iter()
                    .any(|token| ORG_KEYWORDS.contains(&token.text.as_str())));
        if joins && tagged.get(end + 1).is_some_and(starts_run) {
            end += 2;
            continue;
        }
        break;
    }
    end
}

fn label_run(run: &[TaggedToken], preceding: Option<&str>, chunks: &mut Vec<Chunk>) {
    let honorifics = run
        .iter()
        .take_while(|token| HONORIFICS.contains(&token.text.as_str()))
        .count();
    chunks.extend(run[..honorifics].iter().cloned().map(Chunk::Word));
    let name = &run[honorifics..];
    if name.is_empty() {
        return;
    }

    let has = |keywords: &[&str]| {
        name.iter()
            .any(|token| keywords.contains(&token.text.as_str()))
    };
    let label = if has(ORG_KEYWORDS) {
        EntityLabel::Organization
    } else if honorifics > 0 {
        EntityLabel::Person
    } else if name
        .iter()
        .all(|token| token.text.chars().count() > 1 && !token.text.chars().any(char::is_lowercase))
    {
        EntityLabel::Organization
    } else if has(PLACE_KEYWORDS) {
        EntityLabel::Location
    } else if preceding.is_some_and(|word| LOCATIVE_PREPOSITIONS.contains(&word)) {
        EntityLabel::Gpe
    } else if (2..=4).contains(&name.len()) {
        EntityLabel::Person
    } else {
        EntityLabel::Gpe
    };

    chunks.push(Chunk::Entity {
        label,
        tokens: name.to_vec(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persons(text: &str) -> Vec<String> {
        EntityRecognizer::new()
            .extract_person_spans(text)
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn splits_sentences_around_abbreviations() {
        let sentences = RuleTokenizer.sentences(
            "Dr. Jane Smith published a new paper. Visit http://external.org for details.",
        );
        assert_eq!(
            sentences,
            vec![
                "Dr. Jane Smith published a new paper.",
                "Visit http://external.org for details.",
            ]
        );
    }

    #[test]
    fn tokenizes_punctuation_urls_and_possessives() {
        let tokens = RuleTokenizer.tokens("(See Smith's lab at http://lab.example.org.)");
        assert_eq!(
            tokens,
            vec![
                "(", "See", "Smith", "'s", "lab", "at", "http://lab.example.org", ".", ")"
            ]
        );
    }

    #[test]
    fn honorific_marks_person_and_is_excluded_from_span() {
        assert_eq!(
            persons("Dr. Jane Smith published a new paper. Visit http://external.org for details."),
            vec!["Jane Smith"]
        );
    }

    #[test]
    fn sentence_initial_names_are_recognized() {
        assert_eq!(
            persons("Maria Garcia and John Q. Public presented the results."),
            vec!["Maria Garcia", "John Q. Public"]
        );
    }

    #[test]
    fn organizations_and_places_are_not_persons() {
        let chunks = EntityRecognizer::new()
            .chunk_sentence("She moved from Boston to the University of Michigan and joined NASA.")
            .unwrap();
        let entities: Vec<_> = chunks
            .iter()
            .filter_map(|chunk| match chunk {
                Chunk::Entity { label, .. } => Some((*label, chunk.surface())),
                Chunk::Word(_) => None,
            })
            .collect();
        assert_eq!(
            entities,
            vec![
                (EntityLabel::Gpe, "Boston".to_string()),
                (EntityLabel::Organization, "University of Michigan".to_string()),
                (EntityLabel::Organization, "NASA".to_string()),
            ]
        );
    }

    #[test]
    fn particles_stay_inside_names() {
        assert_eq!(
            persons("The talk was given by Ludwig van Beethoven on Monday."),
            vec!["Ludwig van Beethoven"]
        );
    }

    #[test]
    fn strips_all_entities() {
        let stripped = EntityRecognizer::new()
            .strip_named_entities("Researchers in Seattle met Maria Garcia today.")
            .unwrap();
        assert_eq!(stripped, "Researchers in met today .");
    }

    #[test]
    fn control_characters_fail_recognition() {
        let recognizer = EntityRecognizer::new();
        let mut spans = recognizer.extract_person_spans("Jane Smith\u{7} wrote.");
        assert!(matches!(
            spans.next(),
            Some(Err(RecognitionError::MalformedInput(_)))
        ));
        assert!(spans.next().is_none());
    }

    struct ShortTagger;

    impl PosTagger for ShortTagger {
        fn tag(&self, tokens: &[String]) -> Result<Vec<PosTag>, RecognitionError> {
            Ok(vec![PosTag::Noun; tokens.len().saturating_sub(1)])
        }
    }

    #[test]
    fn tag_count_mismatch_is_reported() {
        let recognizer =
            EntityRecognizer::with_backends(RuleTokenizer, ShortTagger, CapitalizationChunker);
        assert_eq!(
            recognizer.chunk_sentence("Two words"),
            Err(RecognitionError::TagCountMismatch { tokens: 2, tags: 1 })
        );
    }
}
