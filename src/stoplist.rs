//! English stop-word list used for block stop-word density.

/// Lowercase English function words and very common content words.
pub const ENGLISH: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "almost", "also", "although",
    "always", "am", "among", "an", "and", "another", "any", "are", "around", "as", "at", "back",
    "be", "became", "because", "become", "been", "before", "being", "below", "best", "better",
    "between", "both", "but", "by", "can", "could", "did", "do", "does", "doing", "done", "down",
    "during", "each", "either", "enough", "even", "ever", "every", "few", "first", "for", "from",
    "further", "get", "gets", "give", "given", "go", "going", "good", "got", "great", "had",
    "has", "have", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his",
    "how", "however", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "last",
    "least", "less", "like", "made", "make", "many", "may", "me", "might", "more", "most",
    "much", "must", "my", "myself", "never", "new", "next", "no", "nor", "not", "now", "of",
    "off", "often", "old", "on", "once", "one", "only", "or", "other", "others", "our", "ours",
    "ourselves", "out", "over", "own", "part", "per", "perhaps", "quite", "rather", "really",
    "right", "said", "same", "say", "says", "see", "seen", "several", "shall", "she", "should",
    "since", "so", "some", "still", "such", "take", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "thing", "things", "this", "those",
    "though", "three", "through", "thus", "to", "together", "too", "toward", "two", "under",
    "until", "up", "upon", "us", "use", "used", "using", "very", "via", "was", "way", "we",
    "well", "were", "what", "when", "where", "whether", "which", "while", "who", "whom",
    "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your",
    "yours", "yourself", "yourselves",
];

/// Whether `word` (already lowercased) is a stop word.
pub fn is_stop_word(word: &str) -> bool {
    ENGLISH.binary_search(&word).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_is_sorted_for_binary_search() {
        assert!(ENGLISH.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn recognizes_function_words() {
        assert!(is_stop_word("the"));
        assert!(is_stop_word("about"));
        assert!(!is_stop_word("researcher"));
    }
}
