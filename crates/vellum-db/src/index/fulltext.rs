use std::collections::{BTreeMap, BTreeSet, HashMap};

use vellum_query::Value;

use crate::payload::RowId;

const EXACT_WEIGHT: f64 = 1.0;
const PREFIX_WEIGHT: f64 = 0.8;
const SUBSTRING_WEIGHT: f64 = 0.6;

/// Substring/prefix full-text index.
///
/// Documents tokenize into lowercased alphanumeric words kept in a sorted
/// vocabulary. A lookup walks the vocabulary, scores every token against
/// the query term and keeps each row's best score. Exact token hits score
/// highest, then prefix, then substring, each scaled by how much of the
/// token the term covers.
#[derive(Debug, Default)]
pub(crate) struct FulltextIndex {
    vocabulary: BTreeMap<String, BTreeSet<RowId>>,
    row_tokens: HashMap<RowId, Vec<String>>,
    present: BTreeSet<RowId>,
}

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

impl FulltextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row_id: RowId, keys: &[Value]) {
        let mut tokens = Vec::new();
        for key in keys {
            if let Value::String(text) = key {
                tokens.extend(tokenize(text));
            }
        }
        for token in &tokens {
            self.vocabulary
                .entry(token.clone())
                .or_default()
                .insert(row_id);
        }
        if !tokens.is_empty() {
            self.present.insert(row_id);
            self.row_tokens.insert(row_id, tokens);
        }
    }

    pub fn erase(&mut self, row_id: RowId) {
        if let Some(tokens) = self.row_tokens.remove(&row_id) {
            for token in tokens {
                if let Some(posting) = self.vocabulary.get_mut(&token) {
                    posting.remove(&row_id);
                    if posting.is_empty() {
                        self.vocabulary.remove(&token);
                    }
                }
            }
        }
        self.present.remove(&row_id);
    }

    /// Match `term` against the vocabulary; per row the best score wins.
    pub fn lookup(&self, term: &str) -> HashMap<RowId, f64> {
        let mut scores: HashMap<RowId, f64> = HashMap::new();
        for needle in tokenize(term) {
            for (token, posting) in &self.vocabulary {
                let score = score_token(token, &needle);
                if score <= 0.0 {
                    continue;
                }
                for &row_id in posting {
                    let best = scores.entry(row_id).or_insert(0.0);
                    if score > *best {
                        *best = score;
                    }
                }
            }
        }
        scores
    }

    pub fn cardinality(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn present(&self) -> &BTreeSet<RowId> {
        &self.present
    }
}

/// Residual-filter view of the same matching rules as [`FulltextIndex::lookup`]:
/// true when any token of `text` scores against any token of `term`.
pub(crate) fn matches_text(text: &str, term: &str) -> bool {
    let tokens = tokenize(text);
    tokenize(term)
        .iter()
        .any(|needle| tokens.iter().any(|token| score_token(token, needle) > 0.0))
}

fn score_token(token: &str, needle: &str) -> f64 {
    if token == needle {
        return EXACT_WEIGHT;
    }
    let coverage = needle.len() as f64 / token.len() as f64;
    if token.starts_with(needle) {
        PREFIX_WEIGHT * coverage
    } else if token.contains(needle) {
        SUBSTRING_WEIGHT * coverage
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(idx: &mut FulltextIndex, row: RowId, text: &str) {
        idx.insert(row, &[Value::String(text.to_string())]);
    }

    #[test]
    fn exact_beats_prefix_beats_substring() {
        let mut idx = FulltextIndex::new();
        doc(&mut idx, 1, "rust");
        doc(&mut idx, 2, "rustic");
        doc(&mut idx, 3, "trusty");

        let scores = idx.lookup("rust");
        assert_eq!(scores.len(), 3);
        assert!(scores[&1] > scores[&2]);
        assert!(scores[&2] > scores[&3]);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut idx = FulltextIndex::new();
        doc(&mut idx, 1, "Hello World");
        assert!(idx.lookup("hello").contains_key(&1));
        assert!(idx.lookup("WORLD").contains_key(&1));
    }

    #[test]
    fn erase_removes_all_traces() {
        let mut idx = FulltextIndex::new();
        doc(&mut idx, 1, "alpha beta");
        idx.erase(1);
        assert!(idx.lookup("alpha").is_empty());
        assert_eq!(idx.cardinality(), 0);
        assert!(idx.present().is_empty());
    }

    #[test]
    fn no_match_scores_nothing() {
        let mut idx = FulltextIndex::new();
        doc(&mut idx, 1, "alpha");
        assert!(idx.lookup("omega").is_empty());
    }
}
