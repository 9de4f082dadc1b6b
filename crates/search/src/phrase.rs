use once_cell::sync::Lazy;
use regex::Regex;

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)""#).expect("valid quoted-phrase pattern"));

/// Exact phrases the user quoted in the query, lowercased
#[must_use]
pub fn quoted_phrases(query: &str) -> Vec<String> {
    QUOTED
        .captures_iter(query)
        .map(|caps| caps[1].to_lowercase())
        .filter(|p| !p.trim().is_empty())
        .collect()
}

/// Partition results into phrase-bearing and the rest, preserving the
/// relative score order inside each group.
///
/// This is a boost, not a filter: nothing is discarded. Callers must
/// over-fetch candidates before applying it, otherwise true phrase
/// matches ranked low by the base scorer are lost before they can be
/// promoted.
#[must_use]
pub fn partition_by_phrases<T>(
    results: Vec<T>,
    phrases: &[String],
    text_of: impl Fn(&T) -> String,
) -> Vec<T> {
    if phrases.is_empty() {
        return results;
    }

    let (with, without): (Vec<T>, Vec<T>) = results.into_iter().partition(|item| {
        let text = text_of(item).to_lowercase();
        phrases.iter().all(|phrase| text.contains(phrase.as_str()))
    });

    let mut ordered = with;
    ordered.extend(without);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_lowercased_phrases() {
        assert_eq!(
            quoted_phrases(r#"brew "Gong Fu" style "yixing pot""#),
            vec!["gong fu".to_string(), "yixing pot".to_string()]
        );
        assert!(quoted_phrases("no quotes here").is_empty());
        assert!(quoted_phrases(r#"empty "" quotes"#).is_empty());
    }

    #[test]
    fn partition_promotes_phrase_bearers_without_discarding() {
        let results = vec![
            ("A", "mentions gong fu brewing"),
            ("B", "unrelated content"),
            ("C", "another gong fu note"),
        ];
        let phrases = vec!["gong fu".to_string()];
        let ordered = partition_by_phrases(results, &phrases, |(_, text)| (*text).to_string());

        let ids: Vec<&str> = ordered.iter().map(|(id, _)| *id).collect();
        // A and C move ahead of B, keeping their own relative order; B survives.
        assert_eq!(ids, vec!["A", "C", "B"]);
    }

    #[test]
    fn all_phrases_must_match() {
        let results = vec![("A", "gong fu only"), ("B", "gong fu and yixing pot")];
        let phrases = vec!["gong fu".to_string(), "yixing pot".to_string()];
        let ordered = partition_by_phrases(results, &phrases, |(_, text)| (*text).to_string());
        assert_eq!(ordered[0].0, "B");
    }

    #[test]
    fn no_phrases_is_identity() {
        let results = vec![("A", "x"), ("B", "y")];
        let ordered = partition_by_phrases(results, &[], |(_, text)| (*text).to_string());
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].0, "A");
    }
}
