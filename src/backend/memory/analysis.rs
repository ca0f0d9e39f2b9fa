//! Text analysis for the in-memory engine

use serde_json::Value as Json;

/// Standard-analyzer approximation: split on non-alphanumerics, lowercase
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Tokens of a scalar JSON value; numbers and booleans are single tokens
pub fn tokens_of(value: &Json) -> Vec<String> {
    match value {
        Json::String(s) => tokenize(s),
        Json::Number(n) => vec![n.to_string()],
        Json::Bool(b) => vec![b.to_string()],
        _ => Vec::new(),
    }
}

/// Levenshtein distance over chars
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    let mut matrix = vec![vec![0; b.len() + 1]; a.len() + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        matrix[0][j] = j;
    }

    for (i, c1) in a.iter().enumerate() {
        for (j, c2) in b.iter().enumerate() {
            let cost = if c1 == c2 { 0 } else { 1 };
            matrix[i + 1][j + 1] = (matrix[i][j + 1] + 1)
                .min(matrix[i + 1][j] + 1)
                .min(matrix[i][j] + cost);
        }
    }

    matrix[a.len()][b.len()]
}

/// Allowed edits for `term` under a `fuzziness` parameter.
///
/// A ratio below 1 is a minimum similarity: `floor(len * (1 - ratio))` edits.
/// Integers are edit counts and `AUTO` scales with term length. Capped at 2.
pub fn max_edits(fuzziness: Option<&Json>, term: &str) -> usize {
    let len = term.chars().count();
    let edits = match fuzziness {
        None | Some(Json::Null) => 0,
        Some(Json::Number(n)) => {
            let f = n.as_f64().unwrap_or(0.0);
            if f <= 0.0 {
                0
            } else if f < 1.0 {
                ((len as f64) * (1.0 - f)).floor() as usize
            } else {
                f as usize
            }
        }
        Some(Json::String(s)) if s.eq_ignore_ascii_case("auto") => match len {
            0..=2 => 0,
            3..=5 => 1,
            _ => 2,
        },
        Some(Json::String(s)) => s
            .parse::<f64>()
            .map(|f| max_edits(Some(&Json::from(f)), term))
            .unwrap_or(0),
        _ => 0,
    };
    edits.min(2)
}

/// True when `candidate` is within `edits` of `term`
pub fn fuzzy_eq(term: &str, candidate: &str, edits: usize) -> bool {
    if edits == 0 {
        return term == candidate;
    }
    let diff = term.chars().count().abs_diff(candidate.chars().count());
    diff <= edits && levenshtein_distance(term, candidate) <= edits
}

/// Term-suggester score: `1 - distance / len`
pub fn similarity(term: &str, candidate: &str) -> f64 {
    let len = term.chars().count().max(1);
    1.0 - levenshtein_distance(term, candidate) as f64 / len as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Hello, World-42"), vec!["hello", "world", "42"]);
        assert!(tokenize("  ").is_empty());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("smath", "smith"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_max_edits() {
        assert_eq!(max_edits(Some(&json!(0.5)), "foo"), 1);
        assert_eq!(max_edits(Some(&json!(0)), "foo"), 0);
        assert_eq!(max_edits(Some(&json!(0.5)), "elasticsearch"), 2);
        assert_eq!(max_edits(Some(&json!(1)), "foo"), 1);
        assert_eq!(max_edits(Some(&json!("AUTO")), "smith"), 1);
        assert_eq!(max_edits(None, "smith"), 0);
    }

    #[test]
    fn test_similarity_score() {
        assert!((similarity("smath", "smith") - 0.8).abs() < f64::EPSILON);
        assert!(fuzzy_eq("smath", "smith", 1));
        assert!(!fuzzy_eq("foo", "smith", 1));
    }
}
