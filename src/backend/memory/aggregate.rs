//! Aggregations and suggesters for the in-memory engine

use crate::backend::memory::analysis::{fuzzy_eq, levenshtein_distance, similarity, tokenize};
use crate::backend::memory::matcher::{compare, indexed_terms, values_at};
use crate::error::{EsError, Result};
use serde_json::{json, Map, Value as Json};
use std::cmp::Ordering;
use std::collections::BTreeMap;

type Properties = Map<String, Json>;

const DEFAULT_TERMS_SIZE: usize = 10;
const DEFAULT_SUGGEST_SIZE: usize = 5;

/// Evaluate an `aggs` object over the matched documents.
///
/// `global` aggregations run their sub-aggregations over `corpus` instead.
pub fn aggregate(
    aggs: &Map<String, Json>,
    matched: &[&Json],
    corpus: &[&Json],
    properties: Option<&Properties>,
) -> Result<Map<String, Json>> {
    let mut results = Map::new();

    for (name, spec) in aggs {
        let result = if spec.get("global").is_some() {
            let mut result = Map::new();
            result.insert("doc_count".to_string(), json!(corpus.len()));
            if let Some(Json::Object(sub)) = spec.get("aggs").or_else(|| spec.get("aggregations")) {
                result.extend(aggregate(sub, corpus, corpus, properties)?);
            }
            Json::Object(result)
        } else if let Some(terms) = spec.get("terms") {
            terms_aggregation(terms, matched, properties)?
        } else {
            return Err(EsError::Transport {
                status: 400,
                message: format!("SearchParseException: unsupported aggregation [{}]", name),
            });
        };
        results.insert(name.clone(), result);
    }

    Ok(results)
}

fn terms_aggregation(spec: &Json, docs: &[&Json], properties: Option<&Properties>) -> Result<Json> {
    let field = spec
        .get("field")
        .and_then(Json::as_str)
        .ok_or_else(|| EsError::Transport {
            status: 400,
            message: "terms aggregation requires a field".to_string(),
        })?;
    let size = spec
        .get("size")
        .and_then(Json::as_u64)
        .map(|s| s as usize)
        .unwrap_or(DEFAULT_TERMS_SIZE);

    // key repr -> (key, doc_count)
    let mut counts: BTreeMap<String, (Json, usize)> = BTreeMap::new();
    for doc in docs {
        let mut seen = Vec::new();
        for term in indexed_terms(properties, doc, field) {
            let repr = term.to_string();
            if seen.contains(&repr) {
                continue;
            }
            counts.entry(repr.clone()).or_insert((term, 0)).1 += 1;
            seen.push(repr);
        }
    }

    let mut buckets: Vec<(Json, usize)> = counts.into_values().collect();
    buckets.sort_by(|(ka, ca), (kb, cb)| {
        cb.cmp(ca)
            .then_with(|| compare(ka, kb).unwrap_or(Ordering::Equal))
    });

    let other: usize = buckets.iter().skip(size).map(|(_, c)| c).sum();
    let buckets: Vec<Json> = buckets
        .into_iter()
        .take(size)
        .map(|(key, doc_count)| json!({"key": key, "doc_count": doc_count}))
        .collect();

    Ok(json!({
        "doc_count_error_upper_bound": 0,
        "sum_other_doc_count": other,
        "buckets": buckets,
    }))
}

/// Term suggester: per token of `text`, close terms of `field` missing from the text
pub fn term_suggest(spec: &Json, corpus: &[&Json], properties: Option<&Properties>) -> Result<Json> {
    let text = spec.get("text").and_then(Json::as_str).unwrap_or_default();
    let term = spec.get("term").ok_or_else(|| EsError::Transport {
        status: 400,
        message: "only term suggestions are supported in a search body".to_string(),
    })?;
    let field = term.get("field").and_then(Json::as_str).unwrap_or("_all");
    let size = term
        .get("size")
        .and_then(Json::as_u64)
        .map(|s| s as usize)
        .unwrap_or(DEFAULT_SUGGEST_SIZE);

    // term -> doc freq
    let mut dictionary: BTreeMap<String, usize> = BTreeMap::new();
    for doc in corpus {
        let mut seen = Vec::new();
        for stored in indexed_terms(properties, doc, field) {
            if let Json::String(s) = stored {
                if !seen.contains(&s) {
                    *dictionary.entry(s.clone()).or_default() += 1;
                    seen.push(s);
                }
            }
        }
    }

    let lowered = text.to_lowercase();
    let mut entries = Vec::new();
    let mut offset = 0;
    for token in tokenize(text) {
        let start = lowered[offset..]
            .find(&token)
            .map(|i| i + offset)
            .unwrap_or(offset);
        offset = start + token.len();

        let mut options: Vec<(String, f64, usize)> = if dictionary.contains_key(&token) {
            Vec::new()
        } else {
            dictionary
                .iter()
                .filter(|(candidate, _)| fuzzy_eq(&token, candidate, 2))
                .map(|(candidate, freq)| (candidate.clone(), similarity(&token, candidate), *freq))
                .collect()
        };
        options.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| a.0.cmp(&b.0))
        });
        options.truncate(size);

        entries.push(json!({
            "text": token,
            "offset": start,
            "length": token.chars().count(),
            "options": options
                .into_iter()
                .map(|(text, score, freq)| json!({"text": text, "score": score, "freq": freq}))
                .collect::<Vec<_>>(),
        }));
    }

    Ok(Json::Array(entries))
}

/// Completion suggester over whole stored values, prefix match with optional fuzziness
pub fn completion_suggest(spec: &Json, corpus: &[&Json]) -> Result<Json> {
    let text = spec.get("text").and_then(Json::as_str).unwrap_or_default();
    let completion = spec.get("completion").ok_or_else(|| EsError::Transport {
        status: 400,
        message: "suggest requires a completion section".to_string(),
    })?;
    let field = completion
        .get("field")
        .and_then(Json::as_str)
        .ok_or_else(|| EsError::Transport {
            status: 400,
            message: "completion suggestion requires a field".to_string(),
        })?;
    let size = completion
        .get("size")
        .and_then(Json::as_u64)
        .map(|s| s as usize)
        .unwrap_or(DEFAULT_SUGGEST_SIZE);
    let edits = match completion.get("fuzzy") {
        Some(Json::Object(fuzzy)) => fuzzy
            .get("fuzziness")
            .and_then(Json::as_u64)
            .map(|f| f as usize)
            .unwrap_or(1),
        _ => 0,
    };

    let prefix = text.to_lowercase();
    let prefix_len = prefix.chars().count();

    let mut options: Vec<(String, f64)> = Vec::new();
    for doc in corpus {
        for value in values_at(doc, field) {
            let input = match value {
                Json::String(s) => s.clone(),
                Json::Number(n) => n.to_string(),
                _ => continue,
            };
            if options.iter().any(|(t, _)| *t == input) {
                continue;
            }
            let head: String = input.to_lowercase().chars().take(prefix_len).collect();
            if head == prefix {
                options.push((input, 1.0));
            } else if edits > 0 && levenshtein_distance(&head, &prefix) <= edits {
                options.push((input, 0.5));
            }
        }
    }

    options.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    options.truncate(size);

    Ok(json!([{
        "text": text,
        "offset": 0,
        "length": text.chars().count(),
        "options": options
            .into_iter()
            .map(|(text, score)| json!({"text": text, "score": score}))
            .collect::<Vec<_>>(),
    }]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Vec<Json> {
        vec![
            json!({"id": 1, "first_name": "John", "last_name": "Smith"}),
            json!({"id": 2, "first_name": "Jane", "last_name": "Smith"}),
            json!({"id": 3, "first_name": "Jack", "last_name": "Smith"}),
            json!({"id": 4, "first_name": "Foo", "last_name": "Bar"}),
        ]
    }

    #[test]
    fn test_global_terms_aggregation() {
        let docs = people();
        let corpus: Vec<&Json> = docs.iter().collect();
        let matched = vec![&docs[3]];
        let aggs = json!({"global_count": {"global": {}, "aggs": {
            "last_name": {"terms": {"field": "last_name"}}
        }}});

        let result = aggregate(aggs.as_object().unwrap(), &matched, &corpus, None).unwrap();

        assert_eq!(result["global_count"]["doc_count"], json!(4));
        assert_eq!(
            result["global_count"]["last_name"]["buckets"],
            json!([{"key": "smith", "doc_count": 3}, {"key": "bar", "doc_count": 1}])
        );
    }

    #[test]
    fn test_terms_aggregation_size() {
        let docs = people();
        let corpus: Vec<&Json> = docs.iter().collect();
        let aggs = json!({"last_name": {"terms": {"field": "last_name", "size": 1}}});

        let result = aggregate(aggs.as_object().unwrap(), &corpus, &corpus, None).unwrap();
        assert_eq!(result["last_name"]["buckets"], json!([{"key": "smith", "doc_count": 3}]));
        assert_eq!(result["last_name"]["sum_other_doc_count"], json!(1));
    }

    #[test]
    fn test_term_suggestion() {
        let docs = people();
        let corpus: Vec<&Json> = docs.iter().collect();
        let spec = json!({"text": "smath", "term": {"field": "last_name"}});

        let result = term_suggest(&spec, &corpus, None).unwrap();
        assert_eq!(result[0]["text"], json!("smath"));
        assert_eq!(result[0]["options"][0]["text"], json!("smith"));
        assert_eq!(result[0]["options"][0]["freq"], json!(3));
        let score = result[0]["options"][0]["score"].as_f64().unwrap();
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_completion() {
        let docs = vec![
            json!({"name_complete": "Elasticsearch"}),
            json!({"name_complete": "Elastic"}),
            json!({"name_complete": "Solr"}),
        ];
        let corpus: Vec<&Json> = docs.iter().collect();
        let spec = json!({"text": "ela", "completion": {"field": "name_complete", "fuzzy": {}}});

        let result = completion_suggest(&spec, &corpus).unwrap();
        let texts: Vec<_> = result[0]["options"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["text"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["Elastic", "Elasticsearch"]);
    }
}
