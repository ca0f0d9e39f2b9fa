//! URL parameters of search and more-like-this requests

use crate::backend::RequestParams;
use serde_json::{json, Value as Json};

/// Parameters renamed to `search_*` for more-like-this requests
pub const MLT_RENAMED: [&str; 6] = ["type", "indices", "types", "scroll", "size", "from"];

/// Pagination parameters for a `[start, stop)` window.
///
/// `from` is only sent for a non-zero start; `size` only when bounded.
pub fn window_params(start: usize, stop: Option<usize>) -> RequestParams {
    let mut params = RequestParams::new();
    if start > 0 {
        params.insert("from".to_string(), json!(start));
    }
    if let Some(stop) = stop {
        params.insert("size".to_string(), json!(stop.saturating_sub(start)));
    }
    params
}

/// Rename search parameters for the more-like-this endpoint, then layer
/// the caller's more-like-this parameters on top
pub fn mlt_params(mut params: RequestParams, mlt: &RequestParams) -> RequestParams {
    for name in MLT_RENAMED {
        if let Some(value) = params.remove(name) {
            params.insert(format!("search_{}", name), value);
        }
    }
    for (key, value) in mlt {
        params.insert(key.clone(), value.clone());
    }
    params
}

/// Build parameters from `(key, value)` pairs
pub fn params<I, K, V>(pairs: I) -> RequestParams
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Json>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_params() {
        assert!(window_params(0, None).is_empty());
        let p = window_params(2, Some(5));
        assert_eq!(p.get("from"), Some(&json!(2)));
        assert_eq!(p.get("size"), Some(&json!(3)));
        let p = window_params(0, Some(1));
        assert!(p.get("from").is_none());
    }

    #[test]
    fn test_mlt_renaming() {
        let search = window_params(1, Some(3));
        let mlt = params([("mlt_fields", json!(["title"])), ("min_term_freq", json!(1))]);

        let p = mlt_params(search, &mlt);
        assert_eq!(p.get("search_from"), Some(&json!(1)));
        assert_eq!(p.get("search_size"), Some(&json!(2)));
        assert!(p.get("from").is_none());
        assert!(p.get("size").is_none());
        assert_eq!(p.get("mlt_fields"), Some(&json!(["title"])));
        assert_eq!(p.get("min_term_freq"), Some(&json!(1)));
    }
}
