//! REST client behavior against a mock cluster

mod common;

use common::INDEX;
use es_indexable::{EsError, HttpBackend, Manager, SearchBackend, Settings};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const SEARCH_PATH: &str = "/es_indexable_test/model-TestModel/_search";

fn manager_for(server: &ServerGuard) -> (Arc<HttpBackend>, Manager) {
    let settings = Arc::new(
        Settings::builder()
            .url(server.url())
            .default_index(INDEX)
            .request_timeout_secs(5)
            .build(),
    );
    let backend = Arc::new(HttpBackend::new(&settings).unwrap());
    let shared: Arc<dyn SearchBackend> = backend.clone();
    let manager = Manager::new(shared, common::registry(), settings, "TestModel").unwrap();
    (backend, manager)
}

fn hit(id: i64, first_name: &str) -> serde_json::Value {
    json!({
        "_index": INDEX,
        "_type": "model-TestModel",
        "_id": id.to_string(),
        "_score": 1.0,
        "_source": {"id": id, "first_name": first_name, "last_name": "Smith", "email": null},
    })
}

#[tokio::test]
async fn test_search_sends_translated_body() {
    let mut server = Server::new_async().await;
    let (_, manager) = manager_for(&server);

    let mock = server
        .mock("POST", SEARCH_PATH)
        .match_query(Matcher::UrlEncoded("size".into(), "2".into()))
        .match_body(Matcher::PartialJson(json!({
            "query": {"filtered": {
                "filter": {"bool": {"must": [{"term": {"last_name": "smith"}}]}}
            }},
            "sort": [{"id": "asc"}, "_score"],
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "took": 2,
                "timed_out": false,
                "hits": {
                    "total": {"value": 3, "relation": "eq"},
                    "max_score": 1.0,
                    "hits": [hit(1, "John"), hit(2, "Jack")],
                },
            })
            .to_string(),
        )
        .create_async()
        .await;

    let qs = manager
        .queryset()
        .filter("last_name", "Smith")
        .slice(0, Some(2));
    let docs = qs.fetch().await.unwrap();

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[1]["first_name"], json!("Jack"));
    assert_eq!(qs.count().await.unwrap(), 3);
    assert_eq!(qs.max_score().await.unwrap(), Some(1.0));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_count_without_query_uses_get() {
    let mut server = Server::new_async().await;
    let (_, manager) = manager_for(&server);

    let mock = server
        .mock("GET", "/es_indexable_test/model-TestModel/_count")
        .with_status(200)
        .with_body(r#"{"count": 7, "_shards": {"total": 1, "successful": 1, "failed": 0}}"#)
        .create_async()
        .await;

    assert_eq!(manager.count().await.unwrap(), 7);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_document_is_not_found() {
    let mut server = Server::new_async().await;
    let (_, manager) = manager_for(&server);

    server
        .mock("GET", "/es_indexable_test/model-TestModel/42")
        .with_status(404)
        .with_body(r#"{"_index": "es_indexable_test", "_id": "42", "found": false}"#)
        .create_async()
        .await;
    server
        .mock("DELETE", "/es_indexable_test/model-TestModel/42")
        .with_status(404)
        .with_body(r#"{"found": false}"#)
        .create_async()
        .await;

    let err = manager.get(42).await.unwrap_err();
    assert!(err.is_not_found());

    // deletes of missing documents are tolerated
    let record = common::person(42, "Nobody", "Here", None);
    manager.delete(&record).await.unwrap();
}

#[tokio::test]
async fn test_error_status_is_a_transport_failure() {
    let mut server = Server::new_async().await;
    let (_, manager) = manager_for(&server);

    server
        .mock("POST", SEARCH_PATH)
        .with_status(500)
        .with_body("cluster on fire")
        .create_async()
        .await;

    let err = manager.queryset().fetch().await.unwrap_err();
    assert!(err.is_transport_failure());
    match err {
        EsError::Transport { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "cluster on fire");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_create_index_tolerates_existing_index() {
    let mut server = Server::new_async().await;
    let (_, manager) = manager_for(&server);

    let create = server
        .mock("PUT", "/es_indexable_test")
        .with_status(400)
        .with_body(r#"{"error": "IndexAlreadyExistsException[[es_indexable_test] already exists]", "status": 400}"#)
        .expect(2)
        .create_async()
        .await;
    let mapping = server
        .mock("PUT", "/es_indexable_test/_mapping/model-TestModel")
        .match_body(Matcher::PartialJson(json!({
            "model-TestModel": {"properties": {"first_name_complete": {"type": "completion"}}}
        })))
        .with_status(200)
        .with_body(r#"{"acknowledged": true}"#)
        .create_async()
        .await;

    manager.create_index(true).await.unwrap();
    let err = manager.create_index(false).await.unwrap_err();
    assert_eq!(err.status(), Some(400));

    create.assert_async().await;
    mapping.assert_async().await;
}

#[tokio::test]
async fn test_bulk_index_sends_ndjson() {
    let mut server = Server::new_async().await;
    let (_, manager) = manager_for(&server);

    let mock = server
        .mock("POST", "/_bulk")
        .match_header("content-type", "application/x-ndjson")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"(?m)^\{"index":\{[^\n]*"_id":"1""#.to_string()),
            Matcher::Regex(r#"(?m)^\{"index":\{[^\n]*"_type":"model-TestModel""#.to_string()),
            Matcher::Regex(r#""first_name":"Jack""#.to_string()),
        ]))
        .with_status(200)
        .with_body(r#"{"took": 3, "errors": false, "items": []}"#)
        .create_async()
        .await;

    let people = common::people();
    let indexed = manager.bulk_index(&people[..2]).await.unwrap();
    assert_eq!(indexed, 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_bulk_item_errors_fail_the_batch() {
    let mut server = Server::new_async().await;
    let (_, manager) = manager_for(&server);

    server
        .mock("POST", "/_bulk")
        .with_status(200)
        .with_body(r#"{"took": 3, "errors": true, "items": []}"#)
        .create_async()
        .await;

    let err = manager.bulk_index(&common::people()).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_more_like_this_parameters() {
    let mut server = Server::new_async().await;
    let (_, manager) = manager_for(&server);

    let mock = server
        .mock("POST", "/es_indexable_test/model-TestModel/1/_mlt")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("mlt_fields".into(), "last_name".into()),
            Matcher::UrlEncoded("search_from".into(), "1".into()),
            Matcher::UrlEncoded("search_size".into(), "1".into()),
        ]))
        .with_status(200)
        .with_body(
            json!({"hits": {"total": 2, "max_score": 0.5, "hits": [hit(3, "Jane")]}}).to_string(),
        )
        .create_async()
        .await;

    let people = common::people();
    let qs = manager
        .mlt(&people[0], &["last_name"])
        .unwrap()
        .slice(1, Some(2));
    let docs = qs.fetch().await.unwrap();

    assert_eq!(docs[0]["id"], json!(3));
    assert_eq!(qs.count().await.unwrap(), 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ping() {
    let mut server = Server::new_async().await;
    let (backend, _) = manager_for(&server);

    let up = server
        .mock("HEAD", "/")
        .with_status(200)
        .create_async()
        .await;
    assert!(backend.ping().await.unwrap());
    up.remove_async().await;

    server
        .mock("HEAD", "/")
        .with_status(503)
        .create_async()
        .await;
    assert!(!backend.ping().await.unwrap());
}

#[tokio::test]
async fn test_unreachable_cluster() {
    let backend = HttpBackend::with_url("http://127.0.0.1:1", 1).unwrap();

    assert!(!backend.ping().await.unwrap());
    let err = backend.get(INDEX, "model-TestModel", "1").await.unwrap_err();
    assert!(err.is_transport_failure());
}

#[tokio::test]
async fn test_truncated_body_is_a_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        // promises 64 bytes, sends 8, then hangs up
        let _ = socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{\"_id\":1")
            .await;
    });

    let backend = HttpBackend::with_url(&format!("http://{}", addr), 5).unwrap();
    let err = backend.get(INDEX, "model-TestModel", "1").await.unwrap_err();
    assert!(err.is_transport_failure());
}

#[tokio::test]
async fn test_document_ids_are_escaped() {
    let mut server = Server::new_async().await;
    let (backend, _) = manager_for(&server);

    let mock = server
        .mock("GET", "/es_indexable_test/model-TestModel/a%2Fb%3Fc")
        .with_status(200)
        .with_body(r#"{"_id": "a/b?c", "found": true, "_source": {"id": "a/b?c"}}"#)
        .create_async()
        .await;

    let response = backend.get(INDEX, "model-TestModel", "a/b?c").await.unwrap();
    assert_eq!(response["_id"], json!("a/b?c"));
    mock.assert_async().await;
}
