//! Client tests against a mocked Firestore REST endpoint.

use serial_test::serial;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use capflow_models::{Job, JobPatch, JobStatus, JobStep, Queue};

use crate::client::{FirestoreClient, FirestoreConfig};
use crate::convert::to_fields;
use crate::error::FirestoreError;
use crate::job_repo::{JobRepository, QUERY_PAGE_SIZE};
use crate::store::{JobStore, Transition};
use crate::types::Document;

const DOCS: &str = "/v1/projects/test-project/databases/(default)/documents";
const UPDATE_TIME: &str = "2024-05-01T10:00:00.123456Z";

async fn client(server: &MockServer) -> FirestoreClient {
    FirestoreClient::new(FirestoreConfig::emulator("test-project", server.uri()))
        .await
        .unwrap()
}

fn job_document(job: &Job) -> serde_json::Value {
    serde_json::to_value(Document {
        name: Some(format!(
            "projects/test-project/databases/(default)/documents/jobs/{}",
            job.id
        )),
        fields: Some(to_fields(job).unwrap()),
        create_time: Some(UPDATE_TIME.to_string()),
        update_time: Some(UPDATE_TIME.to_string()),
    })
    .unwrap()
}

// =============================================================================
// Error classification
// =============================================================================

#[test]
fn test_error_from_http_status() {
    assert!(matches!(FirestoreError::from_http_status(429, "slow down"), FirestoreError::RateLimited(_)));
    assert!(matches!(
        FirestoreError::from_http_status(503, "unavailable"),
        FirestoreError::ServerError(503, _)
    ));
    assert!(matches!(FirestoreError::from_http_status(400, "bad"), FirestoreError::RequestFailed(_)));
    assert!(matches!(FirestoreError::from_http_status(404, "gone"), FirestoreError::NotFound(_)));
    assert!(matches!(FirestoreError::from_http_status(409, "dup"), FirestoreError::AlreadyExists(_)));
}

#[test]
fn test_failed_precondition_body_wins_over_status() {
    let err = FirestoreError::from_http_status(400, r#"{"error":{"status":"FAILED_PRECONDITION"}}"#);
    assert!(err.is_precondition_failed());
    assert!(!err.is_retryable());
}

#[test]
fn test_retryable_classes() {
    assert!(FirestoreError::from_http_status(500, "x").is_retryable());
    assert!(FirestoreError::RateLimited(10).is_retryable());
    assert_eq!(FirestoreError::RateLimited(10).retry_after_ms(), Some(10));
    assert!(!FirestoreError::from_http_status(403, "x").is_retryable());
    assert_eq!(FirestoreError::ServerError(502, "x".into()).http_status(), Some(502));
}

// =============================================================================
// Config
// =============================================================================

#[test]
#[serial]
fn test_config_requires_project_id() {
    std::env::remove_var("GCP_PROJECT_ID");
    std::env::remove_var("FIREBASE_PROJECT_ID");
    assert!(FirestoreConfig::from_env().is_err());
}

#[test]
#[serial]
fn test_config_reads_emulator_host() {
    std::env::set_var("GCP_PROJECT_ID", "test-project");
    std::env::set_var("FIRESTORE_EMULATOR_HOST", "localhost:8080");
    let config = FirestoreConfig::from_env().unwrap();
    assert_eq!(config.emulator_host.as_deref(), Some("localhost:8080"));
    assert_eq!(config.database_id, "(default)");
    std::env::remove_var("FIRESTORE_EMULATOR_HOST");
    std::env::remove_var("GCP_PROJECT_ID");
}

// =============================================================================
// HTTP behavior
// =============================================================================

#[tokio::test]
async fn test_get_missing_document_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/jobs/missing", DOCS)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server).await;
    assert!(client.get_document("jobs", "missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_job_retries_server_errors() {
    let server = MockServer::start().await;
    let job = Job::from_url("u1", "https://example.com/a.mp4");
    let doc_path = format!("{}/jobs/{}", DOCS, job.id);

    Mock::given(method("GET"))
        .and(path(doc_path.clone()))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(doc_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_document(&job)))
        .mount(&server)
        .await;

    let repo = JobRepository::new(client(&server).await);
    let loaded = repo.get(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded, job);
}

#[tokio::test]
async fn test_conditional_update_sends_update_time_precondition() {
    let server = MockServer::start().await;
    let job = Job::from_url("u1", "https://example.com/a.mp4");
    let doc_path = format!("{}/jobs/{}", DOCS, job.id);

    Mock::given(method("GET"))
        .and(path(doc_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_document(&job)))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(doc_path))
        .and(query_param("currentDocument.updateTime", UPDATE_TIME))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_document(&job)))
        .expect(1)
        .mount(&server)
        .await;

    let repo = JobRepository::new(client(&server).await);
    let outcome = repo
        .update_if_status(
            &job.id,
            &[JobStatus::Pending],
            &JobPatch::stage(JobStatus::Downloading, JobStep::Download, 0.05),
        )
        .await
        .unwrap();

    let updated = outcome.applied().unwrap();
    assert_eq!(updated.status, JobStatus::Downloading);
    assert_eq!(updated.step, Some(JobStep::Download));
}

#[tokio::test]
async fn test_conditional_update_skips_write_on_status_mismatch() {
    let server = MockServer::start().await;
    let job = Job::from_url("u1", "https://example.com/a.mp4").with_status(JobStatus::Canceled);
    let doc_path = format!("{}/jobs/{}", DOCS, job.id);

    Mock::given(method("GET"))
        .and(path(doc_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_document(&job)))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(doc_path))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let repo = JobRepository::new(client(&server).await);
    let outcome = repo
        .update_if_status(&job.id, &[JobStatus::Downloading], &JobPatch::status(JobStatus::Stt))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Transition::Conflict {
            id: job.id.clone(),
            current: Some(JobStatus::Canceled)
        }
    );
}

#[tokio::test]
async fn test_run_query_collects_documents() {
    let server = MockServer::start().await;
    let job = Job::from_url("u1", "https://example.com/a.mp4");

    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", DOCS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "document": job_document(&job), "readTime": UPDATE_TIME },
            { "readTime": UPDATE_TIME }
        ])))
        .mount(&server)
        .await;

    let repo = JobRepository::new(client(&server).await);
    let counts = repo.count_by_status("u1").await.unwrap();
    assert_eq!(counts.get(&JobStatus::Pending), Some(&1));
}

#[tokio::test]
async fn test_queue_listing_follows_cursor_past_first_page() {
    let server = MockServer::start().await;
    let jobs: Vec<Job> = (0..=QUERY_PAGE_SIZE as u32)
        .map(|pos| Job::from_url("u1", "https://example.com/a.mp4").as_draft_in("q1", pos))
        .collect();
    let (first_page, rest) = jobs.split_at(QUERY_PAGE_SIZE as usize);
    let page = |jobs: &[Job]| {
        serde_json::Value::Array(
            jobs.iter()
                .map(|job| serde_json::json!({ "document": job_document(job), "readTime": UPDATE_TIME }))
                .collect(),
        )
    };

    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", DOCS)))
        .and(body_string_contains("startAt"))
        .and(body_string_contains(format!("jobs/{}", first_page[first_page.len() - 1].id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(rest)))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", DOCS)))
        .and(body_string_contains("queuePosition"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(first_page)))
        .expect(1)
        .mount(&server)
        .await;

    let repo = JobRepository::new(client(&server).await);
    let listed = repo.queue_jobs("q1", None).await.unwrap();
    assert_eq!(listed.len(), jobs.len());
    assert_eq!(listed.last().and_then(|j| j.queue_position), Some(QUERY_PAGE_SIZE as u32));
}

#[tokio::test]
async fn test_insert_draft_retries_when_queue_counter_moves() {
    let server = MockServer::start().await;
    let queue = Queue::new("u1", "batch");
    let existing = Job::from_url("u1", "https://example.com/a.mp4").as_draft_in(&queue.id, 2);

    Mock::given(method("GET"))
        .and(path(format!("{}/queues/{}", DOCS, queue.id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(
                serde_json::to_value(Document {
                    name: Some(format!(
                        "projects/test-project/databases/(default)/documents/queues/{}",
                        queue.id
                    )),
                    fields: Some(to_fields(&queue).unwrap()),
                    create_time: Some(UPDATE_TIME.to_string()),
                    update_time: Some(UPDATE_TIME.to_string()),
                })
                .unwrap(),
            ),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", DOCS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "document": job_document(&existing), "readTime": UPDATE_TIME }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}:commit", DOCS)))
        .respond_with(ResponseTemplate::new(409).set_body_string("FAILED_PRECONDITION"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}:commit", DOCS)))
        .and(body_string_contains("nextPosition"))
        .and(body_string_contains(r#""exists":false"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "writeResults": [{}, {}],
            "commitTime": UPDATE_TIME
        })))
        .expect(1)
        .mount(&server)
        .await;

    let repo = JobRepository::new(client(&server).await);
    let draft = repo
        .insert_draft(Job::from_url("u1", "https://example.com/b.mp4"), &queue.id)
        .await
        .unwrap();
    assert_eq!(draft.queue_position, Some(3));
    assert_eq!(draft.status, JobStatus::Draft);
}
