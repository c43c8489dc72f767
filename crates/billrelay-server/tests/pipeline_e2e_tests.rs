//! End-to-end pipeline scenarios
//!
//! Each test runs the full Ingest -> Decode -> Delivery -> Rollup tick
//! against a disposable Postgres container, with the object store and the
//! processing endpoint mocked over HTTP.
//!
//! These tests need a local Docker daemon and are `#[ignore]`d by default:
//!
//! ```text
//! cargo test -p billrelay-server --test pipeline_e2e_tests -- --ignored
//! ```

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::io::Write;
use testcontainers::{runners::AsyncRunner, ImageExt};
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use billrelay_server::blob::{BlobConfig, BlobStoreClient};
use billrelay_server::config::{Config, DatabaseConfig, PipelineConfig};
use billrelay_server::db::AdvisoryLock;
use billrelay_server::delivery::{DeliveryClient, DeliveryConfig};
use billrelay_server::pipeline::{Orchestrator, TickOutcome};

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,billrelay_server=debug")),
        )
        .with_test_writer()
        .try_init();
}

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

const SUCCESS_BODY: &str = "<Envelope><Body><ProcessTransactionResponse>\
    <result>SUCCESS</result></ProcessTransactionResponse></Body></Envelope>";

const REJECTED_BODY: &str = "<Envelope><Body><ProcessTransactionResponse>\
    <result>REJECTED</result><message>duplicate submission</message>\
    </ProcessTransactionResponse></Body></Envelope>";

struct TestEnv {
    pool: PgPool,
    config: Config,
    _incoming: tempfile::TempDir,
}

async fn setup_env(blob_server: &MockServer, delivery_server: &MockServer) -> Result<(TestEnv, testcontainers::ContainerAsync<Postgres>)> {
    let container = Postgres::default().with_tag("16-alpine").start().await?;

    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

    let pool = PgPoolOptions::new().max_connections(5).connect(&url).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let incoming = tempfile::tempdir()?;

    let config = Config {
        database: DatabaseConfig {
            url,
            max_connections: 5,
            min_connections: 1,
            connect_timeout_secs: 10,
        },
        blob: BlobConfig {
            account: String::new(),
            container: "payloads".to_string(),
            base_url: Some(blob_server.uri()),
            sas_token: None,
            basic_user: None,
            basic_pass: None,
            list_timeout_secs: 5,
            fetch_timeout_secs: 5,
        },
        delivery: DeliveryConfig {
            endpoint: format!("{}/soap", delivery_server.uri()),
            user: None,
            pass: None,
            timeout_secs: 5,
            max_attempts: 3,
            base_backoff_ms: 10,
        },
        pipeline: PipelineConfig {
            tick_interval_secs: 60,
            incoming_dir: incoming.path().to_string_lossy().into_owned(),
            delivery_batch_limit: 100,
            lock_key: 424_242,
            run_once: true,
        },
    };

    Ok((
        TestEnv {
            pool,
            config,
            _incoming: incoming,
        },
        container,
    ))
}

fn orchestrator(env: &TestEnv) -> Orchestrator {
    let blob = BlobStoreClient::new(env.config.blob.clone()).unwrap();
    let delivery = DeliveryClient::new(env.config.delivery.clone()).unwrap();
    Orchestrator::new(env.pool.clone(), &env.config, blob, delivery)
}

fn listing_body(entries: &[(&str, &str)]) -> String {
    let blobs: String = entries
        .iter()
        .map(|(name, etag)| {
            format!(
                "<Blob><Name>{}</Name><Properties><Etag>\"{}\"</Etag></Properties></Blob>",
                name, etag
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><EnumerationResults><Blobs>{}</Blobs></EnumerationResults>"#,
        blobs
    )
}

async fn mount_listing(server: &MockServer, entries: &[(&str, &str)]) {
    Mock::given(method("GET"))
        .and(path("/payloads"))
        .and(query_param("comp", "list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_body(entries)))
        .mount(server)
        .await;
}

async fn mount_blob(server: &MockServer, name: &str, etag: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/payloads/{}", name)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(bytes)
                .insert_header("ETag", format!("\"{}\"", etag).as_str()),
        )
        .mount(server)
        .await;
}

async fn file_rows(pool: &PgPool) -> Vec<(String, String, String, i32, i32)> {
    sqlx::query_as(
        "SELECT source_name, etag, status, total_records, processed_count
         FROM files ORDER BY created_at",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

async fn record_rows(pool: &PgPool) -> Vec<(String, String, Option<String>, Option<String>)> {
    sqlx::query_as(
        "SELECT entry_id, status, correlation_id, error_message
         FROM records ORDER BY entry_id",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

#[tokio::test]
#[serial]
#[ignore = "requires a local Docker daemon"]
async fn test_full_success_scenario() -> Result<()> {
    init_tracing();

    let blob_server = MockServer::start().await;
    let delivery_server = MockServer::start().await;
    let (env, _container) = setup_env(&blob_server, &delivery_server).await?;

    let payload = gzip(
        r#"{"record_id": "r-1", "name": "alpha", "amount": "10.00", "currency": "EUR", "timestamp": "2026-03-01T00:00:00Z"}
{"record_id": "r-2", "name": "beta", "amount": "20.00", "currency": "EUR", "timestamp": "2026-03-01T00:00:00Z"}"#,
    );

    mount_listing(&blob_server, &[("batch-1", "etag-A")]).await;
    mount_blob(&blob_server, "batch-1", "etag-A", payload).await;

    Mock::given(method("POST"))
        .and(path("/soap"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUCCESS_BODY))
        .mount(&delivery_server)
        .await;

    let orchestrator = orchestrator(&env);
    let outcome = orchestrator.run_tick().await?;
    assert!(matches!(outcome, TickOutcome::Completed(_)));

    let files = file_rows(&env.pool).await;
    assert_eq!(files.len(), 1);
    let (name, etag, status, total, processed) = &files[0];
    assert_eq!(name, "batch-1");
    assert_eq!(etag, "etag-A");
    assert_eq!(status, "PROCESSED");
    assert_eq!(*total, 2);
    assert_eq!(*processed, 2);

    let records = record_rows(&env.pool).await;
    assert_eq!(records.len(), 2);
    for (_, status, correlation_id, error) in &records {
        assert_eq!(status, "PROCESSED");
        assert!(correlation_id.is_some());
        assert!(error.is_none());
    }

    // Idempotent ingest: an unchanged listing adds nothing on the next tick.
    let outcome = orchestrator.run_tick().await?;
    assert!(matches!(outcome, TickOutcome::Completed(_)));
    assert_eq!(file_rows(&env.pool).await.len(), 1);
    assert_eq!(record_rows(&env.pool).await.len(), 2);

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires a local Docker daemon"]
async fn test_mixed_outcome_marks_file_failed() -> Result<()> {
    init_tracing();

    let blob_server = MockServer::start().await;
    let delivery_server = MockServer::start().await;
    let (env, _container) = setup_env(&blob_server, &delivery_server).await?;

    let payload = gzip(
        r#"{"record_id": "r-1", "name": "alpha", "amount": "10.00", "currency": "EUR", "timestamp": "t"}
{"record_id": "r-2", "name": "beta", "amount": "20.00", "currency": "EUR", "timestamp": "t"}"#,
    );

    mount_listing(&blob_server, &[("batch-1", "etag-A")]).await;
    mount_blob(&blob_server, "batch-1", "etag-A", payload).await;

    Mock::given(method("POST"))
        .and(path("/soap"))
        .and(body_string_contains("<prc:recordId>r-1</prc:recordId>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUCCESS_BODY))
        .mount(&delivery_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/soap"))
        .and(body_string_contains("<prc:recordId>r-2</prc:recordId>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REJECTED_BODY))
        .mount(&delivery_server)
        .await;

    orchestrator(&env).run_tick().await?;

    let files = file_rows(&env.pool).await;
    assert_eq!(files.len(), 1);
    let (_, _, status, total, processed) = &files[0];
    assert_eq!(status, "FAILED");
    assert_eq!(*total, 2);
    // processed_count is the settled count, not the success count.
    assert_eq!(*processed, 2);

    let records = record_rows(&env.pool).await;
    let r1 = records.iter().find(|r| r.0 == "r-1").unwrap();
    assert_eq!(r1.1, "PROCESSED");
    assert!(r1.3.is_none());

    let r2 = records.iter().find(|r| r.0 == "r-2").unwrap();
    assert_eq!(r2.1, "FAILED");
    let message = r2.3.as_deref().unwrap();
    assert!(message.contains("rejected"), "got: {}", message);
    assert!(r2.2.is_some());

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires a local Docker daemon"]
async fn test_decode_failure_isolation() -> Result<()> {
    init_tracing();

    let blob_server = MockServer::start().await;
    let delivery_server = MockServer::start().await;
    let (env, _container) = setup_env(&blob_server, &delivery_server).await?;

    // Truncated gzip body: fails decoding, never reaches delivery.
    let mut payload = gzip(r#"{"record_id": "r-1"}"#);
    payload.truncate(8);

    mount_listing(&blob_server, &[("broken", "etag-X")]).await;
    mount_blob(&blob_server, "broken", "etag-X", payload).await;

    orchestrator(&env).run_tick().await?;

    let files = file_rows(&env.pool).await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].2, "FAILED");
    assert_eq!(files[0].3, 0);
    assert!(record_rows(&env.pool).await.is_empty());

    let (error_message,): (Option<String>,) =
        sqlx::query_as("SELECT error_message FROM files LIMIT 1")
            .fetch_one(&env.pool)
            .await?;
    assert!(error_message.unwrap().contains("decode failed"));

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires a local Docker daemon"]
async fn test_reingest_on_changed_etag() -> Result<()> {
    init_tracing();

    let blob_server = MockServer::start().await;
    let delivery_server = MockServer::start().await;
    let (env, _container) = setup_env(&blob_server, &delivery_server).await?;

    let payload = gzip(r#"{"record_id": "r-1", "amount": "1.00"}"#);

    mount_listing(&blob_server, &[("batch-1", "etag-A")]).await;
    mount_blob(&blob_server, "batch-1", "etag-A", payload.clone()).await;
    Mock::given(method("POST"))
        .and(path("/soap"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUCCESS_BODY))
        .mount(&delivery_server)
        .await;

    orchestrator(&env).run_tick().await?;
    assert_eq!(file_rows(&env.pool).await.len(), 1);

    // The source item changed: same name, new etag.
    blob_server.reset().await;
    mount_listing(&blob_server, &[("batch-1", "etag-B")]).await;
    mount_blob(&blob_server, "batch-1", "etag-B", payload).await;

    orchestrator(&env).run_tick().await?;

    let files = file_rows(&env.pool).await;
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].1, "etag-A");
    assert_eq!(files[1].1, "etag-B");

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires a local Docker daemon"]
async fn test_lock_exclusivity() -> Result<()> {
    init_tracing();

    let blob_server = MockServer::start().await;
    let delivery_server = MockServer::start().await;
    let (env, _container) = setup_env(&blob_server, &delivery_server).await?;

    mount_listing(&blob_server, &[]).await;

    let orchestrator = orchestrator(&env);

    // A competing worker holds the lock: the tick is a silent no-op.
    let lock = AdvisoryLock::new(env.pool.clone(), env.config.pipeline.lock_key);
    let guard = lock.try_acquire().await?.expect("lock should be free");

    let outcome = orchestrator.run_tick().await?;
    assert!(matches!(outcome, TickOutcome::Skipped));
    assert!(file_rows(&env.pool).await.is_empty());

    // Once released, the next tick proceeds.
    guard.release().await;
    let outcome = orchestrator.run_tick().await?;
    assert!(matches!(outcome, TickOutcome::Completed(_)));

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires a local Docker daemon"]
async fn test_ingest_race_loser_is_not_an_error() -> Result<()> {
    init_tracing();

    let blob_server = MockServer::start().await;
    let delivery_server = MockServer::start().await;
    let (env, _container) = setup_env(&blob_server, &delivery_server).await?;

    // Another worker recorded the pair between our listing and our insert.
    sqlx::query(
        "INSERT INTO files (id, source_name, etag, local_path, status)
         VALUES ($1, 'batch-1', 'etag-A', '/tmp/batch-1', 'PROCESSING')",
    )
    .bind(Uuid::new_v4())
    .execute(&env.pool)
    .await?;

    let inserted = billrelay_server::db::FileStore::new(env.pool.clone())
        .insert_new("batch-1", "etag-A", "/tmp/elsewhere")
        .await?;

    assert!(inserted.is_none());
    assert_eq!(file_rows(&env.pool).await.len(), 1);

    Ok(())
}
