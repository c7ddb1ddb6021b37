use std::path::Path;

use prim_sync::{
    MetadataStore, PayloadStore, ResourceDescriptor, ResourceSynchronizer, SyncError, SyncState,
    digest, run_all,
};
use prim_sync_http::{HttpConfig, HttpFetcher};
use prim_sync_store::{FsPayloadStore, SidecarStore};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXPORT_PATH: &str = "/api/explore/v2.1/catalog/datasets/r1/exports/jsonl";

struct Fixture {
    _dir: tempfile::TempDir,
    sidecars: SidecarStore,
    payloads: FsPayloadStore,
    fetcher: HttpFetcher,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("data/raw");
        Self {
            sidecars: SidecarStore::new(&raw),
            payloads: FsPayloadStore::new(&raw),
            fetcher: HttpFetcher::new(HttpConfig::default()).unwrap(),
            _dir: dir,
        }
    }

    fn synchronizer(&self) -> ResourceSynchronizer<'_> {
        ResourceSynchronizer::new(&self.fetcher, &self.sidecars, &self.payloads)
    }

    fn raw_dir(&self) -> &Path {
        self.payloads.dir()
    }
}

#[tokio::test]
async fn scenarios_first_fetch_then_not_modified() {
    let server = MockServer::start().await;
    let fx = Fixture::new();
    let resource = ResourceDescriptor::dataset("r1", server.uri());

    // A: no sidecar, 200 with an ETag.
    Mock::given(method("GET"))
        .and(path(EXPORT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"x\"")
                .set_body_string("hello\n"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let outcome = fx.synchronizer().sync(&resource).await;
    assert_eq!(outcome.state, SyncState::Written);

    let payload_path = fx.payloads.payload_path(&resource);
    assert_eq!(std::fs::read(&payload_path).unwrap(), b"hello\n");
    let first = fx.sidecars.load("r1").unwrap();
    assert_eq!(first.etag.as_deref(), Some("\"x\""));
    assert_eq!(first.content_hash, digest(b"hello\n"));

    // B: same validators, server answers 304.
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(EXPORT_PATH))
        .and(header("if-none-match", "\"x\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = fx.synchronizer().sync(&resource).await;
    assert_eq!(outcome.state, SyncState::NotModified);
    assert_eq!(std::fs::read(&payload_path).unwrap(), b"hello\n");

    let second = fx.sidecars.load("r1").unwrap();
    assert_eq!(second.etag, first.etag);
    assert_eq!(second.content_hash, first.content_hash);
    assert!(second.fetched_at >= first.fetched_at);
}

#[tokio::test]
async fn scenario_identical_body_without_validators_is_deduplicated() {
    let server = MockServer::start().await;
    let fx = Fixture::new();
    let resource = ResourceDescriptor::dataset("r1", server.uri());

    Mock::given(method("GET"))
        .and(path(EXPORT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("same\n"))
        .mount(&server)
        .await;

    assert_eq!(
        fx.synchronizer().sync(&resource).await.state,
        SyncState::Written
    );
    let payload_path = fx.payloads.payload_path(&resource);
    let written_at = std::fs::metadata(&payload_path).unwrap().modified().unwrap();
    let before = fx.sidecars.load("r1").unwrap();

    let outcome = fx.synchronizer().sync(&resource).await;
    assert_eq!(outcome.state, SyncState::Deduplicated);

    let after_write = std::fs::metadata(&payload_path).unwrap().modified().unwrap();
    assert_eq!(written_at, after_write);
    let after = fx.sidecars.load("r1").unwrap();
    assert_eq!(after.content_hash, before.content_hash);

    // Only the payload and its sidecar remain; staged temp files are gone.
    let entries = std::fs::read_dir(fx.raw_dir()).unwrap().count();
    assert_eq!(entries, 2);
}

#[tokio::test]
async fn scenario_batch_continues_past_a_failing_resource() {
    let server = MockServer::start().await;
    let fx = Fixture::new();

    for (id, status) in [("r1", 200), ("r2", 500), ("r3", 200)] {
        Mock::given(method("GET"))
            .and(path(format!(
                "/api/explore/v2.1/catalog/datasets/{id}/exports/jsonl"
            )))
            .respond_with(ResponseTemplate::new(status).set_body_string(format!("{id}\n")))
            .mount(&server)
            .await;
    }

    let resources: Vec<ResourceDescriptor> = ["r1", "r2", "r3"]
        .into_iter()
        .map(|id| ResourceDescriptor::dataset(id, server.uri()))
        .collect();
    let report = run_all(&fx.synchronizer(), &resources).await;

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(
        report.outcomes[1].state,
        SyncState::Failed(SyncError::UnexpectedStatus { status: 500 })
    );
    assert!(fx.raw_dir().join("r3.jsonl").exists());
    assert!(!fx.raw_dir().join("r2.jsonl").exists());
    assert!(fx.sidecars.load("r2").is_none());
}

#[tokio::test]
async fn scenario_dry_run_touches_nothing() {
    let server = MockServer::start().await;
    let fx = Fixture::new();
    let resource = ResourceDescriptor::dataset("r1", server.uri());

    let outcome = fx.synchronizer().dry_run(true).sync(&resource).await;

    assert_eq!(outcome.state, SyncState::DryRun);
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(!fx.raw_dir().exists());
}

#[tokio::test]
async fn failed_refetch_keeps_previous_payload_and_sidecar() {
    let server = MockServer::start().await;
    let fx = Fixture::new();
    let resource = ResourceDescriptor::dataset("r1", server.uri());

    Mock::given(method("GET"))
        .and(path(EXPORT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_string("v1\n"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    fx.synchronizer().sync(&resource).await;
    let before = fx.sidecars.load("r1").unwrap();

    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let outcome = fx.synchronizer().sync(&resource).await;
    assert!(!outcome.is_success());
    assert_eq!(
        std::fs::read(fx.payloads.payload_path(&resource)).unwrap(),
        b"v1\n"
    );
    assert_eq!(fx.sidecars.load("r1").unwrap(), before);
}

#[tokio::test]
async fn changed_content_is_written_with_new_validators() {
    let server = MockServer::start().await;
    let fx = Fixture::new();
    let resource = ResourceDescriptor::dataset("r1", server.uri());

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_string("v1\n"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    fx.synchronizer().sync(&resource).await;

    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v2\"")
                .set_body_string("v2\n"),
        )
        .mount(&server)
        .await;

    let outcome = fx.synchronizer().sync(&resource).await;
    assert_eq!(outcome.state, SyncState::Written);

    let sidecar = fx.sidecars.load("r1").unwrap();
    assert_eq!(sidecar.etag.as_deref(), Some("\"v2\""));
    assert_eq!(sidecar.content_hash, digest(b"v2\n"));
    assert_eq!(
        std::fs::read(fx.payloads.payload_path(&resource)).unwrap(),
        b"v2\n"
    );
}

/// Serve one response that announces more body than it sends, then hang up.
fn truncating_server() -> String {
    use std::io::{Read, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Length: 10000\r\nETag: \"v2\"\r\n\r\n{\"partial\":1",
            )
            .unwrap();
        stream.flush().unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn truncated_body_keeps_previous_payload_and_sidecar() {
    let server = MockServer::start().await;
    let fx = Fixture::new();

    Mock::given(method("GET"))
        .and(path(EXPORT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_string("v1\n"),
        )
        .mount(&server)
        .await;
    let original = ResourceDescriptor::dataset("r1", server.uri());
    assert_eq!(
        fx.synchronizer().sync(&original).await.state,
        SyncState::Written
    );
    let before = fx.sidecars.load("r1").unwrap();

    let truncated = ResourceDescriptor::dataset("r1", truncating_server());
    let outcome = fx.synchronizer().sync(&truncated).await;

    assert!(
        matches!(outcome.state, SyncState::Failed(SyncError::Network(_))),
        "{outcome}"
    );
    assert_eq!(
        std::fs::read(fx.payloads.payload_path(&original)).unwrap(),
        b"v1\n"
    );
    assert_eq!(fx.sidecars.load("r1").unwrap(), before);

    // The partial download was staged and then discarded.
    let entries = std::fs::read_dir(fx.raw_dir()).unwrap().count();
    assert_eq!(entries, 2);
}
