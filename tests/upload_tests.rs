//! Upload protocol integration tests
//!
//! Exercise the real HTTP transport and upload manager against a mock
//! server, covering both capability profiles, resume, retry, and
//! credential invalidation.

use std::sync::Arc;

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storycap::application::ports::{ClipStore, FrameStore, PairingGateway};
use storycap::application::upload::{UploadError, UploadManager, UploadOptions};
use storycap::domain::{Clip, ClipStatus, CompressedFrame, UploadStrategy, UploadTarget};
use storycap::infrastructure::{FilePairingStore, HttpTransport, InMemoryStores};

const FRAME_BYTES: usize = 1000;

/// Seed a ready clip whose compressed bytes are a deterministic pattern.
async fn seed_clip(stores: &InMemoryStores, clip_id: &str, total: usize) -> Vec<u8> {
    let content: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();

    let mut clip = Clip::new(clip_id, "integration clip", 48000, 1, 0);
    clip.status = ClipStatus::Ready;
    clip.size_bytes = total as u64;
    clip.digest = "0123456789abcdef0123456789abcdef".to_string();
    clip.filename = "integration_clip__20250101-0000.ogg".to_string();
    ClipStore::put(stores, &clip).await.unwrap();

    for (seq, chunk) in content.chunks(FRAME_BYTES).enumerate() {
        FrameStore::append(
            stores,
            CompressedFrame::new(clip_id, seq as u64, (seq * FRAME_BYTES) as u64, chunk.to_vec()),
        )
        .await
        .unwrap();
    }

    content
}

fn manager(
    stores: &Arc<InMemoryStores>,
    pairing: &Arc<FilePairingStore>,
    chunk_bytes: u64,
) -> UploadManager<HttpTransport, InMemoryStores, InMemoryStores, InMemoryStores, FilePairingStore>
{
    UploadManager::new(
        HttpTransport::new(),
        Arc::clone(stores),
        Arc::clone(stores),
        Arc::clone(stores),
        Some(Arc::clone(pairing)),
        UploadOptions {
            chunk_bytes,
            max_file_bytes: 50 * 1024 * 1024,
        },
    )
}

fn temp_pairing() -> (Arc<FilePairingStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    (
        Arc::new(FilePairingStore::with_path(dir.path().join("device.toml"))),
        dir,
    )
}

/// Byte ranges of the PUT requests a server received, with their bodies.
async fn received_ranges(server: &MockServer) -> Vec<(u64, u64, Vec<u8>)> {
    let mut ranges = Vec::new();
    for request in server.received_requests().await.unwrap() {
        if request.method.as_str() != "PUT" {
            continue;
        }
        if let Some(value) = request.headers.get("content-range") {
            let value = value.to_str().unwrap();
            // "bytes a-b/total"
            let spec = value.trim_start_matches("bytes ");
            let (range, _total) = spec.split_once('/').unwrap();
            let (start, end_inclusive) = range.split_once('-').unwrap();
            ranges.push((
                start.parse().unwrap(),
                end_inclusive.parse::<u64>().unwrap() + 1,
                request.body.clone(),
            ));
        }
    }
    ranges
}

#[tokio::test]
async fn byte_range_upload_resumes_from_server_offset() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/upload"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("accept-ranges", "bytes")
                .insert_header("x-upload-offset", "4096"),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let stores = Arc::new(InMemoryStores::new());
    let content = seed_clip(&stores, "clip-1", 10000).await;
    let (pairing, _dir) = temp_pairing();
    let mgr = manager(&stores, &pairing, 4096);

    let target = UploadTarget::new(format!("{}/upload", server.uri()));
    let outcome = mgr.upload("clip-1", &target, None).await.unwrap();

    assert_eq!(outcome.strategy, UploadStrategy::ByteRange);
    assert_eq!(outcome.offset, 10000);

    // exactly [4096, 10000) went over the wire, byte-for-byte
    let ranges = received_ranges(&server).await;
    assert_eq!(ranges.len(), 2);
    assert_eq!((ranges[0].0, ranges[0].1), (4096, 8192));
    assert_eq!((ranges[1].0, ranges[1].1), (8192, 10000));
    for (start, end, body) in ranges {
        assert_eq!(body, content[start as usize..end as usize].to_vec());
    }
}

#[tokio::test]
async fn interrupted_byte_range_upload_resumes_where_it_stopped() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).insert_header("accept-ranges", "bytes"))
        .mount(&server)
        .await;
    // first chunk lands, everything after fails until the "restart"
    Mock::given(method("PUT"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let stores = Arc::new(InMemoryStores::new());
    let _content = seed_clip(&stores, "clip-1", 10000).await;
    let (pairing, _dir) = temp_pairing();
    let mgr = manager(&stores, &pairing, 4096);
    let target = UploadTarget::new(format!("{}/upload", server.uri()));

    let err = mgr.upload("clip-1", &target, None).await.unwrap_err();
    match err {
        UploadError::Transient { offset, total, .. } => {
            assert_eq!(offset, 4096);
            assert_eq!(total, 10000);
        }
        other => panic!("expected Transient, got {:?}", other),
    }
    let first_run = received_ranges(&server).await;
    assert_eq!((first_run[0].0, first_run[0].1), (0, 4096));

    // server recovers; a fresh manager resumes from the checkpoint,
    // not from zero and not past it
    server.reset().await;
    Mock::given(method("HEAD"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).insert_header("accept-ranges", "bytes"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mgr = manager(&stores, &pairing, 4096);
    let outcome = mgr.upload("clip-1", &target, None).await.unwrap();
    assert_eq!(outcome.offset, 10000);

    let second_run = received_ranges(&server).await;
    assert_eq!((second_run[0].0, second_run[0].1), (4096, 8192));

    // both runs together cover the file exactly once
    let mut covered: Vec<(u64, u64)> = first_run
        .iter()
        .chain(second_run.iter())
        .map(|(s, e, _)| (*s, *e))
        .collect();
    covered.sort_unstable();
    let mut cursor = 0;
    for (start, end) in covered {
        assert_eq!(start, cursor, "gap or overlap at {}", start);
        cursor = end;
    }
    assert_eq!(cursor, 10000);
}

#[tokio::test]
async fn transient_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).insert_header("accept-ranges", "bytes"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let stores = Arc::new(InMemoryStores::new());
    seed_clip(&stores, "clip-1", 3000).await;
    let (pairing, _dir) = temp_pairing();
    let mgr = manager(&stores, &pairing, 4096);

    let target = UploadTarget::new(format!("{}/upload", server.uri()));
    let outcome = mgr.upload("clip-1", &target, None).await.unwrap();
    assert_eq!(outcome.offset, 3000);
}

#[tokio::test]
async fn session_upload_runs_init_chunks_finish() {
    let server = MockServer::start().await;
    // no Accept-Ranges on the probe -> session profile
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/init"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"uploadId": "u-42"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/chunk"))
        .and(query_param("uploadId", "u-42"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/finish"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let stores = Arc::new(InMemoryStores::new());
    seed_clip(&stores, "clip-1", 5000).await;
    let (pairing, _dir) = temp_pairing();
    let mgr = manager(&stores, &pairing, 2000);

    let target = UploadTarget::new(server.uri());
    let outcome = mgr.upload("clip-1", &target, None).await.unwrap();
    assert_eq!(outcome.strategy, UploadStrategy::Session);
    assert_eq!(outcome.offset, 5000);

    // offsets 0, 2000, 4000 were sent, then finish
    let requests = server.received_requests().await.unwrap();
    let chunk_offsets: Vec<String> = requests
        .iter()
        .filter(|r| r.url.path() == "/chunk")
        .map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "offset")
                .map(|(_, v)| v.to_string())
                .unwrap()
        })
        .collect();
    assert_eq!(chunk_offsets, vec!["0", "2000", "4000"]);
    assert!(requests.iter().any(|r| r.url.path() == "/finish"));
}

#[tokio::test]
async fn unauthorized_chunk_invalidates_pairing_and_stops() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/init"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"uploadId": "u-7"})),
        )
        .mount(&server)
        .await;
    // third chunk (offset 2000) rejects the token
    Mock::given(method("PUT"))
        .and(path("/chunk"))
        .and(query_param("offset", "2000"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/chunk"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let stores = Arc::new(InMemoryStores::new());
    seed_clip(&stores, "clip-1", 5000).await;
    let (pairing, _dir) = temp_pairing();
    pairing
        .save_pairing(&server.uri(), "stale-token", None)
        .await
        .unwrap();
    let mgr = manager(&stores, &pairing, 1000);

    let target = pairing.current_target().await.unwrap().unwrap();
    let err = mgr.upload("clip-1", &target, None).await.unwrap_err();
    assert!(matches!(err, UploadError::Unauthorized));

    // credential gone: the caller is forced to re-pair
    assert!(pairing.current_target().await.unwrap().is_none());

    // the bearer token was actually on the wire
    let requests = server.received_requests().await.unwrap();
    let authed = requests
        .iter()
        .filter(|r| r.url.path() == "/chunk")
        .all(|r| {
            r.headers
                .get("authorization")
                .map(|v| v.to_str().unwrap().contains("stale-token"))
                .unwrap_or(false)
        });
    assert!(authed);
}

#[tokio::test]
async fn rejected_upload_surfaces_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("accept-ranges", "bytes"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(413).set_body_string("too large"))
        .mount(&server)
        .await;

    let stores = Arc::new(InMemoryStores::new());
    seed_clip(&stores, "clip-1", 2000).await;
    let (pairing, _dir) = temp_pairing();
    let mgr = manager(&stores, &pairing, 4096);

    let target = UploadTarget::new(format!("{}/upload", server.uri()));
    let err = mgr.upload("clip-1", &target, None).await.unwrap_err();
    assert!(matches!(err, UploadError::Rejected(_)));

    // one PUT, no retries
    let puts = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .count();
    assert_eq!(puts, 1);
}
