// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::credentials::StaticCredentials;
use crate::error::Error;
use futures::stream;
use std::sync::Mutex;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const CHUNK: usize = crate::config::CHUNK_ALIGNMENT;

/// Server-side state of a simulated resumable session
#[derive(Default)]
struct DriveState {
    received: Vec<u8>,
    ranges: Vec<String>,
    /// Accept only this many bytes of the next data request
    accept_limit: Option<usize>,
    /// Answer this many upcoming requests with 500
    fail_next: u32,
    /// Hold the next response this long
    delay_next: Option<Duration>,
}

/// Minimal resumable-upload endpoint that honours Content-Range
#[derive(Clone, Default)]
struct DriveSim {
    state: Arc<Mutex<DriveState>>,
}

impl DriveSim {
    fn received(&self) -> Vec<u8> {
        self.state.lock().unwrap().received.clone()
    }

    fn ranges(&self) -> Vec<String> {
        self.state.lock().unwrap().ranges.clone()
    }

    fn with_state(self, f: impl FnOnce(&mut DriveState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }
}

/// Parse `bytes a-b/T`, `bytes */T`, or the `*` total forms
fn parse_content_range(value: &str) -> (Option<usize>, Option<usize>) {
    let rest = value.strip_prefix("bytes ").unwrap();
    let (range, total) = rest.split_once('/').unwrap();
    let start = (range != "*").then(|| range.split_once('-').unwrap().0.parse().unwrap());
    let total = (total != "*").then(|| total.parse().unwrap());
    (start, total)
}

impl Respond for DriveSim {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.state.lock().unwrap();
        let range = request
            .headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        state.ranges.push(range.clone());

        let template = if state.fail_next > 0 {
            state.fail_next -= 1;
            ResponseTemplate::new(500).set_body_string("backend error")
        } else {
            let (start, total) = parse_content_range(&range);
            match start {
                Some(start) if start != state.received.len() => {
                    ResponseTemplate::new(400).set_body_string("offset mismatch")
                }
                _ => {
                    let mut body = request.body.clone();
                    if start.is_some() {
                        if let Some(limit) = state.accept_limit.take() {
                            body.truncate(limit);
                        }
                    }
                    state.received.extend_from_slice(&body);

                    if total == Some(state.received.len()) {
                        ResponseTemplate::new(200).set_body_json(serde_json::json!({
                            "id": "abc123",
                            "webViewLink": "https://drive.google.com/file/d/abc123/view",
                        }))
                    } else if state.received.is_empty() {
                        ResponseTemplate::new(308)
                    } else {
                        ResponseTemplate::new(308)
                            .insert_header("Range", format!("bytes=0-{}", state.received.len() - 1))
                    }
                }
            }
        };

        match state.delay_next.take() {
            Some(delay) => template.set_delay(delay),
            None => template,
        }
    }
}

fn test_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

fn test_config(endpoint: &str) -> UploadConfig {
    UploadConfig {
        endpoint: endpoint.to_string(),
        chunk_size: CHUNK,
        error_body_limit: 64,
        ..Default::default()
    }
}

fn test_uploader(config: UploadConfig) -> Uploader {
    let credentials = Arc::new(StaticCredentials::new(Some("drive-token".into()), None));
    Uploader::new(config, test_retry(), credentials).unwrap()
}

fn video_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Blob of unknown length delivered in uneven pieces
fn streamed_blob(data: &[u8]) -> ContentBlob {
    let pieces: Vec<Result<Bytes>> = data
        .chunks(100_000)
        .map(|p| Ok(Bytes::copy_from_slice(p)))
        .collect();
    ContentBlob::from_stream(stream::iter(pieces), None)
}

fn target() -> UploadTarget {
    UploadTarget::new("clip", Some("folder1".into()), "video/mp4")
}

/// Mount the session-open endpoint and the simulated session behind it
async fn mount_drive(mock_server: &MockServer, sim: DriveSim) {
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "resumable"))
        .respond_with(ResponseTemplate::new(200).insert_header(
            "Location",
            format!(
                "{}/upload/drive/v3/files?uploadType=resumable&upload_id=sess1",
                mock_server.uri()
            ),
        ))
        .mount(mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("upload_id", "sess1"))
        .respond_with(sim)
        .mount(mock_server)
        .await;
}

// Session opening

#[tokio::test]
async fn test_session_request_carries_metadata_and_headers() {
    let mock_server = MockServer::start().await;
    let sim = DriveSim::default();

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "resumable"))
        .and(query_param("supportsAllDrives", "true"))
        .and(header("authorization", "Bearer drive-token"))
        .and(header("x-upload-content-type", "video/mp4"))
        .and(header("x-upload-content-length", "10"))
        .and(body_json(serde_json::json!({
            "name": "clip.mp4",
            "mimeType": "video/mp4",
            "parents": ["folder1"],
        })))
        .respond_with(ResponseTemplate::new(200).insert_header(
            "Location",
            format!("{}/upload/drive/v3/files?upload_id=sess1", mock_server.uri()),
        ))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(query_param("upload_id", "sess1"))
        .respond_with(sim.clone())
        .mount(&mock_server)
        .await;

    let uploader = test_uploader(test_config(&mock_server.uri()));
    let object = uploader
        .upload(ContentBlob::from_bytes(video_bytes(10)), &target())
        .await
        .unwrap();

    assert_eq!(object.object_id, "abc123");
    assert_eq!(sim.ranges(), vec!["bytes 0-9/10"]);
}

#[tokio::test]
async fn test_session_without_folder_omits_parents() {
    let mock_server = MockServer::start().await;
    let sim = DriveSim::default();

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(body_json(serde_json::json!({
            "name": "clip.mp4",
            "mimeType": "video/mp4",
        })))
        .respond_with(ResponseTemplate::new(200).insert_header(
            "Location",
            format!("{}/upload/drive/v3/files?upload_id=sess1", mock_server.uri()),
        ))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(sim.clone())
        .mount(&mock_server)
        .await;

    let uploader = test_uploader(test_config(&mock_server.uri()));
    let target = UploadTarget::new("clip", None, "video/mp4");
    uploader
        .upload(ContentBlob::from_bytes(video_bytes(3)), &target)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_session_is_init_error_without_data_requests() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("File not found: folder1"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let uploader = test_uploader(test_config(&mock_server.uri()));
    let err = uploader
        .upload(ContentBlob::from_bytes(video_bytes(10)), &target())
        .await
        .unwrap_err();

    match err {
        Error::Upload(UploadError::Init { status, body }) => {
            assert_eq!(status, Some(404));
            assert!(body.contains("folder1"));
        }
        other => panic!("expected init error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_session_open_retries_server_errors() {
    let mock_server = MockServer::start().await;
    let sim = DriveSim::default();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_drive(&mock_server, sim.clone()).await;

    let uploader = test_uploader(test_config(&mock_server.uri()));
    let object = uploader
        .upload(ContentBlob::from_bytes(video_bytes(10)), &target())
        .await
        .unwrap();

    assert_eq!(object.object_id, "abc123");
    assert_eq!(sim.received(), video_bytes(10));
}

#[tokio::test]
async fn test_session_response_without_location_is_init_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let uploader = test_uploader(test_config(&mock_server.uri()));
    let err = uploader
        .upload(ContentBlob::from_bytes(video_bytes(10)), &target())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Upload(UploadError::Init {
            status: Some(200),
            ..
        })
    ));
}

#[tokio::test]
async fn test_missing_drive_credential_fails_before_network() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let credentials = Arc::new(StaticCredentials::new(None, Some("gcs-token".into())));
    let uploader =
        Uploader::new(test_config(&mock_server.uri()), test_retry(), credentials).unwrap();
    let err = uploader
        .upload(ContentBlob::from_bytes(video_bytes(10)), &target())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Credential(_)));
}

// Chunk loop

#[tokio::test]
async fn test_payload_sizes_round_trip_with_known_and_unknown_length() {
    let sizes = [0, 1, CHUNK - 1, CHUNK, CHUNK + 1, 3 * CHUNK + 123];

    for size in sizes {
        for known in [true, false] {
            let mock_server = MockServer::start().await;
            let sim = DriveSim::default();
            mount_drive(&mock_server, sim.clone()).await;

            let data = video_bytes(size);
            let blob = if known {
                ContentBlob::from_bytes(data.clone())
            } else {
                streamed_blob(&data)
            };

            let uploader = test_uploader(test_config(&mock_server.uri()));
            let object = uploader.upload(blob, &target()).await.unwrap();

            assert_eq!(object.object_id, "abc123", "size {size}, known {known}");
            assert_eq!(sim.received(), data, "size {size}, known {known}");

            let ranges = sim.ranges();
            let last = ranges.last().unwrap();
            assert!(
                last.ends_with(&format!("/{size}")),
                "final request must declare the total: {last} (size {size}, known {known})"
            );
        }
    }
}

#[tokio::test]
async fn test_chunks_are_sized_and_contiguous() {
    let mock_server = MockServer::start().await;
    let sim = DriveSim::default();
    mount_drive(&mock_server, sim.clone()).await;

    let size = 2 * CHUNK + 10;
    let uploader = test_uploader(test_config(&mock_server.uri()));
    uploader
        .upload(ContentBlob::from_bytes(video_bytes(size)), &target())
        .await
        .unwrap();

    assert_eq!(
        sim.ranges(),
        vec![
            format!("bytes 0-{}/{size}", CHUNK - 1),
            format!("bytes {}-{}/{size}", CHUNK, 2 * CHUNK - 1),
            format!("bytes {}-{}/{size}", 2 * CHUNK, size - 1),
        ]
    );
}

#[tokio::test]
async fn test_unknown_length_declares_total_only_on_last_chunk() {
    let mock_server = MockServer::start().await;
    let sim = DriveSim::default();
    mount_drive(&mock_server, sim.clone()).await;

    let size = CHUNK + 5;
    let uploader = test_uploader(test_config(&mock_server.uri()));
    uploader
        .upload(streamed_blob(&video_bytes(size)), &target())
        .await
        .unwrap();

    assert_eq!(
        sim.ranges(),
        vec![
            format!("bytes 0-{}/*", CHUNK - 1),
            format!("bytes {}-{}/{size}", CHUNK, size - 1),
        ]
    );
}

#[tokio::test]
async fn test_partial_acceptance_resends_from_reported_offset() {
    let mock_server = MockServer::start().await;
    let sim = DriveSim::default().with_state(|s| s.accept_limit = Some(100));
    mount_drive(&mock_server, sim.clone()).await;

    let size = CHUNK + 50;
    let data = video_bytes(size);
    let uploader = test_uploader(test_config(&mock_server.uri()));
    let object = uploader
        .upload(ContentBlob::from_bytes(data.clone()), &target())
        .await
        .unwrap();

    assert_eq!(object.object_id, "abc123");
    assert_eq!(sim.received(), data);

    let ranges = sim.ranges();
    assert_eq!(ranges[0], format!("bytes 0-{}/{size}", CHUNK - 1));
    assert!(
        ranges[1].starts_with("bytes 100-"),
        "second request must start at the acknowledged offset: {}",
        ranges[1]
    );
}

#[tokio::test]
async fn test_transient_chunk_failure_is_retried() {
    let mock_server = MockServer::start().await;
    let sim = DriveSim::default().with_state(|s| s.fail_next = 1);
    mount_drive(&mock_server, sim.clone()).await;

    let data = video_bytes(CHUNK + 1);
    let uploader = test_uploader(test_config(&mock_server.uri()));
    uploader
        .upload(ContentBlob::from_bytes(data.clone()), &target())
        .await
        .unwrap();

    assert_eq!(sim.received(), data);
    let ranges = sim.ranges();
    assert_eq!(ranges[0], ranges[1], "failed chunk is resent unchanged");
}

#[tokio::test]
async fn test_exhausted_chunk_retries_fail_with_status_and_offset() {
    let mock_server = MockServer::start().await;
    let sim = DriveSim::default().with_state(|s| s.fail_next = u32::MAX);
    mount_drive(&mock_server, sim.clone()).await;

    let uploader = test_uploader(test_config(&mock_server.uri()));
    let err = uploader
        .upload(ContentBlob::from_bytes(video_bytes(CHUNK)), &target())
        .await
        .unwrap_err();

    match err {
        Error::Upload(UploadError::Chunk {
            status,
            body,
            offset,
        }) => {
            assert_eq!(status, Some(500));
            assert_eq!(body, "backend error");
            assert_eq!(offset, 0);
        }
        other => panic!("expected chunk error, got {other:?}"),
    }
    // Initial attempt plus max_attempts retries
    assert_eq!(sim.ranges().len(), 3);
}

#[tokio::test]
async fn test_no_progress_acknowledgements_back_off_then_fail() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).insert_header(
            "Location",
            format!(
                "{}/upload/drive/v3/files?upload_id=stuck",
                mock_server.uri()
            ),
        ))
        .mount(&mock_server)
        .await;
    // 308 without a Range header: nothing was kept
    Mock::given(method("PUT"))
        .and(query_param("upload_id", "stuck"))
        .respond_with(ResponseTemplate::new(308))
        .expect(3)
        .mount(&mock_server)
        .await;

    let (tx, mut rx) = broadcast::channel(64);
    let uploader = test_uploader(test_config(&mock_server.uri())).with_events(tx);
    let started = std::time::Instant::now();
    let err = uploader
        .upload(ContentBlob::from_bytes(video_bytes(CHUNK)), &target())
        .await
        .unwrap_err();

    match err {
        Error::Upload(UploadError::Chunk { status, offset, .. }) => {
            assert_eq!(status, Some(308));
            assert_eq!(offset, 0);
        }
        other => panic!("expected chunk error, got {other:?}"),
    }
    // 10ms then 20ms between the three attempts
    assert!(started.elapsed() >= Duration::from_millis(30));

    let retries: Vec<u32> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|e| match e {
            Event::ChunkRetry { attempt, .. } => Some(attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2]);
}

#[tokio::test]
async fn test_lost_response_queries_status_before_resending() {
    let mock_server = MockServer::start().await;
    let sim = DriveSim::default().with_state(|s| s.delay_next = Some(Duration::from_secs(2)));
    mount_drive(&mock_server, sim.clone()).await;

    let config = UploadConfig {
        request_timeout: Duration::from_millis(300),
        ..test_config(&mock_server.uri())
    };
    let data = video_bytes(64);
    let uploader = test_uploader(config);
    let object = uploader
        .upload(ContentBlob::from_bytes(data.clone()), &target())
        .await
        .unwrap();

    assert_eq!(object.object_id, "abc123");
    // The first PUT landed server-side; the status query finds it complete
    assert_eq!(sim.received(), data);
    assert_eq!(sim.ranges(), vec!["bytes 0-63/64", "bytes */64"]);
}

#[tokio::test]
async fn test_progress_and_retry_events() {
    let mock_server = MockServer::start().await;
    let sim = DriveSim::default().with_state(|s| s.fail_next = 1);
    mount_drive(&mock_server, sim.clone()).await;

    let (tx, mut rx) = broadcast::channel(64);
    let uploader = test_uploader(test_config(&mock_server.uri())).with_events(tx);
    let size = 2 * CHUNK + 1;
    uploader
        .upload(ContentBlob::from_bytes(video_bytes(size)), &target())
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(&events[0], Event::UploadStarted { name } if name == "clip.mp4"));
    assert!(matches!(
        &events[1],
        Event::ChunkRetry {
            offset: 0,
            attempt: 1,
            ..
        }
    ));

    let progress: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            Event::UploadProgress { bytes_sent, .. } => Some(*bytes_sent),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![CHUNK as u64, 2 * CHUNK as u64]);
}

#[tokio::test]
async fn test_invalid_completion_body_is_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).insert_header(
            "Location",
            format!("{}/upload/drive/v3/files?upload_id=sess1", mock_server.uri()),
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let uploader = test_uploader(test_config(&mock_server.uri()));
    let err = uploader
        .upload(ContentBlob::from_bytes(video_bytes(10)), &target())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Upload(UploadError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_short_stream_aborts_without_finalizing() {
    let mock_server = MockServer::start().await;
    let sim = DriveSim::default();
    mount_drive(&mock_server, sim.clone()).await;

    let pieces: Vec<Result<Bytes>> = vec![Ok(Bytes::from(video_bytes(10)))];
    let blob = ContentBlob::from_stream(stream::iter(pieces), Some(20));

    let uploader = test_uploader(test_config(&mock_server.uri()));
    let err = uploader.upload(blob, &target()).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Fetch(crate::error::FetchError::LengthMismatch {
            expected: 20,
            actual: 10
        })
    ));
    assert!(sim.ranges().is_empty(), "no chunk is sent for a truncated stream");
}
