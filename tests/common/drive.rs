//! Simulated Drive resumable-upload endpoint

use std::sync::{Arc, Mutex};
use std::time::Duration;

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Object ID returned when an upload completes
pub const OBJECT_ID: &str = "abc123";

#[derive(Default)]
struct SessionState {
    received: Vec<u8>,
    ranges: Vec<String>,
    metadata: Option<serde_json::Value>,
}

/// Resumable session that honours `Content-Range` and reports progress via `Range`
#[derive(Clone, Default)]
pub struct DriveSim {
    state: Arc<Mutex<SessionState>>,
    response_delay: Option<Duration>,
}

impl DriveSim {
    /// Hold every data response for `delay`, like a slow uplink
    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = Some(delay);
        self
    }

    /// Every byte the session accepted, in order
    pub fn received(&self) -> Vec<u8> {
        self.state.lock().unwrap().received.clone()
    }

    /// `Content-Range` headers of every data and status request
    pub fn ranges(&self) -> Vec<String> {
        self.state.lock().unwrap().ranges.clone()
    }

    /// File metadata sent when the session was opened
    pub fn metadata(&self) -> Option<serde_json::Value> {
        self.state.lock().unwrap().metadata.clone()
    }

    /// Mount the session-open endpoint and the session itself on `server`
    pub async fn mount(&self, server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "resumable"))
            .respond_with(SessionOpener {
                sim: self.clone(),
                location: format!("{}/upload/drive/v3/files?upload_id=e2e", server.uri()),
            })
            .mount(server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("upload_id", "e2e"))
            .respond_with(self.clone())
            .mount(server)
            .await;
    }
}

struct SessionOpener {
    sim: DriveSim,
    location: String,
}

impl Respond for SessionOpener {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let metadata: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        self.sim.state.lock().unwrap().metadata = Some(metadata);
        ResponseTemplate::new(200).insert_header("Location", self.location.as_str())
    }
}

impl Respond for DriveSim {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let template = self.accept(request);
        match self.response_delay {
            Some(delay) => template.set_delay(delay),
            None => template,
        }
    }
}

impl DriveSim {
    fn accept(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.state.lock().unwrap();
        let range = request
            .headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        state.ranges.push(range.clone());

        let (span, total) = range
            .strip_prefix("bytes ")
            .and_then(|r| r.split_once('/'))
            .unwrap();
        if span != "*" {
            let start: usize = span.split_once('-').unwrap().0.parse().unwrap();
            if start != state.received.len() {
                return ResponseTemplate::new(400).set_body_string("offset mismatch");
            }
            state.received.extend_from_slice(&request.body);
        }

        let received = state.received.len();
        if total.parse::<usize>().ok() == Some(received) {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": OBJECT_ID,
                "webViewLink": format!("https://drive.google.com/file/d/{OBJECT_ID}/view"),
            }))
        } else if received == 0 {
            ResponseTemplate::new(308)
        } else {
            ResponseTemplate::new(308).insert_header("Range", format!("bytes=0-{}", received - 1))
        }
    }
}
