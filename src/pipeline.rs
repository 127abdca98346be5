//! Prompt-to-Drive orchestration
//!
//! One run is strictly linear: generate, resolve, fetch, upload. The first
//! failure ends the run; no step is retried across component boundaries.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::credentials::CredentialProvider;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::generation::VideoGenerator;
use crate::resolver;
use crate::types::{Event, StoredObjectRef, UploadTarget};
use crate::uploader::Uploader;
use crate::utils::default_file_name;

/// Event channel capacity
const EVENT_CAPACITY: usize = 1000;

/// Generates a video for a prompt and stores it in Drive
pub struct Pipeline {
    generator: Arc<dyn VideoGenerator>,
    fetcher: Fetcher,
    uploader: Uploader,
    default_mime_type: String,
    event_tx: broadcast::Sender<Event>,
}

impl Pipeline {
    /// Validate `config` and wire the components together
    pub fn new(
        config: Config,
        generator: Arc<dyn VideoGenerator>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        let fetcher = Fetcher::new(config.fetch, config.retry.clone(), credentials.clone())?;
        let default_mime_type = config.upload.default_mime_type.clone();
        let uploader =
            Uploader::new(config.upload, config.retry, credentials)?.with_events(event_tx.clone());

        Ok(Self {
            generator,
            fetcher,
            uploader,
            default_mime_type,
            event_tx,
        })
    }

    /// Subscribe to progress events of subsequent runs
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Run the whole pipeline for one prompt
    ///
    /// `name_hint` names the Drive file (an extension is added from the
    /// content type when missing); without it a name is derived from the
    /// prompt and the current time. `folder_id` selects the parent folder.
    pub async fn run(
        &self,
        prompt: &str,
        name_hint: Option<&str>,
        folder_id: Option<&str>,
    ) -> Result<StoredObjectRef> {
        tracing::info!(prompt = %prompt, "requesting video generation");
        self.emit(Event::GenerationRequested {
            prompt: prompt.to_string(),
        });
        let raw = self.generator.generate(prompt).await?;

        let descriptor = resolver::resolve(&raw)?;
        tracing::info!(
            uri = %descriptor.uri,
            mime_type = ?descriptor.mime_type,
            "generation result resolved"
        );
        self.emit(Event::Resolved {
            uri: descriptor.uri.clone(),
            mime_type: descriptor.mime_type.clone(),
        });

        let blob = self.fetcher.fetch(&descriptor).await?;
        self.emit(Event::FetchStarted {
            uri: descriptor.uri.clone(),
            total_bytes: blob.known_len(),
        });

        // The fetcher settles descriptor vs. response Content-Type
        let mime_type = blob
            .mime_type()
            .map(str::to_string)
            .unwrap_or_else(|| self.default_mime_type.clone());
        let name = match name_hint.map(str::trim).filter(|n| !n.is_empty()) {
            Some(hint) => hint.to_string(),
            None => default_file_name(prompt, Some(&mime_type), Utc::now()),
        };
        let target = UploadTarget::new(&name, folder_id.map(str::to_string), mime_type);

        let object = self.uploader.upload(blob, &target).await?;

        tracing::info!(
            object_id = %object.object_id,
            web_view_link = ?object.web_view_link,
            name = %target.name,
            "video stored"
        );
        self.emit(Event::Completed {
            object_id: object.object_id.clone(),
            web_view_link: object.web_view_link.clone(),
        });

        Ok(object)
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
