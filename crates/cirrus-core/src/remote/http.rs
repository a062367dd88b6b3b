//! HTTP implementation of the CloudNotes API client.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;

use super::NotesApi;
use crate::error::{Error, Result};
use crate::models::{LocalNote, RemoteNote};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// The root path of the CloudNotes service.
const SERVICE_PATH: &str = "index.php/apps/notes/api/v0.2";

/// Reqwest-based client for the CloudNotes REST service.
#[derive(Clone)]
pub struct HttpNotesClient {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl HttpNotesClient {
    /// Create a client for a server.
    ///
    /// The server url must include `http://` or `https://`; a trailing slash
    /// is trimmed.
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let base_url = normalize_server_url(server_url.into())?;
        Ok(Self {
            base_url,
            username: username.into(),
            password: password.into(),
            client: reqwest::Client::builder().build()?,
        })
    }

    /// Service url for the notes collection or a single note.
    ///
    /// Examples:
    ///
    /// ```text
    /// https://cloud.example.org/index.php/apps/notes/api/v0.2/notes
    /// https://cloud.example.org/index.php/apps/notes/api/v0.2/notes/238
    /// ```
    fn notes_url(&self, id: Option<i64>) -> String {
        match id {
            Some(id) => format!("{}/{SERVICE_PATH}/notes/{id}", self.base_url),
            None => format!("{}/{SERVICE_PATH}/notes", self.base_url),
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Request fields sent for create and update.
    fn note_params(note: &LocalNote) -> [(&'static str, String); 3] {
        [
            ("content", note.content.clone()),
            ("category", note.category.clone()),
            (
                "favorite",
                if note.favorite { "true" } else { "false" }.to_string(),
            ),
        ]
    }
}

#[async_trait]
impl NotesApi for HttpNotesClient {
    async fn list(&self) -> Result<Vec<RemoteNote>> {
        let response = self
            .request(reqwest::Method::GET, self.notes_url(None))
            .send()
            .await?;
        let response = validate(response).await?;
        Ok(response.json::<Vec<RemoteNote>>().await?)
    }

    async fn create(&self, note: &LocalNote) -> Result<RemoteNote> {
        let response = self
            .request(reqwest::Method::POST, self.notes_url(None))
            .form(&Self::note_params(note))
            .send()
            .await?;
        let response = validate(response).await?;
        decode_note(response).await
    }

    async fn update(&self, note: &LocalNote) -> Result<RemoteNote> {
        let remote_id = note.remote_id.filter(|id| *id > 0).ok_or(Error::MissingRemoteId)?;

        let response = self
            .request(reqwest::Method::PUT, self.notes_url(Some(remote_id)))
            .form(&Self::note_params(note))
            .send()
            .await?;
        let response = validate(response).await?;
        decode_note(response).await
    }

    async fn delete(&self, remote_note_id: i64) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, self.notes_url(Some(remote_note_id)))
            .send()
            .await?;

        // The note being gone already is the outcome we wanted.
        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!(
                remote_note_id,
                "Remote note is already deleted, treating as success"
            );
            return Ok(());
        }

        validate(response).await?;
        Ok(())
    }

    async fn check(&self) -> Result<()> {
        let response = self
            .request(reqwest::Method::GET, self.notes_url(None))
            .query(&[("exclude", "title,content,category,favorite,modified")])
            .send()
            .await?;
        validate(response).await?;
        Ok(())
    }
}

/// Pass through successful responses, turn everything else into a typed
/// server error with a readable message.
async fn validate(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        message: parse_api_error(&body, status),
    })
}

/// Decode a remote note from a create/update response body.
async fn decode_note(response: Response) -> Result<RemoteNote> {
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Err(Error::MissingRemoteNoteInResponse);
    }
    Ok(serde_json::from_str(&body)?)
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(body: &str, status: StatusCode) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        compact_text(trimmed)
    }
}

fn normalize_server_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw)).ok_or_else(|| {
        Error::InvalidConfiguration("server url must not be empty".to_string())
    })?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidConfiguration(
            "server url must include http:// or https://".to_string(),
        ))
    }
}
