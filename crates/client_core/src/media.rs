//! Media-upload boundary: unsigned multipart image upload to a hosted
//! media API, returning the hosted secure URL.

use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::Deserialize;
use shared::error::{ClientError, ClientResult};
use tracing::debug;

use crate::transport_error;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    error: Option<UploadError>,
}

#[derive(Debug, Deserialize)]
struct UploadError {
    message: String,
}

pub struct MediaUploader {
    http: Client,
    base_url: String,
    cloud_name: String,
    upload_preset: String,
}

impl MediaUploader {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        cloud_name: impl Into<String>,
        upload_preset: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
        }
    }

    /// Uploads image bytes and returns the hosted secure URL. A failure
    /// surfaces as text; the caller keeps whatever URL it had before.
    pub async fn upload_image(&self, bytes: Vec<u8>, filename: &str) -> ClientResult<String> {
        let mime_type = mime_guess::from_path(filename)
            .first_raw()
            .unwrap_or("image/jpeg");
        debug!(filename, mime_type, size = bytes.len(), "media: uploading image");

        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|err| ClientError::validation(format!("unsupported image type: {err}")))?;
        let form = Form::new()
            .text("upload_preset", self.upload_preset.clone())
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/{}/image/upload", self.base_url, self.cloud_name))
            .multipart(form)
            .send()
            .await
            .map_err(|err| transport_error("image upload", err))?;

        let status = response.status();
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|err| ClientError::network(format!("invalid upload response: {err}")))?;

        if let Some(error) = body.error {
            return Err(ClientError::network(format!(
                "upload failed: {}",
                error.message
            )));
        }
        body.secure_url.ok_or_else(|| {
            ClientError::network(format!(
                "upload returned no secure URL (status {status})"
            ))
        })
    }
}
