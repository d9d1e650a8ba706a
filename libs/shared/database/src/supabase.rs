use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

#[derive(Error, Debug)]
pub enum SupabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SupabaseError {
    fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => SupabaseError::Auth(body),
            404 => SupabaseError::NotFound(body),
            409 => SupabaseError::Conflict(body),
            code => SupabaseError::Api { status: code, message: body },
        }
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    /// Bearer used when the caller does not forward a user token.
    default_token: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            api_key: config.supabase_anon_key.clone(),
            default_token: None,
        }
    }

    /// Client acting as the backend itself, bypassing row level security.
    pub fn service_role(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            api_key: config.supabase_service_role_key.clone(),
            default_token: Some(config.supabase_service_role_key.clone()),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", header_value(&self.api_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token.or(self.default_token.as_deref()) {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, SupabaseError>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, SupabaseError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(SupabaseError::from_status(status, error_text));
        }

        let bytes = response.bytes().await?;
        let data = serde_json::from_slice::<T>(&bytes)?;
        Ok(data)
    }

    /// Uploads raw bytes to a storage bucket and returns the public URL of the object.
    pub async fn upload_object(
        &self,
        bucket: &str,
        object_path: &str,
        content_type: &str,
        bytes: Vec<u8>,
        auth_token: Option<&str>,
    ) -> Result<String, SupabaseError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, object_path);
        debug!("Uploading {} bytes to {}", bytes.len(), url);

        let mut headers = self.get_headers(auth_token)?;
        headers.insert(CONTENT_TYPE, header_value(content_type)?);

        let response = self.client.post(&url)
            .headers(headers)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("Storage upload failed ({}): {}", status, error_text);
            return Err(SupabaseError::from_status(status, error_text));
        }

        Ok(self.get_public_url(bucket, object_path))
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }

    pub fn get_public_url(&self, bucket: &str, object_path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, object_path)
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, SupabaseError> {
    HeaderValue::from_str(raw).map_err(|e| SupabaseError::InvalidHeader(e.to_string()))
}
