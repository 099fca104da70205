//! Click Meter client: the single point of entry for tracking-link service calls.
//!
//! Callers are responsible for rate gating; this client issues exactly one HTTP
//! request per method call and never retries.
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://apiv2.clickmeter.com";
const AUTH_HEADER: &str = "X-Clickmeter-Authkey";
/// Datapoint type 0 is a tracking link.
const DATAPOINT_TYPE_TRACKING_LINK: u8 = 0;
const PERMANENT_REDIRECT: u16 = 301;

#[derive(Debug, Error)]
pub enum ClickMeterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("CLICK_METER_API_KEY is not configured")]
    MissingApiKey,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDatapointRequest<'a> {
    #[serde(rename = "type")]
    datapoint_type: u8,
    title: &'a str,
    name: &'a str,
    group_id: i64,
    #[serde(rename = "typeTL")]
    type_tl: TrackingLinkSpec<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackingLinkSpec<'a> {
    domain_id: i64,
    redirect_type: u16,
    url: &'a str,
}

/// Reference returned on creation.
#[derive(Debug, Clone, Deserialize)]
pub struct DatapointRef {
    pub id: i64,
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datapoint {
    pub id: i64,
    pub tracking_code: String,
    #[serde(rename = "typeTL")]
    pub type_tl: Option<DatapointTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatapointTarget {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(alias = "errorMessage")]
    message: String,
}

#[derive(Clone)]
pub struct ClickMeterClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ClickMeterClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ClickMeterError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// POST /datapoints: creates a tracking link redirecting to `destination_url`.
    pub async fn create_datapoint(
        &self,
        title: &str,
        group_id: i64,
        domain_id: i64,
        destination_url: &str,
    ) -> Result<DatapointRef, ClickMeterError> {
        let body = CreateDatapointRequest {
            datapoint_type: DATAPOINT_TYPE_TRACKING_LINK,
            title,
            name: title,
            group_id,
            type_tl: TrackingLinkSpec {
                domain_id,
                redirect_type: PERMANENT_REDIRECT,
                url: destination_url,
            },
        };
        let created: DatapointRef = self
            .send_json(self.request(Method::POST, "/datapoints")?.json(&body))
            .await?;
        debug!("Created datapoint {} ({})", created.id, created.uri);
        Ok(created)
    }

    /// GET /datapoints/{id}
    pub async fn get_datapoint(&self, id: i64) -> Result<Datapoint, ClickMeterError> {
        self.send_json(self.request(Method::GET, &format!("/datapoints/{id}"))?)
            .await
    }

    /// DELETE /datapoints/{id}
    pub async fn delete_datapoint(&self, id: i64) -> Result<(), ClickMeterError> {
        let response = self
            .request(Method::DELETE, &format!("/datapoints/{id}"))?
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClickMeterError> {
        let api_key = self.api_key.as_deref().ok_or(ClickMeterError::MissingApiKey)?;
        Ok(self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(AUTH_HEADER, api_key)
            .header("accept", "application/json"))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClickMeterError> {
        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClickMeterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = parse_error_message(response.text().await.unwrap_or_default());
    if status == StatusCode::NOT_FOUND {
        return Err(ClickMeterError::NotFound(message));
    }
    Err(ClickMeterError::Api {
        status: status.as_u16(),
        message,
    })
}

fn parse_error_message(body: String) -> String {
    serde_json::from_str::<ApiErrorBody>(&body)
        .map(|e| e.message)
        .unwrap_or(body)
}
