use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{
    Method, RequestBuilder, Response, StatusCode, Url,
    multipart::{Form, Part},
};
use serde::de::DeserializeOwned;

use crate::{
    config::NetworkConfig,
    error::{ClientError, extract_detail},
    models::{
        AppointmentRecord, Credentials, MessageResponse, PatientInput, PredictionOutput,
        RecordKind, Registration, TokenResponse, UserProfile,
    },
    traits::RecordSource,
};

/// REST client for the OptoCom backend.
#[derive(Clone, Debug)]
pub struct OptoComClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl OptoComClient {
    /// Create a new API client with configurable timeouts.
    pub fn new(base_url: &str, network_config: &NetworkConfig) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url.trim())
            .map_err(|e| ClientError::InvalidInput(format!("base URL '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(network_config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(network_config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidInput(format!("endpoint '{}': {}", path, e)))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let url = self.endpoint(path)?;
        let builder = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Send and map non-success statuses to errors.
    ///
    /// A 401 on a call that carried a token means the session is gone; a 401
    /// without one (wrong password on login) is an ordinary backend error.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED && self.token.is_some() {
            return Err(ClientError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Backend {
            status,
            detail: extract_detail(&body),
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// `GET /health`; true when the backend answers with a success status.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let response = self
            .client
            .get(self.endpoint("health")?)
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    pub async fn register(&self, registration: &Registration) -> Result<(), ClientError> {
        let builder = self
            .client
            .post(self.endpoint("register")?)
            .json(registration);
        self.send(builder).await?;
        Ok(())
    }

    /// Exchange credentials for a bearer token. Does not store it.
    pub async fn login(&self, credentials: &Credentials) -> Result<String, ClientError> {
        let builder = self.client.post(self.endpoint("login")?).json(credentials);
        let response = self.send(builder).await?;
        let token: TokenResponse = Self::decode(response).await?;
        Ok(token.access_token)
    }

    pub async fn current_user(&self) -> Result<UserProfile, ClientError> {
        let response = self.send(self.request(Method::GET, "me")?).await?;
        Self::decode(response).await
    }

    /// Records of one kind whose appointment falls on `date`.
    pub async fn records_by_date(
        &self,
        kind: RecordKind,
        date: NaiveDate,
    ) -> Result<Vec<AppointmentRecord>, ClientError> {
        let path = format!("{}/date/{}", kind.listing_segment(), date.format("%Y-%m-%d"));
        let response = self.send(self.request(Method::GET, &path)?).await?;
        Self::decode(response).await
    }

    /// Upload a CSV as the `file` field of a multipart form.
    pub async fn upload_csv(
        &self,
        kind: RecordKind,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<MessageResponse, ClientError> {
        if file_name.trim().is_empty() {
            return Err(ClientError::InvalidInput("empty file name".to_string()));
        }

        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("text/csv")?;
        let form = Form::new().part("file", part);

        let builder = self
            .request(Method::POST, &format!("upload/{}", kind.as_str()))?
            .multipart(form);
        let response = self.send(builder).await?;
        let message: MessageResponse = Self::decode(response).await?;
        tracing::info!(%kind, file = file_name, "Uploaded CSV");
        Ok(message)
    }

    /// Raw bytes of the demo CSV for `kind`.
    pub async fn demo_csv(&self, kind: RecordKind) -> Result<Vec<u8>, ClientError> {
        let builder = self
            .client
            .get(self.endpoint(&format!("demo/csv/{}", kind.as_str()))?);
        let response = self.send(builder).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn predict(&self, input: &PatientInput) -> Result<PredictionOutput, ClientError> {
        let builder = self.request(Method::POST, "predict")?.json(input);
        let response = self.send(builder).await?;
        Self::decode(response).await
    }

    /// Delete every record belonging to the current user.
    pub async fn clear_data(&self) -> Result<MessageResponse, ClientError> {
        let response = self
            .send(self.request(Method::DELETE, "data/clear")?)
            .await?;
        Self::decode(response).await
    }
}

impl RecordSource for OptoComClient {
    async fn fetch_records(
        &self,
        kind: RecordKind,
        date: NaiveDate,
    ) -> Result<Vec<AppointmentRecord>, ClientError> {
        self.records_by_date(kind, date).await
    }
}
