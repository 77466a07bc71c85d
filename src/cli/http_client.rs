use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl ApiClient {
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        // Bulk pushes carry every file inline, so allow generous request times.
        let client = Client::builder().timeout(Duration::from_secs(300)).build()?;
        Ok(Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<T> {
        let url = format!("{}/api/v1{}", self.base_url, path);
        let resp = self.client.post(&url).json(body).send().await?;
        Self::handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(resp: Response) -> anyhow::Result<T> {
        if resp.status().is_success() {
            let api_resp: ApiResponse<T> = resp.json().await?;
            api_resp
                .data
                .ok_or_else(|| anyhow::anyhow!("Server returned an empty response"))
        } else {
            let status = resp.status();
            let api_resp: ApiResponse<()> = resp
                .json()
                .await
                .unwrap_or(ApiResponse { data: None, error: None });
            Err(anyhow::anyhow!(api_resp.error.unwrap_or_else(|| {
                format!("Server error {status} (no details provided)")
            })))
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
