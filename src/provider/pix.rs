//! PIX REST client: immediate-charge creation and charge detail.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{PixChargeCreated, PixChargeParams, PixProvider, ProviderError};

/// Credential bundle for the PIX provider API.
#[derive(Debug, Clone)]
pub struct PixCredentials {
    /// API base URL (sandbox or production host).
    pub base_url: String,
    /// OAuth bearer token.
    pub access_token: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// REST-backed [`PixProvider`].
#[derive(Debug, Clone)]
pub struct PixRestClient {
    http: reqwest::Client,
    credentials: PixCredentials,
}

#[derive(Debug, Deserialize)]
struct CobResponse {
    txid: String,
    status: String,
    calendario: CobCalendar,
    loc: CobLocation,
    #[serde(rename = "pixCopiaECola")]
    copy_paste: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CobCalendar {
    expiracao: i64,
    criacao: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CobLocation {
    location: String,
}

impl PixRestClient {
    /// Creates a client for the given credential bundle.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError::Request`] when the HTTP client
    /// cannot be constructed with the configured timeout.
    pub fn new(credentials: PixCredentials) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(credentials.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(Self { http, credentials })
    }
}

#[async_trait]
impl PixProvider for PixRestClient {
    async fn create_immediate_charge(
        &self,
        params: &PixChargeParams,
    ) -> Result<PixChargeCreated, ProviderError> {
        let body = serde_json::json!({
            "calendario": { "expiracao": params.expiration_secs },
            "devedor": { "cpf": params.payer_cpf, "nome": params.payer_name },
            "valor": { "original": params.amount },
            "chave": params.pix_key,
            "solicitacaoPagador": "pagamento de doacao",
        });

        let response = self
            .http
            .post(format!("{}/v2/cob", self.credentials.base_url))
            .bearer_auth(&self.credentials.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let cob: CobResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(PixChargeCreated {
            txid: cob.txid,
            status: cob.status,
            expiration_secs: cob.calendario.expiracao,
            // Some provider versions omit the copy-paste code and only
            // return the location URL.
            copy_paste: cob
                .copy_paste
                .unwrap_or_else(|| cob.loc.location.clone()),
            location: cob.loc.location,
            created_at: cob.calendario.criacao.unwrap_or_else(Utc::now),
            raw,
        })
    }

    async fn charge_detail(&self, txid: &str) -> Result<serde_json::Value, ProviderError> {
        let response = self
            .http
            .get(format!("{}/v2/cob/{txid}", self.credentials.base_url))
            .bearer_auth(&self.credentials.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}
