//! Upstream platform client: envelope decoding, vendor endpoints, and the
//! failure taxonomy the refresh pipeline branches on.

use std::fmt;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::config;
use crate::storage::Store;

// === Failure taxonomy ===

/// Why an upstream vendor fetch failed. Callers branch on the variant:
/// maintenance waits, vendor-not-found skips the vendor, the rest abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Transport-level failure or an empty/undecodable body
    NoResponse,
    /// The platform is in maintenance mode (envelope code 5)
    Maintenance,
    /// The vendor is not currently available (envelope code 1627)
    VendorNotFound(u32),
    /// Any other non-success envelope code
    Api { code: i64 },
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::NoResponse => write!(f, "no response from upstream"),
            UpstreamError::Maintenance => write!(f, "upstream is in maintenance mode"),
            UpstreamError::VendorNotFound(hash) => {
                write!(f, "vendor {} not found upstream", hash)
            }
            UpstreamError::Api { code } => write!(f, "upstream error code {}", code),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Result of the lightweight pre-flight availability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Ok,
    Maintenance,
    NoResponse,
}

// === Wire types ===

/// Standard platform response envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "ErrorCode")]
    pub error_code: i64,
    #[serde(rename = "Response")]
    pub response: Option<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentSingle<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentMap<T> {
    #[serde(default)]
    pub data: HashMap<String, T>,
}

/// Vendor metadata component (component 400).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorComponent {
    pub vendor_hash: u32,
    #[serde(default)]
    pub next_refresh_date: Option<String>,
    #[serde(default)]
    pub vendor_location_index: Option<i64>,
    #[serde(default)]
    pub enabled: bool,
}

/// One sale listing (component 402). Keyed upstream by a listing index.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleComponent {
    pub item_hash: u32,
    #[serde(default)]
    pub costs: Vec<RawCost>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCost {
    pub item_hash: u32,
    pub quantity: i64,
}

/// Per-listing instanced stats (component 304).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsComponent {
    #[serde(default)]
    pub stats: HashMap<String, RawStat>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStat {
    pub stat_hash: u32,
    pub value: i32,
}

/// Per-listing socket state (component 305).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SocketsComponent {
    #[serde(default)]
    pub sockets: Vec<RawSocket>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSocket {
    /// Absent for empty sockets; such sockets carry no perk and are skipped
    #[serde(default)]
    pub plug_hash: Option<u32>,
    #[serde(default)]
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemComponents {
    #[serde(default)]
    pub stats: ComponentMap<StatsComponent>,
    #[serde(default)]
    pub sockets: ComponentMap<SocketsComponent>,
}

/// Decoded body of a single-vendor fetch for one character.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorResponse {
    #[serde(default)]
    pub vendor: ComponentSingle<VendorComponent>,
    #[serde(default)]
    pub sales: ComponentMap<SaleComponent>,
    #[serde(default)]
    pub item_components: ItemComponents,
}

// === Session context ===

/// Everything a vendor fetch needs about the operator's linked account.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub access_token: String,
    pub membership_id: i64,
    pub membership_type: i32,
    pub character_ids: Vec<i64>,
}

impl SessionContext {
    /// Assemble the session from the stored operator token and profile.
    pub fn load(store: &Store) -> Result<Self> {
        let admin = config::admin_discord_id();
        let token = store
            .find_token(admin)?
            .with_context(|| format!("no stored token for operator {}", admin))?;
        let profile = store
            .find_member_profile(admin)?
            .with_context(|| format!("no stored profile for operator {}", admin))?;
        if profile.character_ids.is_empty() {
            bail!("operator profile has no characters");
        }
        Ok(Self {
            access_token: token.access_token,
            membership_id: profile.destiny_membership_id,
            membership_type: profile.membership_type,
            character_ids: profile.character_ids,
        })
    }
}

// === Client seam ===

/// Upstream API surface, split out so tests can script responses.
#[async_trait]
pub trait VendorApi: Send + Sync {
    /// Lightweight availability probe against the vendors endpoint.
    async fn probe(&self, session: &SessionContext) -> ProbeStatus;

    /// Full component fetch for one vendor as seen by one character.
    async fn get_vendor(
        &self,
        session: &SessionContext,
        character_id: i64,
        vendor_hash: u32,
    ) -> Result<VendorResponse, UpstreamError>;

    /// Download a definition icon from the asset host.
    async fn fetch_icon(&self, path: &str) -> Result<Vec<u8>>;
}

/// Live HTTP client for the platform API.
pub struct BungieClient {
    client: reqwest::Client,
    api_key: String,
}

impl BungieClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config::HTTP_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: config::bungie_api_key()?,
        })
    }

    fn components_query(components: &[u32]) -> String {
        components
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    async fn get_envelope<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<Envelope<T>, UpstreamError> {
        debug!("[BUNGIE] GET {}", url);
        let resp = self
            .client
            .get(url)
            .header("X-API-Key", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|_| UpstreamError::NoResponse)?;
        resp.json::<Envelope<T>>()
            .await
            .map_err(|_| UpstreamError::NoResponse)
    }
}

fn check_envelope<T>(envelope: Envelope<T>, vendor_hash: u32) -> Result<T, UpstreamError> {
    match envelope.error_code {
        config::ERROR_CODE_SUCCESS => envelope.response.ok_or(UpstreamError::NoResponse),
        config::ERROR_CODE_MAINTENANCE => Err(UpstreamError::Maintenance),
        config::ERROR_CODE_VENDOR_NOT_FOUND => Err(UpstreamError::VendorNotFound(vendor_hash)),
        code => Err(UpstreamError::Api { code }),
    }
}

#[async_trait]
impl VendorApi for BungieClient {
    async fn probe(&self, session: &SessionContext) -> ProbeStatus {
        let Some(character_id) = session.character_ids.first() else {
            return ProbeStatus::NoResponse;
        };
        let url = format!(
            "{}/Destiny2/{}/Profile/{}/Character/{}/Vendors/?components={}",
            config::BUNGIE_API_BASE,
            session.membership_type,
            session.membership_id,
            character_id,
            Self::components_query(config::PROBE_COMPONENTS),
        );
        match self
            .get_envelope::<serde_json::Value>(&url, &session.access_token)
            .await
        {
            Ok(envelope) if envelope.error_code == config::ERROR_CODE_SUCCESS => ProbeStatus::Ok,
            Ok(envelope) if envelope.error_code == config::ERROR_CODE_MAINTENANCE => {
                ProbeStatus::Maintenance
            }
            Ok(_) | Err(_) => ProbeStatus::NoResponse,
        }
    }

    async fn get_vendor(
        &self,
        session: &SessionContext,
        character_id: i64,
        vendor_hash: u32,
    ) -> Result<VendorResponse, UpstreamError> {
        let url = format!(
            "{}/Destiny2/{}/Profile/{}/Character/{}/Vendors/{}/?components={}",
            config::BUNGIE_API_BASE,
            session.membership_type,
            session.membership_id,
            character_id,
            vendor_hash,
            Self::components_query(config::VENDOR_COMPONENTS),
        );
        let envelope = self
            .get_envelope::<VendorResponse>(&url, &session.access_token)
            .await?;
        check_envelope(envelope, vendor_hash)
    }

    async fn fetch_icon(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}{}", config::BUNGIE_ASSET_BASE, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("icon download failed: {}", url))?;
        if !resp.status().is_success() {
            bail!("icon download returned {}: {}", resp.status(), url);
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(code: i64, body: Option<VendorResponse>) -> Envelope<VendorResponse> {
        Envelope {
            error_code: code,
            response: body,
        }
    }

    #[test]
    fn test_envelope_success_requires_body() {
        let ok = check_envelope(envelope(1, Some(VendorResponse::default())), 672118013);
        assert!(ok.is_ok());

        let empty = check_envelope(envelope(1, None), 672118013);
        assert_eq!(empty.unwrap_err(), UpstreamError::NoResponse);
    }

    #[test]
    fn test_envelope_code_mapping() {
        assert_eq!(
            check_envelope(envelope(5, None), 672118013).unwrap_err(),
            UpstreamError::Maintenance
        );
        assert_eq!(
            check_envelope(envelope(1627, None), 2190858386).unwrap_err(),
            UpstreamError::VendorNotFound(2190858386)
        );
        assert_eq!(
            check_envelope(envelope(99, None), 672118013).unwrap_err(),
            UpstreamError::Api { code: 99 }
        );
    }

    #[test]
    fn test_vendor_response_decodes_components() {
        let body = serde_json::json!({
            "vendor": { "data": {
                "vendorHash": 672118013,
                "nextRefreshDate": "2026-08-26T17:00:00Z",
                "vendorLocationIndex": 1,
                "enabled": true
            }},
            "sales": { "data": {
                "3": { "itemHash": 111, "costs": [{ "itemHash": 222, "quantity": 5 }] }
            }},
            "itemComponents": {
                "stats": { "data": { "3": { "stats": { "4043523819": { "statHash": 4043523819u32, "value": 62 } } } } },
                "sockets": { "data": { "3": { "sockets": [
                    { "plugHash": 777, "isEnabled": true },
                    { "isEnabled": false }
                ] } } }
            }
        });
        let decoded: VendorResponse = serde_json::from_value(body).unwrap();
        assert_eq!(decoded.vendor.data.as_ref().unwrap().vendor_hash, 672118013);
        assert_eq!(decoded.sales.data["3"].item_hash, 111);
        assert_eq!(decoded.sales.data["3"].costs[0].quantity, 5);
        assert_eq!(decoded.item_components.stats.data["3"].stats.len(), 1);
        let sockets = &decoded.item_components.sockets.data["3"].sockets;
        assert_eq!(sockets[0].plug_hash, Some(777));
        assert_eq!(sockets[1].plug_hash, None);
    }
}
