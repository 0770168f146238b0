//! Token records returned by the blockchain index.
//!
//! Only the fields the archiver reads are modelled. Unknown fields are
//! ignored, and metadata that does not match the expected shape is dropped
//! instead of invalidating the whole record.

use serde::{Deserialize, Deserializer, Serialize};

use super::artifact::ArtifactId;

/// A token as indexed on chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Index-internal numeric id
    #[serde(default)]
    pub id: Option<u64>,

    /// Contract the token belongs to
    #[serde(default)]
    pub contract: Option<Account>,

    /// Token id within its contract (decimal string on chain)
    #[serde(default)]
    pub token_id: Option<String>,

    /// Token standard (fa1.2, fa2)
    #[serde(default)]
    pub standard: Option<String>,

    /// Account that minted the token
    #[serde(default)]
    pub first_minter: Option<Account>,

    /// Off-chain metadata
    #[serde(default, deserialize_with = "lenient_metadata")]
    pub metadata: Option<TokenMetadata>,
}

/// An on-chain account reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Subset of TZIP-21 token metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub artifact_uri: Option<String>,
    #[serde(default)]
    pub display_uri: Option<String>,
    #[serde(default)]
    pub thumbnail_uri: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub creators: Option<Vec<String>>,
}

/// Deserialize metadata, treating anything that is not the expected shape as absent
fn lenient_metadata<'de, D>(deserializer: D) -> Result<Option<TokenMetadata>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

impl Token {
    /// Contract address, if known
    pub fn contract_address(&self) -> Option<&str> {
        self.contract.as_ref().and_then(|c| c.address.as_deref())
    }

    /// Dedup key: (contract address, token id)
    pub fn key(&self) -> (Option<String>, Option<String>) {
        (
            self.contract_address().map(str::to_string),
            self.token_id.clone(),
        )
    }

    /// Content identifier of the token's artifact, if it is content-addressed
    pub fn artifact_id(&self) -> Option<ArtifactId> {
        self.metadata
            .as_ref()
            .and_then(|m| m.artifact_uri.as_deref())
            .and_then(ArtifactId::from_artifact_uri)
    }
}

/// Parse one page of index records, skipping records that fail to parse
pub fn parse_tokens(records: Vec<serde_json::Value>) -> Vec<Token> {
    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<Token>(record) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed token record");
                None
            }
        })
        .collect()
}
