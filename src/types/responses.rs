//! Raw response shapes returned by the scan API, kept to the minimal
//! fields the query layer consumes. The upstream may omit any of these
//! fields; mapping to the normalized types in [`crate::types`] happens in
//! [`crate::queries`].
//!
//! Field casing follows the upstream exactly: the consensus endpoint uses
//! snake_case, the updates endpoint camelCase.
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidatorsResponse {
    #[serde(default)]
    pub validator_licenses: Vec<ValidatorLicense>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidatorLicense {
    #[serde(default)]
    pub payload: Option<LicensePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicensePayload {
    #[serde(default)]
    pub validator:      Option<String>,
    #[serde(default)]
    pub sponsor:        Option<String>,
    #[serde(default)]
    pub last_active_at: Option<String>,
    #[serde(default)]
    pub faucet_state:   Option<FaucetState>,
    #[serde(default)]
    pub metadata:       Option<LicenseMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetState {
    #[serde(default)]
    pub num_coupons_missed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseMetadata {
    #[serde(default)]
    pub version:       Option<String>,
    #[serde(default)]
    pub contact_point: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsensusResponse {
    #[serde(default)]
    pub latest_block: Option<LatestBlock>,
    #[serde(default)]
    pub validators:   Vec<ConsensusValidator>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestBlock {
    #[serde(default)]
    pub signed_header: Option<SignedHeader>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignedHeader {
    #[serde(default)]
    pub header: Option<BlockHeader>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockHeader {
    /// Block height; a number or a numeric string upstream.
    #[serde(default, deserialize_with = "crate::internal::round_number::deserialize")]
    pub height: Option<u64>,
    /// Block time as an RFC 3339 string.
    #[serde(default)]
    pub time:   Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsensusValidator {
    #[serde(default)]
    pub address:      Option<String>,
    /// Voting power; a number or a numeric string upstream.
    #[serde(default, deserialize_with = "crate::internal::round_number::deserialize")]
    pub voting_power: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuperValidatorsResponse {
    #[serde(default)]
    pub svs: Vec<SvEntry>,
}

/// One super-validator listing entry. The upstream emits either a plain
/// object or a 2-element `[id-or-object, meta]` tuple; decoding to a
/// normalized [`crate::types::SvNodeState`] happens in the query layer and
/// the raw union never escapes it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SvEntry {
    /// Bare identifier.
    Id(String),
    /// Plain object shape.
    Object(SvObject),
    /// Tuple shape; the first element carries the identifier, the second
    /// optional metadata such as a status.
    Tuple(Vec<serde_json::Value>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SvObject {
    #[serde(default)]
    pub validator_id: Option<String>,
    #[serde(default)]
    pub status:       Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesResponse {
    #[serde(default)]
    pub updates:    Vec<UpdateRecord>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    #[serde(default)]
    pub update_id:           Option<String>,
    #[serde(default)]
    pub record_time:         Option<String>,
    #[serde(default)]
    pub effective_at:        Option<String>,
    #[serde(default)]
    pub created_at:          Option<String>,
    #[serde(default)]
    pub submitting_party_id: Option<String>,
    #[serde(default)]
    pub parties_summarized:  Vec<String>,
    #[serde(default)]
    pub event_count:         Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceResponse {
    #[serde(default)]
    pub open_votes: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewResponse {
    /// Consensus height; a number or a numeric string upstream.
    #[serde(default, deserialize_with = "crate::internal::round_number::deserialize")]
    pub consensus_height: Option<u64>,
    #[serde(default)]
    pub active_validators: Option<u64>,
    #[serde(default)]
    pub super_validators:  Option<u64>,
    #[serde(default)]
    pub supply:            Option<serde_json::Value>,
    #[serde(default)]
    pub featured_apps:     Option<serde_json::Value>,
    #[serde(default)]
    pub open_votes:        Option<serde_json::Value>,
}
