//! Normalized records describing the Canton Network, produced by the
//! query layer from raw upstream responses. Consumers of these types never
//! need defensive null-checks beyond what a field's type declares.
use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};

/// Raw response shapes returned by the scan API.
pub mod responses;

/// A consensus round (block height) number.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, FromStr, Display, From, Into)]
pub struct Round {
    pub round: u64,
}

/// The most recent consensus round together with its block time.
#[derive(Debug, Clone, Serialize)]
pub struct RoundInfo {
    pub round:     Round,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Operational status of a validator as derived from its license record.
/// The upstream reports no third value at this layer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    Active,
    AtRisk,
    /// Returned for lookups that matched no record. "Does not exist yet" is
    /// a normal outcome in this domain, not an error.
    Unknown,
}

impl std::fmt::Display for ValidatorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidatorStatus::Active => write!(f, "active"),
            ValidatorStatus::AtRisk => write!(f, "at_risk"),
            ValidatorStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// First and last observed activity for a validator.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CollectionTiming {
    pub first: chrono::DateTime<chrono::Utc>,
    pub last:  chrono::DateTime<chrono::Utc>,
}

/// A validator as seen through its license and the consensus validator set.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatorInfo {
    /// Identifier as reported by the upstream. May be a fully qualified
    /// `name::fingerprint` pair or a bare short name; the upstream is not
    /// consistent across endpoints.
    pub validator_id:      String,
    /// Sponsor name, when the license carries one.
    pub name:              Option<String>,
    pub status:            ValidatorStatus,
    /// Derived from the validator's consensus voting power, which is the
    /// closest thing to a liveness metric the upstream exposes.
    pub liveness_rounds:   u64,
    /// Liveness coupons missed, per the license faucet state.
    pub missed_rounds:     u64,
    pub collection_timing: Option<CollectionTiming>,
}

/// One super-validator node entry, normalized from the two shapes the
/// upstream emits.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SvNodeState {
    pub node_id: String,
    pub status:  String,
}

/// DSO-like view assembled from the overview and super-validator listings.
/// Fields the upstream does not provide are zero-valued.
#[derive(Debug, Clone, Serialize)]
pub struct DsoState {
    pub voting_threshold: u32,
    pub mining_rounds:    u64,
    pub amulet_rules:     serde_json::Value,
    pub dso_rules:        serde_json::Value,
    pub sv_node_states:   Vec<SvNodeState>,
}

/// Free-form body of a governance vote request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VotePayload {
    #[serde(default)]
    pub requester:   Option<String>,
    #[serde(default)]
    pub reason:      Option<String>,
    #[serde(default)]
    pub action:      Option<String>,
    /// Deadline by which votes must be cast.
    #[serde(default, rename = "voteBefore")]
    pub vote_before: Option<String>,
    #[serde(default)]
    pub votes:       Option<serde_json::Value>,
}

/// A single open governance vote from the overview aggregate. At least one
/// of `contract_id` and `tracking_cid` is usable for lookups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceVote {
    #[serde(default)]
    pub contract_id:   Option<String>,
    #[serde(default, rename = "trackingCid")]
    pub tracking_cid:  Option<String>,
    #[serde(default)]
    pub status:        Option<String>,
    #[serde(default, rename = "acceptCount")]
    pub accept_count:  u64,
    #[serde(default, rename = "rejectCount")]
    pub reject_count:  u64,
    #[serde(default, rename = "noVoteCount")]
    pub no_vote_count: u64,
    #[serde(default)]
    pub payload:       Option<VotePayload>,
}

/// A ledger update involving one or more parties.
#[derive(Debug, Clone, Serialize)]
pub struct PartyUpdate {
    pub update_id:      String,
    /// Record time, falling back to effective time, creation time, and
    /// finally the time of observation.
    pub timestamp:      chrono::DateTime<chrono::Utc>,
    pub parties:        Vec<String>,
    /// Coarse update-type label.
    pub update_type:    String,
    pub round:          Round,
    pub transaction_id: Option<String>,
}

/// A CC transfer between two parties. The scan API does not currently
/// expose transfers; the type exists for the activity summary contract.
#[derive(Debug, Clone, Serialize)]
pub struct Transfer {
    pub transfer_id:    String,
    pub from_party:     String,
    pub to_party:       String,
    pub amount:         f64,
    pub currency:       String,
    pub timestamp:      chrono::DateTime<chrono::Utc>,
    pub round:          Round,
    pub transaction_id: Option<String>,
}

/// Rewards earned by a validator over a period.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatorRewards {
    pub validator_id:     String,
    pub liveness_rewards: f64,
    pub activity_rewards: f64,
    pub total_rewards:    f64,
    pub period_start:     chrono::DateTime<chrono::Utc>,
    pub period_end:       chrono::DateTime<chrono::Utc>,
    pub rounds:           u64,
}

/// Traffic credit balance and burn statistics for a validator.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficData {
    pub validator_id:        String,
    pub current_credits:     f64,
    pub daily_burn_rate:     f64,
    pub total_burned:        f64,
    pub total_purchased:     f64,
    pub average_burn_per_mb: f64,
    pub last_updated:        chrono::DateTime<chrono::Utc>,
}

/// Network-wide activity over a period, bucketed by update kind.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ActivitySummary {
    pub total_transactions: u64,
    pub total_volume:       f64,
    pub transfers:          u64,
    pub offers:             u64,
    pub preapprovals:       u64,
    pub updates:            u64,
}
