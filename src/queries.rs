//! High-level queries over the scan API. Raw upstream shapes are mapped to
//! the normalized records in [`crate::types`], with safe defaults filled in
//! for fields the upstream omits, so downstream consumers never need
//! defensive null-checks beyond what a type declares.
use crate::{
    client::Client,
    constants,
    endpoints::QueryResult,
    types::{
        responses::{ConsensusValidator, SvEntry, UpdateRecord, ValidatorsResponse},
        ActivitySummary, CollectionTiming, DsoState, GovernanceVote, PartyUpdate, RoundInfo,
        SvNodeState, TrafficData, Transfer, ValidatorInfo, ValidatorRewards, ValidatorStatus,
    },
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Parse an upstream RFC 3339 timestamp, tolerating a missing or
/// malformed value.
fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// The part of a validator identifier before the first `::` separator.
fn short_id(id: &str) -> &str { id.split("::").next().unwrap_or(id) }

/// Whether a candidate identifier from the validator list refers to the
/// queried identifier. The upstream inconsistently emits fully qualified
/// and short identifiers across endpoints, so four equivalence forms are
/// accepted: exact full, exact short, full-is-prefix-of-compound, and
/// short-is-prefix-of-compound.
fn validator_id_matches(candidate: &str, full: &str, short: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }
    candidate == full
        || candidate == short
        || full.starts_with(&format!("{candidate}::"))
        || candidate.starts_with(&format!("{short}::"))
}

/// Build a map from validator address to consensus voting power. Each
/// address is also keyed by its segment after the last `::` so compound
/// identifiers can be matched by their short form.
fn voting_power_map(validators: &[ConsensusValidator]) -> HashMap<String, u64> {
    let mut map = HashMap::new();
    for validator in validators {
        let addr = validator
            .address
            .as_deref()
            .map(|a| a.trim().to_lowercase())
            .unwrap_or_default();
        if addr.is_empty() {
            continue;
        }
        let power = validator.voting_power.unwrap_or(0);
        if let Some(last) = addr.rsplit("::").next() {
            if last != addr {
                map.insert(last.to_string(), power);
            }
        }
        map.insert(addr, power);
    }
    map
}

/// Voting power for a validator identifier: exact lowercase match first,
/// then the compound identifier's segments (after the last `::`, then the
/// short form before the first), else 0.
fn liveness_for(id_lower: &str, powers: &HashMap<String, u64>) -> u64 {
    if let Some(power) = powers.get(id_lower) {
        return *power;
    }
    if id_lower.contains("::") {
        if let Some(last) = id_lower.rsplit("::").next() {
            if let Some(power) = powers.get(last) {
                return *power;
            }
        }
        if let Some(power) = powers.get(short_id(id_lower)) {
            return *power;
        }
    }
    0
}

fn map_validator_licenses(
    response: &ValidatorsResponse,
    powers: &HashMap<String, u64>,
) -> Vec<ValidatorInfo> {
    response
        .validator_licenses
        .iter()
        .map(|license| {
            let payload = license.payload.as_ref();
            let id = payload
                .and_then(|p| p.validator.as_deref())
                .unwrap_or("")
                .trim()
                .to_string();
            let missed = payload
                .and_then(|p| p.faucet_state.as_ref())
                .and_then(|f| f.num_coupons_missed)
                .unwrap_or(0);
            let liveness = liveness_for(&id.to_lowercase(), powers);
            let timing = payload
                .and_then(|p| parse_timestamp(p.last_active_at.as_deref()))
                .map(|t| CollectionTiming { first: t, last: t });
            ValidatorInfo {
                validator_id: if id.is_empty() {
                    "unknown".to_string()
                } else {
                    id
                },
                name: payload.and_then(|p| p.sponsor.clone()),
                status: if missed > 0 {
                    ValidatorStatus::AtRisk
                } else {
                    ValidatorStatus::Active
                },
                liveness_rounds: liveness,
                missed_rounds: missed,
                collection_timing: timing,
            }
        })
        .collect()
}

/// All validators, with liveness rounds taken from consensus voting power
/// where a matching entry exists.
pub async fn get_validator_liveness(client: &Client) -> QueryResult<Vec<ValidatorInfo>> {
    let (validators, consensus) =
        futures::try_join!(client.get_validators(), client.get_consensus())?;
    let powers = voting_power_map(&consensus.validators);
    Ok(map_validator_licenses(&validators, &powers))
}

/// A single validator by identifier. Looks through the full liveness list
/// so `liveness_rounds` stays consistent with [`get_validator_liveness`].
/// An identifier that matches no record yields a stub with
/// [`ValidatorStatus::Unknown`] rather than an error.
pub async fn get_validator_info(
    client: &Client,
    validator_id: &str,
) -> QueryResult<ValidatorInfo> {
    let all = get_validator_liveness(client).await?;
    let full = validator_id.trim().to_lowercase();
    let short = short_id(&full).trim().to_string();
    let found = all.into_iter().find(|v| {
        validator_id_matches(v.validator_id.trim().to_lowercase().as_str(), &full, &short)
    });
    Ok(found.unwrap_or_else(|| ValidatorInfo {
        validator_id:      validator_id.to_string(),
        name:              None,
        status:            ValidatorStatus::Unknown,
        liveness_rounds:   0,
        missed_rounds:     0,
        collection_timing: None,
    }))
}

/// Latest round from the consensus block height, falling back to the
/// overview's consensus height.
pub async fn get_latest_round(client: &Client) -> QueryResult<RoundInfo> {
    let (consensus, overview) = futures::try_join!(client.get_consensus(), client.get_overview())?;
    let header = consensus
        .latest_block
        .as_ref()
        .and_then(|b| b.signed_header.as_ref())
        .and_then(|s| s.header.as_ref());
    let round = header
        .and_then(|h| h.height)
        .or(overview.consensus_height)
        .unwrap_or(0);
    let timestamp = header
        .and_then(|h| parse_timestamp(h.time.as_deref()))
        .unwrap_or_else(Utc::now);
    Ok(RoundInfo {
        round: round.into(),
        timestamp,
    })
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Normalize one super-validator entry from either upstream shape.
/// Entries without a usable identifier are dropped; a missing or malformed
/// status defaults to `active`.
fn decode_sv_entry(entry: &SvEntry) -> Option<SvNodeState> {
    let (node_id, status) = match entry {
        SvEntry::Id(id) => (id.clone(), None),
        SvEntry::Object(object) => (
            object.validator_id.clone().unwrap_or_default(),
            object.status.clone(),
        ),
        SvEntry::Tuple(items) => {
            let node_id = match items.first() {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Object(map)) => {
                    map.get("validatorId").map(value_to_string).unwrap_or_default()
                }
                _ => String::new(),
            };
            let status = items
                .get(1)
                .and_then(|meta| meta.get("status"))
                .and_then(|s| s.as_str())
                .map(str::to_string);
            (node_id, status)
        }
    };
    if node_id.is_empty() {
        return None;
    }
    Some(SvNodeState {
        node_id,
        status: status.unwrap_or_else(|| "active".to_string()),
    })
}

/// DSO-like state assembled from the overview and super-validator
/// listings. Fields the upstream does not provide are zero-valued.
pub async fn get_dso_state(client: &Client) -> QueryResult<DsoState> {
    let (_overview, super_validators) =
        futures::try_join!(client.get_overview(), client.get_super_validators())?;
    let sv_node_states = super_validators
        .svs
        .iter()
        .filter_map(decode_sv_entry)
        .collect();
    Ok(DsoState {
        voting_threshold: 0,
        mining_rounds: 0,
        amulet_rules: serde_json::Value::Object(Default::default()),
        dso_rules: serde_json::Value::Object(Default::default()),
        sv_node_states,
    })
}

/// Open governance votes from the overview aggregate. Entries that are not
/// JSON objects are skipped.
pub async fn get_open_votes(client: &Client) -> QueryResult<Vec<GovernanceVote>> {
    let overview = client.get_overview().await?;
    let Some(serde_json::Value::Array(raw)) = overview.open_votes else {
        return Ok(Vec::new());
    };
    Ok(raw
        .into_iter()
        .filter(|v| v.is_object())
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

fn id_matches(value: Option<&str>, target: &str) -> bool {
    value.map(|v| v.eq_ignore_ascii_case(target)).unwrap_or(false)
}

/// A single open governance vote by contract or tracking identifier.
/// Returns `None` when no open vote matches; an absent vote is a normal
/// outcome, not an error.
pub async fn get_governance_vote_detail(
    client: &Client,
    id: &str,
) -> QueryResult<Option<GovernanceVote>> {
    let target = id.trim();
    if target.is_empty() {
        return Ok(None);
    }
    let votes = get_open_votes(client).await?;
    Ok(votes.into_iter().find(|v| {
        id_matches(v.contract_id.as_deref(), target)
            || id_matches(v.tracking_cid.as_deref(), target)
    }))
}

/// Map a raw update record, resolving its timestamp through the fallback
/// chain record time, effective time, creation time, and finally `now`.
fn map_update(update: &UpdateRecord, now: DateTime<Utc>) -> PartyUpdate {
    let timestamp = parse_timestamp(update.record_time.as_deref())
        .or_else(|| parse_timestamp(update.effective_at.as_deref()))
        .or_else(|| parse_timestamp(update.created_at.as_deref()))
        .unwrap_or(now);
    let parties = update
        .submitting_party_id
        .clone()
        .map(|p| vec![p])
        .unwrap_or_default();
    PartyUpdate {
        update_id: update.update_id.clone().unwrap_or_default(),
        timestamp,
        parties,
        update_type: "update".to_string(),
        round: 0u64.into(),
        transaction_id: None,
    }
}

/// All updates within the date range, paginated newest-first. Pagination
/// stops when the requested limit is reached, the upstream provides no
/// continuation token, or the current page already reaches past the window
/// start; a page ceiling guarantees termination regardless.
pub async fn get_all_updates(
    client: &Client,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: usize,
) -> QueryResult<Vec<PartyUpdate>> {
    let mut all: Vec<PartyUpdate> = Vec::new();
    let mut next_token: Option<String> = None;
    for page in 0..constants::UPDATES_MAX_PAGES {
        let response = client
            .get_updates(Some(constants::UPDATES_PAGE_SIZE), next_token.as_deref())
            .await?;
        let now = Utc::now();
        let batch: Vec<PartyUpdate> =
            response.updates.iter().map(|u| map_update(u, now)).collect();
        let mut oldest: Option<DateTime<Utc>> = None;
        for update in &batch {
            if oldest.map(|o| update.timestamp < o).unwrap_or(true) {
                oldest = Some(update.timestamp);
            }
            if update.timestamp >= start && update.timestamp <= end {
                all.push(update.clone());
            }
            if all.len() >= limit {
                break;
            }
        }
        tracing::debug!(page, in_range = all.len(), "fetched update page");
        if all.len() >= limit {
            break;
        }
        next_token = response.next_token.clone();
        if next_token.is_none() || batch.is_empty() {
            break;
        }
        if oldest.map(|o| o < start).unwrap_or(false) {
            break;
        }
        if page + 1 < constants::UPDATES_MAX_PAGES {
            tokio::time::sleep(client.page_delay()).await;
        }
    }
    all.truncate(limit);
    Ok(all)
}

/// Single update detail as a raw JSON object.
pub async fn get_update_detail(
    client: &Client,
    update_id: &str,
    record_time: &str,
) -> QueryResult<serde_json::Value> {
    client.get_update_detail(update_id, record_time).await
}

/// Transfers are not exposed by the scan API; the empty list is the
/// documented contract so the activity summary stays well-defined.
pub async fn get_all_transfers(
    _client: &Client,
    _start: DateTime<Utc>,
    _end: DateTime<Utc>,
    _limit: usize,
) -> QueryResult<Vec<Transfer>> {
    Ok(Vec::new())
}

/// Validator rewards are not exposed by the scan API; a zero-valued record
/// for the requested period is the documented contract.
pub async fn get_validator_rewards(
    _client: &Client,
    validator_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> QueryResult<ValidatorRewards> {
    Ok(ValidatorRewards {
        validator_id:     validator_id.to_string(),
        liveness_rewards: 0.0,
        activity_rewards: 0.0,
        total_rewards:    0.0,
        period_start:     start,
        period_end:       end,
        rounds:           0,
    })
}

/// Validator traffic is not exposed by the scan API; a zero-valued record
/// is the documented contract.
pub async fn get_validator_traffic(
    _client: &Client,
    validator_id: &str,
) -> QueryResult<TrafficData> {
    Ok(TrafficData {
        validator_id:        validator_id.to_string(),
        current_credits:     0.0,
        daily_burn_rate:     0.0,
        total_burned:        0.0,
        total_purchased:     0.0,
        average_burn_per_mb: 0.0,
        last_updated:        Utc::now(),
    })
}

/// Network-wide activity over a period: updates paginated in, transfers
/// always empty, updates bucketed by type label.
pub async fn get_global_activity_summary(
    client: &Client,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: usize,
) -> QueryResult<ActivitySummary> {
    let transfers = get_all_transfers(client, start, end, limit).await?;
    let updates = get_all_updates(client, start, end, limit).await?;
    let total_volume: f64 = transfers.iter().map(|t| t.amount).sum();
    let is_offer = |u: &&PartyUpdate| u.update_type.to_lowercase().contains("offer");
    let is_preapproval = |u: &&PartyUpdate| u.update_type.to_lowercase().contains("preapproval");
    Ok(ActivitySummary {
        total_transactions: (transfers.len() + updates.len()) as u64,
        total_volume,
        transfers: transfers.len() as u64,
        offers: updates.iter().filter(is_offer).count() as u64,
        preapprovals: updates.iter().filter(is_preapproval).count() as u64,
        updates: updates
            .iter()
            .filter(|u| !is_offer(u) && !is_preapproval(u))
            .count() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn voting_power_map_keys_full_and_short_forms() {
        let validators: Vec<ConsensusValidator> = serde_json::from_value(json!([
            {"address": "V1::ABC", "voting_power": "10"},
            {"address": "plain", "voting_power": 7},
            {"address": "  ", "voting_power": 3}
        ]))
        .unwrap();
        let map = voting_power_map(&validators);
        assert_eq!(map.get("v1::abc"), Some(&10));
        assert_eq!(map.get("abc"), Some(&10));
        assert_eq!(map.get("plain"), Some(&7));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn liveness_falls_back_to_compound_segments() {
        let mut powers = HashMap::new();
        powers.insert("v1".to_string(), 10u64);
        assert_eq!(liveness_for("v1", &powers), 10);
        // Segment after the last separator.
        assert_eq!(liveness_for("other::v1", &powers), 10);
        // Short form before the first separator.
        assert_eq!(liveness_for("v1::abc", &powers), 10);
        assert_eq!(liveness_for("missing", &powers), 0);
    }

    #[test]
    fn maps_license_with_short_id_fallback_match() {
        // A compound license identifier matched against a short consensus
        // address through the voting-power fallback.
        let response: ValidatorsResponse = serde_json::from_value(json!({
            "validator_licenses": [
                {"payload": {
                    "validator": "v1::abc",
                    "faucetState": {"numCouponsMissed": 3}
                }}
            ]
        }))
        .unwrap();
        let consensus: Vec<ConsensusValidator> =
            serde_json::from_value(json!([{"address": "v1", "voting_power": "10"}])).unwrap();
        let powers = voting_power_map(&consensus);
        let mapped = map_validator_licenses(&response, &powers);
        assert_eq!(mapped.len(), 1);
        let v = &mapped[0];
        assert_eq!(v.validator_id, "v1::abc");
        assert_eq!(v.status, ValidatorStatus::AtRisk);
        assert_eq!(v.missed_rounds, 3);
        assert_eq!(v.liveness_rounds, 10);
    }

    #[test]
    fn license_without_missed_coupons_is_active() {
        let response: ValidatorsResponse = serde_json::from_value(json!({
            "validator_licenses": [
                {"payload": {"validator": "v2", "sponsor": "Sponsor Co"}}
            ]
        }))
        .unwrap();
        let mapped = map_validator_licenses(&response, &HashMap::new());
        assert_eq!(mapped[0].status, ValidatorStatus::Active);
        assert_eq!(mapped[0].name.as_deref(), Some("Sponsor Co"));
        assert_eq!(mapped[0].liveness_rounds, 0);
    }

    #[test]
    fn validator_matching_accepts_all_four_forms() {
        // exact full
        assert!(validator_id_matches("v1::abc", "v1::abc", "v1"));
        // exact short
        assert!(validator_id_matches("v1", "v1", "v1"));
        // queried full is prefix of nothing; candidate is prefix of full
        assert!(validator_id_matches("v1", "v1::abc", "v1"));
        // candidate compound starts with queried short
        assert!(validator_id_matches("v1::abc", "v1", "v1"));
        assert!(!validator_id_matches("v2::abc", "v1::abc", "v1"));
        assert!(!validator_id_matches("", "v1", "v1"));
    }

    #[test]
    fn sv_entries_decode_from_both_shapes() {
        let entries: Vec<SvEntry> = serde_json::from_value(json!([
            {"validatorId": "sv-1", "status": "degraded"},
            {"validatorId": "sv-2"},
            ["sv-3", {"status": "active"}],
            [{"validatorId": "sv-4"}, {"note": "no status"}],
            ["", {}],
            {"unrelated": true}
        ]))
        .unwrap();
        let decoded: Vec<SvNodeState> = entries.iter().filter_map(decode_sv_entry).collect();
        assert_eq!(decoded, vec![
            SvNodeState {
                node_id: "sv-1".to_string(),
                status:  "degraded".to_string(),
            },
            SvNodeState {
                node_id: "sv-2".to_string(),
                status:  "active".to_string(),
            },
            SvNodeState {
                node_id: "sv-3".to_string(),
                status:  "active".to_string(),
            },
            SvNodeState {
                node_id: "sv-4".to_string(),
                status:  "active".to_string(),
            },
        ]);
    }

    #[test]
    fn update_timestamp_fallback_chain() {
        let now = Utc::now();
        let record: UpdateRecord = serde_json::from_value(json!({
            "updateId": "u1",
            "recordTime": "2024-03-01T00:00:00Z",
            "effectiveAt": "2024-02-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(
            map_update(&record, now).timestamp.to_rfc3339(),
            "2024-03-01T00:00:00+00:00"
        );

        let record: UpdateRecord = serde_json::from_value(json!({
            "updateId": "u2",
            "effectiveAt": "2024-02-01T00:00:00Z",
            "createdAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(
            map_update(&record, now).timestamp.to_rfc3339(),
            "2024-02-01T00:00:00+00:00"
        );

        let record: UpdateRecord = serde_json::from_value(json!({
            "updateId": "u3",
            "createdAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(
            map_update(&record, now).timestamp.to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );

        let record: UpdateRecord = serde_json::from_value(json!({"updateId": "u4"})).unwrap();
        assert_eq!(map_update(&record, now).timestamp, now);
    }

    #[test]
    fn update_parties_come_from_submitting_party() {
        let record: UpdateRecord = serde_json::from_value(json!({
            "updateId": "u1",
            "recordTime": "2024-03-01T00:00:00Z",
            "submittingPartyId": "party::1"
        }))
        .unwrap();
        let mapped = map_update(&record, Utc::now());
        assert_eq!(mapped.parties, vec!["party::1".to_string()]);
        assert_eq!(mapped.update_type, "update");
    }
}
