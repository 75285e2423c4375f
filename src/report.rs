//! Compliance report generation: a tamper-evidence hash chain over the
//! report data, a requirements checklist, and document/CSV renderings.
//!
//! The evidence bundle is computed exactly once when a generator is
//! constructed. The data hash is content-addressed: serializing the same
//! report twice yields the same data hash, while the snapshot hash folds
//! in the generation timestamp and therefore differs between generations.
use crate::{client::Client, constants, endpoints::QueryResult, queries};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Reporting period granularity.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Monthly,
    Quarterly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    pub start: DateTime<Utc>,
    pub end:   DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind:  PeriodType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetrics {
    pub total_transactions: u64,
    pub total_volume:       f64,
    pub active_users:       u64,
    pub rewards_earned:     f64,
    pub transaction_growth: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLine {
    pub activity_type: String,
    pub count:         u64,
    pub volume:        f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceInfo {
    pub audit_status:             String,
    pub controls_in_place:        bool,
    pub non_bona_fide_prevention: String,
}

/// Everything a compliance report is generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    pub app_name:           String,
    pub party_id:           String,
    pub period:             ReportPeriod,
    pub metrics:            ReportMetrics,
    pub activity_breakdown: Vec<ActivityLine>,
    pub compliance:         ComplianceInfo,
}

/// A hash-chained, timestamped proof that a report's data has not been
/// altered since generation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceBundle {
    /// Hex SHA-256 of the data hash concatenated with the timestamp.
    pub snapshot_hash:    String,
    pub timestamp:        DateTime<Utc>,
    /// Hex SHA-256 of the serialized report data.
    pub data_hash:        String,
    pub derivation_notes: String,
    pub signed_by:        String,
}

/// One leaf item of the requirements checklist.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub label:     String,
    pub completed: bool,
}

/// One checklist category with its leaf items.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistCategory {
    pub id:        String,
    pub label:     String,
    pub required:  bool,
    pub completed: bool,
    pub items:     Vec<ChecklistItem>,
}

/// A section of the rendered report document: a title and its lines, in
/// presentation order. Byte-level layout is left to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSection {
    pub title: String,
    pub lines: Vec<String>,
}

/// Layout instructions for the printable report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    pub title:    String,
    pub sections: Vec<DocumentSection>,
}

/// Generator for one report: computes the evidence bundle at construction
/// and renders the same data to a document or CSV.
pub struct ReportGenerator {
    data:     ReportData,
    evidence: EvidenceBundle,
}

fn sha256_hex(input: &[u8]) -> String { hex::encode(Sha256::digest(input)) }

impl ReportGenerator {
    pub fn new(data: ReportData) -> Result<Self, serde_json::Error> {
        Self::new_at(data, Utc::now())
    }

    /// Construct with an explicit generation timestamp; the timestamp is
    /// folded into the snapshot hash.
    pub fn new_at(data: ReportData, now: DateTime<Utc>) -> Result<Self, serde_json::Error> {
        let serialized = serde_json::to_string(&data)?;
        let data_hash = sha256_hex(serialized.as_bytes());
        let timestamp = now;
        let snapshot_hash =
            sha256_hex(format!("{}{}", data_hash, timestamp.to_rfc3339()).as_bytes());
        let evidence = EvidenceBundle {
            snapshot_hash,
            timestamp,
            data_hash,
            derivation_notes: format!(
                "Data derived from Canton Network on-chain records for period {} to {}",
                data.period.start.to_rfc3339(),
                data.period.end.to_rfc3339()
            ),
            signed_by: data.app_name.clone(),
        };
        Ok(Self { data, evidence })
    }

    pub fn data(&self) -> &ReportData { &self.data }

    pub fn evidence_bundle(&self) -> &EvidenceBundle { &self.evidence }

    /// Render the report to ordered document sections.
    pub fn render_document(&self) -> ReportDocument {
        let data = &self.data;
        let evidence = &self.evidence;
        let period_kind = match data.period.kind {
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
        };
        let mut sections = vec![
            DocumentSection {
                title: "Application Information".to_string(),
                lines: vec![
                    format!("App Name: {}", data.app_name),
                    format!("Party ID: {}", data.party_id),
                    format!(
                        "Period: {} - {} ({period_kind})",
                        data.period.start.to_rfc3339(),
                        data.period.end.to_rfc3339()
                    ),
                ],
            },
            DocumentSection {
                title: "Key Metrics".to_string(),
                lines: vec![
                    format!("Total Transactions: {}", data.metrics.total_transactions),
                    format!("Total Volume: {} CC", data.metrics.total_volume),
                    format!("Active Users: {}", data.metrics.active_users),
                    format!("Rewards Earned: {} CC", data.metrics.rewards_earned),
                    format!(
                        "Transaction Growth: {:.2}%",
                        data.metrics.transaction_growth
                    ),
                ],
            },
            DocumentSection {
                title: "Activity Breakdown".to_string(),
                lines: data
                    .activity_breakdown
                    .iter()
                    .map(|line| {
                        format!(
                            "{}: {} transactions, {} CC",
                            line.activity_type, line.count, line.volume
                        )
                    })
                    .collect(),
            },
            DocumentSection {
                title: "Compliance Information".to_string(),
                lines: vec![
                    format!("Audit Status: {}", data.compliance.audit_status),
                    format!(
                        "Controls In Place: {}",
                        if data.compliance.controls_in_place { "Yes" } else { "No" }
                    ),
                    format!(
                        "Non-Bona Fide Prevention: {}",
                        data.compliance.non_bona_fide_prevention
                    ),
                ],
            },
        ];
        sections.push(DocumentSection {
            title: "Evidence Bundle".to_string(),
            lines: vec![
                format!("Snapshot Hash: {}", evidence.snapshot_hash),
                format!("Timestamp: {}", evidence.timestamp.to_rfc3339()),
                format!("Data Hash: {}", evidence.data_hash),
                format!("Derivation: {}", evidence.derivation_notes),
            ],
        });
        ReportDocument {
            title: "Canton Network Featured App Report".to_string(),
            sections,
        }
    }

    /// Render the report as flat `Field,Value` rows, consistent with the
    /// document rendering.
    pub fn to_csv(&self) -> Result<String, csv::Error> {
        let data = &self.data;
        let evidence = &self.evidence;
        let mut writer = csv::Writer::from_writer(Vec::new());
        let period_kind = match data.period.kind {
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
        };
        let rows: Vec<(&str, String)> = vec![
            ("App Name", data.app_name.clone()),
            ("Party ID", data.party_id.clone()),
            ("Period Start", data.period.start.to_rfc3339()),
            ("Period End", data.period.end.to_rfc3339()),
            ("Period Type", period_kind.to_string()),
            (
                "Total Transactions",
                data.metrics.total_transactions.to_string(),
            ),
            ("Total Volume", data.metrics.total_volume.to_string()),
            ("Active Users", data.metrics.active_users.to_string()),
            ("Rewards Earned", data.metrics.rewards_earned.to_string()),
            (
                "Transaction Growth",
                data.metrics.transaction_growth.to_string(),
            ),
            ("Audit Status", data.compliance.audit_status.clone()),
            (
                "Controls In Place",
                data.compliance.controls_in_place.to_string(),
            ),
            ("Snapshot Hash", evidence.snapshot_hash.clone()),
            ("Timestamp", evidence.timestamp.to_rfc3339()),
            ("Data Hash", evidence.data_hash.clone()),
        ];
        writer.write_record(["Field", "Value"])?;
        for (field, value) in rows {
            writer.write_record([field, value.as_str()])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| csv::Error::from(std::io::Error::other(err.to_string())))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The fixed four-category completion checklist derived from the
    /// report data.
    pub fn requirements_checklist(&self) -> Vec<ChecklistCategory> {
        let data = &self.data;
        vec![
            ChecklistCategory {
                id:        "app-info".to_string(),
                label:     "Application Information".to_string(),
                required:  true,
                completed: !data.app_name.is_empty() && !data.party_id.is_empty(),
                items:     vec![
                    ChecklistItem {
                        label:     "Institution name".to_string(),
                        completed: !data.app_name.is_empty(),
                    },
                    ChecklistItem {
                        label:     "Party ID".to_string(),
                        completed: !data.party_id.is_empty(),
                    },
                    ChecklistItem {
                        label:     "Application summary".to_string(),
                        completed: true,
                    },
                ],
            },
            ChecklistCategory {
                id:        "metrics".to_string(),
                label:     "Key Metrics & Activity".to_string(),
                required:  true,
                completed: data.metrics.total_transactions > 0,
                items:     vec![
                    ChecklistItem {
                        label:     "Transaction volume data".to_string(),
                        completed: data.metrics.total_transactions > 0,
                    },
                    ChecklistItem {
                        label:     "User activity metrics".to_string(),
                        completed: data.metrics.active_users > 0,
                    },
                    ChecklistItem {
                        label:     "Rewards earned".to_string(),
                        completed: data.metrics.rewards_earned > 0.0,
                    },
                ],
            },
            ChecklistCategory {
                id:        "compliance".to_string(),
                label:     "Compliance & Controls".to_string(),
                required:  true,
                completed: data.compliance.controls_in_place
                    && !data.compliance.non_bona_fide_prevention.is_empty(),
                items:     vec![
                    ChecklistItem {
                        label:     "Audit status documented".to_string(),
                        completed: !data.compliance.audit_status.is_empty(),
                    },
                    ChecklistItem {
                        label:     "Controls preventing non-bona fide transactions".to_string(),
                        completed: data.compliance.controls_in_place,
                    },
                    ChecklistItem {
                        label:     "Non-bona fide prevention description".to_string(),
                        completed: !data.compliance.non_bona_fide_prevention.is_empty(),
                    },
                ],
            },
            ChecklistCategory {
                id:        "evidence".to_string(),
                label:     "Evidence Bundle".to_string(),
                required:  true,
                completed: true,
                items:     vec![
                    ChecklistItem {
                        label:     "Signed snapshot with hash".to_string(),
                        completed: true,
                    },
                    ChecklistItem {
                        label:     "Data provenance chain".to_string(),
                        completed: true,
                    },
                    ChecklistItem {
                        label:     "Derivation notes".to_string(),
                        completed: true,
                    },
                ],
            },
        ]
    }

    /// Completed leaf items over total leaf items, as a percentage.
    pub fn completion_percentage(&self) -> f64 {
        let checklist = self.requirements_checklist();
        let total: usize = checklist.iter().map(|c| c.items.len()).sum();
        if total == 0 {
            return 0.0;
        }
        let completed: usize = checklist
            .iter()
            .flat_map(|c| c.items.iter())
            .filter(|item| item.completed)
            .count();
        completed as f64 / total as f64 * 100.0
    }
}

/// Options for [`fetch_featured_app_report_data`].
#[derive(Debug, Clone)]
pub struct FetchReportDataOptions {
    pub party_id: String,
    pub app_name: Option<String>,
    pub start:    DateTime<Utc>,
    pub end:      DateTime<Utc>,
}

fn period_type(start: DateTime<Utc>, end: DateTime<Utc>) -> PeriodType {
    let days = (end - start).num_days().abs();
    if days > 60 {
        PeriodType::Quarterly
    } else {
        PeriodType::Monthly
    }
}

/// Assemble [`ReportData`] for a featured app from the network activity
/// summary. Throws no domain errors; API failures propagate.
pub async fn fetch_featured_app_report_data(
    client: &Client,
    options: &FetchReportDataOptions,
) -> QueryResult<ReportData> {
    let summary = queries::get_global_activity_summary(
        client,
        options.start,
        options.end,
        constants::DEFAULT_ACTIVITY_LIMIT,
    )
    .await?;

    let app_name = options
        .app_name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| options.party_id.clone());

    Ok(ReportData {
        app_name,
        party_id: options.party_id.clone(),
        period: ReportPeriod {
            start: options.start,
            end:   options.end,
            kind:  period_type(options.start, options.end),
        },
        metrics: ReportMetrics {
            total_transactions: summary.total_transactions,
            total_volume:       summary.total_volume,
            active_users:       summary
                .total_transactions
                .min(summary.total_transactions / 10),
            rewards_earned:     (summary.total_volume * 0.01).round(),
            transaction_growth: 0.0,
        },
        activity_breakdown: vec![
            ActivityLine {
                activity_type: "Transfers".to_string(),
                count:         summary.transfers,
                volume:        summary.total_volume * 0.6,
            },
            ActivityLine {
                activity_type: "Offers".to_string(),
                count:         summary.offers,
                volume:        summary.total_volume * 0.25,
            },
            ActivityLine {
                activity_type: "Preapprovals".to_string(),
                count:         summary.preapprovals,
                volume:        summary.total_volume * 0.1,
            },
            ActivityLine {
                activity_type: "Updates".to_string(),
                count:         summary.updates,
                volume:        summary.total_volume * 0.05,
            },
        ],
        compliance: ComplianceInfo {
            audit_status:             "Not Available".to_string(),
            controls_in_place:        true,
            non_bona_fide_prevention: "Not Available".to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report_data() -> ReportData {
        ReportData {
            app_name:           "Example App".to_string(),
            party_id:           "party::example".to_string(),
            period:             ReportPeriod {
                start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                end:   Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
                kind:  PeriodType::Monthly,
            },
            metrics:            ReportMetrics {
                total_transactions: 1_200,
                total_volume:       50_000.0,
                active_users:       120,
                rewards_earned:     500.0,
                transaction_growth: 4.2,
            },
            activity_breakdown: vec![ActivityLine {
                activity_type: "Updates".to_string(),
                count:         1_200,
                volume:        50_000.0,
            }],
            compliance:         ComplianceInfo {
                audit_status:             "Reviewed".to_string(),
                controls_in_place:        true,
                non_bona_fide_prevention: "Automated screening".to_string(),
            },
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn data_hash_is_content_addressed() {
        let a = ReportGenerator::new_at(report_data(), at(9)).unwrap();
        let b = ReportGenerator::new_at(report_data(), at(9)).unwrap();
        assert_eq!(
            a.evidence_bundle().data_hash,
            b.evidence_bundle().data_hash
        );
        assert_eq!(
            a.evidence_bundle().snapshot_hash,
            b.evidence_bundle().snapshot_hash
        );
    }

    #[test]
    fn snapshot_hash_folds_in_the_timestamp() {
        let a = ReportGenerator::new_at(report_data(), at(9)).unwrap();
        let b = ReportGenerator::new_at(report_data(), at(10)).unwrap();
        assert_eq!(a.evidence_bundle().data_hash, b.evidence_bundle().data_hash);
        assert_ne!(
            a.evidence_bundle().snapshot_hash,
            b.evidence_bundle().snapshot_hash
        );
    }

    #[test]
    fn different_data_yields_a_different_data_hash() {
        let mut altered = report_data();
        altered.metrics.total_volume += 1.0;
        let a = ReportGenerator::new_at(report_data(), at(9)).unwrap();
        let b = ReportGenerator::new_at(altered, at(9)).unwrap();
        assert_ne!(a.evidence_bundle().data_hash, b.evidence_bundle().data_hash);
    }

    #[test]
    fn document_and_csv_agree_on_hashes() {
        let generator = ReportGenerator::new_at(report_data(), at(9)).unwrap();
        let document = generator.render_document();
        let csv = generator.to_csv().unwrap();
        let evidence = generator.evidence_bundle();

        let evidence_section = document
            .sections
            .iter()
            .find(|s| s.title == "Evidence Bundle")
            .unwrap();
        assert!(evidence_section
            .lines
            .iter()
            .any(|l| l.contains(&evidence.snapshot_hash)));
        assert!(csv.contains(&evidence.snapshot_hash));
        assert!(csv.contains(&evidence.data_hash));
        assert!(csv.starts_with("Field,Value"));
    }

    #[test]
    fn document_has_all_sections_in_order() {
        let generator = ReportGenerator::new_at(report_data(), at(9)).unwrap();
        let document = generator.render_document();
        let titles: Vec<&str> = document.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec![
            "Application Information",
            "Key Metrics",
            "Activity Breakdown",
            "Compliance Information",
            "Evidence Bundle",
        ]);
    }

    #[test]
    fn checklist_reflects_report_contents() {
        let generator = ReportGenerator::new_at(report_data(), at(9)).unwrap();
        let checklist = generator.requirements_checklist();
        assert_eq!(checklist.len(), 4);
        assert!(checklist.iter().all(|c| c.completed));
        assert_eq!(generator.completion_percentage(), 100.0);
    }

    #[test]
    fn empty_report_scores_partial_completion() {
        let mut data = report_data();
        data.metrics.total_transactions = 0;
        data.metrics.active_users = 0;
        data.metrics.rewards_earned = 0.0;
        let generator = ReportGenerator::new_at(data, at(9)).unwrap();
        let checklist = generator.requirements_checklist();
        let metrics = checklist.iter().find(|c| c.id == "metrics").unwrap();
        assert!(!metrics.completed);
        assert!(metrics.items.iter().all(|item| !item.completed));
        // 9 of 12 leaf items remain completed.
        assert_eq!(generator.completion_percentage(), 75.0);
    }

    #[test]
    fn period_type_by_length() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            period_type(start, start + chrono::Duration::days(30)),
            PeriodType::Monthly
        );
        assert_eq!(
            period_type(start, start + chrono::Duration::days(90)),
            PeriodType::Quarterly
        );
    }
}
