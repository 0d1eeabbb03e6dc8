//! Assurance scoring for access grants.
//!
//! A grant's score blends peer typicality and usage activity, then passes
//! through the resource's sensitivity ceiling. The ceiling CAPS the score
//! rather than weighting it: Critical resources have a ceiling of zero and
//! can never be auto-certified, no matter how typical or active the access.

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

use recert_core::config::AssuranceConfig;
use recert_core::types::{
    AccessGrant, ActivitySummary, EmployeeId, GrantId, Resource, ResourceId, Sensitivity,
};
use recert_cluster::ConsensusResult;

/// Score ceiling per sensitivity level. Not a weight: the final score is
/// `raw * ceiling * 100` and can never exceed `100 * ceiling`.
pub fn sensitivity_ceiling(level: Sensitivity) -> f64 {
    match level {
        Sensitivity::Public => 1.0,
        Sensitivity::Internal => 0.85,
        Sensitivity::Confidential => 0.50,
        Sensitivity::Critical => 0.0,
    }
}

/// Wire-contract classification strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    HighAssurance,
    MediumAssurance,
    LowAssurance,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::HighAssurance => "high_assurance",
            Classification::MediumAssurance => "medium_assurance",
            Classification::LowAssurance => "low_assurance",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wire-contract usage labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageLabel {
    Active,
    Occasional,
    Stale,
    Dormant,
}

impl UsageLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageLabel::Active => "active",
            UsageLabel::Occasional => "occasional",
            UsageLabel::Stale => "stale",
            UsageLabel::Dormant => "dormant",
        }
    }
}

impl fmt::Display for UsageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Usage inputs for one (employee, resource) pairing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsagePattern {
    pub total_access_count: i64,
    pub last_accessed_days_ago: Option<i64>,
    pub access_count_30d: i64,
    pub access_count_90d: i64,
    pub days_since_grant: i64,
}

impl UsagePattern {
    pub fn from_summary(summary: &ActivitySummary) -> Self {
        Self {
            total_access_count: summary.total_access_count,
            last_accessed_days_ago: summary.days_since_last_use,
            access_count_30d: summary.access_count_30d,
            access_count_90d: summary.access_count_90d,
            days_since_grant: summary.days_since_grant,
        }
    }
}

/// Complete assurance verdict for one access grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssuranceScore {
    pub grant_id: GrantId,
    pub employee_id: EmployeeId,
    pub resource_id: ResourceId,

    /// Final score in [0, 100], after the ceiling.
    pub overall_score: f64,

    pub peer_typicality: f64,
    pub sensitivity_ceiling: f64,
    pub usage_factor: f64,
    /// Weighted blend before the ceiling is applied.
    pub raw_score: f64,

    pub peers_with_access: usize,
    pub total_peers: usize,
    pub peer_percentage: f64,

    pub usage_pattern: UsageLabel,
    pub days_since_last_use: Option<i64>,

    pub resource_sensitivity: Sensitivity,
    pub resource_name: String,

    pub classification: Classification,
    pub auto_certify_eligible: bool,

    /// Ordered reviewer-facing rationale: peer comparison, usage pattern,
    /// sensitivity note, final assessment. Downstream consumers key off the
    /// ordering and categories, not the exact wording.
    pub explanations: Vec<String>,
}

pub struct AssuranceScorer {
    config: AssuranceConfig,
}

impl AssuranceScorer {
    pub fn new(config: AssuranceConfig) -> Self {
        Self { config }
    }

    /// Fraction of peers holding the resource. An empty peer group yields
    /// the neutral prior 0.5.
    pub fn typicality(
        &self,
        resource_id: &str,
        peer_ids: &[EmployeeId],
        access_by_employee: &FxHashMap<&str, FxHashSet<&str>>,
    ) -> (f64, usize, usize) {
        if peer_ids.is_empty() {
            return (0.5, 0, 0);
        }
        let total = peer_ids.len();
        let holding = peer_ids
            .iter()
            .filter(|peer| {
                access_by_employee
                    .get(peer.as_str())
                    .is_some_and(|set| set.contains(resource_id))
            })
            .count();
        (holding as f64 / total as f64, holding, total)
    }

    /// Usage factor and label from recency and 30-day frequency.
    pub fn usage_factor(&self, usage: &UsagePattern) -> (f64, UsageLabel) {
        if usage.total_access_count == 0 {
            return (0.1, UsageLabel::Dormant);
        }
        let Some(days) = usage.last_accessed_days_ago else {
            return (0.1, UsageLabel::Dormant);
        };

        if days <= self.config.active_days_threshold {
            if usage.access_count_30d >= 10 {
                (1.0, UsageLabel::Active)
            } else if usage.access_count_30d >= 3 {
                (0.9, UsageLabel::Active)
            } else {
                (0.8, UsageLabel::Active)
            }
        } else if days <= self.config.occasional_days_threshold {
            (0.6, UsageLabel::Occasional)
        } else if days <= self.config.stale_days_threshold {
            (0.3, UsageLabel::Stale)
        } else {
            (0.1, UsageLabel::Dormant)
        }
    }

    /// Score a single grant.
    #[allow(clippy::too_many_arguments)]
    pub fn score(
        &self,
        grant: &AccessGrant,
        sensitivity: Sensitivity,
        resource_name: &str,
        peer_ids: &[EmployeeId],
        access_by_employee: &FxHashMap<&str, FxHashSet<&str>>,
        usage: &UsagePattern,
    ) -> AssuranceScore {
        let (typicality, peers_with, total_peers) =
            self.typicality(&grant.resource_id, peer_ids, access_by_employee);
        let (usage_factor, usage_label) = self.usage_factor(usage);
        let ceiling = sensitivity_ceiling(sensitivity);

        let raw_score =
            self.config.weight_typicality * typicality + self.config.weight_usage * usage_factor;
        let final_score = raw_score * ceiling * 100.0;

        let peer_percentage = if total_peers > 0 {
            peers_with as f64 / total_peers as f64 * 100.0
        } else {
            0.0
        };

        let classification = if final_score >= self.config.high_threshold {
            Classification::HighAssurance
        } else if final_score >= self.config.medium_threshold {
            Classification::MediumAssurance
        } else {
            Classification::LowAssurance
        };
        // Critical sensitivity can never be auto-certified.
        let auto_certify_eligible = classification == Classification::HighAssurance && ceiling > 0.0;

        let explanations = self.explanations(
            peer_percentage,
            peers_with,
            total_peers,
            usage_label,
            ceiling,
            final_score,
            usage.last_accessed_days_ago,
        );

        AssuranceScore {
            grant_id: grant.id.clone(),
            employee_id: grant.employee_id.clone(),
            resource_id: grant.resource_id.clone(),
            overall_score: round1(final_score),
            peer_typicality: round3(typicality),
            sensitivity_ceiling: ceiling,
            usage_factor: round3(usage_factor),
            raw_score: round3(raw_score),
            peers_with_access: peers_with,
            total_peers,
            peer_percentage: round1(peer_percentage),
            usage_pattern: usage_label,
            days_since_last_use: usage.last_accessed_days_ago,
            resource_sensitivity: sensitivity,
            resource_name: resource_name.to_string(),
            classification,
            auto_certify_eligible,
            explanations,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn explanations(
        &self,
        peer_percentage: f64,
        peers_with: usize,
        total_peers: usize,
        usage_label: UsageLabel,
        ceiling: f64,
        final_score: f64,
        days_since_last_use: Option<i64>,
    ) -> Vec<String> {
        let mut out = Vec::with_capacity(4);

        if total_peers > 0 {
            if peer_percentage >= 80.0 {
                out.push(format!(
                    "Common access: {peer_percentage:.0}% of peers ({peers_with}/{total_peers}) have this access"
                ));
            } else if peer_percentage >= 50.0 {
                out.push(format!(
                    "Moderate access: {peer_percentage:.0}% of peers ({peers_with}/{total_peers}) have this access"
                ));
            } else if peer_percentage >= 20.0 {
                out.push(format!(
                    "Uncommon access: Only {peer_percentage:.0}% of peers ({peers_with}/{total_peers}) have this access"
                ));
            } else {
                out.push(format!(
                    "Unusual access: Only {peer_percentage:.0}% of peers ({peers_with}/{total_peers}) have this access"
                ));
            }
        } else {
            out.push("No peer group available for comparison".to_string());
        }

        match usage_label {
            UsageLabel::Active => out.push("Active usage: Access used recently".to_string()),
            UsageLabel::Occasional => {
                let days = days_since_last_use.unwrap_or(0);
                out.push(format!("Occasional usage: Last used {days} days ago"));
            }
            UsageLabel::Stale => {
                let days = days_since_last_use.unwrap_or(0);
                out.push(format!("Stale access: Last used {days} days ago"));
            }
            UsageLabel::Dormant => match days_since_last_use {
                Some(days) if days > 0 => {
                    out.push(format!("Dormant access: Not used in {days} days"))
                }
                _ => out.push("Dormant access: Never used".to_string()),
            },
        }

        if ceiling == 0.0 {
            out.push(
                "Critical sensitivity: Requires mandatory review (cannot auto-certify)".to_string(),
            );
        } else if ceiling < 0.6 {
            out.push(format!(
                "Confidential sensitivity: Score capped at {:.0}",
                ceiling * 100.0
            ));
        } else if ceiling < 0.9 {
            out.push("Internal sensitivity: Standard business access".to_string());
        }

        if final_score >= self.config.high_threshold {
            out.push("High assurance: Eligible for auto-certification".to_string());
        } else if final_score >= self.config.medium_threshold {
            out.push("Medium assurance: Review recommended".to_string());
        } else {
            out.push("Low assurance: Review required".to_string());
        }

        out
    }

    /// Score every grant. Grants are scored independently in parallel and
    /// emitted keyed by grant id, so the output order is deterministic.
    pub fn score_all(
        &self,
        access_grants: &[AccessGrant],
        resources: &FxHashMap<&str, &Resource>,
        consensus_results: &BTreeMap<EmployeeId, ConsensusResult>,
        activity: &FxHashMap<(&str, &str), &ActivitySummary>,
    ) -> BTreeMap<GrantId, AssuranceScore> {
        info!("Scoring {} access grants", access_grants.len());

        let mut access_by_employee: FxHashMap<&str, FxHashSet<&str>> = FxHashMap::default();
        for grant in access_grants {
            access_by_employee
                .entry(grant.employee_id.as_str())
                .or_default()
                .insert(grant.resource_id.as_str());
        }

        static EMPTY_PEERS: Vec<EmployeeId> = Vec::new();

        let scores: BTreeMap<GrantId, AssuranceScore> = access_grants
            .par_iter()
            .map(|grant| {
                let resource = resources.get(grant.resource_id.as_str()).copied();
                let sensitivity = resource.map(|r| r.sensitivity).unwrap_or(Sensitivity::Internal);
                let resource_name = resource
                    .map(|r| r.name.as_str())
                    .filter(|name| !name.is_empty())
                    .unwrap_or(grant.resource_id.as_str());

                let peer_ids = consensus_results
                    .get(&grant.employee_id)
                    .map(|c| &c.peer_ids)
                    .unwrap_or(&EMPTY_PEERS);

                let usage = activity
                    .get(&(grant.employee_id.as_str(), grant.resource_id.as_str()))
                    .map(|summary| UsagePattern::from_summary(summary))
                    .unwrap_or_default();

                let score = self.score(
                    grant,
                    sensitivity,
                    resource_name,
                    peer_ids,
                    &access_by_employee,
                    &usage,
                );
                (grant.id.clone(), score)
            })
            .collect();

        let high = scores
            .values()
            .filter(|s| s.classification == Classification::HighAssurance)
            .count();
        let medium = scores
            .values()
            .filter(|s| s.classification == Classification::MediumAssurance)
            .count();
        let low = scores
            .values()
            .filter(|s| s.classification == Classification::LowAssurance)
            .count();
        info!("Scoring complete: {high} high, {medium} medium, {low} low assurance");

        scores
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
