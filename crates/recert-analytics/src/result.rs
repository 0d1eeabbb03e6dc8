//! Pipeline output: the in-memory result and its export document.
//!
//! Every map is a `BTreeMap` so iteration (and serialization) order is
//! stable; two runs over the same snapshot produce structurally equal
//! results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use recert_core::config::StrategyKind;
use recert_core::types::{EmployeeId, GrantId, Sensitivity};
use recert_cluster::{ConsensusResult, StrategyAssignments};
use recert_proximity::EmployeeFeatures;

use crate::assurance::{AssuranceScore, Classification, UsageLabel};

/// Aggregate counts over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_employees: usize,
    pub total_grants: usize,
    pub high_assurance_count: usize,
    pub medium_assurance_count: usize,
    pub low_assurance_count: usize,
    pub auto_certify_eligible_count: usize,
    pub needs_human_review_count: usize,
    pub clustering_disagreement_count: usize,
}

/// Complete analytics result for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResult {
    pub employee_features: BTreeMap<EmployeeId, EmployeeFeatures>,
    pub cluster_assignments: BTreeMap<StrategyKind, StrategyAssignments>,
    pub consensus_results: BTreeMap<EmployeeId, ConsensusResult>,
    pub assurance_scores: BTreeMap<GrantId, AssuranceScore>,
    pub summary: AnalyticsSummary,
}

impl AnalyticsResult {
    /// An empty, well-formed result (e.g. a LOB filter that matched nobody).
    pub fn empty() -> Self {
        Self {
            employee_features: BTreeMap::new(),
            cluster_assignments: BTreeMap::new(),
            consensus_results: BTreeMap::new(),
            assurance_scores: BTreeMap::new(),
            summary: AnalyticsSummary::default(),
        }
    }

    /// Self-contained export document for persistence or transport.
    pub fn to_export(&self) -> ExportDocument {
        ExportDocument {
            summary: self.summary.clone(),
            assurance_scores: self
                .assurance_scores
                .iter()
                .map(|(id, score)| (id.clone(), ExportScore::from(score)))
                .collect(),
            consensus_results: self
                .consensus_results
                .iter()
                .map(|(id, consensus)| (id.clone(), ExportConsensus::from(consensus)))
                .collect(),
        }
    }
}

/// Serializable document with the wire-contract fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub summary: AnalyticsSummary,
    pub assurance_scores: BTreeMap<GrantId, ExportScore>,
    pub consensus_results: BTreeMap<EmployeeId, ExportConsensus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportScore {
    pub grant_id: GrantId,
    pub employee_id: EmployeeId,
    pub resource_id: String,
    pub resource_name: String,
    pub resource_sensitivity: Sensitivity,
    pub overall_score: f64,
    pub classification: Classification,
    pub auto_certify_eligible: bool,
    pub peer_typicality: f64,
    pub peer_percentage: f64,
    pub usage_pattern: UsageLabel,
    pub usage_factor: f64,
    pub explanations: Vec<String>,
}

impl From<&AssuranceScore> for ExportScore {
    fn from(score: &AssuranceScore) -> Self {
        Self {
            grant_id: score.grant_id.clone(),
            employee_id: score.employee_id.clone(),
            resource_id: score.resource_id.clone(),
            resource_name: score.resource_name.clone(),
            resource_sensitivity: score.resource_sensitivity,
            overall_score: score.overall_score,
            classification: score.classification,
            auto_certify_eligible: score.auto_certify_eligible,
            peer_typicality: score.peer_typicality,
            peer_percentage: score.peer_percentage,
            usage_pattern: score.usage_pattern,
            usage_factor: score.usage_factor,
            explanations: score.explanations.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConsensus {
    pub employee_id: EmployeeId,
    pub consensus_score: f64,
    pub strategies_agreeing: usize,
    pub total_strategies: usize,
    pub peer_count: usize,
    pub needs_human_review: bool,
    pub disagreement_reason: Option<String>,
}

impl From<&ConsensusResult> for ExportConsensus {
    fn from(consensus: &ConsensusResult) -> Self {
        Self {
            employee_id: consensus.employee_id.clone(),
            consensus_score: consensus.consensus_score,
            strategies_agreeing: consensus.strategies_agreeing,
            total_strategies: consensus.total_strategies,
            peer_count: consensus.peer_count,
            needs_human_review: consensus.needs_human_review,
            disagreement_reason: consensus.disagreement_reason.clone(),
        }
    }
}
