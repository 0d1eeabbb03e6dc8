//! The pipeline coordinator.
//!
//! Owns the loaded snapshot as an explicit handle (no process-wide state)
//! and drives the stages in order: feature extraction, pairwise proximity,
//! multi-strategy clustering, consensus analysis, assurance scoring. The
//! call is synchronous; stages fan out internally over worker threads and
//! publish immutable outputs.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use recert_core::config::AnalyticsConfig;
use recert_core::types::{AccessGrant, ActivitySummary, Employee, EmployeeId, Snapshot};
use recert_core::Result;
use recert_cluster::{ConsensusAnalyzer, MultiStrategyClusterer};
use recert_proximity::{FeatureExtractor, PeerMatch, ProximityCalculator};

use crate::assurance::{AssuranceScorer, Classification, UsageLabel};
use crate::result::{AnalyticsResult, AnalyticsSummary};

#[derive(Debug)]
pub struct AnalyticsEngine {
    snapshot: Snapshot,
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    /// Validate configuration and snapshot up front; both error kinds are
    /// raised here, before any stage runs.
    pub fn new(snapshot: Snapshot, config: AnalyticsConfig) -> Result<Self> {
        config.validate()?;
        snapshot.validate()?;
        Ok(Self { snapshot, config })
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Run the full pipeline and return the complete result. Local failures
    /// (bad dates, dangling references, failing strategies) are recovered
    /// and reflected in the output, never raised.
    pub fn run(&self) -> AnalyticsResult {
        info!("Starting analytics pipeline...");

        let employees = self.select_population();
        if employees.is_empty() {
            warn!("No employees to analyze");
            return AnalyticsResult::empty();
        }

        let mut employee_ids: Vec<EmployeeId> =
            employees.iter().map(|e| e.id.clone()).collect();
        employee_ids.sort_unstable();
        let id_set: FxHashSet<&str> = employee_ids.iter().map(|s| s.as_str()).collect();

        let mut access_grants: Vec<&AccessGrant> = self
            .snapshot
            .access_grants
            .iter()
            .filter(|g| id_set.contains(g.employee_id.as_str()))
            .collect();
        access_grants.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        let access_grants: Vec<AccessGrant> =
            access_grants.into_iter().cloned().collect();

        let activity_summaries: Vec<&ActivitySummary> = self
            .snapshot
            .activity_summaries
            .iter()
            .filter(|s| id_set.contains(s.employee_id.as_str()))
            .collect();
        info!(
            "Analyzing {} employees with {} access grants",
            employees.len(),
            access_grants.len()
        );

        // Step 1: features.
        info!("Step 1: Extracting employee features...");
        let extractor = FeatureExtractor::new(self.snapshot.as_of);
        let owned_summaries: Vec<ActivitySummary> =
            activity_summaries.iter().map(|&s| s.clone()).collect();
        let features = extractor.extract(
            &employees,
            &access_grants,
            &owned_summaries,
            &self.snapshot.teams,
            &self.snapshot.sub_lobs,
        );
        let chains = extractor.manager_chains(&employees);

        // Step 2: proximity matrix.
        info!("Step 2: Calculating proximity matrix...");
        let calculator = ProximityCalculator::new(self.config.proximity);
        let matrix = calculator.pairwise_matrix(
            &employee_ids,
            &features,
            Some(&chains),
            self.config.pipeline.block_by_lob,
        );

        // Step 3: clustering.
        info!("Step 3: Running multi-strategy clustering...");
        let clusterer = MultiStrategyClusterer::new(
            self.config.clustering.clone(),
            self.config.pipeline.rng_seed,
        );
        let cluster_assignments = clusterer.run(&matrix, &self.config.pipeline.strategies);

        // Step 4: consensus.
        info!("Step 4: Analyzing clustering consensus...");
        let analyzer = ConsensusAnalyzer::new(self.config.consensus.clone());
        let consensus_results = analyzer.analyze(&cluster_assignments, &employee_ids);

        // Step 5: assurance scores.
        info!("Step 5: Calculating assurance scores...");
        let resources: FxHashMap<&str, _> = self
            .snapshot
            .resources
            .iter()
            .map(|r| (r.id.as_str(), r))
            .collect();
        let activity: FxHashMap<(&str, &str), &ActivitySummary> = activity_summaries
            .iter()
            .map(|&s| ((s.employee_id.as_str(), s.resource_id.as_str()), s))
            .collect();
        let scorer = AssuranceScorer::new(self.config.assurance.clone());
        let assurance_scores =
            scorer.score_all(&access_grants, &resources, &consensus_results, &activity);

        let summary = AnalyticsSummary {
            total_employees: employees.len(),
            total_grants: access_grants.len(),
            high_assurance_count: assurance_scores
                .values()
                .filter(|s| s.classification == Classification::HighAssurance)
                .count(),
            medium_assurance_count: assurance_scores
                .values()
                .filter(|s| s.classification == Classification::MediumAssurance)
                .count(),
            low_assurance_count: assurance_scores
                .values()
                .filter(|s| s.classification == Classification::LowAssurance)
                .count(),
            auto_certify_eligible_count: assurance_scores
                .values()
                .filter(|s| s.auto_certify_eligible)
                .count(),
            needs_human_review_count: consensus_results
                .values()
                .filter(|c| c.needs_human_review)
                .count(),
            clustering_disagreement_count: consensus_results
                .values()
                .filter(|c| c.consensus_score < self.config.consensus.review_threshold)
                .count(),
        };

        info!(
            "Analytics pipeline complete: {}/{} grants auto-certify eligible",
            summary.auto_certify_eligible_count, summary.total_grants
        );

        AnalyticsResult {
            employee_features: features,
            cluster_assignments,
            consensus_results,
            assurance_scores,
            summary,
        }
    }

    /// Active employees, narrowed to one LOB when a filter is configured.
    /// A filter that matches no LOB (or an LOB with no teams) selects
    /// nobody; the run still returns a well-formed empty result.
    fn select_population(&self) -> Vec<Employee> {
        let active = self
            .snapshot
            .employees
            .iter()
            .filter(|e| e.status.is_active());

        let Some(filter) = self.config.pipeline.lob_filter.as_deref() else {
            return active.cloned().collect();
        };

        let lob_id = self
            .snapshot
            .lobs
            .iter()
            .find(|l| l.id == filter)
            .or_else(|| self.snapshot.lobs.iter().find(|l| l.name == filter))
            .map(|l| l.id.as_str());

        let Some(lob_id) = lob_id else {
            warn!("LOB not found: {filter}");
            return Vec::new();
        };

        let sub_lobs_in_lob: FxHashSet<&str> = self
            .snapshot
            .sub_lobs
            .iter()
            .filter(|s| s.lob_id == lob_id)
            .map(|s| s.id.as_str())
            .collect();
        let teams_in_lob: FxHashSet<&str> = self
            .snapshot
            .teams
            .iter()
            .filter(|t| {
                t.lob_id.as_deref() == Some(lob_id)
                    || t.sub_lob_id
                        .as_deref()
                        .is_some_and(|s| sub_lobs_in_lob.contains(s))
            })
            .map(|t| t.id.as_str())
            .collect();

        let selected: Vec<Employee> = active
            .filter(|e| {
                e.team_id
                    .as_deref()
                    .is_some_and(|t| teams_in_lob.contains(t))
            })
            .cloned()
            .collect();
        info!(
            "Filtered to {} employees in LOB {filter} (id: {lob_id})",
            selected.len()
        );
        selected
    }

    /// Direct pairwise peer lookup for one employee, bypassing clustering.
    /// A convenience query for interactive callers; the scorer never uses it.
    pub fn find_peers(&self, employee_id: &str, top_k: usize, min_proximity: f64) -> Vec<PeerMatch> {
        let employees = self.select_population();
        let extractor = FeatureExtractor::new(self.snapshot.as_of);
        let features = extractor.extract(
            &employees,
            &self.snapshot.access_grants,
            &self.snapshot.activity_summaries,
            &self.snapshot.teams,
            &self.snapshot.sub_lobs,
        );
        let chains = extractor.manager_chains(&employees);
        let calculator = ProximityCalculator::new(self.config.proximity);
        calculator.find_peers(employee_id, &features, top_k, min_proximity, Some(&chains))
    }

    /// Review queue for a manager: grants held by their direct reports,
    /// lowest assurance first.
    pub fn review_items(
        &self,
        result: &AnalyticsResult,
        reviewer_employee_id: &str,
        include_auto_certified: bool,
    ) -> Vec<ReviewItem> {
        let direct_reports: FxHashSet<&str> = self
            .snapshot
            .employees
            .iter()
            .filter(|e| e.manager_id.as_deref() == Some(reviewer_employee_id))
            .map(|e| e.id.as_str())
            .collect();
        if direct_reports.is_empty() {
            return Vec::new();
        }

        let employee_by_id: FxHashMap<&str, &Employee> = self
            .snapshot
            .employees
            .iter()
            .map(|e| (e.id.as_str(), e))
            .collect();

        let mut items: Vec<ReviewItem> = result
            .assurance_scores
            .values()
            .filter(|score| direct_reports.contains(score.employee_id.as_str()))
            .filter(|score| include_auto_certified || !score.auto_certify_eligible)
            .map(|score| {
                let employee = employee_by_id.get(score.employee_id.as_str());
                let consensus = result.consensus_results.get(&score.employee_id);
                ReviewItem {
                    grant_id: score.grant_id.clone(),
                    employee_id: score.employee_id.clone(),
                    employee_name: employee
                        .map(|e| e.full_name.clone())
                        .unwrap_or_default(),
                    employee_title: employee
                        .map(|e| e.job_title.clone())
                        .unwrap_or_default(),
                    resource_id: score.resource_id.clone(),
                    resource_name: score.resource_name.clone(),
                    resource_sensitivity: score.resource_sensitivity.to_string(),
                    assurance_score: score.overall_score,
                    classification: score.classification,
                    auto_certify_eligible: score.auto_certify_eligible,
                    peer_percentage: score.peer_percentage,
                    peers_with_access: score.peers_with_access,
                    total_peers: score.total_peers,
                    usage_pattern: score.usage_pattern,
                    days_since_last_use: score.days_since_last_use,
                    explanations: score.explanations.clone(),
                    clustering_consensus: consensus.map(|c| c.consensus_score).unwrap_or(0.0),
                    needs_clustering_review: consensus
                        .map(|c| c.needs_human_review)
                        .unwrap_or(false),
                    clustering_disagreement: consensus
                        .and_then(|c| c.disagreement_reason.clone()),
                }
            })
            .collect();

        items.sort_by(|a, b| {
            a.assurance_score
                .partial_cmp(&b.assurance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.grant_id.cmp(&b.grant_id))
        });
        items
    }

    /// Per-employee rollup of grant classifications and peer context.
    pub fn employee_access_summary(
        &self,
        result: &AnalyticsResult,
        employee_id: &str,
    ) -> Option<EmployeeAccessSummary> {
        let employee = self
            .snapshot
            .employees
            .iter()
            .find(|e| e.id == employee_id)?;

        let mut grants: Vec<&crate::assurance::AssuranceScore> = result
            .assurance_scores
            .values()
            .filter(|s| s.employee_id == employee_id)
            .collect();
        grants.sort_by(|a, b| {
            a.overall_score
                .partial_cmp(&b.overall_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.grant_id.cmp(&b.grant_id))
        });

        let consensus = result.consensus_results.get(employee_id);
        let count_class = |c: Classification| {
            grants.iter().filter(|g| g.classification == c).count()
        };

        Some(EmployeeAccessSummary {
            employee_id: employee.id.clone(),
            employee_name: employee.full_name.clone(),
            employee_title: employee.job_title.clone(),
            team_id: employee.team_id.clone(),
            manager_id: employee.manager_id.clone(),
            total_grants: grants.len(),
            high_assurance_count: count_class(Classification::HighAssurance),
            medium_assurance_count: count_class(Classification::MediumAssurance),
            low_assurance_count: count_class(Classification::LowAssurance),
            dormant_access_count: grants
                .iter()
                .filter(|g| g.usage_pattern == UsageLabel::Dormant)
                .count(),
            auto_certify_eligible: grants.iter().filter(|g| g.auto_certify_eligible).count(),
            peer_count: consensus.map(|c| c.peer_count).unwrap_or(0),
            clustering_consensus: consensus.map(|c| c.consensus_score).unwrap_or(0.0),
            needs_clustering_review: consensus.map(|c| c.needs_human_review).unwrap_or(false),
            grant_ids: grants.iter().map(|g| g.grant_id.clone()).collect(),
        })
    }
}

/// One entry in a manager's review queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub grant_id: String,
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub employee_title: String,
    pub resource_id: String,
    pub resource_name: String,
    pub resource_sensitivity: String,
    pub assurance_score: f64,
    pub classification: Classification,
    pub auto_certify_eligible: bool,
    pub peer_percentage: f64,
    pub peers_with_access: usize,
    pub total_peers: usize,
    pub usage_pattern: UsageLabel,
    pub days_since_last_use: Option<i64>,
    pub explanations: Vec<String>,
    pub clustering_consensus: f64,
    pub needs_clustering_review: bool,
    pub clustering_disagreement: Option<String>,
}

/// Rollup of one employee's grants, lowest scores first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeAccessSummary {
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub employee_title: String,
    pub team_id: Option<String>,
    pub manager_id: Option<EmployeeId>,
    pub total_grants: usize,
    pub high_assurance_count: usize,
    pub medium_assurance_count: usize,
    pub low_assurance_count: usize,
    pub dormant_access_count: usize,
    pub auto_certify_eligible: usize,
    pub peer_count: usize,
    pub clustering_consensus: f64,
    pub needs_clustering_review: bool,
    pub grant_ids: Vec<String>,
}
