//! Feature extraction for peer-proximity analysis.
//!
//! Turns the raw snapshot tables into one [`EmployeeFeatures`] record per
//! employee: organizational placement, job attributes, access/usage
//! behavior, and career-stage timing. Everything downstream (proximity,
//! clustering, scoring) reads only these records plus the grant list.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use recert_core::types::{
    AccessGrant, ActivitySummary, Employee, EmployeeId, LobId, ResourceId, SubLob, SubLobId, Team,
    TeamId,
};

/// Cap on manager-chain walks; guards against cyclic manager data.
const MAX_CHAIN_DEPTH: usize = 32;

/// Usage intensity is access_count_30d / this, clipped to 1.0.
const INTENSITY_CAP_30D: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeFeatures {
    pub employee_id: EmployeeId,

    // Structural
    pub manager_id: Option<EmployeeId>,
    pub team_id: Option<TeamId>,
    pub sub_lob_id: Option<SubLobId>,
    pub lob_id: Option<LobId>,
    pub location_id: Option<String>,

    // Functional
    pub job_title: String,
    pub job_code: String,
    pub job_family: String,
    pub job_level: i32,
    pub cost_center_id: Option<String>,

    // Behavioral
    pub access_set: BTreeSet<ResourceId>,
    /// resource id -> normalized usage intensity in [0, 1].
    pub activity_vector: BTreeMap<ResourceId, f64>,

    // Temporal
    pub tenure_days: i64,
    pub time_in_role_days: i64,
    /// "YYYY-Qn", empty when the hire date is missing or unparseable.
    pub hire_quarter: String,
}

/// Extracts [`EmployeeFeatures`] from the raw snapshot tables.
///
/// The extractor is parameterized by the snapshot time so tenure math is
/// replayable; it never reads the wall clock.
pub struct FeatureExtractor {
    as_of: DateTime<Utc>,
}

impl FeatureExtractor {
    pub fn new(as_of: DateTime<Utc>) -> Self {
        Self { as_of }
    }

    /// Extract features for every employee in `employees`.
    ///
    /// Missing or dangling team references leave the LOB fields `None`; the
    /// employee still gets a record and simply matches fewer structural
    /// terms. Unparseable dates zero the temporal fields.
    pub fn extract(
        &self,
        employees: &[Employee],
        access_grants: &[AccessGrant],
        activity_summaries: &[ActivitySummary],
        teams: &[Team],
        sub_lobs: &[SubLob],
    ) -> BTreeMap<EmployeeId, EmployeeFeatures> {
        info!("Extracting features for {} employees", employees.len());

        let team_lookup: FxHashMap<&str, &Team> =
            teams.iter().map(|t| (t.id.as_str(), t)).collect();
        let sub_lob_lookup: FxHashMap<&str, &SubLob> =
            sub_lobs.iter().map(|s| (s.id.as_str(), s)).collect();

        let mut access_by_employee: FxHashMap<&str, BTreeSet<ResourceId>> = FxHashMap::default();
        for grant in access_grants {
            access_by_employee
                .entry(grant.employee_id.as_str())
                .or_default()
                .insert(grant.resource_id.clone());
        }

        let mut activity_by_employee: FxHashMap<&str, BTreeMap<ResourceId, f64>> =
            FxHashMap::default();
        for summary in activity_summaries {
            let intensity = (summary.access_count_30d.max(0) as f64 / INTENSITY_CAP_30D).min(1.0);
            activity_by_employee
                .entry(summary.employee_id.as_str())
                .or_default()
                .insert(summary.resource_id.clone(), intensity);
        }

        let mut features = BTreeMap::new();
        for emp in employees {
            let team = emp
                .team_id
                .as_deref()
                .and_then(|id| team_lookup.get(id).copied());
            let sub_lob_id = team.and_then(|t| t.sub_lob_id.clone());
            let mut lob_id = team.and_then(|t| t.lob_id.clone());
            if lob_id.is_none() {
                if let Some(sub_id) = sub_lob_id.as_deref() {
                    lob_id = sub_lob_lookup.get(sub_id).map(|s| s.lob_id.clone());
                }
            }

            let (tenure_days, hire_quarter) = match emp.hire_date.as_deref().and_then(parse_date) {
                Some(hired) => {
                    let quarter = (hired.month0() / 3) + 1;
                    (
                        (self.as_of - hired).num_days(),
                        format!("{}-Q{}", hired.year(), quarter),
                    )
                }
                None => (0, String::new()),
            };
            let time_in_role_days = emp
                .role_start_date
                .as_deref()
                .and_then(parse_date)
                .map(|started| (self.as_of - started).num_days())
                .unwrap_or(0);

            features.insert(
                emp.id.clone(),
                EmployeeFeatures {
                    employee_id: emp.id.clone(),
                    manager_id: emp.manager_id.clone(),
                    team_id: emp.team_id.clone(),
                    sub_lob_id,
                    lob_id,
                    location_id: emp.location_id.clone(),
                    job_title: emp.job_title.clone(),
                    job_code: emp.job_code.clone(),
                    job_family: emp.job_family.clone(),
                    job_level: emp.job_level,
                    cost_center_id: emp.cost_center_id.clone(),
                    access_set: access_by_employee
                        .get(emp.id.as_str())
                        .cloned()
                        .unwrap_or_default(),
                    activity_vector: activity_by_employee
                        .get(emp.id.as_str())
                        .cloned()
                        .unwrap_or_default(),
                    tenure_days,
                    time_in_role_days,
                    hire_quarter,
                },
            );
        }

        debug!("Extracted features for {} employees", features.len());
        features
    }

    /// Build the manager-chain lookup: employee id -> ordered chain of
    /// manager ids walking upward (direct manager first). Chains stop at a
    /// missing manager, a dangling reference, or the depth cap.
    pub fn manager_chains(&self, employees: &[Employee]) -> FxHashMap<EmployeeId, Vec<EmployeeId>> {
        let manager_of: FxHashMap<&str, &str> = employees
            .iter()
            .filter_map(|e| e.manager_id.as_deref().map(|m| (e.id.as_str(), m)))
            .collect();

        let mut chains = FxHashMap::default();
        for emp in employees {
            let mut chain = Vec::new();
            let mut seen: FxHashSet<&str> = FxHashSet::default();
            seen.insert(emp.id.as_str());
            let mut cursor = emp.id.as_str();
            while let Some(&mgr) = manager_of.get(cursor) {
                if !seen.insert(mgr) || chain.len() >= MAX_CHAIN_DEPTH {
                    break;
                }
                chain.push(mgr.to_string());
                cursor = mgr;
            }
            chains.insert(emp.id.clone(), chain);
        }
        chains
    }
}

/// Lenient ISO-8601 parsing: RFC 3339 with offset, naive datetime, or bare
/// date. Returns `None` on any parse failure.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}
