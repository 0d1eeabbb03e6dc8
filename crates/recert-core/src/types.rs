use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{RecertError, Result};

pub type EmployeeId = String;
pub type TeamId = String;
pub type SubLobId = String;
pub type LobId = String;
pub type ResourceId = String;
pub type GrantId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmploymentStatus {
    Active,
    Inactive,
    Terminated,
}

impl EmploymentStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, EmploymentStatus::Active)
    }
}

impl FromStr for EmploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(EmploymentStatus::Active),
            "inactive" => Ok(EmploymentStatus::Inactive),
            "terminated" => Ok(EmploymentStatus::Terminated),
            other => Err(format!("unknown employment status: {other}")),
        }
    }
}

/// Resource sensitivity levels. The exact casing of the serialized names is
/// part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sensitivity {
    Public,
    Internal,
    Confidential,
    Critical,
}

impl Sensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Public => "Public",
            Sensitivity::Internal => "Internal",
            Sensitivity::Confidential => "Confidential",
            Sensitivity::Critical => "Critical",
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Sensitivity {
    type Err = std::convert::Infallible;

    /// Unrecognized labels fall back to `Internal`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "public" => Sensitivity::Public,
            "confidential" => Sensitivity::Confidential,
            "critical" => Sensitivity::Critical,
            _ => Sensitivity::Internal,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Employee {
    pub id: EmployeeId,
    #[serde(default)]
    pub manager_id: Option<EmployeeId>,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub cost_center_id: Option<String>,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub job_code: String,
    #[serde(default)]
    pub job_family: String,
    /// Job level 1..7; 0 means unknown.
    #[serde(default)]
    pub job_level: i32,
    #[serde(default)]
    pub employment_type: String,
    /// ISO-8601, naive or offset-bearing. Parsed leniently during feature
    /// extraction; parse failures default the temporal features to zero.
    #[serde(default)]
    pub hire_date: Option<String>,
    #[serde(default)]
    pub role_start_date: Option<String>,
    pub status: EmploymentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Team {
    pub id: TeamId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sub_lob_id: Option<SubLobId>,
    #[serde(default)]
    pub lob_id: Option<LobId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubLob {
    pub id: SubLobId,
    #[serde(default)]
    pub name: String,
    pub lob_id: LobId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Lob {
    pub id: LobId,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Resource {
    pub id: ResourceId,
    #[serde(default)]
    pub system_id: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub name: String,
    pub sensitivity: Sensitivity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessGrant {
    pub id: GrantId,
    pub employee_id: EmployeeId,
    pub resource_id: ResourceId,
    #[serde(default)]
    pub granted_date: Option<String>,
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub justification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivitySummary {
    pub employee_id: EmployeeId,
    pub resource_id: ResourceId,
    #[serde(default)]
    pub total_access_count: i64,
    #[serde(default)]
    pub last_accessed: Option<String>,
    #[serde(default)]
    pub access_count_7d: i64,
    #[serde(default)]
    pub access_count_30d: i64,
    #[serde(default)]
    pub access_count_90d: i64,
    #[serde(default)]
    pub days_since_grant: i64,
    #[serde(default)]
    pub days_since_last_use: Option<i64>,
}

/// Read-only input bundle for one pipeline run.
///
/// `as_of` is the snapshot time used for every tenure computation; the
/// pipeline never consults the wall clock, so a replay with the same
/// snapshot is byte-identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub as_of: DateTime<Utc>,
    pub employees: Vec<Employee>,
    pub teams: Vec<Team>,
    pub sub_lobs: Vec<SubLob>,
    pub lobs: Vec<Lob>,
    pub resources: Vec<Resource>,
    pub access_grants: Vec<AccessGrant>,
    pub activity_summaries: Vec<ActivitySummary>,
}

impl Snapshot {
    /// Structural validation of the input bundle. Dangling references are
    /// tolerated (they degrade to fewer proximity matches downstream), but
    /// empty or duplicate primary ids make the snapshot unusable.
    pub fn validate(&self) -> Result<()> {
        let mut employee_ids: FxHashSet<&str> = FxHashSet::default();
        for emp in &self.employees {
            if emp.id.is_empty() {
                return Err(RecertError::snapshot("employee with empty id"));
            }
            if !employee_ids.insert(emp.id.as_str()) {
                return Err(RecertError::snapshot(format!(
                    "duplicate employee id: {}",
                    emp.id
                )));
            }
        }

        let mut resource_ids: FxHashSet<&str> = FxHashSet::default();
        for res in &self.resources {
            if res.id.is_empty() {
                return Err(RecertError::snapshot("resource with empty id"));
            }
            if !resource_ids.insert(res.id.as_str()) {
                return Err(RecertError::snapshot(format!(
                    "duplicate resource id: {}",
                    res.id
                )));
            }
        }

        for team in &self.teams {
            if team.id.is_empty() {
                return Err(RecertError::snapshot("team with empty id"));
            }
        }

        for grant in &self.access_grants {
            if grant.id.is_empty() || grant.employee_id.is_empty() || grant.resource_id.is_empty() {
                return Err(RecertError::snapshot(format!(
                    "access grant with missing key fields: {:?}",
                    grant.id
                )));
            }
        }

        for summary in &self.activity_summaries {
            if summary.employee_id.is_empty() || summary.resource_id.is_empty() {
                return Err(RecertError::snapshot(
                    "activity summary with missing employee or resource id",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn empty_snapshot() -> Snapshot {
        Snapshot {
            as_of: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            employees: Vec::new(),
            teams: Vec::new(),
            sub_lobs: Vec::new(),
            lobs: Vec::new(),
            resources: Vec::new(),
            access_grants: Vec::new(),
            activity_summaries: Vec::new(),
        }
    }

    #[test]
    fn sensitivity_wire_names() {
        assert_eq!(
            serde_json::to_string(&Sensitivity::Confidential).unwrap(),
            "\"Confidential\""
        );
        assert_eq!(Sensitivity::Critical.to_string(), "Critical");
    }

    #[test]
    fn sensitivity_from_str_is_lenient() {
        assert_eq!("public".parse::<Sensitivity>().unwrap(), Sensitivity::Public);
        assert_eq!("CRITICAL".parse::<Sensitivity>().unwrap(), Sensitivity::Critical);
        assert_eq!("whatever".parse::<Sensitivity>().unwrap(), Sensitivity::Internal);
    }

    #[test]
    fn employee_rejects_unknown_keys() {
        let json = r#"{"id": "e1", "status": "Active", "shoe_size": 42}"#;
        assert!(serde_json::from_str::<Employee>(json).is_err());
    }

    #[test]
    fn duplicate_employee_id_fails_validation() {
        let mut snap = empty_snapshot();
        let emp = Employee {
            id: "e1".into(),
            manager_id: None,
            team_id: None,
            location_id: None,
            cost_center_id: None,
            full_name: String::new(),
            job_title: String::new(),
            job_code: String::new(),
            job_family: String::new(),
            job_level: 0,
            employment_type: String::new(),
            hire_date: None,
            role_start_date: None,
            status: EmploymentStatus::Active,
        };
        snap.employees.push(emp.clone());
        snap.employees.push(emp);
        assert!(matches!(snap.validate(), Err(RecertError::Snapshot(_))));
    }

    #[test]
    fn empty_snapshot_is_valid() {
        assert!(empty_snapshot().validate().is_ok());
    }
}
