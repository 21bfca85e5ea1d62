//! Job posting entity.

use serde::{Deserialize, Deserializer, Serialize};

use crate::entity::Entity;
use crate::error::DomainResult;
use crate::id::{JobId, RecruiterId};
use crate::kind::{EntityKind, Indexable};
use crate::salary::Salary;

/// A job posting.
///
/// Field names are the wire contract of the job stream. `posted_by_uuid`
/// becomes the recruiter of every match derived from this job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub location: String,
    pub requirements: Vec<String>,

    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub job_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub salary: Salary,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub posted_by_uuid: Option<RecruiterId>,
    #[serde(default)]
    pub date_posted: String,
}

impl Job {
    /// Minimal job with only the matching attributes set.
    pub fn new(id: JobId, location: impl Into<String>, requirements: Vec<String>) -> Self {
        Self {
            id,
            location: location.into(),
            requirements,
            title: String::new(),
            company_name: String::new(),
            job_type: String::new(),
            description: String::new(),
            responsibilities: Vec::new(),
            salary: Salary::default(),
            posted_by_uuid: None,
            date_posted: String::new(),
        }
    }

    pub fn posted_by(mut self, recruiter: RecruiterId) -> Self {
        self.posted_by_uuid = Some(recruiter);
        self
    }

    /// Decode and validate a job payload.
    pub fn from_json(payload: &[u8]) -> DomainResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn recruiter(&self) -> Option<&RecruiterId> {
        self.posted_by_uuid.as_ref()
    }
}

impl Entity for Job {
    type Id = JobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Indexable for Job {
    const KIND: EntityKind = EntityKind::Job;

    fn location(&self) -> &str {
        &self.location
    }

    fn tags(&self) -> &[String] {
        &self.requirements
    }
}

/// Producers send an empty string (or null) when a job has no known poster.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<RecruiterId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        Some(s) if !s.trim().is_empty() => RecruiterId::new(s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_wire_payload() {
        let payload = br#"{
            "title": "Software Engineer",
            "company_name": "Tech Corp",
            "location": "San Francisco, CA",
            "job_type": "Full-time",
            "description": "Develop and maintain software applications.",
            "responsibilities": ["Write code", "Review code"],
            "requirements": ["Java", "Spring", "AWS"],
            "salary": {"min": 100000, "max": 120000},
            "posted_by_uuid": "1234-5678-uuid",
            "id": "job-001",
            "date_posted": "2024-12-07"
        }"#;

        let job = Job::from_json(payload).unwrap();
        assert_eq!(job.id.as_str(), "job-001");
        assert_eq!(job.recruiter().map(|r| r.as_str()), Some("1234-5678-uuid"));
        assert_eq!(job.tags(), ["Java", "Spring", "AWS"]);
    }

    #[test]
    fn blank_or_missing_poster_means_no_recruiter() {
        let missing = Job::from_json(br#"{"id":"j","location":"NY","requirements":[]}"#).unwrap();
        assert!(missing.recruiter().is_none());

        let blank = Job::from_json(
            br#"{"id":"j","location":"NY","requirements":[],"posted_by_uuid":""}"#,
        )
        .unwrap();
        assert!(blank.recruiter().is_none());
    }

    #[test]
    fn missing_requirements_is_a_decode_error() {
        assert!(Job::from_json(br#"{"id":"j","location":"NY"}"#).is_err());
    }
}
