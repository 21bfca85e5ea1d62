//! Job seeker entity.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::DomainResult;
use crate::id::UserId;
use crate::kind::{EntityKind, Indexable};
use crate::salary::Salary;

/// A person looking for work.
///
/// Field names are the wire contract of the job-seeker stream. Only `id`,
/// `location` and `qualifications` take part in matching; the rest is carried
/// through to the search document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSeeker {
    pub id: UserId,
    pub location: String,
    pub qualifications: Vec<String>,

    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub education_level: String,
    #[serde(default)]
    pub years_of_experience: u32,
    #[serde(default)]
    pub availability: String,
    #[serde(default)]
    pub salary: Salary,
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub phone_number: String,
}

impl JobSeeker {
    /// Minimal job seeker with only the matching attributes set.
    pub fn new(id: UserId, location: impl Into<String>, qualifications: Vec<String>) -> Self {
        Self {
            id,
            location: location.into(),
            qualifications,
            username: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            interests: Vec::new(),
            education_level: String::new(),
            years_of_experience: 0,
            availability: String::new(),
            salary: Salary::default(),
            date_of_birth: String::new(),
            phone_number: String::new(),
        }
    }

    /// Decode and validate a job-seeker payload.
    pub fn from_json(payload: &[u8]) -> DomainResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl Entity for JobSeeker {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Indexable for JobSeeker {
    const KIND: EntityKind = EntityKind::JobSeeker;

    fn location(&self) -> &str {
        &self.location
    }

    fn tags(&self) -> &[String] {
        &self.qualifications
    }
}
