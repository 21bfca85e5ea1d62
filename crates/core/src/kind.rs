//! The two kinds of entity that flow through the pipeline.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// Kind of an indexed entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    JobSeeker,
    Job,
}

impl EntityKind {
    /// Search index (collection) holding documents of this kind.
    pub fn index_name(self) -> &'static str {
        match self {
            EntityKind::JobSeeker => "jobseekers",
            EntityKind::Job => "jobs",
        }
    }

    /// Document field carrying the tags used for overlap matching.
    pub fn tag_field(self) -> &'static str {
        match self {
            EntityKind::JobSeeker => "qualifications",
            EntityKind::Job => "requirements",
        }
    }

    /// The kind a document of this kind is matched against.
    pub fn opposite(self) -> EntityKind {
        match self {
            EntityKind::JobSeeker => EntityKind::Job,
            EntityKind::Job => EntityKind::JobSeeker,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::JobSeeker => "job_seeker",
            EntityKind::Job => "job",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity that can be written to the search index and matched.
///
/// The matching predicate only ever looks at `location` and `tags`; every other
/// attribute is carried through to the stored document untouched.
pub trait Indexable: Entity + Serialize {
    const KIND: EntityKind;

    fn location(&self) -> &str;

    /// Qualifications for a job seeker, requirements for a job.
    fn tags(&self) -> &[String];
}
