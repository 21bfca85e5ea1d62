//! Match record: a job seeker paired with a job.

use serde::{Deserialize, Serialize};

use crate::id::{JobId, RecruiterId, UserId};
use crate::job::Job;
use crate::job_seeker::JobSeeker;

/// Deduplication key of a match.
///
/// A given `(user_id, job_id)` pair is stored at most once. The recruiter is
/// deliberately not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchKey {
    pub user_id: UserId,
    pub job_id: JobId,
}

/// A persisted association between a job seeker and a job.
///
/// Both like flags are tri-state: `None` means undecided, which is how every
/// match starts. They are decided by collaborators outside the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    user_id: UserId,
    job_id: JobId,
    recruiter_id: Option<RecruiterId>,
    user_likes: Option<bool>,
    recruiter_likes: Option<bool>,
}

impl Match {
    /// New, undecided match.
    pub fn new(user_id: UserId, job_id: JobId, recruiter_id: Option<RecruiterId>) -> Self {
        Self {
            user_id,
            job_id,
            recruiter_id,
            user_likes: None,
            recruiter_likes: None,
        }
    }

    /// Match a seeker with a job; the recruiter comes from the job's poster.
    pub fn between(seeker: &JobSeeker, job: &Job) -> Self {
        Self::new(seeker.id.clone(), job.id.clone(), job.posted_by_uuid.clone())
    }

    /// Rebuild a stored match, including any decisions already taken.
    pub fn restore(
        user_id: UserId,
        job_id: JobId,
        recruiter_id: Option<RecruiterId>,
        user_likes: Option<bool>,
        recruiter_likes: Option<bool>,
    ) -> Self {
        Self {
            user_id,
            job_id,
            recruiter_id,
            user_likes,
            recruiter_likes,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn recruiter_id(&self) -> Option<&RecruiterId> {
        self.recruiter_id.as_ref()
    }

    pub fn user_likes(&self) -> Option<bool> {
        self.user_likes
    }

    pub fn recruiter_likes(&self) -> Option<bool> {
        self.recruiter_likes
    }

    pub fn key(&self) -> MatchKey {
        MatchKey {
            user_id: self.user_id.clone(),
            job_id: self.job_id.clone(),
        }
    }
}

impl core::fmt::Display for Match {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Match{{userId='{}', jobId='{}'", self.user_id, self.job_id)?;
        if let Some(r) = &self.recruiter_id {
            write!(f, ", recruiterId='{r}'")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_match_is_undecided_on_both_sides() {
        let seeker = JobSeeker::new(UserId::new("1").unwrap(), "NY", vec!["Tech".into()]);
        let job = Job::new(JobId::new("job-1").unwrap(), "NY", vec!["Tech".into()])
            .posted_by(RecruiterId::new("rec-9").unwrap());

        let m = Match::between(&seeker, &job);
        assert_eq!(m.user_id().as_str(), "1");
        assert_eq!(m.job_id().as_str(), "job-1");
        assert_eq!(m.recruiter_id().map(|r| r.as_str()), Some("rec-9"));
        assert_eq!(m.user_likes(), None);
        assert_eq!(m.recruiter_likes(), None);
    }

    #[test]
    fn key_ignores_recruiter() {
        let user = UserId::new("1").unwrap();
        let job = JobId::new("job-1").unwrap();
        let a = Match::new(user.clone(), job.clone(), Some(RecruiterId::new("a").unwrap()));
        let b = Match::new(user, job, Some(RecruiterId::new("b").unwrap()));

        assert_ne!(a, b);
        assert_eq!(a.key(), b.key());
    }
}
