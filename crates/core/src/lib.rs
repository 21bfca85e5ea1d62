//! `jobmatch-core`: domain building blocks for the matching pipeline.
//!
//! This crate contains **pure domain** types (no infrastructure concerns):
//! the job-seeker and job entities, the salary value object and the match
//! record produced when the two sides meet.

pub mod entity;
pub mod error;
pub mod id;
pub mod job;
pub mod job_seeker;
pub mod kind;
pub mod match_record;
pub mod salary;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{JobId, RecruiterId, UserId};
pub use job::Job;
pub use job_seeker::JobSeeker;
pub use kind::{EntityKind, Indexable};
pub use match_record::{Match, MatchKey};
pub use salary::Salary;
pub use value_object::ValueObject;
