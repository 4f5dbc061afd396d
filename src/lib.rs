//! # Complira (Compliance Training Access & Progression)
//!
//! `complira` is the server side of a compliance-training platform. Organizations
//! enroll workforce members who must read training materials and pass an ordered
//! sequence of quizzes to earn a certificate.
//!
//! ## Access Pipeline
//!
//! Every protected route runs the same two gates, in order:
//!
//! 1. **Role gate** ([`authz`]): the caller's single role (`platform_owner`,
//!    `org_admin`, `workforce_user`) must be in the route's allowed set. Wrong-role
//!    callers are silently routed to their own home instead of seeing an error.
//! 2. **MFA gate** ([`mfa`]): the session must be fully verified (AAL2, or a
//!    verified email-MFA session). Otherwise the caller is routed to the
//!    enrollment/selection/verification step that applies to them.
//!
//! Both gates fail closed: a failing dependency never grants access.
//!
//! ## Progression
//!
//! Quiz unlock state is a pure function of stored records ([`progression`]). The
//! same rule decides which quiz content the API will serve and grade.
//!
//! ## Administration
//!
//! Privileged operations ([`admin`]) verify the caller's role server-side, write
//! audit entries, and use a compensating write when the identity provider rejects
//! a lockout after the profile was already updated.

pub mod admin;
pub mod api;
pub mod authz;
pub mod cli;
pub mod email;
pub mod error;
pub mod guard;
pub mod identity;
pub mod mfa;
pub mod progression;
pub mod route;
pub mod store;

pub use error::{Error, Result};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
