//! Records shared by the store implementations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Seats granted when an organization has no subscription record.
pub const FALLBACK_USERS_LIMIT: i64 = 100;
pub const FALLBACK_TIER: &str = "basic";

/// Second-factor method chosen by the user.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MfaMethod {
    #[default]
    None,
    Totp,
    Email,
}

impl MfaMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Totp => "totp",
            Self::Email => "email",
        }
    }

    /// Parse a stored value; unknown values read as `none`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "totp" => Self::Totp,
            "email" => Self::Email,
            _ => Self::None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    Inactive,
}

impl AccountStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// Workforce group tag used to filter training content.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkforceGroup {
    AllStaff,
    Clinical,
    Administrative,
    Management,
    It,
}

impl WorkforceGroup {
    pub const ALL: [Self; 5] = [
        Self::AllStaff,
        Self::Clinical,
        Self::Administrative,
        Self::Management,
        Self::It,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllStaff => "all_staff",
            Self::Clinical => "clinical",
            Self::Administrative => "administrative",
            Self::Management => "management",
            Self::It => "it",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AllStaff => "All Staff",
            Self::Clinical => "Clinical",
            Self::Administrative => "Administrative",
            Self::Management => "Management",
            Self::It => "IT",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|group| group.as_str() == value.trim())
    }

    /// Parse stored tags, dropping unknown ones.
    #[must_use]
    pub fn parse_all<S: AsRef<str>>(values: &[S]) -> Vec<Self> {
        values
            .iter()
            .filter_map(|value| Self::parse(value.as_ref()))
            .collect()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Profile {
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub organization_id: Option<Uuid>,
    pub workforce_groups: Vec<WorkforceGroup>,
    pub mfa_method: MfaMethod,
    pub mfa_enabled: bool,
    pub status: AccountStatus,
}

impl Profile {
    /// An active profile with no MFA configured.
    #[must_use]
    pub fn new(user_id: Uuid, email: impl Into<String>, organization_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            full_name: None,
            email: Some(email.into()),
            organization_id,
            workforce_groups: vec![WorkforceGroup::AllStaff],
            mfa_method: MfaMethod::None,
            mfa_enabled: false,
            status: AccountStatus::Active,
        }
    }

    #[must_use]
    pub fn with_mfa(mut self, method: MfaMethod, enabled: bool) -> Self {
        self.mfa_method = method;
        self.mfa_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_groups(mut self, groups: Vec<WorkforceGroup>) -> Self {
        self.workforce_groups = groups;
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subscription {
    pub organization_id: Uuid,
    pub tier: String,
    pub users_limit: i64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QuizAttempt {
    pub user_id: Uuid,
    pub sequence: u8,
    pub score: i32,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    DeactivateOrgAdmin,
    PurgeTestAccounts,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeactivateOrgAdmin => "deactivate_org_admin",
            Self::PurgeTestAccounts => "purge_test_accounts",
        }
    }
}

/// Immutable record of a privileged action.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub action: AuditAction,
    pub target_type: String,
    pub target_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(
        actor_id: Uuid,
        organization_id: Option<Uuid>,
        action: AuditAction,
        target_type: &str,
        target_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            actor_id,
            organization_id,
            action,
            target_type: target_type.to_string(),
            target_id,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Outstanding email-MFA code for a user. Only the hash is stored.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EmailMfaChallenge {
    pub user_id: Uuid,
    pub code_hash: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
}

/// Result of claiming one verification attempt against a challenge.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttemptClaim {
    /// The attempt was counted; `attempts` includes it.
    Claimed { code_hash: Vec<u8>, attempts: i32 },
    /// Every allowed attempt has already been used.
    Exhausted,
    Expired,
    Missing,
}
