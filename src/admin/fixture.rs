use secrecy::SecretString;
use std::sync::Arc;
use uuid::Uuid;

use super::{AdminConfig, Administrator};
use crate::authz::Role;
use crate::identity::{memory::MemoryIdentity, Session};
use crate::store::{memory::MemoryStore, Profile};

pub(crate) struct Fixture {
    pub identity: Arc<MemoryIdentity>,
    pub store: Arc<MemoryStore>,
    pub organization_id: Uuid,
    pub config: AdminConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(AdminConfig::new())
    }

    pub fn with_config(config: AdminConfig) -> Self {
        Self {
            identity: Arc::new(MemoryIdentity::new()),
            store: Arc::new(MemoryStore::new()),
            organization_id: Uuid::new_v4(),
            config,
        }
    }

    /// Identity, profile in the fixture organization, and role.
    pub fn user(&self, email: &str, role: Role) -> (Session, Uuid) {
        let user_id = self.identity.add_user(email, "password");
        self.store
            .insert_profile(Profile::new(user_id, email, Some(self.organization_id)));
        self.store.set_role(user_id, role);
        let session = Session::new(
            user_id,
            Some(email.to_string()),
            SecretString::from(self.identity.issue_token(user_id)),
        );
        (session, user_id)
    }

    pub fn admin(&self) -> Administrator {
        Administrator::new(
            self.identity.clone(),
            self.store.clone(),
            self.config.clone(),
        )
    }
}
