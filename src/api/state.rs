//! Shared state handed to every handler through an `Extension`.

use std::sync::Arc;

use crate::admin::{AdminConfig, Administrator};
use crate::authz::RoleGate;
use crate::email::EmailSender;
use crate::guard::RouteGuard;
use crate::identity::{IdentityAdmin, IdentityGateway};
use crate::mfa::email::EmailMfaCheck;
use crate::mfa::email_codes::{EmailCodeConfig, EmailCodeService};
use crate::mfa::MfaResolver;
use crate::store::Store;

pub struct AppState {
    identity: Arc<dyn IdentityGateway>,
    store: Arc<dyn Store>,
    mfa: MfaResolver,
    guard: RouteGuard,
    email_codes: Arc<EmailCodeService>,
    admin: Administrator,
}

impl AppState {
    /// Wire the gates and services around their collaborators.
    ///
    /// Without `email_check` the resolver asks the in-process code service.
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityGateway>,
        identity_admin: Arc<dyn IdentityAdmin>,
        store: Arc<dyn Store>,
        email_sender: Arc<dyn EmailSender>,
        email_check: Option<Arc<dyn EmailMfaCheck>>,
        email_config: EmailCodeConfig,
        admin_config: AdminConfig,
    ) -> Self {
        let email_codes = Arc::new(EmailCodeService::new(
            store.clone(),
            email_sender,
            email_config,
        ));
        let email_check: Arc<dyn EmailMfaCheck> = match email_check {
            Some(check) => check,
            None => email_codes.clone(),
        };
        let mfa = MfaResolver::new(identity.clone(), store.clone(), email_check);
        let guard = RouteGuard::new(RoleGate::new(store.clone()), mfa.clone());
        let admin = Administrator::new(identity_admin, store.clone(), admin_config);

        Self {
            identity,
            store,
            mfa,
            guard,
            email_codes,
            admin,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &Arc<dyn IdentityGateway> {
        &self.identity
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    #[must_use]
    pub fn mfa(&self) -> &MfaResolver {
        &self.mfa
    }

    #[must_use]
    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    #[must_use]
    pub fn email_codes(&self) -> &EmailCodeService {
        &self.email_codes
    }

    #[must_use]
    pub fn admin(&self) -> &Administrator {
        &self.admin
    }
}
