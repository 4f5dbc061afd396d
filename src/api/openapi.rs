use utoipa::openapi::{Contact, Info, InfoBuilder, License};
use utoipa::OpenApi;

use super::error::ErrorBody;
use super::handlers::{access, admin, health, mfa, progress};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        access::check_access,
        mfa::status,
        mfa::set_preference,
        mfa::email,
        progress::progress,
        progress::complete_training,
        progress::quiz,
        progress::submit_attempt,
        admin::deactivate_org_admin,
        admin::seats,
        admin::purge_test_accounts,
    ),
    components(schemas(
        ErrorBody,
        health::Health,
        access::AccessCheckRequest,
        access::AccessCheckResponse,
        mfa::MfaStatusResponse,
        mfa::MfaPreferenceRequest,
        mfa::MfaPreferenceResponse,
        mfa::EmailMfaRequest,
        mfa::EmailMfaResponse,
        progress::ProgressResponse,
        progress::QuizView,
        progress::AttemptRequest,
        progress::AttemptResponse,
        admin::PurgeRequest,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "access", description = "Role and MFA gate for client routes"),
        (name = "mfa", description = "Second-factor selection and email codes"),
        (name = "progress", description = "Training materials, quizzes and certificate eligibility"),
        (name = "admin", description = "Privileged administration"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    // Use Cargo.toml metadata instead of the derive defaults.
    doc.info = cargo_info();
    doc
}

fn cargo_info() -> Info {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    fn non_empty(value: &str) -> Option<&str> {
        let value = value.trim();
        (!value.is_empty()).then_some(value)
    }

    match author.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (non_empty(author), None),
    }
}
