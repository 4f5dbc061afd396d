//! End-to-end router tests.
//!
//! The router runs against the in-memory identity provider and store, so every
//! request goes through the real layers, gates and handlers without a database.

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use complira::admin::{AdminConfig, PROTECTED_ACCOUNT_EMAIL};
use complira::api::{self, AppState, CorsConfig};
use complira::authz::Role;
use complira::email::MemoryEmailSender;
use complira::identity::{memory::MemoryIdentity, AssuranceLevel};
use complira::mfa::email_codes::EmailCodeConfig;
use complira::progression::quiz::{Question, Quiz};
use complira::store::{memory::MemoryStore, AccountStatus, MfaMethod, Profile, WorkforceGroup};

struct Harness {
    identity: Arc<MemoryIdentity>,
    store: Arc<MemoryStore>,
    sender: Arc<MemoryEmailSender>,
    organization_id: Uuid,
    app: Router,
}

struct Reply {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Value,
}

impl Harness {
    fn new() -> Self {
        Self::with_admin_config(AdminConfig::new())
    }

    fn with_admin_config(admin_config: AdminConfig) -> Self {
        let identity = Arc::new(MemoryIdentity::new());
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(MemoryEmailSender::new());
        let state = AppState::new(
            identity.clone(),
            identity.clone(),
            store.clone(),
            sender.clone(),
            None,
            EmailCodeConfig::new(),
            admin_config,
        );
        let cors = CorsConfig::new(["https://app.complira.dev"], false);
        let app = api::app(Arc::new(state), &cors);
        Self {
            identity,
            store,
            sender,
            organization_id: Uuid::new_v4(),
            app,
        }
    }

    /// Identity, profile, role and an access token for a new user.
    fn user(&self, email: &str, role: Role, assurance: AssuranceLevel) -> (String, Uuid) {
        let user_id = self.identity.add_user(email, "password");
        self.identity.set_assurance(user_id, assurance);
        self.store.insert_profile(
            Profile::new(user_id, email, Some(self.organization_id))
                .with_mfa(MfaMethod::Totp, true)
                .with_groups(vec![WorkforceGroup::Administrative]),
        );
        self.store.set_role(user_id, role);
        (self.identity.issue_token(user_id), user_id)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Reply> {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => request.body(Body::empty())?,
        };

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .context("router call failed")?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok(Reply {
            status,
            headers,
            body,
        })
    }
}

fn safety_quiz() -> Quiz {
    Quiz {
        sequence: 1,
        title: "Data protection basics".to_string(),
        workforce_groups: Vec::new(),
        questions: vec![
            Question {
                id: Uuid::from_u128(1),
                prompt: "Who may read patient records?".to_string(),
                choices: vec!["Anyone".to_string(), "Care team only".to_string()],
                correct_choice: 1,
                workforce_groups: Vec::new(),
            },
            Question {
                id: Uuid::from_u128(2),
                prompt: "Where are passwords stored?".to_string(),
                choices: vec!["Sticky note".to_string(), "Password manager".to_string()],
                correct_choice: 1,
                workforce_groups: vec![WorkforceGroup::Administrative],
            },
            Question {
                id: Uuid::from_u128(3),
                prompt: "When is hand hygiene required?".to_string(),
                choices: vec!["Before patient contact".to_string(), "Never".to_string()],
                correct_choice: 0,
                workforce_groups: vec![WorkforceGroup::Clinical],
            },
        ],
    }
}

#[tokio::test]
async fn health_reports_build() -> Result<()> {
    let harness = Harness::new();
    let reply = harness.send(Method::GET, "/health", None, None).await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["name"], "complira");
    assert!(reply.headers.contains_key("x-app"));
    Ok(())
}

#[tokio::test]
async fn request_id_is_generated_and_propagated() -> Result<()> {
    let harness = Harness::new();
    let reply = harness.send(Method::GET, "/", None, None).await?;
    let generated = reply
        .headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::len);
    assert_eq!(generated, Some(26));

    let request = Request::builder()
        .uri("/")
        .header("x-request-id", "req-123")
        .body(Body::empty())?;
    let response = harness.app.clone().oneshot(request).await?;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok()),
        Some("req-123")
    );
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let harness = Harness::new();
    let reply = harness
        .send(Method::GET, "/api-docs/openapi.json", None, None)
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["paths"]["/v1/progress"].is_object());
    Ok(())
}

#[tokio::test]
async fn cors_allows_configured_and_local_origins() -> Result<()> {
    let harness = Harness::new();
    for (origin, allowed) in [
        ("https://app.complira.dev", true),
        ("http://localhost:5173", true),
        ("https://evil.test", false),
    ] {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/v1/progress")
            .header("origin", origin)
            .header("access-control-request-method", "GET")
            .body(Body::empty())?;
        let response = harness.app.clone().oneshot(request).await?;
        let echoed = response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok());
        if allowed {
            assert_eq!(echoed, Some(origin));
        } else {
            assert_eq!(echoed, None);
        }
    }
    Ok(())
}

#[tokio::test]
async fn missing_token_is_unauthenticated() -> Result<()> {
    let harness = Harness::new();
    let reply = harness.send(Method::GET, "/v1/progress", None, None).await?;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "unauthenticated");

    let reply = harness
        .send(Method::GET, "/v1/progress", Some("mem_unknown"), None)
        .await?;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn access_check_redirects() -> Result<()> {
    let harness = Harness::new();
    let check = |roles: Value| json!({ "path": "/quiz/2", "allowed_roles": roles });

    let reply = harness
        .send(
            Method::POST,
            "/v1/access/check",
            None,
            Some(check(json!(["workforce_user"]))),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["granted"], false);
    assert_eq!(reply.body["redirect"], "/login?redirect=%2Fquiz%2F2");

    let (admin, _) = harness.user("admin@example.com", Role::OrgAdmin, AssuranceLevel::Aal2);
    let reply = harness
        .send(
            Method::POST,
            "/v1/access/check",
            Some(&admin),
            Some(check(json!(["workforce_user"]))),
        )
        .await?;
    assert_eq!(reply.body["redirect"], "/admin");

    let (learner, _) = harness.user(
        "learner@example.com",
        Role::WorkforceUser,
        AssuranceLevel::Aal1,
    );
    let reply = harness
        .send(
            Method::POST,
            "/v1/access/check",
            Some(&learner),
            Some(check(json!(["workforce_user"]))),
        )
        .await?;
    assert_eq!(reply.body["granted"], false);
    assert_eq!(reply.body["redirect"], "/mfa-enroll");

    let reply = harness
        .send(
            Method::POST,
            "/v1/access/check",
            Some(&admin),
            Some(check(json!(["org_admin", "platform_owner"]))),
        )
        .await?;
    assert_eq!(reply.body["granted"], true);
    assert!(reply.body.get("redirect").is_none());
    Ok(())
}

#[tokio::test]
async fn identity_outage_fails_closed() -> Result<()> {
    let harness = Harness::new();
    let (token, _) = harness.user(
        "learner@example.com",
        Role::WorkforceUser,
        AssuranceLevel::Aal2,
    );
    harness.identity.fail_sessions(true);

    let reply = harness
        .send(
            Method::POST,
            "/v1/access/check",
            Some(&token),
            Some(json!({ "path": "/dashboard", "allowed_roles": ["workforce_user"] })),
        )
        .await?;
    assert_eq!(reply.body["granted"], false);
    assert_eq!(reply.body["redirect"], "/login");

    let reply = harness
        .send(Method::GET, "/v1/progress", Some(&token), None)
        .await?;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body["message"], "internal error");
    Ok(())
}

#[tokio::test]
async fn unverified_session_gets_mfa_redirect() -> Result<()> {
    let harness = Harness::new();
    let user_id = harness.identity.add_user("new@example.com", "password");
    harness
        .store
        .insert_profile(Profile::new(user_id, "new@example.com", None));
    harness.store.set_role(user_id, Role::WorkforceUser);
    let token = harness.identity.issue_token(user_id);

    let reply = harness
        .send(Method::GET, "/v1/progress", Some(&token), None)
        .await?;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["error"], "unverified");
    assert_eq!(reply.body["redirect"], "/mfa-select");

    let reply = harness
        .send(Method::GET, "/v1/mfa/status", Some(&token), None)
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["authorized"], false);
    assert_eq!(reply.body["method"], "none");
    Ok(())
}

#[tokio::test]
async fn email_code_flow_verifies_session() -> Result<()> {
    let harness = Harness::new();
    let (token, _) = harness.user(
        "learner@example.com",
        Role::WorkforceUser,
        AssuranceLevel::Aal1,
    );

    let reply = harness
        .send(
            Method::PUT,
            "/v1/me/mfa",
            Some(&token),
            Some(json!({ "method": "email" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["enabled"], true);

    let reply = harness
        .send(Method::GET, "/v1/mfa/status", Some(&token), None)
        .await?;
    assert_eq!(reply.body["redirect"], "/mfa-verify?method=email");

    let reply = harness
        .send(
            Method::POST,
            "/v1/mfa/email",
            Some(&token),
            Some(json!({ "action": "send-code" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["sent"], true);

    let message = harness.sender.last().context("no email sent")?;
    assert_eq!(message.to_email, "learner@example.com");
    let code = message.payload["code"]
        .as_str()
        .context("code missing from payload")?
        .to_string();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let reply = harness
        .send(
            Method::POST,
            "/v1/mfa/email",
            Some(&token),
            Some(json!({ "action": "verify-code", "code": wrong })),
        )
        .await?;
    assert_eq!(reply.body["outcome"], "invalid");
    assert_eq!(reply.body["remaining_attempts"], 4);

    let reply = harness
        .send(
            Method::POST,
            "/v1/mfa/email",
            Some(&token),
            Some(json!({ "action": "verify-code" })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = harness
        .send(
            Method::POST,
            "/v1/mfa/email",
            Some(&token),
            Some(json!({ "action": "verify-code", "code": code })),
        )
        .await?;
    assert_eq!(reply.body["outcome"], "verified");

    let reply = harness
        .send(
            Method::POST,
            "/v1/mfa/email",
            Some(&token),
            Some(json!({ "action": "check-session" })),
        )
        .await?;
    assert_eq!(reply.body["verified"], true);

    let reply = harness
        .send(Method::GET, "/v1/progress", Some(&token), None)
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn quizzes_unlock_in_order() -> Result<()> {
    let harness = Harness::new();
    harness.store.insert_quiz(safety_quiz());
    let (token, user_id) = harness.user(
        "learner@example.com",
        Role::WorkforceUser,
        AssuranceLevel::Aal2,
    );

    let reply = harness
        .send(Method::GET, "/v1/quizzes/1", Some(&token), None)
        .await?;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["error"], "forbidden");

    let reply = harness
        .send(Method::POST, "/v1/training/complete", Some(&token), None)
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["quizzes"][0]["status"], "unlocked");
    assert_eq!(reply.body["quizzes"][1]["status"], "locked");

    let reply = harness
        .send(Method::GET, "/v1/quizzes/1", Some(&token), None)
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    let questions = reply.body["questions"]
        .as_array()
        .context("questions missing")?;
    // The clinical-only question is filtered out for an administrative learner.
    assert_eq!(questions.len(), 2);
    assert!(questions
        .iter()
        .all(|question| question.get("correct_choice").is_none()));

    let wrong = json!({ "answers": [
        { "question_id": Uuid::from_u128(1), "choice": 0 },
        { "question_id": Uuid::from_u128(2), "choice": 1 },
    ]});
    let reply = harness
        .send(
            Method::POST,
            "/v1/quizzes/1/attempts",
            Some(&token),
            Some(wrong),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["score"], 50);
    assert_eq!(reply.body["passed"], false);
    assert_eq!(reply.body["progress"]["quizzes"][0]["status"], "failed");

    let reply = harness
        .send(Method::POST, "/v1/quizzes/2/attempts", Some(&token), Some(json!({ "answers": [] })))
        .await?;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let right = json!({ "answers": [
        { "question_id": Uuid::from_u128(1), "choice": 1 },
        { "question_id": Uuid::from_u128(2), "choice": 1 },
    ]});
    let reply = harness
        .send(
            Method::POST,
            "/v1/quizzes/1/attempts",
            Some(&token),
            Some(right),
        )
        .await?;
    assert_eq!(reply.body["score"], 100);
    assert_eq!(reply.body["passed"], true);
    assert_eq!(reply.body["progress"]["quizzes"][0]["status"], "passed");
    assert_eq!(reply.body["progress"]["quizzes"][1]["status"], "unlocked");
    assert_eq!(reply.body["progress"]["certificate_eligible"], false);
    assert_eq!(harness.store.attempts(user_id).len(), 2);

    // Unlocked, but no content has been published for it.
    let reply = harness
        .send(Method::GET, "/v1/quizzes/2", Some(&token), None)
        .await?;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = harness
        .send(Method::GET, "/v1/quizzes/4", Some(&token), None)
        .await?;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn platform_owner_deactivates_org_admin() -> Result<()> {
    let harness = Harness::new();
    let (owner, _) = harness.user(
        "owner@example.com",
        Role::PlatformOwner,
        AssuranceLevel::Aal2,
    );
    let (admin, admin_id) = harness.user("admin@example.com", Role::OrgAdmin, AssuranceLevel::Aal2);
    let uri = format!("/v1/admin/org-admins/{admin_id}/deactivate");

    let reply = harness.send(Method::POST, &uri, Some(&admin), None).await?;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(
        harness.store.profile_status(admin_id),
        Some(AccountStatus::Active)
    );

    let reply = harness.send(Method::POST, &uri, Some(&owner), None).await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "inactive");
    assert_eq!(reply.body["ban_hours"], 876_000);
    assert!(harness.identity.is_banned(admin_id));
    assert_eq!(harness.store.audit_entries().len(), 1);

    let reply = harness
        .send(
            Method::POST,
            &format!("/v1/admin/org-admins/{}/deactivate", Uuid::new_v4()),
            Some(&owner),
            None,
        )
        .await?;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn failed_lockout_and_failed_restore_is_partially_applied() -> Result<()> {
    let harness = Harness::new();
    let (owner, _) = harness.user(
        "owner@example.com",
        Role::PlatformOwner,
        AssuranceLevel::Aal2,
    );
    let (_, admin_id) = harness.user("admin@example.com", Role::OrgAdmin, AssuranceLevel::Aal2);
    harness.identity.fail_ban(true);
    harness.store.limit_status_writes(1);

    let reply = harness
        .send(
            Method::POST,
            &format!("/v1/admin/org-admins/{admin_id}/deactivate"),
            Some(&owner),
            None,
        )
        .await?;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body["error"], "partially_applied");
    assert!(harness.store.audit_entries().is_empty());
    Ok(())
}

#[tokio::test]
async fn org_admin_checks_seats() -> Result<()> {
    let harness = Harness::new();
    let (admin, _) = harness.user("admin@example.com", Role::OrgAdmin, AssuranceLevel::Aal2);
    harness.user("a@example.com", Role::WorkforceUser, AssuranceLevel::Aal1);

    let reply = harness
        .send(Method::GET, "/v1/admin/seats", Some(&admin), None)
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["current"], 2);
    assert_eq!(reply.body["limit"], 100);
    assert_eq!(reply.body["can_add"], true);

    let reply = harness
        .send(
            Method::GET,
            &format!("/v1/admin/seats?organization_id={}", Uuid::new_v4()),
            Some(&admin),
            None,
        )
        .await?;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn purge_respects_dry_run_and_protected_account() -> Result<()> {
    let harness = Harness::with_admin_config(
        AdminConfig::new().with_purge_allow_list(["qa1@example.com", PROTECTED_ACCOUNT_EMAIL]),
    );
    let (owner, _) = harness.user(
        "owner@example.com",
        Role::PlatformOwner,
        AssuranceLevel::Aal2,
    );
    let (_, qa1) = harness.user("qa1@example.com", Role::WorkforceUser, AssuranceLevel::Aal1);
    let (_, protected) = harness.user(
        PROTECTED_ACCOUNT_EMAIL,
        Role::PlatformOwner,
        AssuranceLevel::Aal1,
    );

    let reply = harness
        .send(
            Method::POST,
            "/v1/admin/test-accounts/purge",
            Some(&owner),
            Some(json!({ "dry_run": true })),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["dry_run"], true);
    assert_eq!(reply.body["summary"]["deleted"], 1);
    assert_eq!(reply.body["summary"]["protected"], 1);
    assert!(harness.identity.contains_user(qa1));

    let reply = harness
        .send(
            Method::POST,
            "/v1/admin/test-accounts/purge",
            Some(&owner),
            Some(json!({ "dry_run": false })),
        )
        .await?;
    assert_eq!(reply.body["summary"]["deleted"], 1);
    assert!(!harness.identity.contains_user(qa1));
    assert!(harness.identity.contains_user(protected));
    Ok(())
}
