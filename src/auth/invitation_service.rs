//! Account provisioning through setup-token invitations.
//!
//! New school members are created without a password. The account row and its
//! setup token are written in one transaction; the setup email is sent after
//! commit and a delivery failure is reported, never rolled back.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::auth::models::{Role, TenantScope};
use crate::auth::setup_token::issue_token;
use crate::auth::user::{CreateMemberRequest, NewUser, User};
use crate::config::MailConfig;
use crate::domain::UserId;
use crate::errors::{Result, SchoolError};
use crate::mail::{SetupEmail, SetupPurpose, SharedMailer};
use crate::observability::metrics;
use crate::storage::repositories::password_token::PasswordTokenRecord;
use crate::storage::repositories::student_parent::link_parent_by_email;
use crate::storage::repositories::user::insert_user;
use crate::storage::repositories::{SqlxUserRepository, UserRepository};
use crate::storage::DbPool;

/// An account that was created or re-armed, and whether its email went out.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedAccount {
    #[serde(flatten)]
    pub user: User,
    pub email_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub token_expires_at: DateTime<Utc>,
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::SuperAdmin => "Super Administrator",
        Role::Admin => "Administrator",
        Role::Teacher => "Teacher",
        Role::Parent => "Parent",
        Role::Student => "Student",
    }
}

#[derive(Clone)]
pub struct InvitationService {
    pool: DbPool,
    user_repo: Arc<dyn UserRepository>,
    mailer: SharedMailer,
    mail_config: Arc<MailConfig>,
    token_ttl: Duration,
}

impl InvitationService {
    pub fn new(
        pool: DbPool,
        user_repo: Arc<dyn UserRepository>,
        mailer: SharedMailer,
        mail_config: Arc<MailConfig>,
        token_ttl: Duration,
    ) -> Self {
        Self { pool, user_repo, mailer, mail_config, token_ttl }
    }

    pub fn with_sqlx(
        pool: DbPool,
        mailer: SharedMailer,
        mail_config: Arc<MailConfig>,
        token_ttl: Duration,
    ) -> Self {
        let user_repo = Arc::new(SqlxUserRepository::new(pool.clone()));
        Self::new(pool, user_repo, mailer, mail_config, token_ttl)
    }

    /// Create a passwordless member of the scoped school and send its setup link.
    #[instrument(skip(self, scope, request), fields(school_id = %scope.school_id(), role = %role), name = "invite_member")]
    pub async fn invite_member(
        &self,
        scope: &TenantScope,
        role: Role,
        request: &CreateMemberRequest,
    ) -> Result<ProvisionedAccount> {
        request.validate()?;
        let new_user =
            NewUser::member(scope, role, &request.name, &request.email, request.subject.clone())?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SchoolError::database(e, "Failed to start invitation transaction"))?;

        let user = insert_user(&mut tx, &new_user).await?;
        if let (Role::Student, Some(parent_email)) = (role, request.parent_email.as_deref()) {
            if !link_parent_by_email(&mut tx, scope, user.id, parent_email).await? {
                warn!(user_id = %user.id, "no parent with the given email in this school; student left unlinked");
            }
        }
        let token = issue_token(&mut tx, user.id, self.token_ttl, Utc::now()).await?;

        tx.commit()
            .await
            .map_err(|e| SchoolError::database(e, "Failed to commit invitation"))?;

        info!(user_id = %user.id, "member account created");
        Ok(self.deliver(user, token, SetupPurpose::Invitation).await)
    }

    /// Issue a fresh setup token for an active member of the scoped school.
    ///
    /// Members of other schools are reported as not found.
    #[instrument(skip(self, scope), fields(school_id = %scope.school_id(), user_id = %user_id), name = "reset_member_password")]
    pub async fn reset_password(
        &self,
        scope: &TenantScope,
        user_id: UserId,
    ) -> Result<ProvisionedAccount> {
        let user = self
            .user_repo
            .get_member(scope, user_id, None)
            .await?
            .ok_or_else(|| SchoolError::not_found("User", user_id.to_string()))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SchoolError::database(e, "Failed to start password reset transaction"))?;

        let token = issue_token(&mut tx, user.id, self.token_ttl, Utc::now()).await?;

        tx.commit()
            .await
            .map_err(|e| SchoolError::database(e, "Failed to commit password reset"))?;

        Ok(self.deliver(user, token, SetupPurpose::PasswordReset).await)
    }

    async fn deliver(
        &self,
        user: User,
        token: PasswordTokenRecord,
        purpose: SetupPurpose,
    ) -> ProvisionedAccount {
        let email = SetupEmail {
            recipient: user.email.clone(),
            recipient_name: user.name.clone(),
            role_label: role_label(user.role).to_string(),
            setup_link: self.mail_config.setup_link(&token.token),
            expiry_minutes: self.token_ttl.num_minutes(),
            purpose,
        };

        let (email_sent, warning) = match self.mailer.send_setup_email(&email).await {
            Ok(()) => (true, None),
            Err(err) => {
                warn!(user_id = %user.id, error = %err, "setup email could not be delivered");
                (
                    false,
                    Some(format!(
                        "Account saved but the setup email could not be sent to {}",
                        user.email
                    )),
                )
            }
        };

        if purpose == SetupPurpose::Invitation {
            metrics::record_account_provisioned(user.role.as_str(), email_sent);
        }

        ProvisionedAccount { user, email_sent, warning, token_expires_at: token.expires_at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::Mailer;
    use crate::storage::test_helpers::{insert_school, migrated_pool};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<SetupEmail>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_setup_email(&self, email: &SetupEmail) -> Result<()> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    struct DownMailer;

    #[async_trait]
    impl Mailer for DownMailer {
        async fn send_setup_email(&self, _email: &SetupEmail) -> Result<()> {
            Err(SchoolError::mail("connection refused"))
        }
    }

    fn teacher_request(email: &str) -> CreateMemberRequest {
        CreateMemberRequest {
            name: "Tess".into(),
            email: email.into(),
            subject: Some("Math".into()),
            parent_email: None,
        }
    }

    fn service(pool: DbPool, mailer: SharedMailer) -> InvitationService {
        InvitationService::with_sqlx(pool, mailer, Arc::new(MailConfig::default()), Duration::minutes(1440))
    }

    #[tokio::test]
    async fn invitation_creates_passwordless_member_and_mails_link() {
        let pool = migrated_pool().await;
        let scope = TenantScope::for_tests(insert_school(&pool, "A").await);
        let mailer = Arc::new(RecordingMailer::default());
        let svc = service(pool, mailer.clone());

        let account = svc.invite_member(&scope, Role::Teacher, &teacher_request("t@a.io")).await.unwrap();
        assert!(account.email_sent);
        assert!(account.warning.is_none());
        assert!(!account.user.has_password);
        assert_eq!(account.user.school_id, Some(scope.school_id()));

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "t@a.io");
        assert_eq!(sent[0].expiry_minutes, 1440);
        assert!(sent[0].setup_link.starts_with("http://localhost:5173/set-password?token="));
    }

    #[tokio::test]
    async fn mail_failure_keeps_the_account() {
        let pool = migrated_pool().await;
        let scope = TenantScope::for_tests(insert_school(&pool, "A").await);
        let svc = service(pool.clone(), Arc::new(DownMailer));

        let account = svc.invite_member(&scope, Role::Student, &teacher_request("s@a.io")).await.unwrap();
        assert!(!account.email_sent);
        assert!(account.warning.unwrap().contains("s@a.io"));

        let repo = SqlxUserRepository::new(pool);
        assert!(repo.get_member(&scope, account.user.id, Some(Role::Student)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_email_writes_nothing() {
        let pool = migrated_pool().await;
        let scope = TenantScope::for_tests(insert_school(&pool, "A").await);
        let svc = service(pool.clone(), Arc::new(RecordingMailer::default()));
        svc.invite_member(&scope, Role::Teacher, &teacher_request("t@a.io")).await.unwrap();

        let err = svc.invite_member(&scope, Role::Parent, &teacher_request("t@a.io")).await.unwrap_err();
        assert_eq!(err.to_string(), "Email already exists");

        let tokens: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM password_tokens")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(tokens, 1);
    }

    #[tokio::test]
    async fn student_is_linked_to_parent_by_email() {
        let pool = migrated_pool().await;
        let scope = TenantScope::for_tests(insert_school(&pool, "A").await);
        let svc = service(pool.clone(), Arc::new(RecordingMailer::default()));
        let parent = svc.invite_member(&scope, Role::Parent, &teacher_request("mum@a.io")).await.unwrap();

        let mut request = teacher_request("kid@a.io");
        request.parent_email = Some("mum@a.io".into());
        let student = svc.invite_member(&scope, Role::Student, &request).await.unwrap();

        let mut request = teacher_request("orphan@a.io");
        request.parent_email = Some("nobody@a.io".into());
        svc.invite_member(&scope, Role::Student, &request).await.unwrap();

        let links: Vec<(i64, i64, String)> =
            sqlx::query_as("SELECT student_id, parent_id, relationship_type FROM student_parents")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(links, vec![(student.user.id.get(), parent.user.id.get(), "Parent".to_string())]);
    }

    #[tokio::test]
    async fn reset_is_scoped_to_the_school() {
        let pool = migrated_pool().await;
        let scope_a = TenantScope::for_tests(insert_school(&pool, "A").await);
        let scope_b = TenantScope::for_tests(insert_school(&pool, "B").await);
        let mailer = Arc::new(RecordingMailer::default());
        let svc = service(pool, mailer.clone());
        let b_teacher = svc.invite_member(&scope_b, Role::Teacher, &teacher_request("t@b.io")).await.unwrap();

        let err = svc.reset_password(&scope_a, b_teacher.user.id).await.unwrap_err();
        assert!(matches!(err, SchoolError::NotFound { .. }));

        let reset = svc.reset_password(&scope_b, b_teacher.user.id).await.unwrap();
        assert!(reset.email_sent);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].purpose, SetupPurpose::PasswordReset);
    }
}
