use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::claims::{ADMIN, ClaimCatalog, ClaimId};
use crate::crypto::PasswordManager;
use crate::error::{Result, ServerError};
use crate::repository::{Field, Filter, Page, UserRepository};
use crate::token::TokenManager;
use crate::user::{AccessPolicy, CreateUser, Operation, Session, UpdateUser, User};

/// Business rules over the user directory.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    pwd: PasswordManager,
    token: TokenManager,
    catalog: &'static ClaimCatalog,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(
        repo: Arc<dyn UserRepository>,
        pwd: PasswordManager,
        token: TokenManager,
        catalog: &'static ClaimCatalog,
    ) -> Self {
        Self {
            repo,
            pwd,
            token,
            catalog,
        }
    }

    pub fn repository(&self) -> &Arc<dyn UserRepository> {
        &self.repo
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.token
    }

    /// Which caller may run each operation.
    pub fn access_policy() -> AccessPolicy {
        AccessPolicy::new()
            .public(Operation::Login)
            .public(Operation::Create)
            .public(Operation::CreateMany)
            .authenticated(Operation::GetAll)
            .authenticated(Operation::GetByEmail)
            .authenticated(Operation::GetById)
            .authenticated(Operation::Update)
            .authenticated(Operation::GetUserClaims)
            .require(Operation::Delete, &[ADMIN])
    }

    /// Check credentials and mint a token.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let user = self
            .first_by_email(email)
            .await?
            .ok_or_else(|| ServerError::Validation("email not found".into()))?;

        if !self
            .pwd
            .verify(password.to_owned(), user.password_hash.clone())
            .await?
        {
            return Err(ServerError::Validation("incorrect password".into()));
        }

        let id = user
            .id
            .as_deref()
            .ok_or_else(|| ServerError::internal("stored user has no id"))?;
        let token = self.token.create(id, &user.claim_ids)?;

        tracing::debug!(user_id = %id, "user logged in");
        Ok(Session { user, token })
    }

    /// Create a user and return its id.
    pub async fn create(&self, req: CreateUser) -> Result<String> {
        let user = self.prepare(req).await?;
        let id = self.repo.create(&user).await?;

        tracing::info!(user_id = %id, "user created");
        Ok(id)
    }

    /// Create every user or none of them.
    pub async fn create_many(&self, reqs: Vec<CreateUser>) -> Result<Vec<String>> {
        let mut users = Vec::with_capacity(reqs.len());
        for req in reqs {
            users.push(self.prepare(req).await?);
        }

        let ids = self.repo.create_many(&users).await?;

        tracing::info!(count = ids.len(), "users created");
        Ok(ids)
    }

    /// List every user. An empty directory is not an error.
    pub async fn get_all(&self) -> Result<Vec<User>> {
        match self.repo.get(&Filter::all(), Page::default()).await {
            Err(ServerError::NotFound(_)) => Ok(Vec::new()),
            result => result,
        }
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User> {
        self.first_by_email(email)
            .await?
            .ok_or_else(|| ServerError::Validation("email not found".into()))
    }

    pub async fn get_by_id(&self, id: &str) -> Result<User> {
        self.repo.get_by_id(id).await
    }

    /// Apply the present fields of `patch` to user `id`.
    pub async fn update(&self, id: &str, patch: UpdateUser) -> Result<()> {
        let mut user = self.repo.get_by_id(id).await?;
        if patch.is_empty() {
            return Ok(());
        }

        if patch.new_password.as_deref() == Some("") {
            return Err(ServerError::Validation("password is required".into()));
        }
        if patch.email.as_deref() == Some("") {
            return Err(ServerError::Validation("email is required".into()));
        }
        validate_fields(&patch)?;

        if let Some(new_password) = patch.new_password {
            let matches = match patch.old_password {
                Some(old) => self.pwd.verify(old, user.password_hash.clone()).await?,
                None => false,
            };
            if !matches {
                return Err(ServerError::Validation("old password incorrect".into()));
            }
            user.password_hash = self.pwd.hash(new_password).await?;
        }

        if let Some(claims) = patch.claims {
            self.catalog.validate(&claims)?;
            user.claim_ids = claims;
        }

        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(surnames) = patch.surnames {
            user.surnames = surnames;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }

        user.id = None;
        user.updated_at = Utc::now();
        self.repo.update(id, &user).await?;

        tracing::info!(user_id = %id, "user updated");
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.repo.delete(id).await?;

        tracing::info!(user_id = %id, "user deleted");
        Ok(())
    }

    /// Catalog of every known claim.
    pub fn get_user_claims(&self) -> BTreeMap<ClaimId, String> {
        self.catalog.as_map()
    }

    async fn first_by_email(&self, email: &str) -> Result<Option<User>> {
        match self
            .repo
            .get(&Filter::all().eq(Field::Email, email), Page::first())
            .await
        {
            Ok(users) => Ok(users.into_iter().next()),
            Err(ServerError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Validate a creation request and turn it into a storable user.
    async fn prepare(&self, req: CreateUser) -> Result<User> {
        if req.password.is_empty() {
            return Err(ServerError::Validation("password is required".into()));
        }
        self.catalog.validate(&req.claims)?;
        if req.email.is_empty() {
            return Err(ServerError::Validation("email is required".into()));
        }
        validate_fields(&req)?;

        let password_hash = self.pwd.hash(req.password).await?;
        let now = Utc::now();

        Ok(User {
            id: None,
            name: req.name,
            surnames: req.surnames,
            email: req.email,
            password_hash,
            claim_ids: req.claims,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Turn the first field bound violation into a `Validation` error.
fn validate_fields(value: &impl Validate) -> Result<()> {
    let Err(errors) = value.validate() else {
        return Ok(());
    };

    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|(a, _), (b, _)| a.cmp(b));

    let message = fields
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| {
                error
                    .message
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| format!("invalid {field}"))
            })
        })
        .next()
        .unwrap_or_else(|| "invalid request".to_owned());

    Err(ServerError::Validation(message))
}
