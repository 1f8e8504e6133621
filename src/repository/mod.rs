//! Storage port over users and its adapters.

#[cfg(test)]
pub mod memory;
pub mod mongo;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Configuration, DatabaseKind};
use crate::error::Result;
use crate::user::User;

/// Field a [`Filter`] can match on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Id,
    Name,
    Surnames,
    Email,
}

impl Field {
    /// Column (or document key) name.
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Name => "name",
            Field::Surnames => "surnames",
            Field::Email => "email",
        }
    }
}

/// Conjunction of exact-match clauses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(Field, String)>,
}

impl Filter {
    /// Match every user.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality clause.
    pub fn eq(mut self, field: Field, value: impl Into<String>) -> Self {
        self.clauses.push((field, value.into()));
        self
    }

    pub fn clauses(&self) -> &[(Field, String)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Check every clause against `user`.
    pub fn matches(&self, user: &User) -> bool {
        self.clauses.iter().all(|(field, value)| match field {
            Field::Id => user.id.as_deref() == Some(value.as_str()),
            Field::Name => &user.name == value,
            Field::Surnames => &user.surnames == value,
            Field::Email => &user.email == value,
        })
    }
}

/// Optional page controls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl Page {
    pub fn first() -> Self {
        Self {
            skip: None,
            take: Some(1),
        }
    }
}

/// Port for user persistence operations.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Persist `user` and return the store-assigned id.
    async fn create(&self, user: &User) -> Result<String>;

    /// Find users matching `filter`.
    async fn get(&self, filter: &Filter, page: Page) -> Result<Vec<User>>;

    /// Find one user by id.
    async fn get_by_id(&self, id: &str) -> Result<User>;

    /// Replace the stored fields of user `id` with `user`.
    async fn update(&self, id: &str, user: &User) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Insert every user or none of them.
    async fn create_many(&self, users: &[User]) -> Result<Vec<String>>;

    /// Check the store answers.
    async fn ping(&self) -> Result<()>;
}

/// Connect the backend selected by `config`.
pub async fn connect(config: &Configuration) -> Result<Arc<dyn UserRepository>> {
    let repository: Arc<dyn UserRepository> = match config.database {
        DatabaseKind::Relational => {
            Arc::new(postgres::PgUserRepository::connect(&config.dsn).await?)
        },
        DatabaseKind::Document => {
            Arc::new(mongo::MongoUserRepository::connect(&config.dsn).await?)
        },
    };

    tracing::info!(database = %config.database, "user repository connected");
    Ok(repository)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_filter_matches() {
        let user = User {
            id: Some("1".into()),
            name: "Ada".into(),
            surnames: "Lovelace".into(),
            email: "ada@example.com".into(),
            password_hash: String::default(),
            claim_ids: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(Filter::all().matches(&user));
        assert!(Filter::all().eq(Field::Email, "ada@example.com").matches(&user));
        assert!(
            !Filter::all()
                .eq(Field::Email, "ada@example.com")
                .eq(Field::Name, "Grace")
                .matches(&user)
        );
        assert!(!Filter::all().eq(Field::Email, "ADA@example.com").matches(&user));
        assert!(Filter::all().eq(Field::Id, "1").matches(&user));
    }
}
