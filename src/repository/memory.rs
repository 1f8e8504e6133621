//! In-memory user repository used by tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{Result, ServerError};
use crate::repository::{Filter, Page, UserRepository};
use crate::user::User;

#[derive(Debug, Default)]
struct Store {
    next_id: u64,
    users: BTreeMap<u64, User>,
}

impl Store {
    fn insert(&mut self, user: &User) -> String {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut user = user.clone();
        user.id = Some(id.clone());
        self.users.insert(self.next_id, user);
        id
    }
}

/// Repository over a `BTreeMap`, ids are sequential integers.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    store: Mutex<Store>,
    not_found_on_empty: bool,
    unavailable: AtomicBool,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `get` with `NotFound` on empty results, like the relational
    /// backend does.
    pub fn not_found_on_empty(mut self, enabled: bool) -> Self {
        self.not_found_on_empty = enabled;
        self
    }

    /// Make `ping` fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.store.lock().await.users.len()
    }
}

fn parse_id(id: &str) -> Result<u64> {
    id.parse()
        .map_err(|_| ServerError::Validation(format!("invalid id: {id}")))
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> Result<String> {
        Ok(self.store.lock().await.insert(user))
    }

    async fn get(&self, filter: &Filter, page: Page) -> Result<Vec<User>> {
        let store = self.store.lock().await;
        let skip = page.skip.unwrap_or(0) as usize;
        let take = page.take.map_or(usize::MAX, |take| take as usize);

        let users: Vec<User> = store
            .users
            .values()
            .filter(|user| filter.matches(user))
            .skip(skip)
            .take(take)
            .cloned()
            .collect();

        if users.is_empty() && self.not_found_on_empty {
            return Err(ServerError::NotFound("user not found".into()));
        }

        Ok(users)
    }

    async fn get_by_id(&self, id: &str) -> Result<User> {
        let key = parse_id(id)?;
        self.store
            .lock()
            .await
            .users
            .get(&key)
            .cloned()
            .ok_or_else(|| ServerError::NotFound("user not found".into()))
    }

    async fn update(&self, id: &str, user: &User) -> Result<()> {
        let key = parse_id(id)?;
        let mut store = self.store.lock().await;
        let current = store
            .users
            .get_mut(&key)
            .ok_or_else(|| ServerError::NotFound("user not found".into()))?;

        *current = User {
            id: current.id.clone(),
            created_at: current.created_at,
            ..user.clone()
        };
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let key = parse_id(id)?;
        match self.store.lock().await.users.remove(&key) {
            Some(_) => Ok(()),
            None => Err(ServerError::NotFound("user not found".into())),
        }
    }

    async fn create_many(&self, users: &[User]) -> Result<Vec<String>> {
        let mut store = self.store.lock().await;
        if users.iter().any(|user| user.updated_at < user.created_at) {
            return Err(ServerError::internal("constraint violation"));
        }

        Ok(users.iter().map(|user| store.insert(user)).collect())
    }

    async fn ping(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServerError::internal("store unavailable"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::repository::Field;
    use chrono::Utc;

    fn user(email: &str) -> User {
        let now = Utc::now();
        User {
            id: None,
            name: "Ada".into(),
            surnames: "Lovelace".into(),
            email: email.into(),
            password_hash: "hash".into(),
            claim_ids: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_sequential_ids_and_filters() {
        let repo = InMemoryUserRepository::new();
        assert_eq!(repo.create(&user("a@b")).await.unwrap(), "1");
        assert_eq!(repo.create(&user("c@d")).await.unwrap(), "2");

        let found = repo
            .get(&Filter::all().eq(Field::Email, "c@d"), Page::first())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_deref(), Some("2"));

        let page = Page {
            skip: Some(1),
            take: None,
        };
        assert_eq!(repo.get(&Filter::all(), page).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_policy() {
        let repo = InMemoryUserRepository::new();
        assert!(repo.get(&Filter::all(), Page::default()).await.unwrap().is_empty());

        let repo = InMemoryUserRepository::new().not_found_on_empty(true);
        let err = repo.get(&Filter::all(), Page::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_create_many_all_or_nothing() {
        let repo = InMemoryUserRepository::new();
        let mut broken = user("b@c");
        broken.updated_at = broken.created_at - chrono::Duration::seconds(1);

        assert!(repo.create_many(&[user("a@b"), broken]).await.is_err());
        assert_eq!(repo.len().await, 0);
        assert_eq!(
            repo.create_many(&[user("a@b"), user("b@c")]).await.unwrap(),
            vec!["1", "2"]
        );
    }
}
