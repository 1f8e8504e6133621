//! PostgreSQL implementation of the user repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgQueryResult};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::claims::ClaimId;
use crate::error::{Result, ServerError, ToInternal};
use crate::repository::{Field, Filter, Page, UserRepository};
use crate::user::User;

pub const DEFAULT_POOL_SIZE: u32 = 10;

const SELECT_USERS: &str = r#"SELECT
    id::text AS id, name, surnames, email, password_hash,
    claim_ids, created_at, updated_at
FROM users"#;

const INSERT_USER: &str = r#"INSERT INTO users (
    name, surnames, email, password_hash, claim_ids, created_at, updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7)
RETURNING id::text"#;

/// Row of the `users` table.
#[derive(Debug, sqlx::FromRow)]
struct UserRecord {
    id: String,
    name: String,
    surnames: String,
    email: String,
    password_hash: String,
    claim_ids: Vec<ClaimId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        User {
            id: Some(record.id),
            name: record.name,
            surnames: record.surnames,
            email: record.email,
            password_hash: record.password_hash,
            claim_ids: record.claim_ids,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// PostgreSQL user repository.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new [`PgUserRepository`] over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply pending migrations.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_POOL_SIZE)
            .connect(dsn)
            .await?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .catch("cannot apply migrations")?;

        tracing::info!("postgres connected");
        Ok(Self::new(pool))
    }
}

/// Ids are UUIDs on this backend.
fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| ServerError::Validation(format!("invalid id: {id}")))
}

/// Build the `SELECT` for [`UserRepository::get`].
///
/// Columns come from [`Field`]; every value, offset and limit is bound.
fn select_query(filter: &Filter, page: Page) -> Result<QueryBuilder<'static, Postgres>> {
    let mut query = QueryBuilder::new(SELECT_USERS);

    for (i, (field, value)) in filter.clauses().iter().enumerate() {
        query.push(if i == 0 { " WHERE " } else { " AND " });
        query.push(field.as_str()).push(" = ");
        match field {
            Field::Id => query.push_bind(parse_id(value)?),
            _ => query.push_bind(value.clone()),
        };
    }

    query.push(" ORDER BY created_at, id");

    if let Some(skip) = page.skip {
        query.push(" OFFSET ").push_bind(to_i64(skip));
    }
    if let Some(take) = page.take {
        query.push(" LIMIT ").push_bind(to_i64(take));
    }

    Ok(query)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

async fn insert<'e, E>(executor: E, user: &User) -> Result<String>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let id = sqlx::query_scalar::<_, String>(INSERT_USER)
        .bind(&user.name)
        .bind(&user.surnames)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.claim_ids)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(executor)
        .await?;

    Ok(id)
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: &User) -> Result<String> {
        insert(&self.pool, user).await
    }

    async fn get(&self, filter: &Filter, page: Page) -> Result<Vec<User>> {
        let users = select_query(filter, page)?
            .build_query_as::<UserRecord>()
            .fetch_all(&self.pool)
            .await?;

        if users.is_empty() {
            return Err(ServerError::NotFound("user not found".into()));
        }

        Ok(users.into_iter().map(User::from).collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<User> {
        let id = parse_id(id)?;
        let record = sqlx::query_as::<_, UserRecord>(&format!("{SELECT_USERS} WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(record.into())
    }

    async fn update(&self, id: &str, user: &User) -> Result<()> {
        let id = parse_id(id)?;
        let result: PgQueryResult = sqlx::query(
            r#"
            UPDATE users
            SET
                name = $2,
                surnames = $3,
                email = $4,
                password_hash = $5,
                claim_ids = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&user.name)
        .bind(&user.surnames)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.claim_ids)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound("user not found".into()));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = parse_id(id)?;
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::NotFound("user not found".into()));
        }

        Ok(())
    }

    async fn create_many(&self, users: &[User]) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(users.len());

        for user in users {
            match insert(&mut *tx, user).await {
                Ok(id) => ids.push(id),
                Err(err) => {
                    tx.rollback().await?;
                    return Err(err);
                },
            }
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_select_without_filter() {
        let query = select_query(&Filter::all(), Page::default()).unwrap();
        assert_eq!(query.sql(), format!("{SELECT_USERS} ORDER BY created_at, id"));
    }

    #[test]
    fn test_select_binds_every_value() {
        let filter = Filter::all()
            .eq(Field::Email, "a@b' OR '1'='1")
            .eq(Field::Name, "Ada");
        let page = Page {
            skip: Some(10),
            take: Some(5),
        };
        let query = select_query(&filter, page).unwrap();

        assert_eq!(
            query.sql(),
            format!(
                "{SELECT_USERS} WHERE email = $1 AND name = $2 ORDER BY created_at, id OFFSET $3 LIMIT $4"
            )
        );
        assert!(!query.sql().contains("a@b"));
    }

    #[test]
    fn test_select_rejects_malformed_id() {
        let filter = Filter::all().eq(Field::Id, "not-a-uuid");
        let err = select_query(&filter, Page::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_parse_id() {
        assert!(parse_id("67e55044-10b1-426f-9247-bb680e5fe0c8").is_ok());
        assert_eq!(parse_id("42").unwrap_err().kind(), ErrorKind::Validation);
    }

    fn user(email: &str, claims: Vec<ClaimId>) -> User {
        let now = Utc::now();
        User {
            id: None,
            name: "Ada".into(),
            surnames: "Lovelace".into(),
            email: email.into(),
            password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA".into(),
            claim_ids: claims,
            created_at: now,
            updated_at: now,
        }
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_crud(pool: PgPool) {
        let repo = PgUserRepository::new(pool);

        let id = repo.create(&user("ada@example.com", vec![0])).await.unwrap();
        let found = repo.get_by_id(&id).await.unwrap();
        assert_eq!(found.id.as_deref(), Some(id.as_str()));
        assert_eq!(found.claim_ids, vec![0]);

        let mut changed = found.clone();
        changed.name = "Grace".into();
        repo.update(&id, &changed).await.unwrap();
        assert_eq!(repo.get_by_id(&id).await.unwrap().name, "Grace");

        repo.delete(&id).await.unwrap();
        assert_eq!(repo.get_by_id(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(repo.delete(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            repo.get(&Filter::all(), Page::default()).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[sqlx::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_create_many_rolls_back(pool: PgPool) {
        let repo = PgUserRepository::new(pool.clone());

        // Violates the `updated_at >= created_at` check.
        let mut broken = user("b@example.com", vec![]);
        broken.updated_at = broken.created_at - chrono::Duration::days(1);

        let result = repo
            .create_many(&[user("a@example.com", vec![]), broken])
            .await;
        assert!(result.is_err());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
