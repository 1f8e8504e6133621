//! MongoDB implementation of the user repository.

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use chrono::{DateTime, Utc};
use futures::{FutureExt, TryStreamExt};
use mongodb::options::{IndexOptions, ReadConcern, WriteConcern};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};

use crate::claims::ClaimId;
use crate::error::{Result, ServerError};
use crate::repository::{Field, Filter, Page, UserRepository};
use crate::user::User;

pub const DEFAULT_DATABASE_NAME: &str = "accounts";
const COLLECTION: &str = "users";

/// User as stored in the `users` collection.
#[derive(Debug, Serialize, Deserialize)]
struct UserDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    name: String,
    surnames: String,
    email: String,
    password_hash: String,
    claim_ids: Vec<ClaimId>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    updated_at: DateTime<Utc>,
}

impl From<&User> for UserDocument {
    /// The id is never written; the store assigns it.
    fn from(user: &User) -> Self {
        UserDocument {
            id: None,
            name: user.name.clone(),
            surnames: user.surnames.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            claim_ids: user.claim_ids.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<UserDocument> for User {
    fn from(document: UserDocument) -> Self {
        User {
            id: document.id.map(|id| id.to_hex()),
            name: document.name,
            surnames: document.surnames,
            email: document.email,
            password_hash: document.password_hash,
            claim_ids: document.claim_ids,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

/// MongoDB user repository.
#[derive(Clone)]
pub struct MongoUserRepository {
    client: Client,
    users: Collection<UserDocument>,
}

impl MongoUserRepository {
    /// Connect using `dsn`. The database named in the connection string is
    /// used, [`DEFAULT_DATABASE_NAME`] otherwise.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let client = Client::with_uri_str(dsn).await?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE_NAME));

        let repository = Self::on_database(client, &database).await?;
        tracing::info!(database = %database.name(), "mongodb connected");
        Ok(repository)
    }

    /// Use the `users` collection of `database`, ensuring its email index.
    pub async fn on_database(client: Client, database: &Database) -> Result<Self> {
        let users = database.collection::<UserDocument>(COLLECTION);

        let index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(false).build())
            .build();
        users.create_index(index).await?;

        Ok(Self { client, users })
    }
}

fn object_id_hex(id: &Bson) -> String {
    match id {
        Bson::ObjectId(id) => id.to_hex(),
        other => other.to_string(),
    }
}

/// Ids are `ObjectId`s on this backend.
fn parse_id(id: &str) -> Result<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| ServerError::Validation(format!("invalid id: {id}")))
}

/// Equality document for `filter`.
fn filter_document(filter: &Filter) -> Result<Document> {
    let mut document = Document::new();
    for (field, value) in filter.clauses() {
        match field {
            Field::Id => document.insert("_id", parse_id(value)?),
            _ => document.insert(field.as_str(), value.as_str()),
        };
    }
    Ok(document)
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    async fn create(&self, user: &User) -> Result<String> {
        let result = self.users.insert_one(UserDocument::from(user)).await?;
        Ok(object_id_hex(&result.inserted_id))
    }

    async fn get(&self, filter: &Filter, page: Page) -> Result<Vec<User>> {
        let mut find = self
            .users
            .find(filter_document(filter)?)
            .sort(doc! { "created_at": 1, "_id": 1 });
        if let Some(skip) = page.skip {
            find = find.skip(skip);
        }
        if let Some(take) = page.take {
            find = find.limit(i64::try_from(take).unwrap_or(i64::MAX));
        }

        let documents: Vec<UserDocument> = find.await?.try_collect().await?;
        Ok(documents.into_iter().map(User::from).collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<User> {
        let id = parse_id(id)?;
        self.users
            .find_one(doc! { "_id": id })
            .await?
            .map(User::from)
            .ok_or_else(|| ServerError::NotFound("user not found".into()))
    }

    async fn update(&self, id: &str, user: &User) -> Result<()> {
        let id = parse_id(id)?;
        let result = self
            .users
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$set": {
                        "name": &user.name,
                        "surnames": &user.surnames,
                        "email": &user.email,
                        "password_hash": &user.password_hash,
                        "claim_ids": user.claim_ids.clone(),
                        "updated_at": bson::DateTime::from_chrono(user.updated_at),
                    }
                },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(ServerError::NotFound("user not found".into()));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = parse_id(id)?;
        let result = self.users.delete_one(doc! { "_id": id }).await?;

        if result.deleted_count == 0 {
            return Err(ServerError::NotFound("user not found".into()));
        }

        Ok(())
    }

    async fn create_many(&self, users: &[User]) -> Result<Vec<String>> {
        let documents: Vec<UserDocument> = users.iter().map(UserDocument::from).collect();
        let mut session = self.client.start_session().await?;

        // The driver retries the whole transaction on transient errors and
        // the commit on unknown results, within its own time limit.
        let ids = session
            .start_transaction()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::majority())
            .and_run(
                (self.users.clone(), documents),
                |session, (users, documents)| {
                    async move {
                        let mut ids = Vec::with_capacity(documents.len());
                        for document in documents.iter() {
                            let result = users.insert_one(document).session(&mut *session).await?;
                            ids.push(object_id_hex(&result.inserted_id));
                        }
                        Ok::<_, mongodb::error::Error>(ids)
                    }
                    .boxed()
                },
            )
            .await?;

        Ok(ids)
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }
}
