mod policy;
mod service;

pub use policy::*;
pub use service::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::claims::ClaimId;

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Assigned by the store on insert.
    pub id: Option<String>,
    pub name: String,
    pub surnames: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(rename = "claims")]
    pub claim_ids: Vec<ClaimId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CreateUser {
    #[validate(length(max = 128, message = "name is too long"))]
    pub name: String,
    #[validate(length(max = 128, message = "surnames are too long"))]
    pub surnames: String,
    #[validate(length(max = 254, message = "email is too long"))]
    pub email: String,
    #[validate(length(max = 1024, message = "password is too long"))]
    pub password: String,
    pub claims: Vec<ClaimId>,
}

/// Partial update of a user. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateUser {
    #[validate(length(max = 128, message = "name is too long"))]
    pub name: Option<String>,
    #[validate(length(max = 128, message = "surnames are too long"))]
    pub surnames: Option<String>,
    #[validate(length(max = 254, message = "email is too long"))]
    pub email: Option<String>,
    pub old_password: Option<String>,
    #[validate(length(max = 1024, message = "password is too long"))]
    pub new_password: Option<String>,
    pub claims: Option<Vec<ClaimId>>,
}

impl UpdateUser {
    /// Whether no field is present.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.surnames.is_none()
            && self.email.is_none()
            && self.new_password.is_none()
            && self.claims.is_none()
    }
}

/// Successful login.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub token: String,
}
