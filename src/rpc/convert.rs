//! Conversions between wire messages and service types.

use chrono::{DateTime, Utc};
use prost_types::Timestamp;

use crate::rpc::proto;
use crate::user::{CreateUser, Session, UpdateUser, User};

/// UTC instant as seconds and nanoseconds.
pub fn to_timestamp(instant: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: instant.timestamp(),
        nanos: instant.timestamp_subsec_nanos() as i32,
    }
}

impl From<User> for proto::UserResponse {
    fn from(user: User) -> Self {
        proto::UserResponse {
            id: user.id.unwrap_or_default(),
            name: user.name,
            surnames: user.surnames,
            email: user.email,
            claims: user.claim_ids,
            created_at: Some(to_timestamp(user.created_at)),
            updated_at: Some(to_timestamp(user.updated_at)),
        }
    }
}

impl From<Session> for proto::LoginResponse {
    fn from(session: Session) -> Self {
        proto::LoginResponse {
            user: Some(session.user.into()),
            token: session.token,
        }
    }
}

impl From<proto::CreateUserRequest> for CreateUser {
    fn from(message: proto::CreateUserRequest) -> Self {
        CreateUser {
            name: message.name,
            surnames: message.surnames,
            email: message.email,
            password: message.password,
            claims: message.claims,
        }
    }
}

impl From<proto::UpdateUserRequest> for (String, UpdateUser) {
    fn from(message: proto::UpdateUserRequest) -> Self {
        let patch = UpdateUser {
            name: message.name,
            surnames: message.surnames,
            email: message.email,
            old_password: message.old_password,
            new_password: message.new_password,
            claims: message.claims.map(|claims| claims.ids),
        };
        (message.id, patch)
    }
}
