//! gRPC surface of the user service.

pub mod convert;
pub mod pipeline;

/// Messages and server stubs of `users.v1`.
pub mod proto {
    #![allow(clippy::all)]
    include!("generated/users.v1.rs");
}

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::AppState;
use crate::rpc::pipeline::Pipeline;
use crate::rpc::proto::users_server::{Users, UsersServer};
use crate::user::{CreateUser, Operation, UpdateUser, UserService};

type UserStream =
    tokio_stream::Iter<std::vec::IntoIter<Result<proto::UserResponse, Status>>>;

/// gRPC handlers over [`UserService`].
pub struct UsersService {
    users: UserService,
    pipeline: Pipeline,
}

impl UsersService {
    pub fn new(state: &AppState) -> Self {
        Self {
            users: state.users.clone(),
            pipeline: Pipeline::new(
                Arc::clone(&state.policy),
                state.users.tokens().clone(),
                state.config.timeout,
                state.config.log.snapshot_limit,
            ),
        }
    }
}

/// Build the tonic service.
pub fn server(state: &AppState) -> UsersServer<UsersService> {
    UsersServer::new(UsersService::new(state))
}

#[tonic::async_trait]
impl Users for UsersService {
    async fn login(
        &self,
        request: Request<proto::LoginRequest>,
    ) -> Result<Response<proto::LoginResponse>, Status> {
        self.pipeline
            .unary(Operation::Login, request, |request| async move {
                let message = request.into_inner();
                let session = self.users.login(&message.email, &message.password).await?;
                Ok(session.into())
            })
            .await
    }

    async fn create(
        &self,
        request: Request<proto::CreateUserRequest>,
    ) -> Result<Response<proto::CreateUserResponse>, Status> {
        self.pipeline
            .unary(Operation::Create, request, |request| async move {
                let message = request.into_inner();
                let inserted_id = self.users.create(message.into()).await?;
                Ok(proto::CreateUserResponse { inserted_id })
            })
            .await
    }

    async fn create_many(
        &self,
        request: Request<proto::CreateManyRequest>,
    ) -> Result<Response<proto::CreateManyResponse>, Status> {
        self.pipeline
            .unary(Operation::CreateMany, request, |request| async move {
                let message = request.into_inner();
                let users = message.users.into_iter().map(CreateUser::from).collect();
                let inserted_ids = self.users.create_many(users).await?;
                Ok(proto::CreateManyResponse { inserted_ids })
            })
            .await
    }

    type GetAllStream = UserStream;

    async fn get_all(&self, request: Request<()>) -> Result<Response<UserStream>, Status> {
        let response = self
            .pipeline
            .unary(Operation::GetAll, request, |_| async move {
                let users = self.users.get_all().await?;
                Ok(users
                    .into_iter()
                    .map(proto::UserResponse::from)
                    .collect::<Vec<_>>())
            })
            .await?;

        Ok(response.map(|users| {
            tokio_stream::iter(users.into_iter().map(Ok).collect::<Vec<_>>())
        }))
    }

    async fn get_by_email(
        &self,
        request: Request<proto::GetByEmailRequest>,
    ) -> Result<Response<proto::UserResponse>, Status> {
        self.pipeline
            .unary(Operation::GetByEmail, request, |request| async move {
                let message = request.into_inner();
                Ok(self.users.get_by_email(&message.email).await?.into())
            })
            .await
    }

    async fn get_by_id(
        &self,
        request: Request<proto::GetByIdRequest>,
    ) -> Result<Response<proto::UserResponse>, Status> {
        self.pipeline
            .unary(Operation::GetById, request, |request| async move {
                let message = request.into_inner();
                Ok(self.users.get_by_id(&message.id).await?.into())
            })
            .await
    }

    async fn update(
        &self,
        request: Request<proto::UpdateUserRequest>,
    ) -> Result<Response<()>, Status> {
        self.pipeline
            .unary(Operation::Update, request, |request| async move {
                let message = request.into_inner();
                let (id, patch): (String, UpdateUser) = message.into();
                self.users.update(&id, patch).await
            })
            .await
    }

    async fn delete(
        &self,
        request: Request<proto::DeleteUserRequest>,
    ) -> Result<Response<()>, Status> {
        self.pipeline
            .unary(Operation::Delete, request, |request| async move {
                let message = request.into_inner();
                self.users.delete(&message.id).await
            })
            .await
    }

    async fn get_user_claims(
        &self,
        request: Request<()>,
    ) -> Result<Response<proto::ClaimsResponse>, Status> {
        self.pipeline
            .unary(Operation::GetUserClaims, request, |_| async move {
                Ok(proto::ClaimsResponse {
                    claims: self.users.get_user_claims().into_iter().collect(),
                })
            })
            .await
    }
}
