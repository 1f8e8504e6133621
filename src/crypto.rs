//! Password hashing.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::config::Argon2 as ArgonConfig;
use crate::error::{Result, ServerError};

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(#[from] argon2::Error),
    #[error("password hash error: {0}")]
    PasswordHash(argon2::password_hash::Error),
}

impl From<CryptoError> for ServerError {
    fn from(err: CryptoError) -> Self {
        ServerError::wrap("password hashing failed", err)
    }
}

/// Argon2id password manager.
///
/// Hashing is CPU-bound; the async methods run on the blocking pool.
#[derive(Clone, Debug)]
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`]. Missing parameters use the
    /// library defaults.
    pub fn new(config: Option<ArgonConfig>) -> std::result::Result<Self, CryptoError> {
        let config = config.unwrap_or_default();
        let params = Params::new(
            config.memory_cost.unwrap_or(Params::DEFAULT_M_COST),
            config.iterations.unwrap_or(Params::DEFAULT_T_COST),
            config.parallelism.unwrap_or(Params::DEFAULT_P_COST),
            None,
        )?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `password` into a PHC string.
    pub fn hash_password(
        &self,
        password: impl AsRef<[u8]>,
    ) -> std::result::Result<String, CryptoError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(CryptoError::PasswordHash)?;

        Ok(hash.to_string())
    }

    /// Check `password` against a PHC string.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        digest: &str,
    ) -> std::result::Result<bool, CryptoError> {
        let parsed = PasswordHash::new(digest).map_err(CryptoError::PasswordHash)?;

        match self.argon2().verify_password(password.as_ref(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(CryptoError::PasswordHash(err)),
        }
    }

    /// Hash on the blocking pool.
    pub async fn hash(&self, password: String) -> Result<String> {
        let manager = self.clone();
        let digest =
            tokio::task::spawn_blocking(move || manager.hash_password(password))
                .await??;
        Ok(digest)
    }

    /// Verify on the blocking pool.
    pub async fn verify(&self, password: String, digest: String) -> Result<bool> {
        let manager = self.clone();
        let matches = tokio::task::spawn_blocking(move || {
            manager.verify_password(password, &digest)
        })
        .await??;
        Ok(matches)
    }
}

#[cfg(test)]
pub(crate) fn test_manager() -> PasswordManager {
    PasswordManager::new(Some(ArgonConfig {
        memory_cost: Some(1024),
        iterations: Some(1),
        parallelism: Some(1),
    }))
    .expect("valid argon2 parameters")
}
