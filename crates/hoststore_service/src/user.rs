//! User accounts.
//!
//! Key layout:
//!
//! | Key | Record |
//! |---|---|
//! | `user:<userId>` | [`UserEntity`] |
//! | `email:<email>` | [`EmailIndexEntity`] pointing back at the user |
//! | `recover:<email>` | [`RecoverCodeEntity`], with a TTL |
//! | `<userId>:...` | content owned by the user |
//!
//! The user record and its email index are always written in the same
//! transaction.

use crate::config::ServiceConfig;
use crate::entity::{EmailIndexEntity, RecoverCodeEntity, RegisterRequest, UserEntity};
use crate::error::{ServiceError, ServiceResult};
use crate::normalize::{normalize_code, normalize_email, normalize_field, normalize_user_id};
use bytes::Bytes;
use hoststore_core::{key, Context, CoreError, Store, Ttl};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use uuid::Uuid;

const USER_PREFIX: &str = "user:";
const DEFAULT_ROLE: &str = "USER";
const MAX_ID_ATTEMPTS: usize = 8;

/// Turns passwords into stored hashes and checks them.
pub trait PasswordHasher: Send + Sync {
    /// Hashes a clear-text password.
    fn hash(&self, password: &str) -> String;

    /// Checks `password` against a hash produced by [`hash`](Self::hash).
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Salted SHA-256, stored as `sha256$<salt>$<hex digest>`.
///
/// Fast by construction; deployments storing user-chosen passwords should
/// plug a deliberately slow hash in through [`PasswordHasher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256PasswordHasher;

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, password: &str) -> String {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = salted_digest(&salt, password);
        format!("sha256${salt}${digest}")
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        let mut parts = hash.splitn(3, '$');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("sha256"), Some(salt), Some(expected)) => {
                constant_time_eq(salted_digest(salt, password).as_bytes(), expected.as_bytes())
            }
            _ => false,
        }
    }
}

fn salted_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"$");
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// User registration, lookup and maintenance.
#[derive(Clone)]
pub struct UserService {
    store: Store,
    config: ServiceConfig,
    hasher: Arc<dyn PasswordHasher>,
}

impl fmt::Debug for UserService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserService")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl UserService {
    /// Creates a user service hashing with [`Sha256PasswordHasher`].
    #[must_use]
    pub fn new(store: Store, config: ServiceConfig) -> Self {
        Self {
            store,
            config,
            hasher: Arc::new(Sha256PasswordHasher),
        }
    }

    /// Replaces the password hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Picks a user id no stored user has.
    ///
    /// # Errors
    ///
    /// Fails if every candidate collided, or on store errors.
    pub fn generate_user_id(&self, ctx: &Context) -> ServiceResult<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = Uuid::new_v4().simple().to_string();
            if !self.store.exists(ctx, &key!("user:%s", candidate)?)? {
                return Ok(candidate);
            }
            tracing::warn!(user_id = %candidate, "generated user id collided");
        }
        Err(CoreError::invalid_operation("no free user id").into())
    }

    /// Registers a user with a fresh id and the default role.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty email and
    /// [`ServiceError::UserAlreadyExists`] if the email is registered.
    pub fn create_user(&self, ctx: &Context, req: &RegisterRequest) -> ServiceResult<UserEntity> {
        let email = normalize_email(&req.email);
        if email.is_empty() {
            return Err(ServiceError::validation("email is empty"));
        }

        self.store.transaction(ctx, false, |txn| -> ServiceResult<UserEntity> {
            if self.find_email(txn, &email)?.is_some() {
                return Err(ServiceError::UserAlreadyExists { email: email.clone() });
            }
            let user = UserEntity {
                user_id: self.generate_user_id(txn)?,
                first_name: normalize_field(&req.first_name),
                middle_name: normalize_field(&req.middle_name),
                last_name: normalize_field(&req.last_name),
                email: email.clone(),
                password_hash: self.hasher.hash(&req.password),
                roles: vec![DEFAULT_ROLE.to_string()],
                created_at: self.store.clock().now().timestamp(),
                ..UserEntity::default()
            };
            self.write_user(txn, &user)?;
            tracing::info!(user_id = %user.user_id, "user created");
            Ok(user)
        })
    }

    /// Loads a user by id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UserNotFound`] for an unknown id.
    pub fn get_user(&self, ctx: &Context, user_id: &str) -> ServiceResult<UserEntity> {
        let user_id = user_id_of(user_id)?;
        self.store
            .get_checked(ctx, &key!("user:%s", user_id)?, &user_id)?
            .ok_or(ServiceError::UserNotFound)
    }

    /// Resolves an email to its user id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UserNotFound`] for an unregistered email.
    pub fn get_user_id_by_email(&self, ctx: &Context, email: &str) -> ServiceResult<String> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ServiceError::validation("email is empty"));
        }
        self.find_email(ctx, &email)?
            .map(|index| index.user_id)
            .ok_or(ServiceError::UserNotFound)
    }

    /// Checks a password. `username` is an email if it contains `@`, and
    /// a user id otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UserNotFound`] or
    /// [`ServiceError::InvalidPassword`].
    pub fn authenticate_user(
        &self,
        ctx: &Context,
        username: &str,
        password: &str,
    ) -> ServiceResult<UserEntity> {
        self.store.transaction(ctx, true, |txn| -> ServiceResult<UserEntity> {
            let user_id = if username.contains('@') {
                self.get_user_id_by_email(txn, username)?
            } else {
                username.to_string()
            };
            let user = self.get_user(txn, &user_id)?;
            if !self.hasher.verify(password, &user.password_hash) {
                tracing::debug!(user_id = %user.user_id, "password mismatch");
                return Err(ServiceError::InvalidPassword);
            }
            Ok(user)
        })
    }

    /// Writes a user, keeping the email index in step.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty id and
    /// [`ServiceError::UserAlreadyExists`] if the email belongs to another
    /// user.
    pub fn save_user(&self, ctx: &Context, user: &UserEntity) -> ServiceResult<()> {
        let mut user = user.clone();
        user.user_id = user_id_of(&user.user_id)?;
        user.email = normalize_email(&user.email);
        self.store
            .transaction(ctx, false, |txn| self.write_user(txn, &user))
    }

    /// Loads a user, lets `update` change it and saves it, all in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UserNotFound`], `update`'s error, or the
    /// save error.
    pub fn do_with_user<F>(&self, ctx: &Context, user_id: &str, update: F) -> ServiceResult<()>
    where
        F: FnOnce(&mut UserEntity) -> ServiceResult<()>,
    {
        self.store.transaction(ctx, false, |txn| -> ServiceResult<()> {
            let mut user = self.get_user(txn, user_id)?;
            update(&mut user)?;
            self.save_user(txn, &user)
        })
    }

    /// Removes a user and its email index. Owned content stays; see
    /// [`drop_user_content`](Self::drop_user_content).
    ///
    /// Removing an unknown user is not an error.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty id, and store errors.
    pub fn remove_user(&self, ctx: &Context, user_id: &str) -> ServiceResult<()> {
        let user_id = user_id_of(user_id)?;
        let user_key = key!("user:%s", user_id)?;

        self.store.transaction(ctx, false, |txn| -> ServiceResult<()> {
            let Some(user) = self.store.get_checked::<UserEntity>(txn, &user_key, &user_id)? else {
                return Ok(());
            };
            self.unlink_email(txn, &user.email, &user_id)?;
            self.store.remove(txn, &user_key)?;
            tracing::info!(user_id = %user_id, "user removed");
            Ok(())
        })
    }

    /// Removes every key under `<userId>:`. Returns how many went.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty id, and store errors.
    pub fn drop_user_content(&self, ctx: &Context, user_id: &str) -> ServiceResult<usize> {
        let prefix = content_prefix(user_id)?;
        Ok(self
            .store
            .remove_prefix(ctx, &prefix, self.config.batch_size)?)
    }

    /// Visits the raw entries under `<userId>:` until `visit` breaks.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty id, and store errors.
    pub fn dump_user<F>(&self, ctx: &Context, user_id: &str, mut visit: F) -> ServiceResult<()>
    where
        F: FnMut(&str, Bytes) -> ControlFlow<()>,
    {
        let prefix = content_prefix(user_id)?;
        self.store
            .enumerate_raw(ctx, &prefix, self.config.batch_size, |key, value| {
                Ok::<_, ServiceError>(visit(key, value))
            })
    }

    /// Visits every user in id order until `visit` breaks.
    ///
    /// # Errors
    ///
    /// Returns store and codec errors.
    pub fn enum_users<F>(&self, ctx: &Context, mut visit: F) -> ServiceResult<()>
    where
        F: FnMut(UserEntity) -> ControlFlow<()>,
    {
        self.store
            .enumerate_records(ctx, USER_PREFIX, self.config.batch_size, |_, user| {
                Ok::<_, ServiceError>(visit(user))
            })
    }

    /// Replaces the password of the user registered under `email` and
    /// returns that user's id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UserNotFound`] for an unregistered email.
    pub fn reset_password(
        &self,
        ctx: &Context,
        email: &str,
        new_password: &str,
    ) -> ServiceResult<String> {
        self.store.transaction(ctx, false, |txn| -> ServiceResult<String> {
            let user_id = self.get_user_id_by_email(txn, email)?;
            self.do_with_user(txn, &user_id, |user| {
                user.password_hash = self.hasher.hash(new_password);
                Ok(())
            })?;
            tracing::info!(user_id = %user_id, "password reset");
            Ok(user_id)
        })
    }

    /// Stores a recovery code for `email`, replacing any previous one.
    ///
    /// `ttl` defaults to the configured recovery code retention.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty email or code.
    pub fn save_recover_code(
        &self,
        ctx: &Context,
        email: &str,
        code: &str,
        ttl: Option<Ttl>,
    ) -> ServiceResult<()> {
        let email = normalize_email(email);
        let code = normalize_code(code);
        if email.is_empty() || code.is_empty() {
            return Err(ServiceError::validation("email and code are required"));
        }
        let record = RecoverCodeEntity::new(
            email.clone(),
            code,
            self.store.clock().now().timestamp(),
        );
        let ttl = ttl.unwrap_or(self.config.recover_code_ttl);
        self.store
            .set_record(ctx, &key!("recover:%s", email)?, &record, Some(ttl))?;
        Ok(())
    }

    /// Checks a recovery code. The code stays valid until it expires or
    /// is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRecoverCode`] if no live code is
    /// stored for `email` or it differs from `code`.
    pub fn validate_recover_code(&self, ctx: &Context, email: &str, code: &str) -> ServiceResult<()> {
        let email = normalize_email(email);
        let code = normalize_code(code);
        if email.is_empty() {
            return Err(ServiceError::InvalidRecoverCode);
        }
        let stored = self
            .store
            .get_checked::<RecoverCodeEntity>(ctx, &key!("recover:%s", email)?, &email)?;
        match stored {
            Some(stored) if !code.is_empty() && stored.code == code => Ok(()),
            _ => Err(ServiceError::InvalidRecoverCode),
        }
    }

    fn find_email(&self, ctx: &Context, email: &str) -> ServiceResult<Option<EmailIndexEntity>> {
        Ok(self
            .store
            .get_checked(ctx, &key!("email:%s", email)?, email)?)
    }

    /// Writes `user` and its index; `user` is already normalized.
    fn write_user(&self, txn: &Context, user: &UserEntity) -> ServiceResult<()> {
        let user_key = key!("user:%s", user.user_id)?;
        let previous = self
            .store
            .get_checked::<UserEntity>(txn, &user_key, &user.user_id)?;

        if let Some(previous) = previous {
            if previous.email != user.email {
                self.unlink_email(txn, &previous.email, &user.user_id)?;
            }
        }

        if !user.email.is_empty() {
            match self.find_email(txn, &user.email)? {
                Some(index) if index.user_id != user.user_id => {
                    return Err(ServiceError::UserAlreadyExists {
                        email: user.email.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    let index = EmailIndexEntity::new(user.email.clone(), user.user_id.clone());
                    self.store
                        .set_record(txn, &key!("email:%s", user.email)?, &index, None)?;
                }
            }
        }

        self.store.set_record(txn, &user_key, user, None)?;
        Ok(())
    }

    /// Removes the index entry of `email` if it points at `user_id`.
    fn unlink_email(&self, txn: &Context, email: &str, user_id: &str) -> ServiceResult<()> {
        if email.is_empty() {
            return Ok(());
        }
        if let Some(index) = self.find_email(txn, email)? {
            if index.user_id == user_id {
                self.store.remove(txn, &key!("email:%s", email)?)?;
            }
        }
        Ok(())
    }
}

fn user_id_of(raw: &str) -> ServiceResult<String> {
    let user_id = normalize_user_id(raw);
    if user_id.is_empty() {
        return Err(ServiceError::validation("user id is empty"));
    }
    Ok(user_id)
}

fn content_prefix(user_id: &str) -> ServiceResult<String> {
    Ok(key!("%s:", user_id_of(user_id)?)?)
}
