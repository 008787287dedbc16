//! # hoststore services
//!
//! Domain services built on [`hoststore_core::Store`]:
//!
//! - [`PageService`]: CMS pages under `page:<name>`
//! - [`SecurityLogService`]: per-user security events with a retention TTL
//! - [`UserService`]: accounts, the email index and recovery codes
//!
//! Every operation takes a [`Context`](hoststore_core::Context). Passing a
//! context that carries a transaction makes the call part of it:
//!
//! ```
//! use hoststore_core::{Context, Store};
//! use hoststore_service::{RegisterRequest, SecurityLogService, ServiceConfig, ServiceError, UserService};
//!
//! let store = Store::open_in_memory();
//! let users = UserService::new(store.clone(), ServiceConfig::default());
//! let log = SecurityLogService::new(store.clone(), ServiceConfig::default());
//!
//! let ctx = Context::new();
//! let user = store
//!     .transaction(&ctx, false, |txn| {
//!         let req = RegisterRequest {
//!             email: "ada@example.com".into(),
//!             password: "pw".into(),
//!             ..RegisterRequest::default()
//!         };
//!         let user = users.create_user(txn, &req)?;
//!         log.log_event(txn, &user.user_id, "register", "127.0.0.1", "doc")?;
//!         Ok::<_, ServiceError>(user)
//!     })
//!     .unwrap();
//!
//! assert_eq!(users.get_user_id_by_email(&ctx, "ADA@example.com").unwrap(), user.user_id);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entity;
mod error;
mod normalize;
mod page;
mod security_log;
mod user;

pub use config::ServiceConfig;
pub use entity::{
    AdminPage, ContentType, EmailIndexEntity, PageEntity, RecoverCodeEntity, RegisterRequest,
    SecurityLogEntity, UserEntity,
};
pub use error::{ServiceError, ServiceResult};
pub use normalize::{
    normalize_code, normalize_email, normalize_field, normalize_identity, normalize_page_id,
    normalize_user_id,
};
pub use page::PageService;
pub use security_log::SecurityLogService;
pub use user::{PasswordHasher, Sha256PasswordHasher, UserService};
