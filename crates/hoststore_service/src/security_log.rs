//! Per-user security event log.
//!
//! Events live at `<userId>:user:security-log:<UTC timestamp>` and expire
//! after the configured retention. Keys come from the store's monotonic
//! keyer, so events written in the same millisecond still get distinct,
//! time-ordered keys.

use crate::config::ServiceConfig;
use crate::entity::SecurityLogEntity;
use crate::error::{ServiceError, ServiceResult};
use crate::normalize::normalize_user_id;
use hoststore_core::{key, Appended, Context, Store};
use std::ops::ControlFlow;

/// Records and lists security events.
#[derive(Debug, Clone)]
pub struct SecurityLogService {
    store: Store,
    config: ServiceConfig,
}

impl SecurityLogService {
    /// Creates a security log service.
    #[must_use]
    pub fn new(store: Store, config: ServiceConfig) -> Self {
        Self { store, config }
    }

    /// Appends an event for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty user id or event name, and
    /// a conflict if a concurrent writer took the same slot.
    pub fn log_event(
        &self,
        ctx: &Context,
        user_id: &str,
        event_name: &str,
        remote_ip: &str,
        user_agent: &str,
    ) -> ServiceResult<Appended> {
        let prefix = log_prefix(user_id)?;
        if event_name.is_empty() {
            return Err(ServiceError::validation("event name is empty"));
        }

        let appended = self
            .store
            .log_keyer()
            .with_ttl(Some(self.config.security_log_ttl))
            .append::<_, ServiceError, _>(ctx, &prefix, |at| {
                SecurityLogEntity::new(event_name, at.timestamp(), remote_ip, user_agent)
            })?;
        tracing::debug!(key = %appended.key, event = event_name, "security event logged");
        Ok(appended)
    }

    /// Visits the events of `user_id`, oldest first, until `visit` breaks.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty user id, and store errors.
    pub fn enum_events<F>(&self, ctx: &Context, user_id: &str, mut visit: F) -> ServiceResult<()>
    where
        F: FnMut(SecurityLogEntity) -> ControlFlow<()>,
    {
        let prefix = log_prefix(user_id)?;
        self.store
            .enumerate_records(ctx, &prefix, self.config.batch_size, |_, event| {
                Ok::<_, ServiceError>(visit(event))
            })
    }
}

fn log_prefix(user_id: &str) -> ServiceResult<String> {
    let user_id = normalize_user_id(user_id);
    if user_id.is_empty() {
        return Err(ServiceError::validation("user id is empty"));
    }
    Ok(key!("%s:user:security-log:", user_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoststore_core::{Config, ManualClock, Ttl};
    use std::sync::Arc;
    use std::time::Duration;

    fn service(clock: Arc<ManualClock>, config: ServiceConfig) -> SecurityLogService {
        SecurityLogService::new(Store::in_memory_with(clock, Config::default()), config)
    }

    fn events(log: &SecurityLogService, user_id: &str) -> Vec<SecurityLogEntity> {
        let mut out = Vec::new();
        log.enum_events(&Context::new(), user_id, |event| {
            out.push(event);
            ControlFlow::Continue(())
        })
        .unwrap();
        out
    }

    #[test]
    fn key_layout() {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_123));
        let log = service(clock, ServiceConfig::default());
        let appended = log
            .log_event(&Context::new(), "u-1", "login", "10.0.0.1", "curl")
            .unwrap();
        assert_eq!(appended.key, "u1:user:security-log:2023-11-14 22:13:20.123");
    }

    #[test]
    fn events_are_listed_oldest_first() {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let log = service(clock.clone(), ServiceConfig::default());
        let ctx = Context::new();
        log.log_event(&ctx, "u1", "login", "ip", "ua").unwrap();
        clock.advance(Duration::from_secs(5));
        log.log_event(&ctx, "u1", "logout", "ip", "ua").unwrap();
        log.log_event(&ctx, "u2", "login", "ip", "ua").unwrap();

        let names: Vec<_> = events(&log, "u1").into_iter().map(|e| e.event_name).collect();
        assert_eq!(names, vec!["login", "logout"]);
        assert_eq!(events(&log, "u1")[1].event_time, 1_700_000_005);
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let log = service(Arc::new(ManualClock::default()), ServiceConfig::default());
        let ctx = Context::new();
        assert!(matches!(
            log.log_event(&ctx, "::", "login", "", ""),
            Err(ServiceError::Validation { .. })
        ));
        assert!(matches!(
            log.log_event(&ctx, "u1", "", "", ""),
            Err(ServiceError::Validation { .. })
        ));
    }

    #[test]
    fn events_expire() {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let config = ServiceConfig::default().security_log_ttl(Ttl::from_secs(60));
        let log = service(clock.clone(), config);
        log.log_event(&Context::new(), "u1", "login", "ip", "ua").unwrap();

        clock.advance(Duration::from_secs(59));
        assert_eq!(events(&log, "u1").len(), 1);
        clock.advance(Duration::from_secs(1));
        assert!(events(&log, "u1").is_empty());
    }
}
