//! Service configuration.

use hoststore_core::Ttl;

/// Settings shared by the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Retention of security log entries.
    pub security_log_ttl: Ttl,
    /// Entries fetched per enumeration batch.
    pub batch_size: usize,
    /// Retention of password recovery codes.
    pub recover_code_ttl: Ttl,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            security_log_ttl: Ttl::ONE_YEAR,
            batch_size: 256,
            recover_code_ttl: Ttl::from_secs(3_600),
        }
    }
}

impl ServiceConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the security log retention.
    #[must_use]
    pub const fn security_log_ttl(mut self, ttl: Ttl) -> Self {
        self.security_log_ttl = ttl;
        self
    }

    /// Sets the enumeration batch size.
    #[must_use]
    pub const fn batch_size(mut self, value: usize) -> Self {
        self.batch_size = value;
        self
    }

    /// Sets the default recovery code retention.
    #[must_use]
    pub const fn recover_code_ttl(mut self, ttl: Ttl) -> Self {
        self.recover_code_ttl = ttl;
        self
    }
}
