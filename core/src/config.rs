//! §3 channel attributes and the builder that validates them eagerly, the
//! way `hardy-bpa::config::Config` is populated and checked before a `Bpa`
//! is constructed — here at `Channel::open` rather than a separate
//! settings-file/env layer, since only ten scalar options exist.

use crate::Error;
use dtnchan_bundle::CipherSuite;
use std::time::Duration;

/// The ten named channel options of spec.md §3, plus their effects.
#[derive(Debug, Clone, Copy)]
pub struct Attrs {
    pub lifetime: Duration,
    pub request_custody: bool,
    pub admin_record: bool,
    pub integrity_check: bool,
    pub cipher_suite: CipherSuite,
    pub allow_fragmentation: bool,
    pub timeout: Duration,
    pub max_length: Option<usize>,
    pub cid_reuse: bool,
    pub dacs_rate: Duration,
}

/// Builds and validates an [`Attrs`]. Every field has the same default a
/// freshly-opened channel would want; callers override only what matters.
#[derive(Debug, Clone, Copy)]
pub struct AttrsBuilder {
    lifetime: Duration,
    request_custody: bool,
    admin_record: bool,
    integrity_check: bool,
    cipher_suite: CipherSuite,
    allow_fragmentation: bool,
    timeout: Duration,
    max_length: Option<usize>,
    cid_reuse: bool,
    dacs_rate: Duration,
}

impl Default for AttrsBuilder {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(3600),
            request_custody: false,
            admin_record: false,
            integrity_check: false,
            cipher_suite: CipherSuite::Crc16,
            allow_fragmentation: false,
            timeout: Duration::from_secs(30),
            max_length: None,
            cid_reuse: false,
            dacs_rate: Duration::from_secs(60),
        }
    }
}

impl AttrsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lifetime(mut self, v: Duration) -> Self {
        self.lifetime = v;
        self
    }

    pub fn request_custody(mut self, v: bool) -> Self {
        self.request_custody = v;
        self
    }

    pub fn admin_record(mut self, v: bool) -> Self {
        self.admin_record = v;
        self
    }

    pub fn integrity_check(mut self, v: bool) -> Self {
        self.integrity_check = v;
        self
    }

    pub fn cipher_suite(mut self, v: CipherSuite) -> Self {
        self.cipher_suite = v;
        self
    }

    pub fn allow_fragmentation(mut self, v: bool) -> Self {
        self.allow_fragmentation = v;
        self
    }

    pub fn timeout(mut self, v: Duration) -> Self {
        self.timeout = v;
        self
    }

    pub fn max_length(mut self, v: Option<usize>) -> Self {
        self.max_length = v;
        self
    }

    pub fn cid_reuse(mut self, v: bool) -> Self {
        self.cid_reuse = v;
        self
    }

    pub fn dacs_rate(mut self, v: Duration) -> Self {
        self.dacs_rate = v;
        self
    }

    pub fn build(self) -> Result<Attrs, Error> {
        if self.lifetime.is_zero() {
            return Err(Error::ParmErr);
        }
        if self.timeout.is_zero() {
            return Err(Error::ParmErr);
        }
        if self.max_length == Some(0) {
            return Err(Error::ParmErr);
        }
        Ok(Attrs {
            lifetime: self.lifetime,
            request_custody: self.request_custody,
            admin_record: self.admin_record,
            integrity_check: self.integrity_check,
            cipher_suite: self.cipher_suite,
            allow_fragmentation: self.allow_fragmentation,
            timeout: self.timeout,
            max_length: self.max_length,
            cid_reuse: self.cid_reuse,
            dacs_rate: self.dacs_rate,
        })
    }
}
