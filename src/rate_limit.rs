use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::error::{Error, Result};

const READ_LIMIT: u32 = 10;
const READ_WINDOW: Duration = Duration::from_secs(20);
const WRITE_LIMIT: u32 = 5;
const WRITE_WINDOW: Duration = Duration::from_secs(60);

/// Request classes with independent quotas. Classification from the HTTP
/// method happens at the middleware; this module never sees a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClass {
    Read,
    Create,
    Mutate,
}

/// Per-client request throttle: one keyed limiter per method class, each
/// equivalent to a sliding window of `limit` requests per `window`, keyed by
/// client IP. Holds no note data.
pub struct RequestQuotas {
    read: DefaultKeyedRateLimiter<IpAddr>,
    create: DefaultKeyedRateLimiter<IpAddr>,
    mutate: DefaultKeyedRateLimiter<IpAddr>,
}

impl Default for RequestQuotas {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestQuotas {
    #[must_use]
    pub fn new() -> Self {
        Self {
            read: keyed(READ_LIMIT, READ_WINDOW),
            create: keyed(WRITE_LIMIT, WRITE_WINDOW),
            mutate: keyed(WRITE_LIMIT, WRITE_WINDOW),
        }
    }

    /// `Err(RateLimited)` when the client is over quota for the class.
    pub fn check(&self, class: MethodClass, client: IpAddr) -> Result<()> {
        let limiter = match class {
            MethodClass::Read => &self.read,
            MethodClass::Create => &self.create,
            MethodClass::Mutate => &self.mutate,
        };
        limiter.check_key(&client).map_err(|_| Error::RateLimited)
    }
}

fn keyed(limit: u32, window: Duration) -> DefaultKeyedRateLimiter<IpAddr> {
    let burst = NonZeroU32::new(limit).expect("quota limit must be non-zero");
    let quota = Quota::with_period(window / limit)
        .expect("quota period must be non-zero")
        .allow_burst(burst);
    RateLimiter::keyed(quota)
}
