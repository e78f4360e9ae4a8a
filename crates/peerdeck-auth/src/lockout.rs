//! Per-IP brute-force lockout with a global backstop.
//!
//! Delay for failed attempt `n ∈ 1..=9` is `ceil(n · 1.5^(n−1) · 0.5)`
//! seconds (1, 2, 4, 7, 13, 23, 40, 69, 116). From the tenth failure the IP
//! is blocked for fifteen minutes. Records idle for fifteen minutes are
//! swept on every check, and a global failure budget across all IPs trips a
//! temporary endpoint-wide lockout.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::error::AuthError;

const BLOCK_AFTER_ATTEMPTS: u32 = 10;
const BLOCK_MINUTES: i64 = 15;
const SWEEP_MINUTES: i64 = 15;
const GLOBAL_FAILURE_BUDGET: u32 = 50;

#[derive(Debug, Clone)]
struct AttemptRecord {
    count: u32,
    #[allow(dead_code)]
    first_attempt: DateTime<Utc>,
    last_attempt: DateTime<Utc>,
    blocked_until: Option<DateTime<Utc>>,
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The caller should delay the response by this many seconds.
    Delay(u64),
    /// The IP is now blocked until the given instant.
    Blocked(DateTime<Utc>),
}

/// In-memory brute-force limiter shared by login surfaces.
#[derive(Default)]
pub struct LoginRateLimiter {
    records: Mutex<HashMap<IpAddr, AttemptRecord>>,
}

/// The published delay schedule in seconds for attempts 1..=9.
#[must_use]
pub fn delay_for_attempt(attempt: u32) -> u64 {
    let n = f64::from(attempt);
    (n * 1.5_f64.powi(attempt as i32 - 1) * 0.5).ceil() as u64
}

impl LoginRateLimiter {
    /// Fresh limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject early when the IP or the endpoint is locked out. Also sweeps
    /// stale records.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RateLimited`] while a lockout is in force.
    pub fn pre_check(&self, ip: IpAddr) -> Result<(), AuthError> {
        self.pre_check_at(ip, Utc::now())
    }

    fn pre_check_at(&self, ip: IpAddr, now: DateTime<Utc>) -> Result<(), AuthError> {
        let mut records = self.records.lock().expect("lockout mutex poisoned");
        let sweep_cutoff = now - Duration::minutes(SWEEP_MINUTES);
        records.retain(|_, record| record.last_attempt > sweep_cutoff);

        if let Some(record) = records.get(&ip) {
            if let Some(blocked_until) = record.blocked_until {
                if blocked_until > now {
                    return Err(AuthError::RateLimited {
                        retry_after: blocked_until,
                    });
                }
            }
        }

        let global: u32 = records.values().map(|record| record.count).sum();
        if global >= GLOBAL_FAILURE_BUDGET {
            let retry_after = records
                .values()
                .map(|record| record.last_attempt)
                .max()
                .unwrap_or(now)
                + Duration::minutes(BLOCK_MINUTES);
            return Err(AuthError::RateLimited { retry_after });
        }

        Ok(())
    }

    /// Record a failed attempt, returning the delay or the new block.
    pub fn record_failure(&self, ip: IpAddr) -> FailureOutcome {
        self.record_failure_at(ip, Utc::now())
    }

    fn record_failure_at(&self, ip: IpAddr, now: DateTime<Utc>) -> FailureOutcome {
        let mut records = self.records.lock().expect("lockout mutex poisoned");
        let record = records.entry(ip).or_insert_with(|| AttemptRecord {
            count: 0,
            first_attempt: now,
            last_attempt: now,
            blocked_until: None,
        });
        record.count += 1;
        record.last_attempt = now;

        if record.count >= BLOCK_AFTER_ATTEMPTS {
            let blocked_until = now + Duration::minutes(BLOCK_MINUTES);
            record.blocked_until = Some(blocked_until);
            FailureOutcome::Blocked(blocked_until)
        } else {
            FailureOutcome::Delay(delay_for_attempt(record.count))
        }
    }

    /// Clear the record for an IP after a successful login.
    pub fn record_success(&self, ip: IpAddr) {
        self.records
            .lock()
            .expect("lockout mutex poisoned")
            .remove(&ip);
    }

    /// Age of the oldest tracked record, for diagnostics.
    #[must_use]
    pub fn tracked_ips(&self) -> usize {
        self.records.lock().expect("lockout mutex poisoned").len()
    }
}
