//! Scheduling predicate for profile captures.
//!
//! Nothing here triggers captures. A driver polls [`is_due`] (or
//! [`CaptureService::run_due_profiles`](crate::CaptureService::run_due_profiles))
//! and captures whatever is due.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut tick = tokio::time::interval(Duration::from_secs(30));
//! loop {
//!     tick.tick().await;
//!     service.run_due_profiles(Utc::now()).await?;
//! }
//! ```

use chrono::{DateTime, Duration, Utc};

use crate::Profile;

/// Whether `profile` should be captured at `now`.
///
/// Due means enabled, a non-zero refresh interval, and at least that many
/// seconds since the last run. A profile that never ran counts as last run
/// at the Unix epoch, so it is due immediately.
pub fn is_due(profile: &Profile, now: DateTime<Utc>) -> bool {
    if !profile.enabled || profile.refresh_interval == 0 {
        return false;
    }

    let last_run = profile.last_run.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let interval = i64::try_from(profile.refresh_interval)
        .ok()
        .and_then(Duration::try_seconds);

    match interval.and_then(|i| last_run.checked_add_signed(i)) {
        Some(next) => {
            let due = now >= next;
            tracing::debug!(
                "Profile {} next run {} -> due={}",
                profile.id,
                next.to_rfc3339(),
                due
            );
            due
        }
        // Interval so large the next run is beyond representable time
        None => false,
    }
}

/// Profiles from `profiles` that are due at `now`.
pub fn due_profiles(profiles: &[Profile], now: DateTime<Utc>) -> Vec<&Profile> {
    profiles.iter().filter(|p| is_due(p, now)).collect()
}
