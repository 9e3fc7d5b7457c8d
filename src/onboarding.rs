use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::store::SessionStore;
use crate::types::{OnboardingRecord, UserId};

/// Per-user onboarding completion and saved profile.
///
/// Resolution order for [`is_completed`](Onboarding::is_completed): the
/// per-user record wins outright; the legacy global record is consulted only
/// when no per-user record exists. An explicit per-user `false` is final and
/// is never overridden by a stale global `true` left behind by a previous
/// user of the same device.
///
/// Completion answers are cached in-process, so repeated calls stay
/// consistent until [`complete`](Onboarding::complete) or
/// [`reset`](Onboarding::reset) changes the answer.
pub struct Onboarding<S> {
    store: Arc<S>,
    completed: Mutex<HashMap<UserId, bool>>,
}

impl<S: SessionStore> Onboarding<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            completed: Mutex::new(HashMap::new()),
        }
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, bool>> {
        self.completed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether `user_id` has completed onboarding.
    ///
    /// Store failures resolve to `false` after logging: an unknown state
    /// must never unlock the dashboard.
    pub fn is_completed(&self, user_id: &UserId) -> bool {
        if let Some(&answer) = self.cache().get(user_id) {
            return answer;
        }

        let answer = self.resolve(user_id);
        self.cache().insert(user_id.clone(), answer);
        answer
    }

    fn resolve(&self, user_id: &UserId) -> bool {
        match self.store.load_onboarding(Some(user_id)) {
            Ok(Some(record)) => record.completed,
            Ok(None) => match self.store.load_onboarding(None) {
                Ok(record) => record.is_some_and(|r| r.completed),
                Err(e) => {
                    tracing::warn!(error = %e, "legacy onboarding record unreadable");
                    false
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "onboarding record unreadable");
                false
            }
        }
    }

    /// Mark onboarding completed for `user_id`, optionally storing the
    /// profile assembled by the flow. Idempotent.
    ///
    /// Also writes the legacy global record so older clients sharing the
    /// store keep seeing the completion.
    pub fn complete(
        &self,
        user_id: &UserId,
        profile: Option<serde_json::Value>,
    ) -> Result<(), Error> {
        // Completing without a profile keeps whatever was saved earlier.
        let profile = match profile {
            Some(profile) => Some(profile),
            None => self
                .store
                .load_onboarding(Some(user_id))?
                .and_then(|r| r.profile),
        };
        let record = OnboardingRecord::completed_now(profile);
        self.store.save_onboarding(Some(user_id), &record)?;
        self.store.save_onboarding(None, &record)?;
        self.cache().insert(user_id.clone(), true);
        tracing::info!(user_id = %user_id, "onboarding completed");
        Ok(())
    }

    /// Clear `user_id`'s record and the legacy global record.
    ///
    /// This is the explicit path for un-completing a user (testing, support
    /// resets); plain logout only drops the cache via [`forget`](Self::forget).
    pub fn reset(&self, user_id: &UserId) -> Result<(), Error> {
        self.store.clear_onboarding(Some(user_id))?;
        self.store.clear_onboarding(None)?;
        self.cache().remove(user_id);
        Ok(())
    }

    /// Drop the session-scoped cache entry for `user_id` without touching
    /// the durable record. Called on logout.
    pub fn forget(&self, user_id: &UserId) {
        self.cache().remove(user_id);
    }

    /// The user's saved profile, falling back to the legacy global copy.
    pub fn profile(&self, user_id: &UserId) -> Option<serde_json::Value> {
        let per_user = self
            .store
            .load_onboarding(Some(user_id))
            .ok()
            .flatten()
            .and_then(|r| r.profile);
        if per_user.is_some() {
            return per_user;
        }
        self.store
            .load_onboarding(None)
            .ok()
            .flatten()
            .and_then(|r| r.profile)
    }

    /// Write the user's profile without changing completion state, plus the
    /// legacy global copy for older clients.
    pub fn save_profile(
        &self,
        user_id: &UserId,
        profile: serde_json::Value,
    ) -> Result<(), Error> {
        let mut record = self
            .store
            .load_onboarding(Some(user_id))?
            .unwrap_or_default();
        record.profile = Some(profile.clone());
        self.store.save_onboarding(Some(user_id), &record)?;

        let mut legacy = self.store.load_onboarding(None)?.unwrap_or_default();
        legacy.profile = Some(profile);
        self.store.save_onboarding(None, &legacy)?;
        Ok(())
    }
}
