use crate::types::{GateStatus, Role, SessionSnapshot, UserId};

/// Route paths the guard redirects between.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    /// Where unauthenticated requests land.
    pub login: String,
    /// The seeker onboarding area, matched by prefix.
    pub onboarding: String,
    pub seeker_dashboard: String,
    pub provider_dashboard: String,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            login: "/login".into(),
            onboarding: "/seeker/onboarding".into(),
            seeker_dashboard: "/seeker/dashboard".into(),
            provider_dashboard: "/provider/dashboard".into(),
        }
    }
}

impl RoutePolicy {
    #[must_use]
    pub fn with_login(mut self, path: impl Into<String>) -> Self {
        self.login = path.into();
        self
    }

    #[must_use]
    pub fn with_onboarding(mut self, path: impl Into<String>) -> Self {
        self.onboarding = path.into();
        self
    }

    #[must_use]
    pub fn with_seeker_dashboard(mut self, path: impl Into<String>) -> Self {
        self.seeker_dashboard = path.into();
        self
    }

    #[must_use]
    pub fn with_provider_dashboard(mut self, path: impl Into<String>) -> Self {
        self.provider_dashboard = path.into();
        self
    }

    fn dashboard_for(&self, role: Role) -> &str {
        match role {
            Role::Seeker => &self.seeker_dashboard,
            Role::Provider => &self.provider_dashboard,
        }
    }
}

/// Guard classification of the current session for a navigation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// The manager has not finished initializing; no decision is trusted.
    Loading,
    Unauthenticated,
    ProviderActive,
    /// Seeker who has not completed onboarding; pinned to the onboarding path.
    SeekerOnboarding,
    SeekerActive,
}

/// Outcome of one navigation decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Still initializing: render nothing, decide nothing.
    Pending,
    Allow,
    Redirect {
        target: String,
        /// The originally requested path, preserved for post-login return.
        return_to: Option<String>,
    },
}

impl Decision {
    fn redirect(target: &str) -> Self {
        Self::Redirect {
            target: target.to_owned(),
            return_to: None,
        }
    }
}

/// Pure navigation authorizer.
///
/// Evaluated fresh on every navigation attempt; it holds no mutable state
/// and never errors. Anything it cannot determine resolves toward login,
/// never toward a protected route.
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    policy: RoutePolicy,
}

impl RouteGuard {
    #[must_use]
    pub fn new(policy: RoutePolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    /// Classify the session for routing purposes.
    ///
    /// `is_completed` is only consulted for seekers: a provider session
    /// never triggers an onboarding check.
    pub fn classify<F>(&self, snapshot: &SessionSnapshot, is_completed: F) -> GuardState
    where
        F: FnOnce(&UserId) -> bool,
    {
        if snapshot.status == GateStatus::Loading {
            return GuardState::Loading;
        }
        let Some(session) = snapshot.session.as_ref() else {
            return GuardState::Unauthenticated;
        };
        match session.role {
            Role::Provider => GuardState::ProviderActive,
            Role::Seeker => {
                if is_completed(&session.user_id) {
                    GuardState::SeekerActive
                } else {
                    GuardState::SeekerOnboarding
                }
            }
        }
    }

    /// Authorize or redirect a navigation attempt to `path`.
    ///
    /// `required_role` is the role the requested route declares, if any.
    /// The result never chains: re-deciding on a redirect target (with that
    /// target's own required role) always yields `Allow`.
    pub fn decide<F>(
        &self,
        snapshot: &SessionSnapshot,
        path: &str,
        required_role: Option<Role>,
        is_completed: F,
    ) -> Decision
    where
        F: FnOnce(&UserId) -> bool,
    {
        let on_onboarding = path.starts_with(self.policy.onboarding.as_str());

        match self.classify(snapshot, is_completed) {
            GuardState::Loading => Decision::Pending,
            GuardState::Unauthenticated => {
                if path == self.policy.login {
                    Decision::Allow
                } else {
                    Decision::Redirect {
                        target: self.policy.login.clone(),
                        return_to: Some(path.to_owned()),
                    }
                }
            }
            GuardState::ProviderActive => {
                // Providers never see onboarding, whatever the route declares.
                if on_onboarding {
                    return Decision::redirect(&self.policy.provider_dashboard);
                }
                match required_role {
                    Some(Role::Provider) | None => Decision::Allow,
                    Some(Role::Seeker) => Decision::redirect(&self.policy.provider_dashboard),
                }
            }
            GuardState::SeekerOnboarding => {
                if on_onboarding {
                    Decision::Allow
                } else {
                    Decision::redirect(&self.policy.onboarding)
                }
            }
            GuardState::SeekerActive => {
                // Completed seekers cannot re-enter onboarding.
                if on_onboarding {
                    return Decision::redirect(&self.policy.seeker_dashboard);
                }
                match required_role {
                    Some(Role::Seeker) | None => Decision::Allow,
                    Some(Role::Provider) => Decision::redirect(&self.policy.seeker_dashboard),
                }
            }
        }
    }

    /// Where a freshly authenticated user should land: the preserved
    /// return path when it resolves to `Allow` for them, their dashboard
    /// otherwise.
    pub fn post_login_target<F>(
        &self,
        snapshot: &SessionSnapshot,
        return_to: Option<&str>,
        required_role: Option<Role>,
        is_completed: F,
    ) -> String
    where
        F: Fn(&UserId) -> bool,
    {
        let fallback = match snapshot.session.as_ref() {
            Some(session) if session.role == Role::Seeker && !is_completed(&session.user_id) => {
                self.policy.onboarding.clone()
            }
            Some(session) => self.policy.dashboard_for(session.role).to_owned(),
            None => self.policy.login.clone(),
        };
        match return_to {
            Some(path)
                if self.decide(snapshot, path, required_role, &is_completed)
                    == Decision::Allow =>
            {
                path.to_owned()
            }
            _ => fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Session;

    fn snapshot(session: Option<Session>) -> SessionSnapshot {
        SessionSnapshot {
            status: GateStatus::Ready,
            session,
        }
    }

    fn session(role: Role) -> Session {
        Session {
            user_id: UserId::from("u-1"),
            email: "a@b.com".into(),
            role,
            access_token: "at-1".into(),
            refresh_token: "rt-1".into(),
        }
    }

    fn guard() -> RouteGuard {
        RouteGuard::default()
    }

    #[test]
    fn loading_yields_pending() {
        let decision = guard().decide(
            &SessionSnapshot::loading(),
            "/seeker/dashboard",
            Some(Role::Seeker),
            |_| true,
        );
        assert_eq!(decision, Decision::Pending);
    }

    #[test]
    fn unauthenticated_redirects_to_login_with_return_path() {
        // Scenario D.
        let decision = guard().decide(
            &snapshot(None),
            "/provider/dashboard",
            Some(Role::Provider),
            |_| true,
        );
        assert_eq!(
            decision,
            Decision::Redirect {
                target: "/login".into(),
                return_to: Some("/provider/dashboard".into()),
            }
        );
    }

    #[test]
    fn unauthenticated_may_reach_login() {
        let decision = guard().decide(&snapshot(None), "/login", None, |_| true);
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn incomplete_seeker_is_pinned_to_onboarding() {
        // Scenario A.
        let snap = snapshot(Some(session(Role::Seeker)));
        let decision = guard().decide(&snap, "/seeker/dashboard", Some(Role::Seeker), |_| false);
        assert_eq!(decision, Decision::redirect("/seeker/onboarding"));

        let decision = guard().decide(&snap, "/seeker/onboarding", Some(Role::Seeker), |_| false);
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn completed_seeker_cannot_reenter_onboarding() {
        // Scenario B.
        let snap = snapshot(Some(session(Role::Seeker)));
        let decision = guard().decide(&snap, "/seeker/onboarding", Some(Role::Seeker), |_| true);
        assert_eq!(decision, Decision::redirect("/seeker/dashboard"));
    }

    #[test]
    fn onboarding_subpaths_match_by_prefix() {
        let snap = snapshot(Some(session(Role::Seeker)));
        let decision =
            guard().decide(&snap, "/seeker/onboarding/chapter/2", Some(Role::Seeker), |_| false);
        assert_eq!(decision, Decision::Allow);

        let decision =
            guard().decide(&snap, "/seeker/onboarding/chapter/2", Some(Role::Seeker), |_| true);
        assert_eq!(decision, Decision::redirect("/seeker/dashboard"));
    }

    #[test]
    fn provider_never_sees_onboarding() {
        // Scenario C, and both onboarding answers for good measure.
        let snap = snapshot(Some(session(Role::Provider)));
        for completed in [true, false] {
            let decision =
                guard().decide(&snap, "/seeker/onboarding", Some(Role::Seeker), |_| completed);
            assert_eq!(decision, Decision::redirect("/provider/dashboard"));
        }
    }

    #[test]
    fn provider_session_never_triggers_onboarding_lookup() {
        let snap = snapshot(Some(session(Role::Provider)));
        let decision = guard().decide(&snap, "/provider/dashboard", Some(Role::Provider), |_| {
            panic!("onboarding consulted for a provider")
        });
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn role_mismatch_redirects_to_own_dashboard() {
        let snap = snapshot(Some(session(Role::Provider)));
        let decision = guard().decide(&snap, "/seeker/missions", Some(Role::Seeker), |_| true);
        assert_eq!(decision, Decision::redirect("/provider/dashboard"));

        let snap = snapshot(Some(session(Role::Seeker)));
        let decision = guard().decide(&snap, "/provider/listings", Some(Role::Provider), |_| true);
        assert_eq!(decision, Decision::redirect("/seeker/dashboard"));
    }

    #[test]
    fn roleless_paths_pass_for_any_ready_session() {
        for role in [Role::Seeker, Role::Provider] {
            let snap = snapshot(Some(session(role)));
            let decision = guard().decide(&snap, "/help", None, |_| true);
            assert_eq!(decision, Decision::Allow);
        }
    }

    /// Re-applying `decide` to any redirect target must resolve to `Allow`.
    #[test]
    fn redirects_never_chain() {
        let routes: &[(&str, Option<Role>)] = &[
            ("/login", None),
            ("/help", None),
            ("/seeker/onboarding", Some(Role::Seeker)),
            ("/seeker/onboarding/chapter/1", Some(Role::Seeker)),
            ("/seeker/dashboard", Some(Role::Seeker)),
            ("/seeker/missions", Some(Role::Seeker)),
            ("/provider/dashboard", Some(Role::Provider)),
            ("/provider/listings", Some(Role::Provider)),
        ];
        let required_role_of = |target: &str| {
            routes
                .iter()
                .find(|(path, _)| *path == target)
                .and_then(|(_, role)| *role)
        };

        let snapshots = [
            snapshot(None),
            snapshot(Some(session(Role::Provider))),
            snapshot(Some(session(Role::Seeker))),
        ];

        let g = guard();
        for snap in &snapshots {
            for completed in [true, false] {
                for (path, required) in routes {
                    let first = g.decide(snap, path, *required, |_| completed);
                    if let Decision::Redirect { target, .. } = first {
                        let second =
                            g.decide(snap, &target, required_role_of(&target), |_| completed);
                        assert_eq!(
                            second,
                            Decision::Allow,
                            "loop from {path} via {target} (completed={completed})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn post_login_honors_return_path_when_allowed() {
        let snap = snapshot(Some(session(Role::Seeker)));
        let g = guard();

        let target =
            g.post_login_target(&snap, Some("/seeker/missions"), Some(Role::Seeker), |_| true);
        assert_eq!(target, "/seeker/missions");

        // An incomplete seeker's return path loses to the onboarding pin.
        let target =
            g.post_login_target(&snap, Some("/seeker/missions"), Some(Role::Seeker), |_| false);
        assert_eq!(target, "/seeker/onboarding");
    }

    #[test]
    fn post_login_falls_back_to_dashboard() {
        let snap = snapshot(Some(session(Role::Provider)));
        let target = guard().post_login_target(&snap, None, None, |_| true);
        assert_eq!(target, "/provider/dashboard");
    }

    #[test]
    fn custom_policy_paths_are_respected() {
        let g = RouteGuard::new(
            RoutePolicy::default()
                .with_login("/signin")
                .with_onboarding("/welcome"),
        );
        let decision = g.decide(&snapshot(None), "/anything", None, |_| false);
        assert_eq!(
            decision,
            Decision::Redirect {
                target: "/signin".into(),
                return_to: Some("/anything".into()),
            }
        );

        let snap = snapshot(Some(session(Role::Seeker)));
        let decision = g.decide(&snap, "/seeker/dashboard", Some(Role::Seeker), |_| false);
        assert_eq!(decision, Decision::redirect("/welcome"));
    }
}
