//! Credential-automation decision engine.
//!
//! A pure function of the resolved host, the per-host override store, and
//! the secret store's existence probe. Computed fresh for every connection
//! attempt; nothing is cached or shared between attempts.

use tracing::debug;

use crate::host::{EffectiveHost, LoginMode};
use crate::secret::{CredentialRef, SecretStore};
use crate::store::AuthMode;

/// Per-host override lookup. Lookup trouble is modeled as absence so the
/// engine can only ever degrade toward standard interactive auth.
pub trait OverrideStore {
    fn auth_override(&self, host_key: &str) -> Option<AuthMode>;
}

/// The verdict for one connection attempt. `host_key` and `user` are the
/// exact values any later secret retrieval must use; they are not altered
/// after the decision is made.
#[derive(Debug, Clone)]
pub struct AuthDecision {
    pub use_automation: bool,
    pub reason: String,
    pub host_key: String,
    pub user: String,
}

impl AuthDecision {
    fn new(host: &EffectiveHost, use_automation: bool, reason: impl Into<String>) -> Self {
        Self {
            use_automation,
            reason: reason.into(),
            host_key: host.host_key().to_string(),
            user: host.user.clone(),
        }
    }
}

/// Decide whether to automate credential entry for this attempt.
///
/// Precedence: a per-host override is terminal for the policy question;
/// otherwise the catalog login mode answers it. Any affirmative answer is
/// then gated on a non-revealing existence probe, so automation is never
/// enabled without a credential actually present (fail-closed).
pub fn decide(
    host: &EffectiveHost,
    overrides: &dyn OverrideStore,
    secrets: &dyn SecretStore,
) -> AuthDecision {
    let (tentative, reason): (bool, &str) = match overrides.auth_override(host.host_key()) {
        Some(AuthMode::Manual) => {
            return AuthDecision::new(host, false, "per-host override: manual")
        }
        Some(AuthMode::Automate) => (true, "per-host override: automate"),
        None => match host.login_mode {
            LoginMode::Askpass => (true, "login mode askpass"),
            LoginMode::Manual => (false, "login mode manual"),
            LoginMode::Default => (false, "automation not requested"),
        },
    };

    if !tentative {
        return AuthDecision::new(host, false, reason);
    }

    let cred = CredentialRef::password(host.host_key(), &host.user);
    let available = secrets.probe(&cred).unwrap_or_else(|e| {
        debug!(host = %host.host_key(), error = %e, "existence probe failed");
        false
    });

    if available {
        AuthDecision::new(host, true, reason)
    } else {
        AuthDecision::new(
            host,
            false,
            format!("{reason}, but credential missing/unavailable"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::fake::FakeSecrets;
    use std::collections::HashMap;

    struct Overrides(HashMap<String, AuthMode>);

    impl Overrides {
        fn none() -> Self {
            Self(HashMap::new())
        }

        fn with(host_key: &str, mode: AuthMode) -> Self {
            let mut map = HashMap::new();
            map.insert(host_key.to_string(), mode);
            Self(map)
        }
    }

    impl OverrideStore for Overrides {
        fn auth_override(&self, host_key: &str) -> Option<AuthMode> {
            self.0.get(host_key).copied()
        }
    }

    fn host(login_mode: LoginMode) -> EffectiveHost {
        EffectiveHost {
            name: "db".into(),
            hostname: "db01.internal".into(),
            user: "deploy".into(),
            port: None,
            jump_host: None,
            login_mode,
            tags: vec![],
            group: None,
        }
    }

    fn secrets_present() -> FakeSecrets {
        FakeSecrets::with("deploy@db01.internal", b"hunter2")
    }

    #[test]
    fn manual_override_wins_over_everything() {
        let decision = decide(
            &host(LoginMode::Askpass),
            &Overrides::with("db01.internal", AuthMode::Manual),
            &secrets_present(),
        );
        assert!(!decision.use_automation);
        assert!(decision.reason.contains("manual"));
    }

    #[test]
    fn automate_override_wins_over_manual_login_mode() {
        let decision = decide(
            &host(LoginMode::Manual),
            &Overrides::with("db01.internal", AuthMode::Automate),
            &secrets_present(),
        );
        assert!(decision.use_automation);
        assert_eq!(decision.host_key, "db01.internal");
        assert_eq!(decision.user, "deploy");
    }

    #[test]
    fn askpass_with_credential_automates() {
        let decision = decide(
            &host(LoginMode::Askpass),
            &Overrides::none(),
            &secrets_present(),
        );
        assert!(decision.use_automation);
    }

    #[test]
    fn askpass_without_credential_fails_closed() {
        let decision = decide(
            &host(LoginMode::Askpass),
            &Overrides::none(),
            &FakeSecrets::default(),
        );
        assert!(!decision.use_automation);
        assert!(decision.reason.contains("credential missing/unavailable"));
    }

    #[test]
    fn probe_error_degrades_instead_of_aborting() {
        let decision = decide(
            &host(LoginMode::Askpass),
            &Overrides::none(),
            &FakeSecrets::failing(),
        );
        assert!(!decision.use_automation);
        assert!(decision.reason.contains("credential missing/unavailable"));
    }

    #[test]
    fn default_login_mode_does_not_probe() {
        // A failing store would error if probed; default mode short-circuits
        // before reaching it.
        let decision = decide(
            &host(LoginMode::Default),
            &Overrides::none(),
            &FakeSecrets::failing(),
        );
        assert!(!decision.use_automation);
        assert!(decision.reason.contains("not requested"));
    }

    #[test]
    fn override_lookup_uses_resolved_hostname_not_alias() {
        // Override keyed by the alias must not match.
        let decision = decide(
            &host(LoginMode::Askpass),
            &Overrides::with("db", AuthMode::Manual),
            &secrets_present(),
        );
        assert!(decision.use_automation);
    }
}
