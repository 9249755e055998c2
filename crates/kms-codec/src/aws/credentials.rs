//! [`CredentialHandle`]: which credential source the KMS client will use.

use aws_config::ConfigLoader;
use aws_sdk_kms::config::Credentials;

/// Provider name reported by statically configured credentials.
const STATIC_PROVIDER_NAME: &str = "kms-codec-static";

/// Which resolution strategy produced a [`CredentialHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStrategy {
    /// Explicit access key + secret key.
    Static,
    /// A named profile from the shared config/credentials files.
    Profile,
    /// The SDK default chain (environment, profiles, container, instance metadata).
    DefaultChain,
}

#[derive(Clone)]
enum Source {
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
    Profile(String),
    DefaultChain,
}

/// Resolved credential source, owned by the KMS transport for its lifetime.
///
/// Secrets held here are never printed; see the [`std::fmt::Debug`] impl.
#[derive(Clone)]
pub struct CredentialHandle {
    source: Source,
}

impl CredentialHandle {
    /// Pick a strategy from the optional settings.
    ///
    /// Precedence is fixed: both static keys present → static; otherwise a
    /// profile name → profile; otherwise the default chain. Blank strings
    /// count as absent and unused fields are ignored.
    pub fn resolve(
        access_key: Option<&str>,
        secret_key: Option<&str>,
        profile: Option<&str>,
    ) -> Self {
        let source = match (present(access_key), present(secret_key), present(profile)) {
            (Some(access), Some(secret), _) => Source::Static {
                access_key_id: access.to_owned(),
                secret_access_key: secret.to_owned(),
            },
            (_, _, Some(name)) => Source::Profile(name.to_owned()),
            _ => Source::DefaultChain,
        };
        Self { source }
    }

    pub fn strategy(&self) -> CredentialStrategy {
        match self.source {
            Source::Static { .. } => CredentialStrategy::Static,
            Source::Profile(_) => CredentialStrategy::Profile,
            Source::DefaultChain => CredentialStrategy::DefaultChain,
        }
    }

    /// The selected profile name, if the profile strategy was chosen.
    pub fn profile_name(&self) -> Option<&str> {
        match &self.source {
            Source::Profile(name) => Some(name),
            _ => None,
        }
    }

    /// Apply this credential source to an SDK config loader.
    pub(crate) fn configure(&self, loader: ConfigLoader) -> ConfigLoader {
        match &self.source {
            Source::Static {
                access_key_id,
                secret_access_key,
            } => loader.credentials_provider(Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                None,
                None,
                STATIC_PROVIDER_NAME,
            )),
            Source::Profile(name) => loader.profile_name(name),
            Source::DefaultChain => loader,
        }
    }
}

/// Trimmed `v`, or `None` if it is absent or blank.
fn present(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

impl std::fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even the access key ID.
        match &self.source {
            Source::Static { .. } => f.write_str("CredentialHandle::Static([REDACTED])"),
            Source::Profile(name) => write!(f, "CredentialHandle::Profile({name})"),
            Source::DefaultChain => f.write_str("CredentialHandle::DefaultChain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_keys_win_over_profile() {
        let handle = CredentialHandle::resolve(Some("AKIA1"), Some("secret"), Some("dev"));
        assert_eq!(handle.strategy(), CredentialStrategy::Static);
        assert_eq!(handle.profile_name(), None);
    }

    #[test]
    fn profile_when_static_keys_incomplete() {
        let handle = CredentialHandle::resolve(Some("AKIA1"), None, Some("dev"));
        assert_eq!(handle.strategy(), CredentialStrategy::Profile);
        assert_eq!(handle.profile_name(), Some("dev"));
    }

    #[test]
    fn default_chain_when_nothing_configured() {
        let handle = CredentialHandle::resolve(None, None, None);
        assert_eq!(handle.strategy(), CredentialStrategy::DefaultChain);
    }

    #[test]
    fn blank_values_count_as_absent() {
        let handle = CredentialHandle::resolve(Some(" "), Some("secret"), Some(""));
        assert_eq!(handle.strategy(), CredentialStrategy::DefaultChain);
    }

    #[test]
    fn lone_secret_key_is_ignored() {
        let handle = CredentialHandle::resolve(None, Some("secret"), None);
        assert_eq!(handle.strategy(), CredentialStrategy::DefaultChain);
    }

    #[test]
    fn present_trims_and_drops_blanks() {
        assert_eq!(present(Some("  dev ")), Some("dev"));
        assert_eq!(present(Some("\t")), None);
        assert_eq!(present(None), None);
    }

    #[test]
    fn static_keys_are_trimmed() {
        let handle = CredentialHandle::resolve(Some(" AKIA1 "), Some(" secret\n"), None);
        assert_eq!(handle.strategy(), CredentialStrategy::Static);
    }

    #[test]
    fn debug_redacts_static_secrets() {
        let handle = CredentialHandle::resolve(Some("AKIA1"), Some("topsecret"), None);
        let out = format!("{handle:?}");
        assert!(out.contains("REDACTED"));
        assert!(!out.contains("topsecret"));
        assert!(!out.contains("AKIA1"));
    }
}
