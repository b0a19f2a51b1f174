use crate::error::{BrokerError, Result};

/// Client registration for one OAuth provider.
///
/// Built once at startup and handed to the provider's adapter. Every field is
/// required; blank values are rejected at construction so a misconfigured
/// deployment fails before serving traffic.
#[derive(Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Space separated scope string, sent verbatim
    pub scopes: String,
}

impl ProviderConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: scopes.into(),
        };

        for (field, value) in [
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
            ("redirect_uri", &config.redirect_uri),
            ("scopes", &config.scopes),
        ] {
            if value.trim().is_empty() {
                return Err(BrokerError::Config(format!("{} must not be blank", field)));
            }
        }

        Ok(config)
    }

    /// Read `{NAME}_CLIENT_ID`, `{NAME}_CLIENT_SECRET`, `{NAME}_REDIRECT_URI`
    /// and `{NAME}_SCOPES` from the environment.
    pub fn from_env(provider: &str) -> Result<Self> {
        Self::from_lookup(provider, |key| std::env::var(key).ok())
    }

    fn from_lookup<F>(provider: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = provider.to_uppercase();
        let read = |suffix: &str| {
            let key = format!("{}_{}", prefix, suffix);
            lookup(&key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| BrokerError::Config(format!("{} must be set", key)))
        };

        Self::new(
            read("CLIENT_ID")?,
            read("CLIENT_SECRET")?,
            read("REDIRECT_URI")?,
            read("SCOPES")?,
        )
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_lookup_complete() {
        let vars = env(&[
            ("HUBSPOT_CLIENT_ID", "client"),
            ("HUBSPOT_CLIENT_SECRET", "secret"),
            ("HUBSPOT_REDIRECT_URI", "http://localhost:8000/integrations/hubspot/oauth2callback"),
            ("HUBSPOT_SCOPES", "oauth crm.objects.companies.read"),
        ]);

        let config = ProviderConfig::from_lookup("hubspot", |k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.client_id, "client");
        assert_eq!(config.scopes, "oauth crm.objects.companies.read");
    }

    #[test]
    fn test_missing_variable_is_fatal() {
        let vars = env(&[
            ("NOTION_CLIENT_ID", "client"),
            ("NOTION_REDIRECT_URI", "http://localhost/cb"),
            ("NOTION_SCOPES", "read"),
        ]);

        let err = ProviderConfig::from_lookup("notion", |k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("NOTION_CLIENT_SECRET must be set"));
    }

    #[test]
    fn test_blank_field_rejected() {
        let result = ProviderConfig::new("id", "  ", "http://localhost/cb", "read");
        assert!(matches!(result, Err(BrokerError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ProviderConfig::new("id", "super-secret", "http://localhost/cb", "read").unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
