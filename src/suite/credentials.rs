//! Automation credentials resolved from the environment

use super::config::CredentialsConfig;

/// Username/password handed to the application and scenario scripts
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Read the variables named in the suite's `[credentials]` section
    ///
    /// Missing variables are logged and left unset; scenarios that need them
    /// fail on their own.
    pub fn from_env(config: &CredentialsConfig) -> Self {
        Self::resolve(config, |name| std::env::var(name).ok())
    }

    fn resolve(config: &CredentialsConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |var: &Option<String>| {
            let name = var.as_deref()?;
            let value = lookup(name);
            if value.is_none() {
                tracing::warn!("Credential variable {} is not set", name);
            }
            value
        };
        Self {
            username: read(&config.username_env),
            password: read(&config.password_env),
        }
    }

    /// Environment variables exported to launched processes
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = Vec::new();
        if let Some(user) = &self.username {
            vars.push(("DMF_USERNAME", user.clone()));
        }
        if let Some(pass) = &self.password {
            vars.push(("DMF_PASSWORD", pass.clone()));
        }
        vars
    }
}
