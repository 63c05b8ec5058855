//! Runtime environment detection.
//!
//! Single source of truth for whether the gateway is running in development
//! or production, based on the `GATEWAY_ENV` environment variable. Gates two
//! behaviors: the compiled-in development signing key and the `/token` dev
//! endpoint.

/// Runtime environment for the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment — unlocks the dev signing key and `/token`.
    Development,
}

impl Environment {
    /// Detect current environment from `GATEWAY_ENV`.
    #[must_use]
    pub fn current() -> Self {
        Self::from_var(std::env::var("GATEWAY_ENV").ok().as_deref())
    }

    /// Parse the environment from an already-read `GATEWAY_ENV` value.
    ///
    /// Split out from `current()` so the parsing logic is testable without
    /// mutating process-global environment state.
    #[must_use]
    fn from_var(value: Option<&str>) -> Self {
        match value {
            Some("development") | Some("dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` if this is the development environment.
    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
        }
    }
}

/// Convenience function equivalent to `Environment::current().is_development()`.
#[must_use]
pub fn is_development() -> bool {
    Environment::current().is_development()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(Environment::Development.to_string(), "development");
    }

    #[test]
    fn test_defaults_to_production() {
        assert_eq!(Environment::from_var(None), Environment::Production);
        assert_eq!(Environment::from_var(Some("")), Environment::Production);
        assert_eq!(Environment::from_var(Some("prod")), Environment::Production);
    }

    #[test]
    fn test_dev_aliases() {
        assert!(Environment::from_var(Some("dev")).is_development());
        assert!(Environment::from_var(Some("development")).is_development());
    }
}
