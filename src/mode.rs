use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Serving topology selected for one process invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// Single TLS listener on the configured port, self-signed certificates.
    Test,
    /// Single plain HTTP listener on the configured port.
    PlainHttp,
    /// Plain HTTP origin behind a tunnel that terminates TLS upstream.
    TunnelOrigin,
    /// HTTPS on :443 plus an HTTP -> HTTPS redirect on :80.
    Production,
    /// No listener; prints the stored leads and analytics.
    View,
}

pub const VALID_MODES: &str =
    "serve-test, serve-http, serve-cfd, serve-prod, view (aliases: test/http/cfd/prod/tui)";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid mode {input:?}. Valid modes: {}", VALID_MODES)]
pub struct ModeError {
    pub input: String,
}

impl RunMode {
    /// Resolves free-form mode text through the alias table.
    ///
    /// Input is trimmed and lower-cased first. Unknown input yields `None`;
    /// callers must not substitute a default.
    pub fn resolve(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "serve-test" | "test" | "serve" => Some(Self::Test),
            "serve-http" | "http" => Some(Self::PlainHttp),
            "serve-cfd" | "cfd" | "cloudflared" => Some(Self::TunnelOrigin),
            "serve-prod" | "prod" => Some(Self::Production),
            "view" | "tui" => Some(Self::View),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Test => "serve-test",
            Self::PlainHttp => "serve-http",
            Self::TunnelOrigin => "serve-cfd",
            Self::Production => "serve-prod",
            Self::View => "view",
        }
    }

    /// Modes that terminate TLS in this process.
    pub fn requires_tls(self) -> bool {
        matches!(self, Self::Test | Self::Production)
    }
}

impl FromStr for RunMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s).ok_or_else(|| ModeError {
            input: s.to_string(),
        })
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_every_alias() {
        let cases = [
            ("serve-test", RunMode::Test),
            ("test", RunMode::Test),
            ("serve", RunMode::Test),
            ("serve-http", RunMode::PlainHttp),
            ("http", RunMode::PlainHttp),
            ("serve-cfd", RunMode::TunnelOrigin),
            ("cfd", RunMode::TunnelOrigin),
            ("cloudflared", RunMode::TunnelOrigin),
            ("serve-prod", RunMode::Production),
            ("prod", RunMode::Production),
            ("view", RunMode::View),
            ("tui", RunMode::View),
        ];

        for (raw, expected) in cases {
            assert_eq!(RunMode::resolve(raw), Some(expected), "alias {raw}");
            let shouted = format!("  {}\t", raw.to_uppercase());
            assert_eq!(RunMode::resolve(&shouted), Some(expected), "alias {shouted:?}");
        }
    }

    #[test]
    fn rejects_unknown_modes() {
        for raw in ["", "   ", "production", "https", "serve-tls", "prod2", "vieww"] {
            assert_eq!(RunMode::resolve(raw), None, "input {raw:?}");
        }
    }

    #[test]
    fn parse_error_lists_valid_modes() {
        let err = "staging".parse::<RunMode>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("\"staging\""));
        assert!(message.contains("serve-prod"));
        assert!(message.contains("view"));
    }

    #[test]
    fn tls_is_required_only_for_test_and_production() {
        assert!(RunMode::Test.requires_tls());
        assert!(RunMode::Production.requires_tls());
        assert!(!RunMode::PlainHttp.requires_tls());
        assert!(!RunMode::TunnelOrigin.requires_tls());
        assert!(!RunMode::View.requires_tls());
    }

    #[test]
    fn canonical_names_round_trip() {
        for mode in [
            RunMode::Test,
            RunMode::PlainHttp,
            RunMode::TunnelOrigin,
            RunMode::Production,
            RunMode::View,
        ] {
            assert_eq!(mode.to_string().parse::<RunMode>(), Ok(mode));
        }
    }
}
