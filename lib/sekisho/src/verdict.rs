use cookie::Cookie;
use std::fmt;
use strum::AsRefStr;
use thiserror::Error;
use zeroize::Zeroizing;

/// Taxonomy of reasons a request gets turned away
#[derive(AsRefStr, Clone, Copy, Debug, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum DenyReason {
    MissingOriginSignal,
    UntrustedOrigin,
    TokenAbsent,
    ExpectedTokenUnavailable,
    TokenFactoryFailed,
    TokenMismatch,
}

/// A denial together with the message written into the response body
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Denial {
    #[error("Origin and Referer request headers are both absent/empty")]
    MissingOriginSignal,

    #[error("Referer missing in secure request")]
    MissingSecureReferer,

    #[error("Invalid Origin or Referer request header value")]
    UntrustedOrigin,

    #[error("Could not extract expected anti-forgery token")]
    ExpectedTokenUnavailable,

    #[error("{provider} did not return a token")]
    TokenFactoryFailed { provider: &'static str },

    #[error("No anti-forgery token found in {header} header")]
    HeaderTokenAbsent { header: String },

    #[error("No anti-forgery token found in form field {field}")]
    FormTokenAbsent { field: String },

    #[error("Invalid anti-forgery token")]
    TokenMismatch,
}

impl Denial {
    #[must_use]
    pub fn kind(&self) -> DenyReason {
        match self {
            Self::MissingOriginSignal | Self::MissingSecureReferer => {
                DenyReason::MissingOriginSignal
            }
            Self::UntrustedOrigin => DenyReason::UntrustedOrigin,
            Self::ExpectedTokenUnavailable => DenyReason::ExpectedTokenUnavailable,
            Self::TokenFactoryFailed { .. } => DenyReason::TokenFactoryFailed,
            Self::HeaderTokenAbsent { .. } | Self::FormTokenAbsent { .. } => {
                DenyReason::TokenAbsent
            }
            Self::TokenMismatch => DenyReason::TokenMismatch,
        }
    }
}

/// A freshly issued (or re-issued) token
pub struct Issued {
    pub token: Zeroizing<String>,

    /// Cookie to append to the response, if the provider stores the token client-side
    pub cookie: Option<Cookie<'static>>,
}

impl fmt::Debug for Issued {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Issued")
            .field("token", &"[redacted]")
            .field("cookie", &self.cookie.as_ref().map(Cookie::name))
            .finish()
    }
}

/// Per-request decision of the gate
#[derive(Debug)]
pub enum Verdict {
    /// Hand the request to the next service
    Allow,

    /// Answer with the token instead of calling the next service
    IssueToken(Issued),

    /// Answer with the failure status and the denial message
    Deny(Denial),
}

impl Verdict {
    #[inline]
    #[must_use]
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Deny(denial) => Some(denial),
            _ => None,
        }
    }
}

impl From<Denial> for Verdict {
    #[inline]
    fn from(value: Denial) -> Self {
        Self::Deny(value)
    }
}
