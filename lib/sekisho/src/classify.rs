use crate::{options::Options, request::RequestContext};
use strum::AsRefStr;

/// Rule that exempted a request from verification
#[derive(AsRefStr, Clone, Copy, Debug, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum Bypass {
    SafeMethod,
    SafePath,
    SafeAuthenticationScheme,
}

/// Check the exemption rules in order and return the first one that matches
///
/// Methods are compared case-sensitively, paths have to match exactly.
#[must_use]
pub fn classify(options: &Options, ctx: &RequestContext<'_>) -> Option<Bypass> {
    if options.safe_methods.contains(ctx.method()) {
        return Some(Bypass::SafeMethod);
    }

    if options.safe_paths.contains(ctx.path()) {
        return Some(Bypass::SafePath);
    }

    if ctx
        .authentication_schemes()
        .any(|scheme| options.safe_authentication_schemes.contains(scheme))
    {
        return Some(Bypass::SafeAuthenticationScheme);
    }

    None
}
