use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CookieConfiguration {
    pub cookie_name: Option<SmolStr>,
    /// Secret the cookie protection key is derived from
    ///
    /// Without one, a random key is generated and issued cookies become invalid on restart.
    pub secret_key: Option<SmolStr>,
    #[serde(default)]
    pub allowed_origins: Vec<SmolStr>,
    pub token_length: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DelegatedConfiguration {
    #[serde(default = "default_true")]
    pub referer_required: bool,
    /// Name of the cookie holding the session identifier the token is derived from
    pub session_cookie: SmolStr,
    pub secret_key: SmolStr,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum Mode {
    Cookie(CookieConfiguration),
    Delegated(DelegatedConfiguration),
}

/// Settings of the anti-forgery gate
///
/// Everything except the mode is optional and falls back to the library defaults.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    pub token_endpoint: Option<SmolStr>,
    pub failure_status: Option<u16>,
    pub header_name: Option<SmolStr>,
    pub form_field_name: Option<SmolStr>,
    pub form_content_types: Option<Vec<SmolStr>>,
    pub form_body_limit: Option<usize>,
    pub safe_methods: Option<Vec<SmolStr>>,
    #[serde(default)]
    pub safe_paths: Vec<SmolStr>,
    #[serde(default)]
    pub safe_authentication_schemes: Vec<SmolStr>,
    pub mode: Mode,
}

fn default_true() -> bool {
    true
}
