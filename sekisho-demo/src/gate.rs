use axum::http::{header, request::Parts};
use color_eyre::eyre;
use cookie::Cookie;
use sekisho::{
    AllowedOrigins, Builder, CookieProvider, DelegateProvider, KeyedHashProtector, RandomToken,
    Sekisho, SekishoLayer,
};
use sekisho_config::gate::{Configuration, CookieConfiguration, DelegatedConfiguration, Mode};
use smol_str::SmolStr;

const COOKIE_KEY_CONTEXT: &str = "sekisho-demo 2024-11-02 cookie protection";
const SESSION_KEY_CONTEXT: &str = "sekisho-demo 2024-11-02 session token";

pub enum GateLayer {
    Cookie(SekishoLayer<CookieProvider>),
    Delegated(SekishoLayer<DelegateProvider>),
}

fn apply_common<V>(mut builder: Builder<V>, config: &Configuration) -> Builder<V> {
    if let Some(ref endpoint) = config.token_endpoint {
        builder = builder.token_endpoint(endpoint.as_str());
    }
    if let Some(status) = config.failure_status {
        builder = builder.failure_status(status);
    }
    if let Some(ref name) = config.header_name {
        builder = builder.header_name(name);
    }
    if let Some(ref name) = config.form_field_name {
        builder = builder.form_field_name(name.as_str());
    }
    if let Some(ref content_types) = config.form_content_types {
        builder = builder.form_content_types(content_types);
    }
    if let Some(limit) = config.form_body_limit {
        builder = builder.form_body_limit(limit);
    }
    if let Some(ref methods) = config.safe_methods {
        builder = builder.safe_methods(methods);
    }

    builder
        .safe_paths(config.safe_paths.iter().map(SmolStr::as_str))
        .safe_authentication_schemes(config.safe_authentication_schemes.iter().map(SmolStr::as_str))
}

fn cookie(config: &Configuration, mode: &CookieConfiguration) -> eyre::Result<GateLayer> {
    let protector = if let Some(ref secret_key) = mode.secret_key {
        KeyedHashProtector::derive(COOKIE_KEY_CONTEXT, secret_key.as_bytes())
    } else {
        warn!("no secret key configured, issued tokens won't survive a restart");
        KeyedHashProtector::generate()
    };

    let mut builder = Sekisho::cookie()
        .protector(protector)
        .token_factory(mode.token_length.map_or_else(RandomToken::default, RandomToken::new));

    if let Some(ref name) = mode.cookie_name {
        builder = builder.cookie_name(name.as_str());
    }
    if !mode.allowed_origins.is_empty() {
        builder = builder.origin_validator(AllowedOrigins::parse(&mode.allowed_origins)?);
    }

    let layer = apply_common(builder, config).build()?;
    Ok(GateLayer::Cookie(layer))
}

/// Derive the expected token from the session cookie
///
/// Requests without a session have no expected token.
fn session_token(
    key: [u8; blake3::KEY_LEN],
    session_cookie: SmolStr,
) -> impl Fn(&Parts) -> Option<String> + Send + Sync + 'static {
    move |parts: &Parts| {
        let session = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse_encoded)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == session_cookie.as_str())?;

        let hash = blake3::keyed_hash(&key, session.value().as_bytes());
        Some(base64_simd::URL_SAFE_NO_PAD.encode_to_string(hash.as_bytes()))
    }
}

fn delegated(config: &Configuration, mode: &DelegatedConfiguration) -> eyre::Result<GateLayer> {
    let key = blake3::derive_key(SESSION_KEY_CONTEXT, mode.secret_key.as_bytes());

    let builder = Sekisho::delegated()
        .extractor(session_token(key, mode.session_cookie.clone()))
        .referer_required(mode.referer_required);

    let layer = apply_common(builder, config).build()?;
    Ok(GateLayer::Delegated(layer))
}

pub fn build(config: &Configuration) -> eyre::Result<GateLayer> {
    match config.mode {
        Mode::Cookie(ref mode) => cookie(config, mode),
        Mode::Delegated(ref mode) => delegated(config, mode),
    }
}
