use crate::{
    codec::{CookieCodec, CookieProtector},
    engine::Gate,
    layer::SekishoLayer,
    provider::{
        CookieProvider, DelegateProvider, ExpectedTokenExtractor, OriginValidator, TokenFactory,
    },
};
use http::{
    header::InvalidHeaderName, method::InvalidMethod, status::InvalidStatusCode, HeaderName,
    Method, StatusCode,
};
use mime::Mime;
use std::collections::HashSet;
use thiserror::Error;

const DEFAULT_COOKIE_NAME: &str = "CSRF";
const DEFAULT_FORM_BODY_LIMIT: usize = 64 * 1024;
const DEFAULT_FORM_FIELD_NAME: &str = "csrf_token";
const DEFAULT_HEADER_NAME: &str = "X-CSRF-Token";
const DEFAULT_TOKEN_ENDPOINT: &str = "/auth/token";

/// Misconfiguration detected while building the gate
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Cookie name is empty or contains separators")]
    InvalidCookieName,

    #[error("Form field name must not be empty")]
    EmptyFormFieldName,

    #[error("Token endpoint must be an absolute path")]
    InvalidTokenEndpoint,

    #[error("No cookie protector configured")]
    MissingProtector,

    #[error("No expected token extractor configured")]
    MissingExtractor,

    #[error("No token factory configured")]
    MissingTokenFactory,

    #[error("Invalid content type")]
    InvalidContentType(#[from] mime::FromStrError),

    #[error("Invalid header name")]
    InvalidHeaderName(#[from] InvalidHeaderName),

    #[error("Invalid method")]
    InvalidMethod(#[from] InvalidMethod),

    #[error("Invalid status code")]
    InvalidStatusCode(#[from] InvalidStatusCode),
}

/// Settings shared by both variants of the gate
///
/// Immutable once the gate is built.
#[derive(Clone, Debug)]
pub struct Options {
    pub(crate) token_endpoint: String,
    pub(crate) failure_status: StatusCode,
    pub(crate) header_name: HeaderName,
    /// Header name as configured, for the user-facing message
    pub(crate) header_label: String,
    pub(crate) form_field_name: String,
    pub(crate) form_content_types: Vec<Mime>,
    pub(crate) form_body_limit: usize,
    pub(crate) safe_methods: Vec<Method>,
    pub(crate) safe_paths: HashSet<String>,
    pub(crate) safe_authentication_schemes: HashSet<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.into(),
            failure_status: StatusCode::BAD_REQUEST,
            header_name: HeaderName::from_static("x-csrf-token"),
            header_label: DEFAULT_HEADER_NAME.into(),
            form_field_name: DEFAULT_FORM_FIELD_NAME.into(),
            form_content_types: vec![
                mime::APPLICATION_WWW_FORM_URLENCODED,
                mime::MULTIPART_FORM_DATA,
            ],
            form_body_limit: DEFAULT_FORM_BODY_LIMIT,
            safe_methods: vec![Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE],
            safe_paths: HashSet::new(),
            safe_authentication_schemes: HashSet::new(),
        }
    }
}

impl Options {
    #[inline]
    #[must_use]
    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    #[inline]
    #[must_use]
    pub fn failure_status(&self) -> StatusCode {
        self.failure_status
    }

    #[inline]
    #[must_use]
    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    #[inline]
    #[must_use]
    pub fn form_field_name(&self) -> &str {
        &self.form_field_name
    }

    /// Whether the content type is eligible for the form field fallback
    ///
    /// Only the essence (`type/subtype`) is compared, parameters like `boundary` are ignored.
    #[must_use]
    pub fn is_form_content_type(&self, content_type: &Mime) -> bool {
        self.form_content_types
            .iter()
            .any(|form_type| form_type.essence_str() == content_type.essence_str())
    }

    fn validate(&self) -> Result<(), BuildError> {
        if !self.token_endpoint.starts_with('/') {
            return Err(BuildError::InvalidTokenEndpoint);
        }

        if self.form_field_name.is_empty() {
            return Err(BuildError::EmptyFormFieldName);
        }

        Ok(())
    }
}

/// Entrypoint for building the gate
///
/// Pick the variant first, then adjust the shared settings.
pub struct Sekisho;

impl Sekisho {
    /// The gate issues its own tokens and keeps the expected token in a protected cookie
    #[must_use]
    pub fn cookie() -> Builder<CookieSettings> {
        Builder::new(CookieSettings {
            cookie_name: DEFAULT_COOKIE_NAME.into(),
            protector: None,
            factory: None,
            origin_validator: None,
        })
    }

    /// The expected token is computed by an extractor, e.g. from the session
    #[must_use]
    pub fn delegated() -> Builder<DelegateSettings> {
        Builder::new(DelegateSettings {
            extractor: None,
            referer_required: true,
        })
    }
}

pub struct CookieSettings {
    cookie_name: String,
    protector: Option<Box<dyn CookieProtector>>,
    factory: Option<Box<dyn TokenFactory>>,
    origin_validator: Option<Box<dyn OriginValidator>>,
}

pub struct DelegateSettings {
    extractor: Option<Box<dyn ExpectedTokenExtractor>>,
    referer_required: bool,
}

/// Builder for the gate
///
/// Invalid values are remembered and reported by `build`, so the setters can be chained freely.
#[must_use]
pub struct Builder<V> {
    options: Result<Options, BuildError>,
    variant: V,
}

impl<V> Builder<V> {
    fn new(variant: V) -> Self {
        Self {
            options: Ok(Options::default()),
            variant,
        }
    }

    fn and_then<F>(mut self, func: F) -> Self
    where
        F: FnOnce(&mut Options) -> Result<(), BuildError>,
    {
        self.options = self.options.and_then(|mut options| {
            func(&mut options)?;
            Ok(options)
        });
        self
    }

    /// Path that hands out tokens on `GET` instead of verifying
    pub fn token_endpoint(self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.and_then(|options| {
            options.token_endpoint = path;
            Ok(())
        })
    }

    /// Status code used for every denial
    pub fn failure_status(self, status: u16) -> Self {
        self.and_then(|options| {
            options.failure_status = StatusCode::from_u16(status)?;
            Ok(())
        })
    }

    /// Header carrying the caller's token
    pub fn header_name(self, name: &str) -> Self {
        self.and_then(|options| {
            options.header_name = HeaderName::from_bytes(name.as_bytes())?;
            options.header_label = name.into();
            Ok(())
        })
    }

    /// Form field carrying the token when the header is absent
    pub fn form_field_name(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.and_then(|options| {
            options.form_field_name = name;
            Ok(())
        })
    }

    /// Content types eligible for the form field fallback
    pub fn form_content_types<I, S>(self, content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.and_then(|options| {
            options.form_content_types = content_types
                .into_iter()
                .map(|content_type| content_type.as_ref().parse())
                .collect::<Result<_, _>>()?;
            Ok(())
        })
    }

    /// Maximum number of body bytes read while looking for the form field
    ///
    /// Urlencoded bodies larger than this are rejected. Multipart bodies are scanned
    /// part by part, once the field is found the remainder of the body is read in full.
    pub fn form_body_limit(self, limit: usize) -> Self {
        self.and_then(|options| {
            options.form_body_limit = limit;
            Ok(())
        })
    }

    /// Methods that always pass (compared case-sensitively)
    pub fn safe_methods<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.and_then(|options| {
            options.safe_methods = methods
                .into_iter()
                .map(|method| Method::from_bytes(method.as_ref().as_bytes()))
                .collect::<Result<_, _>>()?;
            Ok(())
        })
    }

    /// Paths that always pass (exact match)
    pub fn safe_paths<I, S>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths = paths.into_iter().map(Into::into).collect();
        self.and_then(|options| {
            options.safe_paths = paths;
            Ok(())
        })
    }

    /// Authentication schemes whose callers always pass
    pub fn safe_authentication_schemes<I, S>(self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let schemes = schemes.into_iter().map(Into::into).collect();
        self.and_then(|options| {
            options.safe_authentication_schemes = schemes;
            Ok(())
        })
    }

    fn finish(self) -> Result<(Options, V), BuildError> {
        let options = self.options?;
        options.validate()?;
        Ok((options, self.variant))
    }
}

impl Builder<CookieSettings> {
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.variant.cookie_name = name.into();
        self
    }

    pub fn protector(mut self, protector: impl CookieProtector) -> Self {
        self.variant.protector = Some(Box::new(protector));
        self
    }

    pub fn token_factory(mut self, factory: impl TokenFactory) -> Self {
        self.variant.factory = Some(Box::new(factory));
        self
    }

    /// Predicate the Origin (or Referer) of unsafe requests has to satisfy
    pub fn origin_validator(mut self, validator: impl OriginValidator) -> Self {
        self.variant.origin_validator = Some(Box::new(validator));
        self
    }

    pub fn build(self) -> Result<SekishoLayer<CookieProvider>, BuildError> {
        let (options, settings) = self.finish()?;

        let valid_cookie_name = !settings.cookie_name.is_empty()
            && settings
                .cookie_name
                .bytes()
                .all(|byte| byte.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&byte));

        if !valid_cookie_name {
            return Err(BuildError::InvalidCookieName);
        }

        let provider = CookieProvider {
            cookie_name: settings.cookie_name,
            codec: CookieCodec::new(settings.protector.ok_or(BuildError::MissingProtector)?),
            factory: settings.factory.ok_or(BuildError::MissingTokenFactory)?,
            origin_validator: settings.origin_validator,
        };

        Ok(SekishoLayer::new(Gate::new(options, provider)))
    }
}

impl Builder<DelegateSettings> {
    pub fn extractor(mut self, extractor: impl ExpectedTokenExtractor) -> Self {
        self.variant.extractor = Some(Box::new(extractor));
        self
    }

    /// Whether TLS requests have to carry a Referer header
    pub fn referer_required(mut self, required: bool) -> Self {
        self.variant.referer_required = required;
        self
    }

    pub fn build(self) -> Result<SekishoLayer<DelegateProvider>, BuildError> {
        let (options, settings) = self.finish()?;

        let provider = DelegateProvider {
            extractor: settings.extractor.ok_or(BuildError::MissingExtractor)?,
            referer_required: settings.referer_required,
        };

        Ok(SekishoLayer::new(Gate::new(options, provider)))
    }
}
