use http::{
    header, request::Parts, uri::Scheme, HeaderMap, HeaderName, HeaderValue, Method,
};
use mime::Mime;

/// Marker extension for requests that arrived over TLS
///
/// Insert this from whatever layer terminates TLS (or trusts a `X-Forwarded-Proto` header)
/// when the request URI itself doesn't carry the `https` scheme.
#[derive(Clone, Copy, Debug, Default)]
pub struct Secure;

/// Authentication schemes resolved for the caller by an upstream authentication layer
#[derive(Clone, Debug, Default)]
pub struct AuthenticationSchemes(pub Vec<String>);

impl AuthenticationSchemes {
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S> FromIterator<S> for AuthenticationSchemes
where
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Read-only view over the parts of a request the gate decides on
pub struct RequestContext<'a> {
    parts: &'a Parts,
    secure: bool,
    content_type: Option<Mime>,
}

impl<'a> RequestContext<'a> {
    #[must_use]
    pub fn new(parts: &'a Parts) -> Self {
        let secure = parts.uri.scheme() == Some(&Scheme::HTTPS)
            || parts.extensions.get::<Secure>().is_some();

        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());

        Self {
            parts,
            secure,
            content_type,
        }
    }

    #[inline]
    #[must_use]
    pub fn parts(&self) -> &'a Parts {
        self.parts
    }

    #[inline]
    #[must_use]
    pub fn method(&self) -> &'a Method {
        &self.parts.method
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &'a str {
        self.parts.uri.path()
    }

    #[inline]
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    #[inline]
    #[must_use]
    pub fn headers(&self) -> &'a HeaderMap {
        &self.parts.headers
    }

    /// Content type of the body, if it was present and parseable
    #[inline]
    #[must_use]
    pub fn content_type(&self) -> Option<&Mime> {
        self.content_type.as_ref()
    }

    /// Authentication schemes attached by upstream layers, empty if none were attached
    pub fn authentication_schemes(&self) -> impl Iterator<Item = &'a str> {
        self.parts
            .extensions
            .get::<AuthenticationSchemes>()
            .into_iter()
            .flat_map(|schemes| schemes.iter())
    }

    /// Raw value of the header, `None` if it is missing or empty
    ///
    /// Values aren't restricted to visible ASCII, tokens are compared byte for byte.
    #[must_use]
    pub fn header(&self, name: &HeaderName) -> Option<&'a [u8]> {
        self.parts
            .headers
            .get(name)
            .map(HeaderValue::as_bytes)
            .filter(|value| !value.is_empty())
    }
}
