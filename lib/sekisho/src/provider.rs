use crate::{
    codec::{CookieCodec, CookieProtector},
    request::RequestContext,
    verdict::{Denial, Issued},
};
use cookie::Cookie;
use http::{header, request::Parts};
use rand::{distributions::Alphanumeric, Rng};
use std::{collections::HashSet, str};
use url::{Origin, Url};
use zeroize::Zeroizing;

const RANDOM_TOKEN_LEN: usize = 32;

/// Mints new tokens for the self-issuing variant
pub trait TokenFactory: Send + Sync + 'static {
    /// Generate a new token
    ///
    /// `None` or an empty string means the factory couldn't produce one.
    fn generate(&self) -> Option<String>;
}

impl<F> TokenFactory for F
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    #[inline]
    fn generate(&self) -> Option<String> {
        self()
    }
}

/// Random alphanumeric tokens drawn from the thread-local CSPRNG
#[derive(Clone, Copy, Debug)]
pub struct RandomToken {
    len: usize,
}

impl RandomToken {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Default for RandomToken {
    fn default() -> Self {
        Self::new(RANDOM_TOKEN_LEN)
    }
}

impl TokenFactory for RandomToken {
    fn generate(&self) -> Option<String> {
        let token = rand::thread_rng()
            .sample_iter(Alphanumeric)
            .map(char::from)
            .take(self.len)
            .collect();

        Some(token)
    }
}

/// Decides whether the origin a request claims to come from is trustworthy
pub trait OriginValidator: Send + Sync + 'static {
    fn is_trusted(&self, source: &Url) -> bool;
}

impl<F> OriginValidator for F
where
    F: Fn(&Url) -> bool + Send + Sync + 'static,
{
    #[inline]
    fn is_trusted(&self, source: &Url) -> bool {
        self(source)
    }
}

/// Trusts an exact set of origins (scheme, host, and port)
#[derive(Clone, Debug)]
pub struct AllowedOrigins {
    origins: HashSet<Origin>,
}

impl AllowedOrigins {
    pub fn parse<I, S>(origins: I) -> Result<Self, url::ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let origins = origins
            .into_iter()
            .map(|origin| Url::parse(origin.as_ref()).map(|url| url.origin()))
            .collect::<Result<_, _>>()?;

        Ok(Self { origins })
    }
}

impl OriginValidator for AllowedOrigins {
    fn is_trusted(&self, source: &Url) -> bool {
        self.origins.contains(&source.origin())
    }
}

/// Source of the token a request is expected to carry
///
/// The gate runs the same classification and comparison for every provider.
/// Providers only differ in where the expected token comes from and how strictly they check the origin.
pub trait ExpectedTokenProvider: Send + Sync + 'static {
    /// Name used in the message when no token could be issued
    fn name(&self) -> &'static str;

    /// Produce the token handed out on the issuance endpoint
    fn issue(&self, ctx: &RequestContext<'_>) -> Option<Issued>;

    /// Recover the token the request has to present
    ///
    /// Unlike [`ExpectedTokenProvider::issue`] this never mints anything.
    fn expected(&self, ctx: &RequestContext<'_>) -> Option<Zeroizing<String>>;

    /// Check the Origin/Referer signals of a request that isn't bypassed
    fn check_origin(&self, ctx: &RequestContext<'_>) -> Result<(), Denial>;
}

/// Self-issuing variant: the expected token lives in a protected cookie
pub struct CookieProvider {
    pub(crate) cookie_name: String,
    pub(crate) codec: CookieCodec<Box<dyn CookieProtector>>,
    pub(crate) factory: Box<dyn TokenFactory>,
    pub(crate) origin_validator: Option<Box<dyn OriginValidator>>,
}

impl CookieProvider {
    fn read_cookie(&self, ctx: &RequestContext<'_>) -> Option<Zeroizing<String>> {
        for header in ctx.headers().get_all(header::COOKIE) {
            let Ok(value) = header.to_str() else {
                continue;
            };

            for cookie in Cookie::split_parse_encoded(value) {
                let Ok(cookie) = cookie else {
                    continue;
                };

                if cookie.name() == self.cookie_name {
                    return self.codec.decode(cookie.value());
                }
            }
        }

        None
    }
}

impl ExpectedTokenProvider for CookieProvider {
    fn name(&self) -> &'static str {
        "ExpectedTokenFactory"
    }

    fn issue(&self, ctx: &RequestContext<'_>) -> Option<Issued> {
        let token = match self.read_cookie(ctx) {
            Some(token) => token,
            None => {
                let token = self.factory.generate().filter(|token| !token.is_empty())?;
                Zeroizing::new(token)
            }
        };

        let cookie = Cookie::build((self.cookie_name.clone(), self.codec.encode(&token)))
            .path("/")
            .http_only(true)
            .secure(ctx.is_secure())
            .build();

        Some(Issued {
            token,
            cookie: Some(cookie),
        })
    }

    fn expected(&self, ctx: &RequestContext<'_>) -> Option<Zeroizing<String>> {
        self.read_cookie(ctx)
    }

    fn check_origin(&self, ctx: &RequestContext<'_>) -> Result<(), Denial> {
        let source = ctx
            .header(&header::ORIGIN)
            .or_else(|| ctx.header(&header::REFERER))
            .ok_or(Denial::MissingOriginSignal)?;

        if let Some(ref validator) = self.origin_validator {
            let trusted = str::from_utf8(source)
                .ok()
                .and_then(|source| {
                    Url::parse(source)
                        .inspect_err(|error| debug!(?error, "unparseable origin signal"))
                        .ok()
                })
                .is_some_and(|source| validator.is_trusted(&source));

            if !trusted {
                return Err(Denial::UntrustedOrigin);
            }
        }

        Ok(())
    }
}

/// Computes the expected token from the request, for example from the session
pub trait ExpectedTokenExtractor: Send + Sync + 'static {
    fn extract(&self, parts: &Parts) -> Option<String>;
}

impl<F> ExpectedTokenExtractor for F
where
    F: Fn(&Parts) -> Option<String> + Send + Sync + 'static,
{
    #[inline]
    fn extract(&self, parts: &Parts) -> Option<String> {
        self(parts)
    }
}

/// Delegated variant: the expected token is computed on demand, nothing is stored client-side
pub struct DelegateProvider {
    pub(crate) extractor: Box<dyn ExpectedTokenExtractor>,
    pub(crate) referer_required: bool,
}

impl ExpectedTokenProvider for DelegateProvider {
    fn name(&self) -> &'static str {
        "ExpectedTokenExtractor"
    }

    fn issue(&self, ctx: &RequestContext<'_>) -> Option<Issued> {
        self.expected(ctx).map(|token| Issued {
            token,
            cookie: None,
        })
    }

    fn expected(&self, ctx: &RequestContext<'_>) -> Option<Zeroizing<String>> {
        self.extractor
            .extract(ctx.parts())
            .filter(|token| !token.is_empty())
            .map(Zeroizing::new)
    }

    fn check_origin(&self, ctx: &RequestContext<'_>) -> Result<(), Denial> {
        if self.referer_required && ctx.is_secure() && ctx.header(&header::REFERER).is_none() {
            return Err(Denial::MissingSecureReferer);
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{
        AllowedOrigins, CookieProvider, DelegateProvider, ExpectedTokenProvider, OriginValidator,
        RandomToken, TokenFactory,
    };
    use crate::{
        codec::{CookieCodec, KeyedHashProtector},
        request::RequestContext,
        verdict::Denial,
    };
    use http::{header, request::Parts, HeaderValue, Request};
    use url::Url;

    fn request_parts(request: http::request::Builder) -> Parts {
        request.body(()).unwrap().into_parts().0
    }

    fn cookie_provider() -> CookieProvider {
        CookieProvider {
            cookie_name: "CSRF".into(),
            codec: CookieCodec::new(Box::new(KeyedHashProtector::derive(
                "sekisho tests",
                b"hunter2",
            ))),
            factory: Box::new(|| Some("AAAA".to_string())),
            origin_validator: None,
        }
    }

    #[test]
    fn random_token() {
        let token = RandomToken::default().generate().unwrap();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|ch| ch.is_ascii_alphanumeric()));
        assert_ne!(Some(token), RandomToken::default().generate());
    }

    #[test]
    fn allowed_origins() {
        let allowed = AllowedOrigins::parse(["https://example.com", "http://localhost:8080"]).unwrap();

        assert!(allowed.is_trusted(&Url::parse("https://example.com/some/form?x=1").unwrap()));
        assert!(allowed.is_trusted(&Url::parse("http://localhost:8080").unwrap()));
        assert!(!allowed.is_trusted(&Url::parse("http://example.com").unwrap()));
        assert!(!allowed.is_trusted(&Url::parse("http://localhost:8081").unwrap()));
        assert!(!allowed.is_trusted(&Url::parse("https://evil.example").unwrap()));
    }

    #[test]
    fn allowed_origins_rejects_garbage() {
        assert!(AllowedOrigins::parse(["not an origin"]).is_err());
    }

    #[test]
    fn cookie_issue_reuses_cookie() {
        let provider = cookie_provider();
        let encoded = provider.codec.encode("BBBB");

        let parts = request_parts(Request::get("/auth/token").header(header::COOKIE, format!("CSRF={encoded}")));
        let issued = provider.issue(&RequestContext::new(&parts)).unwrap();
        assert_eq!(issued.token.as_str(), "BBBB");
    }

    #[test]
    fn cookie_issue_mints_without_cookie() {
        let provider = cookie_provider();
        let parts = request_parts(Request::get("https://example.com/auth/token"));

        let issued = provider.issue(&RequestContext::new(&parts)).unwrap();
        assert_eq!(issued.token.as_str(), "AAAA");

        let cookie = issued.cookie.unwrap();
        assert_eq!(cookie.name(), "CSRF");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert!(cookie.expires().is_none());
    }

    #[test]
    fn cookie_issue_mints_over_tampered_cookie() {
        let provider = cookie_provider();
        let parts = request_parts(Request::get("/auth/token").header(header::COOKIE, "CSRF=garbage"));

        let issued = provider.issue(&RequestContext::new(&parts)).unwrap();
        assert_eq!(issued.token.as_str(), "AAAA");
        assert!(provider.expected(&RequestContext::new(&parts)).is_none());
    }

    #[test]
    fn cookie_factory_failure() {
        let mut provider = cookie_provider();
        provider.factory = Box::new(|| Some(String::new()));

        let parts = request_parts(Request::get("/auth/token"));
        assert!(provider.issue(&RequestContext::new(&parts)).is_none());
    }

    #[test]
    fn cookie_origin_falls_back_to_referer() {
        let mut provider = cookie_provider();
        provider.origin_validator = Some(Box::new(|url: &Url| url.host_str() == Some("example.com")));

        let parts = request_parts(
            Request::post("/x")
                .header(header::ORIGIN, "")
                .header(header::REFERER, "https://example.com/form"),
        );
        assert_eq!(provider.check_origin(&RequestContext::new(&parts)), Ok(()));
    }

    #[test]
    fn cookie_origin_missing() {
        let provider = cookie_provider();
        let parts = request_parts(Request::post("/x"));

        assert_eq!(
            provider.check_origin(&RequestContext::new(&parts)),
            Err(Denial::MissingOriginSignal)
        );
    }

    #[test]
    fn cookie_non_ascii_origin_signal() {
        let parts = request_parts(Request::post("/x").header(
            header::REFERER,
            HeaderValue::from_bytes("https://exämple.com/".as_bytes()).unwrap(),
        ));

        let provider = cookie_provider();
        assert_eq!(provider.check_origin(&RequestContext::new(&parts)), Ok(()));

        let mut provider = cookie_provider();
        provider.origin_validator = Some(Box::new(|_: &Url| true));
        let parts = request_parts(Request::post("/x").header(
            header::ORIGIN,
            HeaderValue::from_bytes(b"https://\xff.example").unwrap(),
        ));
        assert_eq!(
            provider.check_origin(&RequestContext::new(&parts)),
            Err(Denial::UntrustedOrigin)
        );
    }

    #[test]
    fn cookie_origin_untrusted() {
        let mut provider = cookie_provider();
        provider.origin_validator = Some(Box::new(|url: &Url| url.host_str() == Some("example.com")));

        let parts = request_parts(Request::post("/x").header(header::ORIGIN, "https://evil.example"));
        assert_eq!(
            provider.check_origin(&RequestContext::new(&parts)),
            Err(Denial::UntrustedOrigin)
        );

        let parts = request_parts(Request::post("/x").header(header::ORIGIN, "null"));
        assert_eq!(
            provider.check_origin(&RequestContext::new(&parts)),
            Err(Denial::UntrustedOrigin)
        );
    }

    #[test]
    fn delegate_referer_rule_only_applies_to_tls() {
        let provider = DelegateProvider {
            extractor: Box::new(|_: &Parts| Some("AAAA".to_string())),
            referer_required: true,
        };

        let plain = request_parts(Request::post("http://example.com/x"));
        assert_eq!(provider.check_origin(&RequestContext::new(&plain)), Ok(()));

        let secure = request_parts(Request::post("https://example.com/x"));
        assert_eq!(
            provider.check_origin(&RequestContext::new(&secure)),
            Err(Denial::MissingSecureReferer)
        );

        let with_referer = request_parts(
            Request::post("https://example.com/x").header(header::REFERER, "https://example.com"),
        );
        assert_eq!(provider.check_origin(&RequestContext::new(&with_referer)), Ok(()));

        let lenient = DelegateProvider {
            referer_required: false,
            ..provider
        };
        assert_eq!(lenient.check_origin(&RequestContext::new(&secure)), Ok(()));
    }

    #[test]
    fn delegate_issue_has_no_cookie() {
        let provider = DelegateProvider {
            extractor: Box::new(|_: &Parts| Some("AAAA".to_string())),
            referer_required: true,
        };

        let parts = request_parts(Request::get("/auth/token"));
        let issued = provider.issue(&RequestContext::new(&parts)).unwrap();
        assert_eq!(issued.token.as_str(), "AAAA");
        assert!(issued.cookie.is_none());
    }
}
