use crate::{
    classify::classify,
    options::Options,
    provider::ExpectedTokenProvider,
    request::RequestContext,
    verdict::{Denial, Verdict},
};
use http::Method;
use mime::Mime;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Outcome of looking at the request head
#[derive(Debug)]
pub enum Decision {
    Verdict(Verdict),

    /// The token has to be read from the form body before a verdict can be reached
    ReadForm(PendingForm),
}

impl From<Verdict> for Decision {
    #[inline]
    fn from(value: Verdict) -> Self {
        Self::Verdict(value)
    }
}

impl From<Denial> for Decision {
    #[inline]
    fn from(value: Denial) -> Self {
        Self::Verdict(Verdict::Deny(value))
    }
}

/// Verification suspended until the form body is available
pub struct PendingForm {
    expected: Zeroizing<String>,
    field: String,
    content_type: Mime,
    limit: usize,
}

impl PendingForm {
    #[inline]
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[inline]
    #[must_use]
    pub fn content_type(&self) -> &Mime {
        &self.content_type
    }

    /// Maximum number of body bytes to buffer
    #[inline]
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Finish verification with the value of the form field, if any
    #[must_use]
    pub fn conclude(self, actual: Option<&str>) -> Verdict {
        match actual.filter(|actual| !actual.is_empty()) {
            Some(actual) => compare(&self.expected, actual.as_bytes()),
            None => Verdict::Deny(Denial::FormTokenAbsent { field: self.field }),
        }
    }
}

impl std::fmt::Debug for PendingForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingForm")
            .field("field", &self.field)
            .field("content_type", &self.content_type)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

fn compare(expected: &str, actual: &[u8]) -> Verdict {
    if bool::from(expected.as_bytes().ct_eq(actual)) {
        Verdict::Allow
    } else {
        Verdict::Deny(Denial::TokenMismatch)
    }
}

/// The verification engine
///
/// Stateless apart from its configuration, so one instance serves every request.
pub struct Gate<P> {
    options: Options,
    provider: P,
}

impl<P> Gate<P>
where
    P: ExpectedTokenProvider,
{
    pub(crate) fn new(options: Options, provider: P) -> Self {
        Self { options, provider }
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Decide on a request by its head alone
    ///
    /// Returns [`Decision::ReadForm`] when the token is missing from the header but the body is an eligible form.
    #[must_use]
    pub fn decide(&self, ctx: &RequestContext<'_>) -> Decision {
        if ctx.method() == Method::GET && ctx.path() == self.options.token_endpoint {
            return match self.provider.issue(ctx) {
                Some(issued) => Verdict::IssueToken(issued).into(),
                None => Denial::TokenFactoryFailed {
                    provider: self.provider.name(),
                }
                .into(),
            };
        }

        if let Some(bypass) = classify(&self.options, ctx) {
            trace!(bypass = bypass.as_ref(), "request exempt from verification");
            return Verdict::Allow.into();
        }

        if let Err(denial) = self.provider.check_origin(ctx) {
            return denial.into();
        }

        let Some(expected) = self.provider.expected(ctx) else {
            return Denial::ExpectedTokenUnavailable.into();
        };

        if let Some(actual) = ctx.header(&self.options.header_name) {
            return compare(&expected, actual).into();
        }

        match ctx.content_type() {
            Some(content_type) if self.options.is_form_content_type(content_type) => {
                Decision::ReadForm(PendingForm {
                    expected,
                    field: self.options.form_field_name.clone(),
                    content_type: content_type.clone(),
                    limit: self.options.form_body_limit,
                })
            }
            _ => Denial::HeaderTokenAbsent {
                header: self.options.header_label.clone(),
            }
            .into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Decision, Gate};
    use crate::{
        options::Sekisho, provider::DelegateProvider, request::RequestContext, verdict::Denial,
        verdict::Verdict,
    };
    use http::{header, request::Parts, HeaderValue, Request};
    use triomphe::Arc;

    fn request_parts(request: http::request::Builder) -> Parts {
        request.body(()).unwrap().into_parts().0
    }

    fn gate() -> Arc<Gate<DelegateProvider>> {
        let layer = Sekisho::delegated()
            .extractor(|parts: &Parts| {
                parts
                    .headers
                    .contains_key(header::AUTHORIZATION)
                    .then(|| "AAAA".to_string())
            })
            .referer_required(false)
            .build()
            .unwrap();

        layer.gate
    }

    fn decide(gate: &Gate<DelegateProvider>, request: http::request::Builder) -> Decision {
        let parts = request_parts(request);
        gate.decide(&RequestContext::new(&parts))
    }

    fn denial(decision: Decision) -> Denial {
        match decision {
            Decision::Verdict(Verdict::Deny(denial)) => denial,
            other => panic!("expected a denial, got {other:?}"),
        }
    }

    #[test]
    fn matching_header_token() {
        let decision = decide(
            &gate(),
            Request::post("/x")
                .header(header::AUTHORIZATION, "yes")
                .header("x-csrf-token", "AAAA"),
        );
        assert!(matches!(decision, Decision::Verdict(Verdict::Allow)));
    }

    #[test]
    fn mismatching_header_token() {
        let decision = decide(
            &gate(),
            Request::post("/x")
                .header(header::AUTHORIZATION, "yes")
                .header("x-csrf-token", "AAAB"),
        );
        assert_eq!(denial(decision), Denial::TokenMismatch);

        let decision = decide(
            &gate(),
            Request::post("/x")
                .header(header::AUTHORIZATION, "yes")
                .header("x-csrf-token", "AAAAA"),
        );
        assert_eq!(denial(decision), Denial::TokenMismatch);
    }

    #[test]
    fn non_ascii_header_token() {
        let layer = Sekisho::delegated()
            .extractor(|_: &Parts| Some("tökén".to_string()))
            .build()
            .unwrap();

        let decision = decide(
            &layer.gate,
            Request::post("/x").header(
                "x-csrf-token",
                HeaderValue::from_bytes("tökén".as_bytes()).unwrap(),
            ),
        );
        assert!(matches!(decision, Decision::Verdict(Verdict::Allow)));

        let decision = decide(
            &layer.gate,
            Request::post("/x").header(
                "x-csrf-token",
                HeaderValue::from_bytes("tokén".as_bytes()).unwrap(),
            ),
        );
        assert_eq!(denial(decision), Denial::TokenMismatch);
    }

    #[test]
    fn expected_token_unavailable() {
        let decision = decide(&gate(), Request::post("/x").header("x-csrf-token", "AAAA"));
        assert_eq!(denial(decision), Denial::ExpectedTokenUnavailable);
    }

    #[test]
    fn absent_header_without_form() {
        let decision = decide(
            &gate(),
            Request::post("/x")
                .header(header::AUTHORIZATION, "yes")
                .header(header::CONTENT_TYPE, "application/json"),
        );
        assert_eq!(
            denial(decision),
            Denial::HeaderTokenAbsent {
                header: "X-CSRF-Token".into()
            }
        );
    }

    #[test]
    fn form_content_type_defers() {
        let decision = decide(
            &gate(),
            Request::post("/x")
                .header(header::AUTHORIZATION, "yes")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8"),
        );

        let Decision::ReadForm(pending) = decision else {
            panic!("expected the form to be read");
        };
        assert_eq!(pending.field(), "csrf_token");
        assert_eq!(pending.limit(), 64 * 1024);
        assert!(matches!(pending.conclude(Some("AAAA")), Verdict::Allow));
    }

    #[test]
    fn pending_form_verdicts() {
        let pending = |gate: &Gate<DelegateProvider>| {
            match decide(
                gate,
                Request::post("/x")
                    .header(header::AUTHORIZATION, "yes")
                    .header(header::CONTENT_TYPE, "multipart/form-data; boundary=X"),
            ) {
                Decision::ReadForm(pending) => pending,
                other => panic!("expected the form to be read, got {other:?}"),
            }
        };

        let gate = gate();
        assert_eq!(
            pending(&gate).conclude(Some("nope")).denial(),
            Some(&Denial::TokenMismatch)
        );
        assert_eq!(
            pending(&gate).conclude(Some("")).denial(),
            Some(&Denial::FormTokenAbsent {
                field: "csrf_token".into()
            })
        );
        assert_eq!(
            pending(&gate).conclude(None).denial(),
            Some(&Denial::FormTokenAbsent {
                field: "csrf_token".into()
            })
        );
    }

    #[test]
    fn issuance_only_on_get() {
        let gate = gate();

        let decision = decide(&gate, Request::get("/auth/token").header(header::AUTHORIZATION, "yes"));
        let Decision::Verdict(Verdict::IssueToken(issued)) = decision else {
            panic!("expected a token to be issued");
        };
        assert_eq!(issued.token.as_str(), "AAAA");

        let decision = decide(&gate, Request::get("/auth/token"));
        assert_eq!(
            denial(decision),
            Denial::TokenFactoryFailed {
                provider: "ExpectedTokenExtractor"
            }
        );

        let decision = decide(&gate, Request::post("/auth/token").header(header::AUTHORIZATION, "yes"));
        assert_eq!(
            denial(decision),
            Denial::HeaderTokenAbsent {
                header: "X-CSRF-Token".into()
            }
        );
    }
}
