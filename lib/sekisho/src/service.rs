use crate::{
    engine::{Decision, Gate},
    form,
    provider::ExpectedTokenProvider,
    request::RequestContext,
    response::materialize,
    verdict::Verdict,
    BoxError, ResponseFuture,
};
use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;
use std::{
    mem,
    task::{self, Poll},
};
use tower::Service;
use triomphe::Arc;

pub struct SekishoService<S, P> {
    inner: S,
    gate: Arc<Gate<P>>,
}

impl<S, P> SekishoService<S, P> {
    pub(crate) fn new(inner: S, gate: Arc<Gate<P>>) -> Self {
        Self { inner, gate }
    }
}

impl<S, P> Clone for SekishoService<S, P>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<S, P, ReqBody, ResBody> Service<Request<ReqBody>> for SekishoService<S, P>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    P: ExpectedTokenProvider,
    ReqBody: Body + From<Bytes> + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: Into<BoxError>,
    ResBody: From<String> + Send + 'static,
{
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, ResBody, S::Error>;
    type Response = Response<ResBody>;

    fn poll_ready(&mut self, cx: &mut task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (parts, body) = req.into_parts();
        let decision = self.gate.decide(&RequestContext::new(&parts));
        let failure_status = self.gate.options().failure_status();

        let pending = match decision {
            Decision::Verdict(verdict) => {
                return match materialize(verdict, failure_status, parts.uri.path()) {
                    Some(response) => ResponseFuture::ready(response),
                    None => ResponseFuture::inner(self.inner.call(Request::from_parts(parts, body))),
                };
            }
            Decision::ReadForm(pending) => pending,
        };

        // The inner service was driven to readiness, the clone might not be
        let clone = self.inner.clone();
        let mut inner = mem::replace(&mut self.inner, clone);

        ResponseFuture::form(Box::pin(async move {
            let read = form::read_token(
                body,
                pending.content_type(),
                pending.field(),
                pending.limit(),
            )
            .await;

            let verdict = match read {
                Some((actual, bytes)) => match pending.conclude(Some(&actual)) {
                    Verdict::Allow => {
                        return inner
                            .call(Request::from_parts(parts, ReqBody::from(bytes)))
                            .await;
                    }
                    verdict => verdict,
                },
                None => pending.conclude(None),
            };

            let response = materialize(verdict, failure_status, parts.uri.path())
                .expect("[Bug] Denials always produce a response");

            Ok(response)
        }))
    }
}
