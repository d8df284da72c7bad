#![allow(dead_code)]

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{header, Request, Response};
use http_body_util::{BodyExt, Full};
use sekisho::KeyedHashProtector;
use std::convert::Infallible;
use tower::{service_fn, Service, ServiceExt};

pub type Body = Full<Bytes>;

pub fn protector() -> KeyedHashProtector {
    KeyedHashProtector::derive("sekisho integration tests", b"hunter2")
}

/// Inner service answering with the request body it received
pub fn echo() -> impl Service<
    Request<Body>,
    Response = Response<String>,
    Error = Infallible,
    Future = BoxFuture<'static, Result<Response<String>, Infallible>>,
> + Clone
       + Send
       + 'static {
    service_fn(
        |req: Request<Body>| -> BoxFuture<'static, Result<Response<String>, Infallible>> {
            Box::pin(async move {
                let body = req.into_body().collect().await?.to_bytes();
                let body = String::from_utf8_lossy(&body).into_owned();

                Ok(Response::new(format!("passed:{body}")))
            })
        },
    )
}

pub async fn call<S>(service: &mut S, req: Request<Body>) -> Response<String>
where
    S: Service<Request<Body>, Response = Response<String>, Error = Infallible>,
{
    service.ready().await.unwrap().call(req).await.unwrap()
}

pub fn empty() -> Body {
    Full::default()
}

/// The `name=value` part of the `Set-Cookie` header, ready for a `Cookie` request header
pub fn cookie_pair(response: &Response<String>) -> String {
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

pub fn assert_vary<B>(response: &Response<B>) {
    assert!(
        response
            .headers()
            .get_all(header::VARY)
            .iter()
            .any(|value| value == "Cookie"),
        "missing `Vary: Cookie`"
    );
}
