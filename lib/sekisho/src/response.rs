use crate::verdict::Verdict;
use http::{
    header::{self, HeaderValue},
    Response, StatusCode,
};
use std::mem;

/// Turn a verdict into the response sent in place of the downstream one
///
/// Returns `None` for [`Verdict::Allow`], which doesn't answer the request itself.
pub fn materialize<B>(verdict: Verdict, failure_status: StatusCode, path: &str) -> Option<Response<B>>
where
    B: From<String>,
{
    let (status, body, cookie) = match verdict {
        Verdict::Allow => return None,
        Verdict::IssueToken(issued) => {
            debug!(path, "issuing anti-forgery token");

            let mut token = issued.token;
            (StatusCode::OK, mem::take(&mut *token), issued.cookie)
        }
        Verdict::Deny(denial) => {
            debug!(reason = denial.kind().as_ref(), %denial, path, "denied request");
            (failure_status, denial.to_string(), None)
        }
    };

    let mut response = Response::new(B::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));

    if let Some(cookie) = cookie {
        match HeaderValue::from_str(&cookie.encoded().to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(error) => error!(?error, "failed to encode anti-forgery cookie"),
        }
    }

    Some(response)
}

/// Responses differ based on the cookies of the request, caches have to know
#[inline]
pub fn append_vary<B>(response: &mut Response<B>) {
    response.headers_mut().append(header::VARY, HeaderValue::from_static("Cookie"));
}
