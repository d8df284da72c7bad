use crate::BoxError;
use bytes::{Buf, Bytes, BytesMut};
use futures_util::stream;
use http_body::Body;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use mime::Mime;
use std::{
    pin::Pin,
    task::{self, ready, Poll},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("scanned {limit} bytes without finding the token field")]
struct ScanLimitReached {
    limit: usize,
}

/// Read the first occurrence of the token field from a form body
///
/// Returns the field value together with the complete body, so it can be handed downstream.
/// Malformed bodies behave as if the field wasn't present.
///
/// Urlencoded bodies are buffered in full and may not exceed `limit`.
/// Multipart bodies are scanned incrementally; `limit` only caps how much is read
/// while looking for the field, the rest of the body is not constrained.
pub async fn read_token<B>(
    body: B,
    content_type: &Mime,
    name: &str,
    limit: usize,
) -> Option<(String, Bytes)>
where
    B: Body + Send,
    B::Error: Into<BoxError>,
{
    if content_type.type_() == mime::MULTIPART {
        read_multipart_token(body, content_type, name, limit).await
    } else {
        read_urlencoded_token(body, name, limit).await
    }
}

async fn read_urlencoded_token<B>(body: B, name: &str, limit: usize) -> Option<(String, Bytes)>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(error) if error.is::<LengthLimitError>() => {
            debug!(limit, "urlencoded body exceeds the form body limit");
            return None;
        }
        Err(error) => {
            debug!(?error, "failed to buffer form body");
            return None;
        }
    };

    let fields: Vec<(String, String)> = serde_urlencoded::from_bytes(&body)
        .inspect_err(|error| debug!(?error, "malformed urlencoded body"))
        .ok()?;

    let token = fields
        .into_iter()
        .find_map(|(key, value)| (key == name).then_some(value))?;

    Some((token, body))
}

/// Body wrapper keeping a copy of every chunk handed to the multipart parser
struct Tee<B> {
    body: Pin<Box<B>>,
    seen: Vec<Bytes>,
    scanned: usize,
    limit: usize,
}

impl<B> Tee<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    fn new(body: B, limit: usize) -> Self {
        Self {
            body: Box::pin(body),
            seen: Vec::new(),
            scanned: 0,
            limit,
        }
    }

    fn limit_reached(&self) -> bool {
        self.scanned >= self.limit
    }

    fn poll_chunk(&mut self, cx: &mut task::Context<'_>) -> Poll<Option<Result<Bytes, BoxError>>> {
        // Checked before pulling, a single chunk may cross the limit
        if self.limit_reached() {
            return Poll::Ready(Some(Err(ScanLimitReached { limit: self.limit }.into())));
        }

        loop {
            let frame = match ready!(self.body.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => frame,
                Some(Err(error)) => return Poll::Ready(Some(Err(error.into()))),
                None => return Poll::Ready(None),
            };

            // Trailers don't carry form data
            let Ok(mut data) = frame.into_data() else {
                continue;
            };

            let chunk = data.copy_to_bytes(data.remaining());
            self.scanned += chunk.len();
            self.seen.push(chunk.clone());

            return Poll::Ready(Some(Ok(chunk)));
        }
    }

    async fn into_bytes(self) -> Result<Bytes, BoxError> {
        let rest = self.body.collect().await.map_err(Into::into)?.to_bytes();

        let mut bytes = BytesMut::with_capacity(self.scanned + rest.len());
        for chunk in self.seen {
            bytes.extend_from_slice(&chunk);
        }
        bytes.extend_from_slice(&rest);

        Ok(bytes.freeze())
    }
}

async fn read_multipart_token<B>(
    body: B,
    content_type: &Mime,
    name: &str,
    limit: usize,
) -> Option<(String, Bytes)>
where
    B: Body + Send,
    B::Error: Into<BoxError>,
{
    let Some(boundary) = content_type.get_param(mime::BOUNDARY) else {
        debug!("multipart body without boundary");
        return None;
    };

    let mut tee = Tee::new(body, limit);
    let token = {
        let stream = stream::poll_fn(|cx| tee.poll_chunk(cx));
        let mut multipart = multer::Multipart::new(stream, boundary.as_str());
        find_multipart_field(&mut multipart, name).await
    };

    let Some(token) = token else {
        if tee.limit_reached() {
            debug!(limit, "token field not within the scanned part of the multipart body");
        }
        return None;
    };

    let body = tee
        .into_bytes()
        .await
        .inspect_err(|error| debug!(?error, "failed to buffer form body"))
        .ok()?;

    Some((token, body))
}

async fn find_multipart_field(multipart: &mut multer::Multipart<'_>, name: &str) -> Option<String> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return None,
            Err(error) => {
                debug!(?error, "malformed multipart body");
                return None;
            }
        };

        if field.name() == Some(name) {
            return field
                .text()
                .await
                .inspect_err(|error| debug!(?error, "failed to read multipart field"))
                .ok();
        }
    }
}
