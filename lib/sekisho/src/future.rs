use crate::response::append_vary;
use futures_util::future::BoxFuture;
use http::Response;
use pin_project_lite::pin_project;
use std::{
    future::Future,
    pin::Pin,
    task::{self, ready, Poll},
};

pin_project! {
    #[project = ResponseFutureProj]
    pub enum ResponseFuture<F, ResBody, E> {
        /// The request passed on the head alone
        Inner {
            #[pin]
            future: F,
        },
        /// The body is read before the request is either passed on or denied
        Form {
            future: BoxFuture<'static, Result<Response<ResBody>, E>>,
        },
        /// The gate answered the request itself
        Ready {
            response: Option<Response<ResBody>>,
        },
    }
}

impl<F, ResBody, E> ResponseFuture<F, ResBody, E> {
    pub(crate) fn inner(future: F) -> Self {
        Self::Inner { future }
    }

    pub(crate) fn form(future: BoxFuture<'static, Result<Response<ResBody>, E>>) -> Self {
        Self::Form { future }
    }

    pub(crate) fn ready(response: Response<ResBody>) -> Self {
        Self::Ready {
            response: Some(response),
        }
    }
}

impl<F, ResBody, E> Future for ResponseFuture<F, ResBody, E>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = Result<Response<ResBody>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let mut response = match self.project() {
            ResponseFutureProj::Inner { future } => ready!(future.poll(cx))?,
            ResponseFutureProj::Form { future } => ready!(future.as_mut().poll(cx))?,
            ResponseFutureProj::Ready { response } => response
                .take()
                .expect("[Bug] Future polled after completion"),
        };

        append_vary(&mut response);

        Poll::Ready(Ok(response))
    }
}
