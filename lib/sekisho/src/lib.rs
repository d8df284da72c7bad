#![doc = include_str!("../README.md")]

#[macro_use]
extern crate tracing;

pub use self::{
    classify::{classify, Bypass},
    codec::{CookieCodec, CookieProtector, KeyedHashProtector},
    engine::{Decision, Gate, PendingForm},
    future::ResponseFuture,
    layer::SekishoLayer,
    options::{BuildError, Builder, CookieSettings, DelegateSettings, Options, Sekisho},
    provider::{
        AllowedOrigins, CookieProvider, DelegateProvider, ExpectedTokenExtractor,
        ExpectedTokenProvider, OriginValidator, RandomToken, TokenFactory,
    },
    request::{AuthenticationSchemes, RequestContext, Secure},
    response::materialize,
    service::SekishoService,
    verdict::{Denial, DenyReason, Issued, Verdict},
};

mod classify;
mod codec;
mod engine;
mod form;
mod future;
mod layer;
mod options;
mod provider;
mod request;
mod response;
mod service;
mod verdict;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
