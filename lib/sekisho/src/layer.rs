use crate::{engine::Gate, SekishoService};
use tower::Layer;
use triomphe::Arc;

/// Layer wrapping services with the anti-forgery gate
///
/// Construct it through [`Sekisho`](crate::Sekisho).
pub struct SekishoLayer<P> {
    pub(crate) gate: Arc<Gate<P>>,
}

impl<P> SekishoLayer<P> {
    pub(crate) fn new(gate: Gate<P>) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }

    #[inline]
    #[must_use]
    pub fn gate(&self) -> &Gate<P> {
        &self.gate
    }
}

impl<P> Clone for SekishoLayer<P> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<S, P> Layer<S> for SekishoLayer<P> {
    type Service = SekishoService<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        SekishoService::new(inner, Arc::clone(&self.gate))
    }
}
