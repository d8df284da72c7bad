use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Protects the expected token before it is handed to the client inside a cookie
///
/// Implementations are shared between all in-flight requests and have to be safe to call concurrently.
pub trait CookieProtector: Send + Sync + 'static {
    fn protect(&self, plaintext: &[u8]) -> Vec<u8>;

    /// Reverse [`CookieProtector::protect`]
    ///
    /// Return `None` for anything that wasn't produced by this protector.
    fn unprotect(&self, protected: &[u8]) -> Option<Vec<u8>>;
}

impl<T> CookieProtector for Box<T>
where
    T: CookieProtector + ?Sized,
{
    #[inline]
    fn protect(&self, plaintext: &[u8]) -> Vec<u8> {
        (**self).protect(plaintext)
    }

    #[inline]
    fn unprotect(&self, protected: &[u8]) -> Option<Vec<u8>> {
        (**self).unprotect(protected)
    }
}

/// Prepends a keyed BLAKE3 hash to the payload
///
/// This guards the integrity of the cookie only, the token itself stays readable.
/// That's fine for double-submit tokens since the cookie is `HttpOnly` and the token is handed out in plain anyway.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyedHashProtector {
    key: [u8; blake3::KEY_LEN],
}

impl KeyedHashProtector {
    #[must_use]
    pub fn new(key: [u8; blake3::KEY_LEN]) -> Self {
        Self { key }
    }

    /// Derive the key from some secret material
    #[must_use]
    pub fn derive(context: &str, material: &[u8]) -> Self {
        Self::new(blake3::derive_key(context, material))
    }

    /// Generate a random key
    ///
    /// Cookies protected with a generated key won't survive a restart.
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0; blake3::KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(key)
    }
}

impl CookieProtector for KeyedHashProtector {
    fn protect(&self, plaintext: &[u8]) -> Vec<u8> {
        let hash = blake3::keyed_hash(&self.key, plaintext);

        let mut protected = Vec::with_capacity(blake3::OUT_LEN + plaintext.len());
        protected.extend_from_slice(hash.as_bytes());
        protected.extend_from_slice(plaintext);
        protected
    }

    fn unprotect(&self, protected: &[u8]) -> Option<Vec<u8>> {
        if protected.len() < blake3::OUT_LEN {
            return None;
        }

        let (hash, plaintext) = protected.split_at(blake3::OUT_LEN);
        let expected_hash = blake3::keyed_hash(&self.key, plaintext);

        if bool::from(expected_hash.as_bytes()[..].ct_eq(hash)) {
            Some(plaintext.to_vec())
        } else {
            None
        }
    }
}

/// Turns expected tokens into cookie values and back
#[derive(Clone)]
pub struct CookieCodec<P> {
    protector: P,
}

impl<P> CookieCodec<P>
where
    P: CookieProtector,
{
    #[must_use]
    pub fn new(protector: P) -> Self {
        Self { protector }
    }

    /// Protect the token and encode it as standard base64
    #[must_use]
    pub fn encode(&self, token: &str) -> String {
        let protected = self.protector.protect(token.as_bytes());
        base64_simd::STANDARD.encode_to_string(protected)
    }

    /// Recover the token from a cookie value
    ///
    /// Malformed base64, foreign or tampered payloads, and empty tokens are all treated as "no token".
    #[must_use]
    pub fn decode(&self, value: &str) -> Option<Zeroizing<String>> {
        let protected = base64_simd::STANDARD
            .decode_to_vec(value)
            .inspect_err(|error| debug!(?error, "failed to decode csrf cookie"))
            .ok()?;

        let Some(plaintext) = self.protector.unprotect(&protected) else {
            debug!("csrf cookie failed verification");
            return None;
        };

        let token = String::from_utf8(plaintext)
            .inspect_err(|error| debug!(?error, "csrf cookie isn't valid utf-8"))
            .ok()?;

        (!token.is_empty()).then(|| Zeroizing::new(token))
    }
}
