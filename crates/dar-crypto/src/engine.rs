//! The pluggable crypto capability interface and scoped engine override.

use std::cell::RefCell;
use std::sync::Arc;

use serde_json::Value;

use crate::error::CryptoError;

/// The four operations a crypto engine must provide.
///
/// Implementing this trait is what "registering" a custom engine means; an
/// engine missing any operation simply does not compile. `context` is an
/// opaque caller-supplied value threaded through from the protocol layer,
/// ignored by the default engine.
pub trait Encryptor: Send + Sync {
    /// Sign `payload` with the provider's private key (base64 DER).
    fn sign(
        &self,
        payload: &[u8],
        private_key: &str,
        context: Option<&Value>,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Check `signature` over `payload` against one public key (base64
    /// SubjectPublicKeyInfo). A malformed key is an error; a signature that
    /// merely does not match is `Ok(false)`.
    fn verify(
        &self,
        payload: &[u8],
        signature: &[u8],
        public_key: &str,
        context: Option<&Value>,
    ) -> Result<bool, CryptoError>;

    /// Encrypt `plaintext` under the provider's 32-byte symmetric key,
    /// returning a self-contained envelope.
    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8],
        context: Option<&Value>,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt an envelope produced by `encrypt`.
    fn decrypt(
        &self,
        envelope: &[u8],
        key: &[u8],
        context: Option<&Value>,
    ) -> Result<Vec<u8>, CryptoError>;
}

thread_local! {
    static SCOPED_ENGINES: RefCell<Vec<Arc<dyn Encryptor>>> = const { RefCell::new(Vec::new()) };
}

struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPED_ENGINES.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Run `f` with `encryptor` installed as this thread's engine.
///
/// The override is confined to the current thread and removed when `f`
/// returns, unwinds, or exits early — restoration rides on a drop guard.
/// Nested scopes stack; the innermost engine wins.
pub fn with_encryptor<T>(encryptor: Arc<dyn Encryptor>, f: impl FnOnce() -> T) -> T {
    SCOPED_ENGINES.with(|stack| stack.borrow_mut().push(encryptor));
    let _guard = ScopeGuard;
    f()
}

/// The engine installed by the innermost active [`with_encryptor`] scope on
/// this thread, if any.
pub fn scoped_encryptor() -> Option<Arc<dyn Encryptor>> {
    SCOPED_ENGINES.with(|stack| stack.borrow().last().cloned())
}
