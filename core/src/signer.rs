use crate::{Context, Error, ProvideCredential, Result, SignRequest, SigningCredential};
use std::sync::{Arc, Mutex};

/// Signer is the main struct used to sign the request.
///
/// Credentials are cached in memory and shared by every clone of the signer,
/// including clones produced by [`Signer::with_builder`]. A cached credential
/// is reused until [`SigningCredential::is_valid`] reports otherwise.
#[derive(Clone, Debug)]
pub struct Signer<K: SigningCredential> {
    ctx: Context,
    loader: Arc<dyn ProvideCredential<Credential = K>>,
    builder: Arc<dyn SignRequest<Credential = K>>,
    credential: Arc<Mutex<Option<K>>>,
}

impl<K: SigningCredential> Signer<K> {
    /// Create a new signer.
    pub fn new(
        ctx: Context,
        loader: impl ProvideCredential<Credential = K>,
        builder: impl SignRequest<Credential = K>,
    ) -> Self {
        Self {
            ctx,

            loader: Arc::new(loader),
            builder: Arc::new(builder),
            credential: Arc::new(Mutex::new(None)),
        }
    }

    /// Return a signer that signs with `builder` but shares this signer's
    /// context, loader and credential cache.
    ///
    /// Used when signing parameters such as region change per request.
    pub fn with_builder(&self, builder: impl SignRequest<Credential = K>) -> Self {
        Self {
            ctx: self.ctx.clone(),
            loader: self.loader.clone(),
            builder: Arc::new(builder),
            credential: self.credential.clone(),
        }
    }

    /// Get the context used by this signer.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Load a valid credential, from the cache if possible.
    ///
    /// Returns a `CredentialUnavailable` error if the loader has nothing to offer.
    pub async fn credential(&self) -> Result<K> {
        let cached = self.credential.lock().expect("lock poisoned").clone();
        if let Some(cred) = cached.filter(|c| c.is_valid()) {
            return Ok(cred);
        }

        let loaded = self.loader.provide_credential(&self.ctx).await?;
        let Some(cred) = loaded.filter(|c| c.is_valid()) else {
            return Err(Error::credential_unavailable(
                "no valid credential found in the configured providers",
            ));
        };

        *self.credential.lock().expect("lock poisoned") = Some(cred.clone());
        Ok(cred)
    }

    /// Signing request.
    ///
    /// `body` must be the exact bytes that will be sent with the request.
    pub async fn sign(&self, req: &mut http::request::Parts, body: &[u8]) -> Result<()> {
        let cred = self.credential().await?;

        self.builder.sign_request(&self.ctx, req, body, &cred).await
    }
}
