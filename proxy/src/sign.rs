use bytes::Bytes;
use graphsign_aws_v4::{Credential, RequestSigner};
use graphsign_core::utils::Redact;
use graphsign_core::{Context, ProvideCredential, Signer};
use log::debug;

use crate::error::Result;
use crate::query::IamOptions;

/// Signs upstream requests when, and only when, IAM options are present.
///
/// All clones share one credential cache.
#[derive(Debug, Clone)]
pub struct IamSigner {
    signer: Signer<Credential>,
}

impl IamSigner {
    /// Create a signer that resolves credentials through `provider`.
    pub fn new(
        ctx: Context,
        provider: impl ProvideCredential<Credential = Credential>,
        default_service_type: &str,
    ) -> Self {
        // Region and service are replaced per request.
        let builder = RequestSigner::new(default_service_type, "us-east-1");
        Self {
            signer: Signer::new(ctx, provider, builder),
        }
    }

    /// Sign `req` for `iam`, or hand it back untouched when `iam` is `None`.
    ///
    /// The body must already be the exact bytes that go on the wire.
    pub async fn sign(
        &self,
        req: http::Request<Bytes>,
        iam: Option<&IamOptions>,
    ) -> Result<http::Request<Bytes>> {
        let Some(iam) = iam else {
            return Ok(req);
        };

        let (mut parts, body) = req.into_parts();
        self.signer
            .with_builder(RequestSigner::new(&iam.service, &iam.region))
            .sign(&mut parts, &body)
            .await?;
        if let Some(auth) = parts.headers.get(http::header::AUTHORIZATION) {
            debug!(
                "signed {} {} for {}/{}: {}",
                parts.method,
                parts.uri,
                iam.region,
                iam.service,
                Redact::from(auth)
            );
        }

        Ok(http::Request::from_parts(parts, body))
    }
}
