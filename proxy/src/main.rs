use std::sync::Arc;

use graphsign_aws_v4::DefaultCredentialProvider;
use graphsign_core::{Context, OsEnv};
use graphsign_file_read_tokio::TokioFileRead;
use graphsign_http_send_reqwest::ReqwestHttpSend;
use graphsign_proxy::{router, serve, Config, Proxy, ReqwestTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let ctx = Context::new()
        .with_file_read(TokioFileRead)
        .with_http_send(ReqwestHttpSend::default())
        .with_env(OsEnv);

    let config = Config::from_env(&ctx)?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();
    log::debug!("loaded config: {config:?}");

    let proxy = Proxy::new(
        ctx,
        DefaultCredentialProvider::new(),
        Arc::new(ReqwestTransport::new()?),
        &config,
    );
    serve(&config, router(proxy)).await
}
