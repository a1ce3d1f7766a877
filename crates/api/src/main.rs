use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lastbasket_observability::init();

    let config = lastbasket_api::config::Config::from_env();
    let addr = config.addr.clone();
    let app = lastbasket_api::app::build_app(config).await;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
