use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jotter::api::{self, AppState};
use jotter::config::Config;
use jotter::image_store::{HostedImageStore, ImageStore, MemoryImageStore};
use jotter::lifecycle::NoteService;
use jotter::rate_limit::RequestQuotas;
use jotter::storage::create_operator_from_uri;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("jotter=info,tower_http=info")),
        )
        .with(fmt::layer())
        .init();

    let config = Config::from_env();
    let op = create_operator_from_uri(&config.storage_uri)?;
    info!(uri = %config.storage_uri, "document store ready");

    let images: Arc<dyn ImageStore> = match &config.image_host {
        Some(host) => {
            info!(cloud = %host.cloud_name, folder = %host.folder, "using hosted image store");
            Arc::new(HostedImageStore::new(host))
        }
        None => {
            warn!("image host credentials not set, images are kept in process memory");
            Arc::new(MemoryImageStore::new())
        }
    };

    let notes = Arc::new(NoteService::new(op, images, config.max_image_bytes));
    let quotas = config.rate_limit_enabled.then(|| Arc::new(RequestQuotas::new()));
    if quotas.is_none() {
        warn!("rate limiting is disabled");
    }

    let app = api::router(AppState {
        notes,
        quotas,
        max_image_bytes: config.max_image_bytes,
    });

    let listener = TcpListener::bind(config.bind).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
