use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Service configuration, read once from the environment at startup and
/// passed into the components that need it.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    /// Document store URI, see `storage::create_operator_from_uri`.
    pub storage_uri: String,
    /// Hosted image service credentials; `None` falls back to the in-memory
    /// image store.
    pub image_host: Option<ImageHostConfig>,
    /// Upload size cap enforced before any image leaves the process.
    pub max_image_bytes: usize,
    pub rate_limit_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct ImageHostConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

impl Config {
    pub fn from_env() -> Self {
        let host: IpAddr = env::var("JOTTER_HOST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            bind: SocketAddr::new(host, port),
            storage_uri: env::var("JOTTER_STORAGE_URI").unwrap_or_else(|_| "memory://".to_string()),
            image_host: ImageHostConfig::from_env(),
            max_image_bytes: env::var("JOTTER_MAX_IMAGE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_IMAGE_BYTES),
            rate_limit_enabled: env::var("JOTTER_RATE_LIMIT")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        }
    }
}

impl ImageHostConfig {
    /// `Some` only when the full credential set is present.
    fn from_env() -> Option<Self> {
        Some(Self {
            cloud_name: env::var("CLOUDINARY_CLOUD_NAME").ok()?,
            api_key: env::var("CLOUDINARY_API_KEY").ok()?,
            api_secret: env::var("CLOUDINARY_API_SECRET").ok()?,
            folder: env::var("JOTTER_IMAGE_FOLDER").unwrap_or_else(|_| "notes".to_string()),
        })
    }
}
