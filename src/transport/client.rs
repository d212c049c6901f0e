use tracing::{debug, warn};

use crate::common::types::AnyResult;
use crate::configs::TransportConfig;

/// Build a `reqwest::Client` for range streaming from the transport config.
///
/// The client-wide timeout bounds a whole task (headers plus body); the
/// per-read request timeout is enforced by the transport itself.
pub fn create_client(config: &TransportConfig) -> AnyResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.resource_timeout())
        .connect_timeout(config.connect_timeout())
        .tcp_nodelay(true);

    if let Some(proxy_config) = &config.proxy {
        if let Some(p_url) = &proxy_config.url {
            match reqwest::Proxy::all(p_url) {
                Ok(mut proxy_obj) => {
                    if let (Some(u), Some(p)) = (&proxy_config.username, &proxy_config.password) {
                        proxy_obj = proxy_obj.basic_auth(u, p);
                    }
                    builder = builder.proxy(proxy_obj);
                    debug!("Configured outbound proxy: {}", p_url);
                }
                Err(e) => {
                    warn!(
                        "Failed to parse proxy URL '{}': {} - proxy will be ignored",
                        p_url, e
                    );
                }
            }
        }
    }

    Ok(builder.build()?)
}
