use std::sync::Arc;

use audionet::common::logger;
use audionet::common::types::AnyResult;
use audionet::configs::Config;
use audionet::loader::{ChannelSink, SinkEvent};
use audionet::{ByteWindow, ProxyManager, ResourceLoaderDelegate, ResourceRequest};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

const USAGE: &str = "usage: audionet <url> <output-file> [offset length]";

fn parse_args(args: &[String]) -> Option<(String, String, Option<ByteWindow>)> {
    match args {
        [url, output] => Some((url.clone(), output.clone(), None)),
        [url, output, offset, length] => {
            let window = ByteWindow::bounded(offset.parse().ok()?, length.parse().ok()?);
            Some((url.clone(), output.clone(), Some(window)))
        }
        _ => None,
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((url, output, window)) = parse_args(&args) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("{}; using built-in defaults", e);
        Config::default()
    });
    logger::init(&config);

    let manager = ProxyManager::from_config(&config)?;
    let (sink, mut events) = ChannelSink::new();
    let request = ResourceRequest::new(manager.proxied_url(&url), window, Arc::new(sink));
    let id = request.id;

    info!("Loading {} (window={:?}) into {}", url, window, output);
    let mut file = tokio::fs::File::create(&output).await?;
    manager.should_wait_for_loading(request);

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let mut written = 0u64;
    loop {
        tokio::select! {
            _ = &mut interrupt => {
                manager.did_cancel(id);
                warn!("Interrupted after {} bytes", written);
                return Err("interrupted".into());
            }
            event = events.recv() => match event {
                Some(SinkEvent::ContentInfo(info)) => {
                    info!(
                        "Content: type={}, length={:?}, byte ranges={}",
                        info.content_type.identifier(),
                        info.content_length,
                        info.byte_range_access
                    );
                }
                Some(SinkEvent::Data(chunk)) => {
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                Some(SinkEvent::Finished(Ok(()))) => {
                    file.flush().await?;
                    info!("Wrote {} bytes to {}", written, output);
                    return Ok(());
                }
                Some(SinkEvent::Finished(Err(e))) => {
                    error!("Loading failed after {} bytes: {}", written, e);
                    return Err(e.into());
                }
                None => return Err("loader dropped the request".into()),
            }
        }
    }
}
