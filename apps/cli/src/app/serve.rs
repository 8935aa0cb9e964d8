use crate::args::Serve;
use crate::feed::Feed;
use color_eyre::eyre::Result;
use livecursor::{AttributeFilter, MemorySource};
use livecursor_api_ndjson::NdjsonServer;
use livecursor_common::optify;
use livecursor_common::time::Duration;
use tokio_util::sync::CancellationToken;

pub async fn run(opts: Serve) -> Result<()> {
    let source = MemorySource::new(&opts.name);
    let mut feed = Feed::new();
    source.seed(feed.batch(opts.seed));

    let server = NdjsonServer::bind(opts.listen.as_str(), source.clone())
        .await?
        .heartbeat_interval(Duration::from_millis(opts.heartbeat_ms));
    info!(uri = %server.uri()?, source = %opts.name, seeded = opts.seed, "listening");

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(server.serve(shutdown.clone()));
    if let Some(ms) = opts.interval_ms {
        let interval = Duration::from_millis(ms.max(1));
        tokio::spawn(publish(
            source.clone(),
            feed,
            interval,
            opts.delete_every,
            shutdown.child_token(),
        ));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    source.end();
    shutdown.cancel();
    server.await??;
    Ok(())
}

async fn publish(
    source: MemorySource,
    mut feed: Feed,
    interval: Duration,
    delete_every: Option<u64>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut published = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => (),
        }
        let record = feed.next_record();
        trace!(?record, "publishing");
        source.insert(vec![record]);
        published += 1;

        let Some(every) = delete_every.filter(|n| *n > 0) else {
            continue;
        };
        if published % every != 0 {
            continue;
        }
        let Some(id) = feed.published_id() else {
            continue;
        };
        if let Some(filter) = optify!(AttributeFilter::parse(&format!("id = {id}")), "bad delete filter") {
            let removed = source.delete_where(&filter);
            debug!(id, removed, "deleted vehicle");
        }
    }
    debug!(published, "publisher stopped");
}
