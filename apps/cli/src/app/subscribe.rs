use crate::args::Subscribe;
use color_eyre::eyre::Result;
use livecursor::{
    CancelReason, CancellationController, CursorError, RealtimeCursor, Row, Subscription,
    SubscriptionConfig,
};
use livecursor_api_ndjson::NdjsonTransport;
use livecursor_common::time::{sleep, Duration};
use livecursor_common::{optify, BackoffRetry, RetryableError};

enum Stop {
    Ended,
    Limit,
}

pub async fn run(opts: Subscribe) -> Result<()> {
    let config = SubscriptionConfig::builder()
        .buffer_size(opts.buffer)
        .replay(opts.replay)
        .build();
    let initial = BackoffRetry::builder()
        .retries(opts.max_retries)
        .duration(Duration::from_millis(250))
        .build();
    let mut retry = initial;

    let interrupt = CancellationController::new();
    let ctrl_c = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut printed = 0u64;
    loop {
        let subscription = Subscription::new(NdjsonTransport::new(), &opts.url, config.clone());
        let before = printed;
        let outcome = match subscription.open(opts.filter.as_deref()).await {
            Ok(cursor) => print_rows(cursor, &opts, &interrupt, &mut printed).await,
            Err(e) => Err(e),
        };
        subscription.close();
        if printed > before {
            retry.reset(initial);
        }

        let err = match outcome {
            Ok(Stop::Ended) => {
                info!(printed, "source ended");
                return Ok(());
            }
            Ok(Stop::Limit) => {
                info!(printed, "row limit reached");
                return Ok(());
            }
            Err(e) => e,
        };
        match err {
            CursorError::Cancelled(CancelReason::Timeout) => {
                info!(printed, "no rows before the timeout");
                return Ok(());
            }
            CursorError::Cancelled(CancelReason::Requested) => {
                info!(printed, "interrupted");
                return Ok(());
            }
            e if opts.reconnect && should_reconnect(&e) && retry.can_retry() => {
                let delay = retry.next_delay();
                warn!(error = %e, attempt = retry.attempts(), ?delay, "subscription lost, reconnecting");
                sleep(delay).await;
            }
            e => return Err(e.into()),
        }
    }
}

/// Connection failures are reopened when they are retryable; a faulted
/// stream always gets a fresh subscription.
fn should_reconnect(e: &CursorError) -> bool {
    e.is_faulted() || matches!(e, CursorError::Connection(_) if e.is_retryable())
}

async fn print_rows(
    mut cursor: RealtimeCursor,
    opts: &Subscribe,
    interrupt: &CancellationController,
    printed: &mut u64,
) -> Result<Stop, CursorError> {
    let timeout = opts.timeout.map(Duration::from_secs);
    while cursor.wait_for_rows_with(timeout, interrupt).await? {
        while cursor.advance()? {
            let row = cursor.current()?;
            if let Some(line) = format_row(row, opts.json) {
                println!("{line}");
            }
            *printed += 1;
            if opts.max_rows.is_some_and(|max| *printed >= max) {
                cursor.close();
                return Ok(Stop::Limit);
            }
        }
    }
    debug!(stats = ?cursor.stats(), "cursor closed");
    Ok(Stop::Ended)
}

fn format_row(row: &Row, json: bool) -> Option<String> {
    if json {
        return optify!(serde_json::to_string(row), "failed to encode row");
    }
    let fields = row
        .record()
        .fields()
        .iter()
        .map(|f| format!("{}={}", f.name, f.value))
        .collect::<Vec<_>>()
        .join(" ");
    Some(format!("{:<12} {fields}", row.origin().to_string()))
}
