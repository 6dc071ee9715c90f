use tokio::select;
use tokio_util::sync::CancellationToken;

/// Resolves once the process is asked to stop, or once someone else cancelled the token (the event
/// feed ending does that).
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => {},
    };
}
