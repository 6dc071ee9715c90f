use anyhow::Result;
use tokio::{io::AsyncBufRead, sync::mpsc};
use tokio_stream::{wrappers::LinesStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use crate::host::{tab_table::TabTable, HostEvent};

/// Reads the host's newline-delimited json event feed. Every event is recorded in the [TabTable]
/// right away and then handed to the debounce stage.
pub struct EventSource<R> {
    next: mpsc::Sender<HostEvent>,
    lines: LinesStream<R>,
    tabs: TabTable,
    shutdown: CancellationToken,
}

impl<R: AsyncBufRead + Unpin> EventSource<R> {
    pub fn new(
        input: R,
        next: mpsc::Sender<HostEvent>,
        tabs: TabTable,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            next,
            lines: LinesStream::new(tokio::io::AsyncBufReadExt::lines(input)),
            tabs,
            shutdown,
        }
    }

    /// Runs until the feed ends or shutdown is requested. Ending the feed requests shutdown for
    /// everyone else. Returning drops the sender, which lets the debounce stage finish.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                line = self.lines.next() => line,
            };

            match line {
                Some(Ok(line)) => self.accept(&line).await?,
                Some(Err(e)) => {
                    error!("Failed to read the event feed {e:?}");
                    self.shutdown.cancel();
                    return Err(e.into());
                }
                None => {
                    info!("Event feed ended");
                    self.shutdown.cancel();
                    return Ok(());
                }
            }
        }
    }

    async fn accept(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let event = match serde_json::from_str::<HostEvent>(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed event {line}: {e}");
                return Ok(());
            }
        };
        trace!("Received {event:?}");

        if let Err(e) = self.tabs.record(&event) {
            error!("Failed to record {event:?} {e:?}");
        }

        self.next
            .send(event)
            .await
            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
        Ok(())
    }
}
