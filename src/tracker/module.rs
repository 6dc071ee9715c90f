use std::future::Future;

use anyhow::Result;

use crate::host::HostEvent;

/// Consumer at the end of the event pipeline. The tracker is the real one; tests plug in
/// recorders.
pub trait EventProcessor {
    fn process_next(&mut self, event: HostEvent) -> impl Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl Future<Output = Result<()>>;
}
