use std::{
    future::Future,
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

/// Shared timing primitive for all controllers: fires immediately, then once
/// per `period`. Each tick runs on its own task so a slow fetch never delays
/// the next tick (overlapping attempts are resolved by ticket order).
///
/// The loop holds only a `Weak` reference to the controller; once every
/// external handle is dropped the next tick exits the loop, so a forgotten
/// `stop()` cannot leak a poll against the backend forever.
pub(crate) fn spawn_poll_loop<C, F, Fut>(controller: &Arc<C>, period: Duration, tick: F) -> JoinHandle<()>
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let weak: Weak<C> = Arc::downgrade(controller);
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(strong) = weak.upgrade() else { break };
            tokio::spawn(tick(strong));
        }
    })
}
