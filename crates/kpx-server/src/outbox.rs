//! Background outbox delivery.

use std::sync::Arc;

use kpx_config::OutboxConfig;
use kpx_db::dispatch::OutboxDispatcher;
use kpx_db::service::KpxService;
use tokio::time::MissedTickBehavior;

/// Deliver pending outbox events every `config.interval()` until the task
/// is dropped.
pub async fn run_dispatcher(svc: Arc<KpxService>, config: OutboxConfig) {
    let dispatcher = OutboxDispatcher::new(config.max_attempts);
    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match dispatcher
            .deliver_pending(&svc, &*svc, config.batch_size)
            .await
        {
            Ok(report) if report.total() > 0 => tracing::info!(
                delivered = report.delivered,
                retried = report.retried,
                failed = report.failed,
                deferred = report.deferred,
                "outbox pass complete"
            ),
            Ok(_) => {}
            Err(e) => tracing::error!("outbox pass failed: {e}"),
        }
    }
}
