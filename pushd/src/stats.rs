//! Periodic stats reporting loop (§6, §4.6, source's `Stats.Start`).

use std::sync::Arc;
use std::time::Duration;

use pushd_core::pubsub::Broker;
use pushd_core::sinks::StatsSink;

pub async fn run(broker: Arc<Broker>, sink: Arc<dyn StatsSink>, interval: Duration) {
    loop {
        compio::time::sleep(interval).await;
        sink.report(broker.stats_snapshot());
    }
}
