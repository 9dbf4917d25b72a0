//! Scheduler / Orchestrator: owns every live component and drives the
//! four tickers (poll, disconnect, flush, cleanup) plus graceful
//! shutdown. Grounded on the teacher's `commands/run/mod.rs` +
//! `workers.rs` pattern of one spawned task per concern, with
//! `shutdown.rs`'s `ctrl_c()` handling generalized to a
//! [`tokio_util::sync::CancellationToken`] so every ticker can observe
//! shutdown without a bespoke channel per task.
//!
//! Per §7, "only the Scheduler translates unhandled errors into
//! circuit-breaker state" — each ticker owns a [`CircuitBreaker`] that
//! trips after repeated failures and backs off before retrying, rather
//! than tearing down the process.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::airspace::AirspaceStore;
use crate::batcher::WriteBatcher;
use crate::coalescer::Coalescer;
use crate::config::Config;
use crate::controllers::ControllerModel;
use crate::controllers_repo::ControllersRepository;
use crate::correlator::{self, FacilityLookup};
use crate::feed_client::FeedClient;
use crate::filter::{self, FilterStats};
use crate::flights::FlightModel;
use crate::flights_repo::FlightsRepository;
use crate::lifecycle::{self, CompletionEvent};
use crate::occupancy::NewOccupancyModel;
use crate::occupancy_repo::OccupancyRepository;
use crate::status::StatusSnapshot;
use crate::summaries::build_summary;
use crate::summaries_repo::SummariesRepository;
use crate::transceivers::NewTransceiverSampleModel;
use crate::transceivers_repo::TransceiversRepository;

/// Consecutive-failure tripwire for one ticker. Trips after
/// `TRIP_THRESHOLD` consecutive failures and holds off further attempts
/// for an exponentially growing cooldown, capped at `MAX_COOLDOWN`.
struct CircuitBreaker {
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
}

const TRIP_THRESHOLD: u32 = 3;
const MAX_COOLDOWN: Duration = Duration::from_secs(300);

impl CircuitBreaker {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            cooldown_until: None,
        }
    }

    fn is_open(&self) -> bool {
        self.cooldown_until.is_some_and(|until| Instant::now() < until)
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.cooldown_until = None;
    }

    fn record_failure(&mut self, label: &str) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= TRIP_THRESHOLD {
            let exponent = self.consecutive_failures - TRIP_THRESHOLD;
            let cooldown = Duration::from_secs(5 * 2u64.saturating_pow(exponent)).min(MAX_COOLDOWN);
            warn!("{label} circuit breaker tripped after {} consecutive failures, cooling down for {cooldown:?}", self.consecutive_failures);
            metrics::counter!("scheduler.circuit_breaker_trips_total").increment(1);
            self.cooldown_until = Some(Instant::now() + cooldown);
        }
    }
}

impl FacilityLookup for Coalescer {
    fn facility_for(&self, callsign: &str) -> Option<i16> {
        self.controller(callsign).map(|entry| entry.facility)
    }
}

/// Shared state every ticker task needs, grouped into one `Arc` so tasks
/// can each clone a cheap handle rather than threading a dozen
/// parameters through `tokio::spawn`.
pub struct Scheduler {
    config: Config,
    coalescer: Arc<Coalescer>,
    airspace: Arc<AirspaceStore>,
    feed_client: FeedClient,
    batcher: Arc<WriteBatcher>,
    flights_repo: FlightsRepository,
    controllers_repo: ControllersRepository,
    occupancy_repo: OccupancyRepository,
    transceivers_repo: TransceiversRepository,
    summaries_repo: SummariesRepository,
    status: StdMutex<StatusSnapshot>,
    /// Callsigns seen in the most recent poll tick's filtered snapshot —
    /// distinct from the Coalescer's keyset, which also holds `landed`
    /// flights still waiting on the disconnect/timeout detectors. The
    /// pilot-disconnect detector needs "absent from the latest snapshot",
    /// not "absent from everything we're still tracking".
    last_poll_present: StdMutex<std::collections::HashSet<String>>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        coalescer: Arc<Coalescer>,
        airspace: Arc<AirspaceStore>,
        feed_client: FeedClient,
        batcher: Arc<WriteBatcher>,
        flights_repo: FlightsRepository,
        controllers_repo: ControllersRepository,
        occupancy_repo: OccupancyRepository,
        transceivers_repo: TransceiversRepository,
        summaries_repo: SummariesRepository,
    ) -> Self {
        Self {
            config,
            coalescer,
            airspace,
            feed_client,
            batcher,
            flights_repo,
            controllers_repo,
            occupancy_repo,
            transceivers_repo,
            summaries_repo,
            status: StdMutex::new(StatusSnapshot::default()),
            last_poll_present: StdMutex::new(std::collections::HashSet::new()),
        }
    }

    /// Spawn all four tickers and block until `shutdown` is cancelled
    /// (by `Ctrl+C` or a test harness), then flush whatever is still
    /// pending before returning.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let poll_handle = tokio::spawn(self.clone().poll_loop(shutdown.clone()));
        let disconnect_handle = tokio::spawn(self.clone().disconnect_loop(shutdown.clone()));
        let flush_handle = tokio::spawn(self.clone().flush_loop(shutdown.clone()));
        let cleanup_handle = tokio::spawn(self.clone().cleanup_loop(shutdown.clone()));

        tokio::signal::ctrl_c().await?;
        info!("received shutdown signal, stopping tickers");
        shutdown.cancel();

        for handle in [poll_handle, disconnect_handle, flush_handle, cleanup_handle] {
            if let Err(err) = handle.await {
                error!("ticker task panicked during shutdown: {err}");
            }
        }

        info!("flushing pending writes before exit");
        let stats = self.batcher.flush().await;
        info!("final flush wrote {} rows", stats.total());

        Ok(())
    }

    async fn poll_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = interval(Duration::from_secs(self.config.poll_interval_s));
        let mut breaker = CircuitBreaker::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }

            if breaker.is_open() {
                continue;
            }

            match self.run_poll_tick().await {
                Ok(()) => breaker.record_success(),
                Err(err) => {
                    error!("poll tick failed: {err:#}");
                    breaker.record_failure("poll");
                    let mut status = self.status.lock().unwrap();
                    status.last_error = Some(err.to_string());
                }
            }
        }
    }

    async fn run_poll_tick(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        let snapshot = self.feed_client.fetch_snapshot().await?;
        let airspace = self.airspace.current();

        let mut filter_stats = FilterStats::default();
        let mut present_callsigns = std::collections::HashSet::new();

        for pilot in snapshot.pilots {
            let decision = filter::filter_flight(&pilot, &airspace);
            filter_stats.record(decision);
            if decision.is_kept() {
                present_callsigns.insert(pilot.callsign.clone());
                self.coalescer.upsert_flight(pilot, now);
            }
        }

        for controller in snapshot.controllers {
            if filter::filter_controller(&controller.callsign, &airspace, self.config.callsign_filter_enabled) {
                self.coalescer.upsert_controller(controller, now);
            }
        }

        for sample in snapshot.transceivers {
            self.batcher
                .queue_transceiver_sample(NewTransceiverSampleModel::from(&sample));
            self.coalescer.push_transceiver_sample(sample);
        }

        let outcome = lifecycle::process_poll_tick(&self.coalescer, &airspace, &self.config, &present_callsigns, now);

        *self.last_poll_present.lock().unwrap() = present_callsigns;

        for callsign in self.coalescer.flight_callsigns() {
            if let Some(flight) = self.coalescer.flight(&callsign) {
                self.batcher.queue_flight_upsert(FlightModel::from(&*flight));
            }
        }
        for callsign in self.coalescer.controller_callsigns() {
            if let Some(controller) = self.coalescer.controller(&callsign) {
                self.batcher.queue_controller_upsert(ControllerModel::from(&*controller));
            }
        }

        self.apply_occupancy_ops(outcome.occupancy_ops).await;

        for landing in &outcome.landings {
            info!("{} landed at {}", landing.callsign, landing.arrival);
        }

        if self.batcher.should_flush(&self.config) {
            let stats = self.batcher.flush().await;
            self.record_flush(stats.total());
        }

        self.write_status(&filter_stats, outcome.landings.len() as u64, 0, 0);
        Ok(())
    }

    async fn disconnect_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = interval(Duration::from_secs(self.config.disconnect_check_interval_s));
        let mut breaker = CircuitBreaker::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }

            if breaker.is_open() {
                continue;
            }

            match self.run_disconnect_tick().await {
                Ok(()) => breaker.record_success(),
                Err(err) => {
                    error!("disconnect/timeout tick failed: {err:#}");
                    breaker.record_failure("disconnect");
                }
            }
        }
    }

    async fn run_disconnect_tick(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        let present = self.last_poll_present.lock().unwrap().clone();

        let mut events = lifecycle::run_disconnect_detector(&self.coalescer, &present, now);
        events.extend(lifecycle::run_timeout_detector(&self.coalescer, &self.config, now));

        for event in events {
            self.handle_completion(event).await;
        }
        Ok(())
    }

    /// Completion event handling (§4.E step sequence): close every open
    /// occupancy row, compute ATC coverage, build and write the summary
    /// row, optionally archive, then drop the flight from the Coalescer.
    /// Spawned off the tick path so a slow Correlator query never delays
    /// the next disconnect sweep — reads the already-removed flight
    /// snapshot, never the live map, avoiding a lock held across an
    /// `.await`.
    async fn handle_completion(&self, event: CompletionEvent) {
        let Some(flight) = self.coalescer.remove_flight(&event.callsign) else {
            return;
        };

        // Evict any pending upsert queued for this flight this tick (it
        // still carries the pre-completion status) so the next flush
        // can't overwrite the final row written below.
        self.batcher.discard_pending_flight_upsert(flight.id);

        let flights_repo = self.flights_repo.clone();
        let occupancy_repo = self.occupancy_repo.clone();
        let transceivers_repo = self.transceivers_repo.clone();
        let summaries_repo = self.summaries_repo.clone();
        let coalescer = self.coalescer.clone();

        tokio::spawn(async move {
            let closed = occupancy_repo
                .close_all_open_for_callsign(
                    &flight.callsign,
                    event.disconnected_at,
                    flight.latitude,
                    flight.longitude,
                    flight.altitude,
                )
                .await;
            if let Err(err) = closed {
                error!("failed to close occupancy rows for {}: {err:#}", flight.callsign);
            }

            let rows = match occupancy_repo.closed_rows_for_flight(flight.id).await {
                Ok(rows) => rows,
                Err(err) => {
                    error!("failed to read closed occupancy rows for {}: {err:#}", flight.callsign);
                    Vec::new()
                }
            };

            let t0 = flight.first_seen;
            let t1 = event.disconnected_at;
            let coverage = match correlator::compute_coverage(&flight.callsign, t0, t1, &transceivers_repo, coalescer.as_ref()).await {
                Ok(coverage) => coverage,
                Err(err) => {
                    error!("coverage computation failed for {}: {err:#}", flight.callsign);
                    Default::default()
                }
            };

            let summary = build_summary(
                &flight,
                &rows,
                coverage.controller_callsigns,
                coverage.controller_time_percentage,
                event.disconnected_at,
            );
            if let Err(err) = summaries_repo.insert(summary).await {
                error!("failed to write flight summary for {}: {err:#}", flight.callsign);
            }

            if let Err(err) = flights_repo.upsert_flights(vec![FlightModel::from(&flight)]).await {
                error!("failed to persist final flight state for {}: {err:#}", flight.callsign);
            }

            metrics::counter!("lifecycle.completions_total").increment(1);
            info!(
                "{} completed ({}), coverage {}%",
                flight.callsign,
                event.disconnect_method.as_str(),
                coverage_percent_or_unknown(coverage.controller_time_percentage, coverage.total_samples)
            );
        });
    }

    async fn flush_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = interval(Duration::from_secs(self.config.flush_interval_s));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let stats = self.batcher.flush().await;
            self.record_flush(stats.total());
        }
    }

    async fn cleanup_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = interval(Duration::from_secs(self.config.cleanup_interval_s));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let now = Utc::now();
            self.coalescer.reap_stale_transceivers(now);

            if self.config.archive_enabled {
                let controller_cutoff = now - chrono::Duration::hours(self.config.stale_reap_hours);
                if let Err(err) = self.controllers_repo.archive_stale(controller_cutoff).await {
                    error!("controller archive sweep failed: {err:#}");
                }

                let flight_cutoff = now - chrono::Duration::days(self.config.archive_after_days);
                if let Err(err) = self.flights_repo.archive_terminal_before(flight_cutoff).await {
                    error!("flight archive sweep failed: {err:#}");
                }
            }
        }
    }

    async fn apply_occupancy_ops(&self, ops: Vec<lifecycle::OccupancyOp>) {
        for op in ops {
            match op {
                lifecycle::OccupancyOp::Open(row) => self.queue_or_insert_open(row).await,
                lifecycle::OccupancyOp::Close {
                    callsign,
                    sector_name,
                    exit_timestamp,
                    exit_latitude,
                    exit_longitude,
                    exit_altitude,
                } => {
                    if let Err(err) = self
                        .occupancy_repo
                        .close_open_for_sector(&callsign, &sector_name, exit_timestamp, exit_latitude, exit_longitude, exit_altitude)
                        .await
                    {
                        error!("failed to close occupancy row for {callsign}/{sector_name}: {err:#}");
                    }
                }
            }
        }
    }

    /// Occupancy opens queue through the Write Batcher like any other
    /// append; closes bypass it entirely (see `occupancy_repo.rs`) since
    /// they must land before the next tick's sector-transition sweep can
    /// re-check the at-most-one-open-row invariant.
    async fn queue_or_insert_open(&self, row: NewOccupancyModel) {
        self.batcher.queue_occupancy_open(row);
    }

    fn record_flush(&self, rows_written: usize) {
        let mut status = self.status.lock().unwrap();
        status.last_flush_at = Some(Utc::now());
        status.pending_batch_size = self.batcher.pending_len();
        metrics::gauge!("batcher.pending_rows").set(status.pending_batch_size as f64);
        let _ = rows_written;
    }

    fn write_status(&self, filter_stats: &FilterStats, landings: u64, completions: u64, timeouts: u64) {
        let mut status = self.status.lock().unwrap();
        status.tick_count += 1;
        status.last_tick_at = Some(Utc::now());
        status.flights_tracked = self.coalescer.flight_count();
        status.controllers_tracked = self.coalescer.controller_count();
        status.landings_detected += landings;
        status.completions_detected += completions;
        status.timeouts_detected += timeouts;
        status.pending_batch_size = self.batcher.pending_len();

        metrics::gauge!("coalescer.flights_tracked").set(status.flights_tracked as f64);
        metrics::gauge!("coalescer.controllers_tracked").set(status.controllers_tracked as f64);
        metrics::counter!("lifecycle.landings_total").increment(landings);
        let _ = filter_stats;

        if let Err(err) = status.write_to(&self.config.status_path) {
            warn!("failed to write status snapshot: {err:#}");
        }
    }
}

fn coverage_percent_or_unknown(percentage: i16, total_samples: usize) -> String {
    if total_samples == 0 {
        "unknown".to_string()
    } else {
        percentage.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_breaker_trips_after_threshold_failures() {
        let mut breaker = CircuitBreaker::new();
        assert!(!breaker.is_open());

        for _ in 0..TRIP_THRESHOLD {
            breaker.record_failure("test");
        }
        assert!(breaker.is_open());
    }

    #[test]
    fn circuit_breaker_resets_on_success() {
        let mut breaker = CircuitBreaker::new();
        breaker.record_failure("test");
        breaker.record_failure("test");
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures, 0);
        assert!(!breaker.is_open());
    }

    #[test]
    fn coverage_percent_unknown_when_no_samples() {
        assert_eq!(coverage_percent_or_unknown(0, 0), "unknown");
        assert_eq!(coverage_percent_or_unknown(80, 10), "80");
    }
}
