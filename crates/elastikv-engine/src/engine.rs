//! The per-period control loop.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use elastikv_actuator::Actuator;
use elastikv_cluster::ClusterBackend;
use elastikv_control::{FeedForwardClassifier, Filter, PidController};
use elastikv_core::ControlConfig;

use crate::probe::ProbeRegistry;
use crate::report::{Decision, PeriodRecord, ReportWriter};
use crate::sample::PeriodAggregate;

/// Smallest per-node throughput target the feedback path will divide by.
const OUTPUT_FLOOR: f64 = 50.0;
/// Smallest node-count change a feed-forward estimate must propose when
/// latency is beyond the 50% band around the operating point; anything
/// weaker contradicts the deviation that triggered feed-forward.
const FF_PLAUSIBLE_DELTA: i32 = 3;

/// Drives one sampling period at a time: poll the probes, aggregate,
/// run the decision state machine, hand any delta to the actuator, and
/// append one record to the period report.
pub struct DecisionEngine<W: Write> {
    cfg: ControlConfig,
    probes: ProbeRegistry,
    actuator: Arc<Actuator>,
    cluster: Arc<dyn ClusterBackend>,
    filter: Filter,
    pid: PidController,
    classifier: FeedForwardClassifier,
    report: ReportWriter<W>,

    period: u64,
    /// Warm-up ticks remaining; control is live once this goes negative.
    warmup: i64,
    /// First period after which feed-forward may fire again.
    next_ff: u64,
    last_tps: f64,
    first_period: bool,
    /// Sticky large-throughput-swing flag, consumed by the feed-forward
    /// trigger.
    big_tp_change: bool,
}

impl<W: Write> DecisionEngine<W> {
    pub fn new(
        cfg: ControlConfig,
        probes: ProbeRegistry,
        actuator: Arc<Actuator>,
        cluster: Arc<dyn ClusterBackend>,
        report_sink: W,
    ) -> Self {
        let filter = Filter::new(cfg.filter_alpha);
        let pid = PidController::new(cfg.input_op, cfg.setpoint, cfg.kp, cfg.ki, cfg.kd);
        let classifier =
            FeedForwardClassifier::new(cfg.ff_read1, cfg.ff_mixed1, cfg.ff_read2, cfg.ff_mixed2);
        Self {
            // warmup_periods = N means exactly N Warmup ticks; the last
            // one (counter 0) clears the control history.
            warmup: cfg.warmup_periods as i64 - 1,
            cfg,
            probes,
            actuator,
            cluster,
            filter,
            pid,
            classifier,
            report: ReportWriter::new(report_sink),
            period: 0,
            next_ff: 0,
            last_tps: 0.0,
            first_period: true,
            big_tp_change: false,
        }
    }

    /// Run sampling periods until the shutdown channel fires.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            interval_secs = self.cfg.sampling_interval_secs,
            "decision engine running"
        );
        loop {
            tokio::select! {
                res = self.tick() => res?,
                _ = shutdown.changed() => {
                    info!("decision engine stopping");
                    return Ok(());
                }
            }
        }
    }

    /// One full sampling period: sleep, poll, decide, record.
    pub async fn tick(&mut self) -> anyhow::Result<()> {
        let started = Instant::now();
        tokio::time::sleep(self.cfg.sampling_interval()).await;

        let agg = self.poll_probes().await;
        let probe_count = self.probes.len().await;
        let elapsed = started.elapsed().as_secs_f64();

        let record = self.observe(elapsed, probe_count, &agg);
        self.report.write(&record)?;
        self.actuator.pump();
        Ok(())
    }

    async fn poll_probes(&self) -> PeriodAggregate {
        let mut agg = PeriodAggregate::new();
        let timeout = self.cfg.probe_timeout();
        let mut probes = self.probes.lock().await;
        for probe in probes.iter_mut() {
            match probe.poll(timeout).await {
                Ok(Some(sample)) => agg.merge(&sample),
                Ok(None) => debug!(probe = %probe.label(), "no data this period"),
                // A failed probe sits out this period but stays
                // registered; removal is an explicit external action.
                Err(e) => warn!(probe = %probe.label(), error = %e, "probe poll failed"),
            }
        }
        agg
    }

    /// Evaluate one period's aggregate and produce its report record.
    pub fn observe(
        &mut self,
        elapsed_secs: f64,
        probe_count: usize,
        agg: &PeriodAggregate,
    ) -> PeriodRecord {
        let nodes = self.actuator.active_nodes();
        let node_div = nodes.max(1) as f64;
        let total_ops = agg.total_ops();
        let throughput = total_ops / elapsed_secs;
        let tps = throughput / node_div;
        let read_tps = agg.read.ops() / elapsed_secs / node_div;
        let mixed_tps = agg.mixed.ops() / elapsed_secs / node_div;
        let filtered = self.filter.step(agg.read.p99());

        let decision = self.decide(filtered, throughput, tps, read_tps, mixed_tps, nodes);

        let record = PeriodRecord {
            period: self.period,
            elapsed_secs,
            probes: probe_count,
            nodes,
            total_ops,
            throughput,
            tps_per_node: tps,
            read_tps_per_node: read_tps,
            read_mean: agg.read.mean(),
            read_stddev: agg.read.stddev(),
            read_min: agg.read.min(),
            read_p95: agg.read.p95(),
            read_p99: agg.read.p99(),
            read_p99_filtered: filtered,
            read_max: agg.read.max(),
            mixed_mean: agg.mixed.mean(),
            mixed_stddev: agg.mixed.stddev(),
            mixed_min: agg.mixed.min(),
            mixed_p95: agg.mixed.p95(),
            mixed_p99: agg.mixed.p99(),
            mixed_max: agg.mixed.max(),
            output_error: tps - self.cfg.output_op,
            input_error: filtered - self.cfg.input_op,
            decision,
        };

        self.last_tps = tps;
        self.first_period = false;
        self.period += 1;
        record
    }

    fn decide(
        &mut self,
        filtered: f64,
        throughput: f64,
        tps: f64,
        read_tps: f64,
        mixed_tps: f64,
        nodes: u32,
    ) -> Decision {
        if self.warmup >= 0 {
            if self.warmup == 0 {
                // Last warm-up tick: stale startup data must not seed
                // live control.
                debug!("warm-up over, clearing control history");
                self.filter.reset();
                self.pid.reset();
            }
            self.warmup -= 1;
            return Decision::Warmup;
        }

        if !self.first_period
            && !self.actuator.is_rebalancing()
            && (tps - self.last_tps).abs() > self.cfg.ff_throughput_delta
        {
            info!(tps, last = self.last_tps, "large throughput swing flagged");
            self.big_tp_change = true;
        }

        if self.actuator.provisions_nodes() {
            match self.cluster.observed_node_count() {
                Ok(observed) if observed != nodes => {
                    warn!(
                        observed,
                        bookkept = nodes,
                        "cluster size disagrees with bookkeeping"
                    );
                    self.filter.reset();
                    self.pid.reset();
                    return Decision::Inconsistent;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "could not query cluster size"),
            }
        }

        let in_op = self.cfg.input_op;
        let dead = self.cfg.dead_band;
        if filtered >= in_op - 2.0 * dead && filtered <= in_op + dead {
            debug!(filtered, "latency inside the dead band");
            self.filter.reset();
            self.pid.reset();
            return Decision::DeadZone;
        }

        if self.actuator.is_rebalancing() {
            return Decision::Rebalancing;
        }

        if nodes <= self.actuator.min_nodes() && filtered <= in_op + dead {
            self.filter.reset();
            self.pid.reset();
            return Decision::MinBound;
        }

        let mut ff_fallback = false;
        if self.period > self.next_ff
            && (self.big_tp_change || filtered > 1.5 * in_op || filtered < 0.5 * in_op)
        {
            self.big_tp_change = false;
            self.next_ff = self.period + self.cfg.ff_cooldown_periods;
            match self.classifier.classify(read_tps, mixed_tps) {
                Ok(output) => {
                    let raw = throughput / output - nodes as f64;
                    let applied = raw.ceil() as i32;
                    let implausible = (filtered > 1.5 * in_op && applied < FF_PLAUSIBLE_DELTA)
                        || (filtered < 0.5 * in_op && applied > -FF_PLAUSIBLE_DELTA);
                    if implausible {
                        warn!(
                            applied,
                            filtered, "feed-forward estimate implausible, using feedback"
                        );
                        ff_fallback = true;
                    } else {
                        // This control epoch is now feed-forward-driven.
                        self.filter.reset();
                        self.pid.reset();
                        if applied > 0 || (applied < 0 && nodes > self.actuator.min_nodes()) {
                            self.actuator.schedule(applied, false);
                        }
                        return Decision::FeedForward {
                            output,
                            raw,
                            applied,
                        };
                    }
                }
                Err(e) => {
                    warn!(error = %e, "feed-forward classification failed, using feedback");
                    ff_fallback = true;
                }
            }
        }

        let delta = self.pid.step(filtered);
        let mut output = tps + delta;
        if output < OUTPUT_FLOOR {
            warn!(output, "feedback target below floor, clamping");
            output = OUTPUT_FLOOR;
        }
        let raw = throughput / output - nodes as f64;
        let applied = raw.ceil() as i32;
        if applied > 0 || (applied < 0 && nodes > self.actuator.min_nodes()) {
            self.actuator.schedule(applied, true);
        }
        Decision::Feedback {
            output,
            raw,
            applied,
            ff_fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use elastikv_cluster::InMemoryCluster;
    use elastikv_core::FleetConfig;

    use crate::probe::ProbeSample;
    use crate::sample::ClassSample;

    fn control() -> ControlConfig {
        ControlConfig {
            input_op: 100.0,
            output_op: 1000.0,
            kp: 1.0,
            warmup_periods: 1,
            dead_band: 10.0,
            ff_throughput_delta: 100.0,
            ff_read1: 1800.0,
            ff_mixed1: 200.0,
            ff_read2: 0.0,
            ff_mixed2: 1000.0,
            ..Default::default()
        }
    }

    fn fleet() -> FleetConfig {
        FleetConfig {
            node_settle_secs: 0,
            post_rebalance_settle_secs: 0,
            decommission_delay_ms: 0,
            ..Default::default()
        }
    }

    fn build(
        cfg: ControlConfig,
        cluster_nodes: u32,
        bookkept_nodes: u32,
    ) -> (DecisionEngine<Vec<u8>>, Arc<Actuator>) {
        let cluster = Arc::new(InMemoryCluster::new("kv", 90, 3, cluster_nodes));
        let actuator = Arc::new(Actuator::new(fleet(), cluster.clone(), bookkept_nodes));
        let engine = DecisionEngine::new(
            cfg,
            ProbeRegistry::new(),
            actuator.clone(),
            cluster,
            Vec::new(),
        );
        (engine, actuator)
    }

    fn agg(read_ops: i64, read_p99: f64, mixed_ops: i64) -> PeriodAggregate {
        let mut a = PeriodAggregate::new();
        a.merge(&ProbeSample {
            read: ClassSample {
                ops: read_ops,
                p99: read_p99,
                ..Default::default()
            },
            mixed: ClassSample {
                ops: mixed_ops,
                ..Default::default()
            },
        });
        a
    }

    #[test]
    fn warmup_suppresses_actions_and_resets_on_its_last_tick() {
        let cfg = ControlConfig {
            warmup_periods: 2,
            ..control()
        };
        let (mut e, act) = build(cfg, 3, 3);

        // Exactly warmup_periods ticks stay in the Warmup state.
        let r0 = e.observe(100.0, 1, &agg(30_000, 500.0, 0));
        let r1 = e.observe(100.0, 1, &agg(30_000, 500.0, 0));
        assert_eq!(r0.decision, Decision::Warmup);
        assert_eq!(r1.decision, Decision::Warmup);
        assert_eq!(act.queue_len(), 0);

        // Filter was reset on the last warm-up tick, so the first live
        // period sees the raw p99 rather than a blend with the 500s.
        let r2 = e.observe(100.0, 1, &agg(30_000, 130.0, 0));
        assert_eq!(r2.read_p99_filtered, 130.0);
        assert!(matches!(r2.decision, Decision::Feedback { .. }));
        assert_eq!(act.queue_len(), 1);
    }

    #[test]
    fn latency_inside_the_dead_band_holds() {
        let (mut e, act) = build(control(), 3, 3);
        e.observe(100.0, 1, &agg(30_000, 105.0, 0));

        let r = e.observe(100.0, 1, &agg(30_000, 105.0, 0));
        assert_eq!(r.decision, Decision::DeadZone);
        assert_eq!(act.queue_len(), 0);
    }

    #[test]
    fn low_latency_at_minimum_size_holds() {
        let (mut e, act) = build(control(), 3, 3);
        e.observe(100.0, 1, &agg(30_000, 30.0, 0));

        let r = e.observe(100.0, 1, &agg(30_000, 30.0, 0));
        assert_eq!(r.decision, Decision::MinBound);
        assert_eq!(act.queue_len(), 0);
    }

    #[test]
    fn feedback_grows_on_moderately_high_latency() {
        let (mut e, act) = build(control(), 5, 5);
        e.observe(100.0, 1, &agg(500_000, 130.0, 0));

        // filtered 130: above the dead band, below the 1.5x feed-forward
        // trigger. error = -30, output = 1000 - 30 = 970,
        // raw = 5000/970 - 5, applied = ceil = 1.
        let r = e.observe(100.0, 1, &agg(500_000, 130.0, 0));
        match r.decision {
            Decision::Feedback {
                output,
                applied,
                ff_fallback,
                ..
            } => {
                assert_eq!(output, 970.0);
                assert_eq!(applied, 1);
                assert!(!ff_fallback);
            }
            other => panic!("unexpected decision {other}"),
        }
        assert_eq!(act.queue_len(), 1);
        assert_eq!(r.nodes, 5);
        assert_eq!(r.throughput, 5000.0);
        assert_eq!(r.tps_per_node, 1000.0);
        assert_eq!(r.output_error, 0.0);
        assert_eq!(r.input_error, 30.0);
    }

    #[test]
    fn feedback_shrinks_above_the_minimum() {
        let cfg = ControlConfig { kp: 5.0, ..control() };
        let (mut e, act) = build(cfg, 5, 5);
        e.observe(100.0, 1, &agg(250_000, 70.0, 0));

        // filtered 70: below the dead band. error = 30, delta = 150,
        // output = 500 + 150 = 650, raw = 2500/650 - 5, applied = -1.
        let r = e.observe(100.0, 1, &agg(250_000, 70.0, 0));
        match r.decision {
            Decision::Feedback { applied, .. } => assert_eq!(applied, -1),
            other => panic!("unexpected decision {other}"),
        }
        assert_eq!(act.queue_len(), 1);
    }

    #[test]
    fn feed_forward_fires_on_a_latency_spike_then_cools_down() {
        let (mut e, act) = build(control(), 3, 3);
        e.observe(100.0, 1, &agg(540_000, 200.0, 360_000));

        // read 1800/node, mixed 1200/node → model output 1500;
        // raw = 9000/1500 - 3 = 3.
        let r = e.observe(100.0, 1, &agg(540_000, 200.0, 360_000));
        assert_eq!(
            r.decision,
            Decision::FeedForward {
                output: 1500.0,
                raw: 3.0,
                applied: 3,
            }
        );
        assert_eq!(act.queue_len(), 1);

        // Same load next period: cooldown keeps feed-forward off.
        let r = e.observe(100.0, 1, &agg(540_000, 200.0, 360_000));
        assert!(matches!(
            r.decision,
            Decision::Feedback {
                ff_fallback: false,
                ..
            }
        ));
    }

    #[test]
    fn implausible_feed_forward_falls_back_to_feedback() {
        let (mut e, act) = build(control(), 3, 3);
        e.observe(100.0, 1, &agg(90_000, 200.0, 60_000));

        // Model output 1500 at throughput 1500 gives applied = -2: a
        // shrink despite the latency spike, so feedback takes over.
        let r = e.observe(100.0, 1, &agg(90_000, 200.0, 60_000));
        match r.decision {
            Decision::Feedback {
                applied,
                ff_fallback,
                ..
            } => {
                assert_eq!(applied, 1);
                assert!(ff_fallback);
            }
            other => panic!("unexpected decision {other}"),
        }
        assert_eq!(act.queue_len(), 1);
    }

    #[test]
    fn degenerate_model_falls_back_and_output_is_floored() {
        let (mut e, act) = build(control(), 3, 3);
        e.observe(100.0, 1, &agg(0, 200.0, 0));

        // Zero throughput: the classifier has no demand ray. The PID
        // target 0 - 100 is floored at 50; the resulting shrink is held
        // back because the cluster is already at minimum size.
        let r = e.observe(100.0, 1, &agg(0, 200.0, 0));
        assert_eq!(
            r.decision,
            Decision::Feedback {
                output: 50.0,
                raw: -3.0,
                applied: -3,
                ff_fallback: true,
            }
        );
        assert_eq!(act.queue_len(), 0);
    }

    #[test]
    fn observed_size_mismatch_is_flagged_inconsistent() {
        let (mut e, act) = build(control(), 5, 3);
        e.observe(100.0, 1, &agg(30_000, 130.0, 0));

        let r = e.observe(100.0, 1, &agg(30_000, 130.0, 0));
        assert_eq!(r.decision, Decision::Inconsistent);
        assert_eq!(act.queue_len(), 0);
    }

    #[test]
    fn throughput_swing_arms_the_feed_forward_trigger() {
        let (mut e, _act) = build(control(), 3, 3);
        e.observe(100.0, 1, &agg(30_000, 130.0, 0));

        // filtered 130 alone would pick feedback; the 100 → 3000
        // per-node throughput jump arms feed-forward instead.
        let r = e.observe(100.0, 1, &agg(540_000, 130.0, 360_000));
        assert!(matches!(r.decision, Decision::FeedForward { applied: 3, .. }));
    }

    #[test]
    fn swing_armed_feed_forward_keeps_small_deltas_at_moderate_latency() {
        let (mut e, act) = build(control(), 3, 3);
        e.observe(100.0, 1, &agg(30_000, 130.0, 0));

        // filtered 130 is inside the 50% band, so the plausibility check
        // must not demand a 3-node correction: the swing-armed estimate
        // of +1 (output 1500 at throughput 5400) is applied as-is.
        let r = e.observe(100.0, 1, &agg(324_000, 130.0, 216_000));
        match r.decision {
            Decision::FeedForward {
                output, applied, ..
            } => {
                assert_eq!(output, 1500.0);
                assert_eq!(applied, 1);
            }
            other => panic!("unexpected decision {other}"),
        }
        assert_eq!(act.queue_len(), 1);
    }

    struct GatedCluster {
        started: std::sync::mpsc::Sender<()>,
        release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl ClusterBackend for GatedCluster {
        fn request_nodes(&self, _count: u32) -> anyhow::Result<()> {
            Ok(())
        }
        fn decommission_node(&self, _node_index: u32) -> anyhow::Result<()> {
            Ok(())
        }
        fn observed_node_count(&self) -> anyhow::Result<u32> {
            Ok(0)
        }
        fn trigger_rebalance(&self, _target_nodes: u32) -> anyhow::Result<Duration> {
            self.started.send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            Ok(Duration::ZERO)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rebalance_in_flight_suppresses_control() {
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let cluster = Arc::new(GatedCluster {
            started: started_tx,
            release: std::sync::Mutex::new(release_rx),
        });
        let cfg = FleetConfig {
            provision_nodes: false,
            ..fleet()
        };
        let actuator = Arc::new(Actuator::new(cfg, cluster.clone(), 3));
        let mut e = DecisionEngine::new(
            control(),
            ProbeRegistry::new(),
            actuator.clone(),
            cluster,
            Vec::new(),
        );
        e.observe(100.0, 1, &agg(30_000, 130.0, 0));

        actuator.schedule(1, true);
        let handle = actuator.pump().expect("worker started");
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("rebalance started");

        let r = e.observe(100.0, 1, &agg(30_000, 130.0, 0));
        assert_eq!(r.decision, Decision::Rebalancing);
        assert_eq!(actuator.queue_len(), 0);

        release_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
