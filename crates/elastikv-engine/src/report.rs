//! Tab-separated period report.
//!
//! One record per sampling period, written to any `io::Write` sink. The
//! record captures the aggregated telemetry the decision was based on
//! plus the decision itself, so a whole control run can be replayed or
//! plotted from the report alone.

use std::fmt;
use std::io::{self, Write};

/// Outcome of one period's decision state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Warmup,
    Inconsistent,
    DeadZone,
    Rebalancing,
    MinBound,
    FeedForward {
        output: f64,
        raw: f64,
        applied: i32,
    },
    Feedback {
        output: f64,
        raw: f64,
        applied: i32,
        ff_fallback: bool,
    },
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Warmup => write!(f, "Warmup"),
            Decision::Inconsistent => write!(f, "Inconsistent"),
            Decision::DeadZone => write!(f, "DeadZone"),
            Decision::Rebalancing => write!(f, "Rebalancing"),
            Decision::MinBound => write!(f, "MinBound"),
            Decision::FeedForward {
                output,
                raw,
                applied,
            } => write!(f, "FeedForward#{output}#{raw}#{applied}"),
            Decision::Feedback {
                output,
                raw,
                applied,
                ff_fallback,
            } => {
                write!(f, "Feedback#{output}#{raw}#{applied}")?;
                if *ff_fallback {
                    write!(f, "#FeedForwardFallback")?;
                }
                Ok(())
            }
        }
    }
}

/// Everything recorded about one sampling period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodRecord {
    pub period: u64,
    pub elapsed_secs: f64,
    pub probes: usize,
    pub nodes: u32,
    pub total_ops: f64,
    pub throughput: f64,
    pub tps_per_node: f64,
    pub read_tps_per_node: f64,
    pub read_mean: f64,
    pub read_stddev: f64,
    pub read_min: f64,
    pub read_p95: f64,
    pub read_p99: f64,
    pub read_p99_filtered: f64,
    pub read_max: f64,
    pub mixed_mean: f64,
    pub mixed_stddev: f64,
    pub mixed_min: f64,
    pub mixed_p95: f64,
    pub mixed_p99: f64,
    pub mixed_max: f64,
    pub output_error: f64,
    pub input_error: f64,
    pub decision: Decision,
}

const HEADER: &str = "period\telapsed_secs\tprobes\tnodes\ttotal_ops\tthroughput\t\
tps_per_node\tread_tps_per_node\tread_mean\tread_stddev\tread_min\tread_p95\t\
read_p99\tread_p99_filtered\tread_max\tmixed_mean\tmixed_stddev\tmixed_min\t\
mixed_p95\tmixed_p99\tmixed_max\toutput_error\tinput_error\tdecision";

/// Writes period records as tab-separated lines, header first.
pub struct ReportWriter<W: Write> {
    sink: W,
    header_written: bool,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            header_written: false,
        }
    }

    pub fn write(&mut self, rec: &PeriodRecord) -> io::Result<()> {
        if !self.header_written {
            writeln!(self.sink, "{HEADER}")?;
            self.header_written = true;
        }
        writeln!(
            self.sink,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            rec.period,
            rec.elapsed_secs,
            rec.probes,
            rec.nodes,
            rec.total_ops,
            rec.throughput,
            rec.tps_per_node,
            rec.read_tps_per_node,
            rec.read_mean,
            rec.read_stddev,
            rec.read_min,
            rec.read_p95,
            rec.read_p99,
            rec.read_p99_filtered,
            rec.read_max,
            rec.mixed_mean,
            rec.mixed_stddev,
            rec.mixed_min,
            rec.mixed_p95,
            rec.mixed_p99,
            rec.mixed_max,
            rec.output_error,
            rec.input_error,
            rec.decision,
        )?;
        self.sink.flush()
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(period: u64, decision: Decision) -> PeriodRecord {
        PeriodRecord {
            period,
            elapsed_secs: 300.0,
            probes: 2,
            nodes: 3,
            total_ops: 900_000.0,
            throughput: 3000.0,
            tps_per_node: 1000.0,
            read_tps_per_node: 900.0,
            read_mean: 4.0,
            read_stddev: 1.0,
            read_min: 1.0,
            read_p95: 8.0,
            read_p99: 12.0,
            read_p99_filtered: 11.5,
            read_max: 40.0,
            mixed_mean: 6.0,
            mixed_stddev: 2.0,
            mixed_min: 2.0,
            mixed_p95: 10.0,
            mixed_p99: 15.0,
            mixed_max: 50.0,
            output_error: -400.0,
            input_error: 5.5,
            decision,
        }
    }

    #[test]
    fn decision_tags_render() {
        assert_eq!(Decision::Warmup.to_string(), "Warmup");
        assert_eq!(
            Decision::FeedForward {
                output: 1200.0,
                raw: 2.5,
                applied: 3,
            }
            .to_string(),
            "FeedForward#1200#2.5#3"
        );
        assert_eq!(
            Decision::Feedback {
                output: 1350.0,
                raw: -1.2,
                applied: -1,
                ff_fallback: true,
            }
            .to_string(),
            "Feedback#1350#-1.2#-1#FeedForwardFallback"
        );
        assert_eq!(
            Decision::Feedback {
                output: 1350.0,
                raw: -1.2,
                applied: -1,
                ff_fallback: false,
            }
            .to_string(),
            "Feedback#1350#-1.2#-1"
        );
    }

    #[test]
    fn header_written_once() {
        let mut writer = ReportWriter::new(Vec::new());
        writer.write(&record(0, Decision::Warmup)).unwrap();
        writer.write(&record(1, Decision::DeadZone)).unwrap();

        let out = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("period\telapsed_secs"));
        assert!(lines[1].starts_with("0\t300\t2\t3\t"));
        assert!(lines[2].ends_with("DeadZone"));
    }

    #[test]
    fn record_has_all_columns() {
        let mut writer = ReportWriter::new(Vec::new());
        writer
            .write(&record(
                7,
                Decision::Feedback {
                    output: 1000.0,
                    raw: 0.4,
                    applied: 1,
                    ff_fallback: false,
                },
            ))
            .unwrap();

        let out = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0].split('\t').count(), 24);
        assert_eq!(lines[1].split('\t').count(), 24);
        assert_eq!(lines[1].split('\t').next(), Some("7"));
    }
}
