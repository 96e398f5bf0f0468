//! One end-to-end probe run: fetch, ingest, verify, report.

use super::ingest::RecordIngestor;
use super::report::ConsistencyReport;
use super::verify::{ReplicationVerifier, VerifyOrder};
use crate::core::config::Config;
use crate::core::error::ProbeResult;
use crate::source::SourceFetcher;
use crate::store::{PrimaryStore, ReplicaStore};
use serde::{Serialize, Serializer};
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Wall time spent in each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTimings {
    /// Source fetch.
    #[serde(rename = "fetch_ms", serialize_with = "as_millis")]
    pub fetch: Duration,
    /// Dispatching writes.
    #[serde(rename = "ingest_ms", serialize_with = "as_millis")]
    pub ingest: Duration,
    /// Reading back.
    #[serde(rename = "verify_ms", serialize_with = "as_millis")]
    pub verify: Duration,
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Everything observed during one run.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeRun {
    /// Source name.
    pub source: String,
    /// Records returned by the source, malformed ones included.
    pub fetched_count: usize,
    /// Stage timings.
    pub timings: StageTimings,
    /// From the first write to the last read.
    #[serde(rename = "write_window_ms", serialize_with = "as_millis")]
    pub write_window: Duration,
    /// Entry TTL.
    #[serde(rename = "ttl_ms", serialize_with = "as_millis")]
    pub ttl: Duration,
    /// The write window reached the TTL, so early entries may have expired
    /// before they were read.
    pub ttl_window_exceeded: bool,
    /// Aggregated result.
    pub report: ConsistencyReport,
}

/// Drives one batch through source, primary and replica.
pub struct ReplicationProbe<S, P, R> {
    source: S,
    ingestor: RecordIngestor<P>,
    verifier: ReplicationVerifier<R>,
    count: usize,
    order: VerifyOrder,
    echo: bool,
}

impl<S, P, R> ReplicationProbe<S, P, R>
where
    S: SourceFetcher,
    P: PrimaryStore,
    R: ReplicaStore,
{
    /// Probe fetching 100 records, verifying in reverse order with echo on.
    pub fn new(source: S, ingestor: RecordIngestor<P>, verifier: ReplicationVerifier<R>) -> Self {
        Self {
            source,
            ingestor,
            verifier,
            count: 100,
            order: VerifyOrder::default(),
            echo: true,
        }
    }

    /// Probe assembled from configuration.
    pub fn from_config(source: S, primary: P, replica: R, config: &Config) -> ProbeResult<Self> {
        let ingestor = RecordIngestor::new(
            primary,
            config.ingest.namespace.clone(),
            config.ingest.ttl_seconds,
            config.ingest.write_mode,
        )?;
        let verifier = ReplicationVerifier::new(replica).with_concurrency(config.verify.concurrency)?;

        Ok(Self::new(source, ingestor, verifier)
            .with_count(config.source.count)
            .with_order(config.verify.order)
            .with_echo(config.verify.echo))
    }

    /// Records requested from the source.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Verification order.
    pub fn with_order(mut self, order: VerifyOrder) -> Self {
        self.order = order;
        self
    }

    /// Print present keys while verifying.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Run the probe once. With echo on, the text report and the echo lines
    /// go to stdout.
    ///
    /// Only a source failure is an error; write and read failures show up as
    /// missing keys in the report.
    pub async fn run(&self) -> ProbeResult<ProbeRun> {
        if self.echo {
            let mut stdout = std::io::stdout();
            self.run_into(Some(&mut stdout)).await
        } else {
            self.run_into(None).await
        }
    }

    /// Run the probe once, writing the text report to `out` as stages finish.
    ///
    /// The fetch and ingest lines precede the echo lines; the verification
    /// summary and any TTL warning follow them.
    pub async fn run_into(
        &self,
        mut out: Option<&mut (dyn Write + Send)>,
    ) -> ProbeResult<ProbeRun> {
        let started = Instant::now();
        let records = self.source.fetch(self.count).await?;
        let fetch = started.elapsed();
        info!(
            source = self.source.name(),
            records = records.len(),
            elapsed_ms = fetch.as_millis() as u64,
            "fetched"
        );
        report_line(
            &mut out,
            format_args!(
                "Received {} records from {} in {}ms",
                records.len(),
                self.source.name(),
                fetch.as_millis()
            ),
        );

        let write_started = Instant::now();
        let attempted = self.ingestor.ingest(&records).await;
        let ingest = write_started.elapsed();
        info!(mode = %self.ingestor.mode(), attempted = attempted.len(), "ingested");
        report_line(
            &mut out,
            format_args!("Successfully inserted {} records", attempted.len()),
        );

        let verify_started = Instant::now();
        let ordered = self.order.apply(attempted.clone());
        let echo: Option<&mut (dyn Write + Send)> = match out.as_mut() {
            Some(w) if self.echo => Some(&mut **w),
            _ => None,
        };
        let outcomes = self.verifier.verify_into(&ordered, echo).await;
        let verify = verify_started.elapsed();

        let report = ConsistencyReport::build(&attempted, &outcomes);
        info!(verified = report.verified_count, "verified");
        report_line(
            &mut out,
            format_args!(
                "Verified that {} records made it into the replica",
                report.verified_count
            ),
        );

        let write_window = write_started.elapsed();
        let ttl = Duration::from_secs(self.ingestor.ttl_seconds());
        let ttl_window_exceeded = !attempted.is_empty() && write_window >= ttl;
        if ttl_window_exceeded {
            warn!(
                window_ms = write_window.as_millis() as u64,
                ttl_seconds = self.ingestor.ttl_seconds(),
                "verification finished after the TTL; early entries may have expired unverified"
            );
            report_line(
                &mut out,
                format_args!(
                    "Warning: verification took {}ms, longer than the {}s TTL",
                    write_window.as_millis(),
                    ttl.as_secs()
                ),
            );
        }

        Ok(ProbeRun {
            source: self.source.name().to_string(),
            fetched_count: records.len(),
            timings: StageTimings {
                fetch,
                ingest,
                verify,
            },
            write_window,
            ttl,
            ttl_window_exceeded,
            report,
        })
    }
}

fn report_line(out: &mut Option<&mut (dyn Write + Send)>, line: std::fmt::Arguments<'_>) {
    if let Some(out) = out.as_mut() {
        if let Err(e) = writeln!(out, "{}", line) {
            debug!(error = %e, "report write failed");
        }
    }
}

impl<S, P, R> std::fmt::Debug for ReplicationProbe<S, P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationProbe")
            .field("count", &self.count)
            .field("order", &self.order)
            .field("echo", &self.echo)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ingest::WriteMode;
    use crate::source::{FetchFuture, RawRecord, StaticSource};
    use crate::store::{MemoryStore, MirroredStore};
    use std::sync::Arc;

    fn records(n: usize) -> Vec<RawRecord> {
        (0..n)
            .map(|i| RawRecord::new(format!("id{}", i), format!("fact {}", i)))
            .collect()
    }

    fn probe(
        source: StaticSource,
        replicate: bool,
    ) -> ReplicationProbe<StaticSource, MirroredStore, Arc<MemoryStore>> {
        let replica = MemoryStore::shared();
        let mirror = if replicate {
            MirroredStore::new(MemoryStore::shared(), replica.clone())
        } else {
            MirroredStore::with_filter(MemoryStore::shared(), replica.clone(), |_| false)
        };
        let ingestor = RecordIngestor::new(mirror, "fact", 120, WriteMode::BestEffort).unwrap();
        ReplicationProbe::new(source, ingestor, ReplicationVerifier::new(replica)).with_echo(false)
    }

    #[tokio::test]
    async fn test_full_replication() {
        let run = probe(StaticSource::new("fixture", records(5)), true)
            .run()
            .await
            .unwrap();
        assert_eq!(run.fetched_count, 5);
        assert_eq!(run.report.attempted_count, 5);
        assert_eq!(run.report.verified_count, 5);
        assert!(!run.ttl_window_exceeded);
        // Reverse order by default.
        assert_eq!(run.report.verified_keys[0].as_str(), "fact:id4");
    }

    #[tokio::test]
    async fn test_no_replication_is_not_an_error() {
        let run = probe(StaticSource::new("fixture", records(3)), false)
            .run()
            .await
            .unwrap();
        assert_eq!(run.report.attempted_count, 3);
        assert_eq!(run.report.verified_count, 0);
    }

    #[tokio::test]
    async fn test_count_limits_fetch() {
        let run = probe(StaticSource::new("fixture", records(10)), true)
            .with_count(4)
            .run()
            .await
            .unwrap();
        assert_eq!(run.report.attempted_count, 4);
    }

    struct FailingSource;

    impl SourceFetcher for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        fn fetch(&self, _count: usize) -> FetchFuture<'_> {
            Box::pin(async {
                Err(crate::core::error::ProbeError::SourceFetch {
                    message: "unreachable".into(),
                })
            })
        }
    }

    #[tokio::test]
    async fn test_source_failure_is_fatal_and_writes_nothing() {
        let primary = MemoryStore::shared();
        let ingestor = RecordIngestor::new(primary.clone(), "fact", 120, WriteMode::BestEffort).unwrap();
        let probe = ReplicationProbe::new(
            FailingSource,
            ingestor,
            ReplicationVerifier::new(MemoryStore::shared()),
        );

        assert!(probe.run().await.is_err());
        assert_eq!(primary.write_count(), 0);
    }

    #[tokio::test]
    async fn test_text_report_brackets_echo_lines() {
        let probe = probe(StaticSource::new("Cat Facts", records(2)), true).with_echo(true);
        let mut out = Vec::new();
        probe.run_into(Some(&mut out)).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Received 2 records from Cat Facts in "));
        assert_eq!(lines[1], "Successfully inserted 2 records");
        assert_eq!(lines[2], "fact:id1 --> \t [fact 1]");
        assert_eq!(lines[3], "fact:id0 --> \t [fact 0]");
        assert_eq!(lines[4], "Verified that 2 records made it into the replica");
    }

    #[tokio::test]
    async fn test_text_report_without_echo() {
        let probe = probe(StaticSource::new("fixture", records(3)), false);
        let mut out = Vec::new();
        probe.run_into(Some(&mut out)).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with(
            "Successfully inserted 3 records\n\
             Verified that 0 records made it into the replica\n"
        ));
        assert!(!text.contains("Warning"));
    }

    #[tokio::test]
    async fn test_run_serializes() {
        let run = probe(StaticSource::new("fixture", records(2)), true)
            .run()
            .await
            .unwrap();
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["source"], "fixture");
        assert_eq!(json["ttl_ms"], 120_000);
        assert_eq!(json["report"]["verified_count"], 2);
        assert!(json["timings"]["fetch_ms"].is_u64());
    }
}
