//! Integration tests for the full matching pipeline.
//!
//! Tests: Bus → ConsumerWorker → MatchPipeline → SearchIndex → MatchStore
//!
//! Verifies:
//! - Matches are created once per (user, job) pair, from either side
//! - Entities that match nobody cause no store traffic
//! - Malformed messages are settled and do not block the queue

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use proptest::prelude::*;
    use tokio_util::sync::CancellationToken;

    use jobmatch_core::{EntityKind, JobId, UserId};
    use jobmatch_events::{BusConnector, Disposition, InMemoryBus, MessageBus, RetryPolicy};

    use crate::match_store::{InMemoryMatchStore, MatchStore};
    use crate::pipeline::{MatchPipeline, PipelineHandler};
    use crate::search::InMemorySearchIndex;
    use crate::workers::{ConsumerWorker, WorkerHandle, WorkerSettings};

    const SEEKERS: &str = "jobseeker_update";
    const JOBS: &str = "job_update";

    struct Harness {
        bus: Arc<InMemoryBus>,
        index: Arc<InMemorySearchIndex>,
        store: Arc<InMemoryMatchStore>,
        cancel: CancellationToken,
        workers: Vec<WorkerHandle>,
    }

    impl Harness {
        async fn publish(&self, queue: &str, payload: &str) {
            self.bus.publish(queue, payload.as_bytes()).await.unwrap();
        }

        /// Wait until `n` deliveries have been settled in total.
        async fn settled(&self, n: usize) {
            for _ in 0..1000 {
                if self.bus.settlements().len() >= n {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("expected {n} settlements, got {:?}", self.bus.settlements());
        }

        async fn stop(self) -> (Arc<InMemoryBus>, Arc<InMemorySearchIndex>, Arc<InMemoryMatchStore>) {
            self.cancel.cancel();
            for worker in self.workers {
                worker.join().await;
            }
            (self.bus, self.index, self.store)
        }
    }

    async fn setup() -> Harness {
        let bus = Arc::new(InMemoryBus::new());
        let index = Arc::new(InMemorySearchIndex::new());
        let store = Arc::new(InMemoryMatchStore::new());

        let connector = Arc::new(BusConnector::new(
            bus.clone(),
            vec![SEEKERS.to_string(), JOBS.to_string()],
            RetryPolicy::fixed(3, Duration::from_millis(1)),
        ));
        connector.connect(&CancellationToken::new()).await.unwrap();

        let pipeline = Arc::new(MatchPipeline::new(index.clone(), store.clone(), 10_000));
        let settings = WorkerSettings {
            poll_wait: Duration::from_millis(20),
            fault_backoff: Duration::from_millis(20),
        };
        let cancel = CancellationToken::new();

        let workers = vec![
            ConsumerWorker::spawn(
                SEEKERS,
                connector.clone(),
                PipelineHandler::new(pipeline.clone(), EntityKind::JobSeeker),
                settings,
                cancel.clone(),
            ),
            ConsumerWorker::spawn(
                JOBS,
                connector,
                PipelineHandler::new(pipeline, EntityKind::Job),
                settings,
                cancel.clone(),
            ),
        ];

        Harness {
            bus,
            index,
            store,
            cancel,
            workers,
        }
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn job(id: &str) -> JobId {
        JobId::new(id).unwrap()
    }

    #[tokio::test]
    async fn seeker_then_matching_job_creates_one_match() {
        let h = setup().await;

        h.publish(SEEKERS, r#"{"id":"1","location":"NY","qualifications":["Tech","DevOps"]}"#).await;
        h.settled(1).await;
        h.publish(JOBS, r#"{"id":"job-1","location":"NY","requirements":["Tech","AWS"]}"#).await;
        h.settled(2).await;

        let (bus, _, store) = h.stop().await;
        let stored = store.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].user_id(), &user("1"));
        assert_eq!(stored[0].job_id(), &job("job-1"));
        assert_eq!(stored[0].user_likes(), None);
        assert_eq!(stored[0].recruiter_likes(), None);
        assert!(bus.settlements().iter().all(|s| s.disposition == Disposition::Ack));
    }

    #[tokio::test]
    async fn redelivered_job_does_not_duplicate_the_match() {
        let h = setup().await;
        let job_payload = r#"{"id":"job-1","location":"NY","requirements":["Tech","AWS"],"posted_by_uuid":"rec-1"}"#;

        h.publish(SEEKERS, r#"{"id":"1","location":"NY","qualifications":["Tech","DevOps"]}"#).await;
        h.settled(1).await;
        h.publish(JOBS, job_payload).await;
        h.settled(2).await;
        h.publish(JOBS, job_payload).await;
        h.settled(3).await;

        let (_, index, store) = h.stop().await;
        assert_eq!(store.len(), 1);
        assert_eq!(index.len(EntityKind::Job), 1);
        assert!(store.exists_match(&user("1"), &job("job-1")).await.unwrap());
        assert_eq!(store.all()[0].recruiter_id().map(|r| r.as_str()), Some("rec-1"));
    }

    #[tokio::test]
    async fn job_without_candidates_never_reaches_the_store() {
        let h = setup().await;

        h.publish(SEEKERS, r#"{"id":"1","location":"NY","qualifications":["Tech"]}"#).await;
        h.publish(JOBS, r#"{"id":"job-2","location":"LA","requirements":["Tech"]}"#).await;
        h.settled(2).await;

        let (_, index, store) = h.stop().await;
        assert_eq!(store.calls(), 0);
        assert!(store.is_empty());
        assert!(index.document(EntityKind::Job, "job-2").is_some());
    }

    #[tokio::test]
    async fn empty_tags_match_nothing_even_in_the_same_location() {
        let h = setup().await;

        h.publish(SEEKERS, r#"{"id":"1","location":"NY","qualifications":["Tech"]}"#).await;
        h.settled(1).await;
        h.publish(JOBS, r#"{"id":"job-3","location":"NY","requirements":[]}"#).await;
        h.settled(2).await;

        let (_, _, store) = h.stop().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped_without_blocking_the_queue() {
        let h = setup().await;

        h.publish(JOBS, "this is not json").await;
        h.publish(SEEKERS, r#"{"location":"NY"}"#).await;
        h.publish(SEEKERS, r#"{"id":"1","location":"NY","qualifications":["Tech"]}"#).await;
        h.publish(JOBS, r#"{"id":"job-1","location":"NY","requirements":["Tech"]}"#).await;
        h.settled(4).await;

        let (bus, _, store) = h.stop().await;
        let drops = bus
            .settlements()
            .iter()
            .filter(|s| s.disposition == Disposition::Drop)
            .count();
        assert_eq!(drops, 2);
        assert_eq!(bus.pending(SEEKERS) + bus.pending(JOBS), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn store_failures_are_acknowledged_and_do_not_stop_other_matches() {
        let h = setup().await;
        h.store.fail_inserts_for(&user("2"), &job("job-1"));

        h.publish(SEEKERS, r#"{"id":"1","location":"NY","qualifications":["Tech"]}"#).await;
        h.publish(SEEKERS, r#"{"id":"2","location":"NY","qualifications":["Tech"]}"#).await;
        h.settled(2).await;
        h.publish(JOBS, r#"{"id":"job-1","location":"NY","requirements":["Tech"]}"#).await;
        h.settled(3).await;

        let (bus, _, store) = h.stop().await;
        assert!(bus.settlements().iter().all(|s| s.disposition == Disposition::Ack));
        let stored = store.matches_for_job(&job("job-1")).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].user_id(), &user("1"));
    }

    #[tokio::test]
    async fn upserting_the_same_seeker_twice_leaves_one_document() {
        let h = setup().await;

        h.publish(SEEKERS, r#"{"id":"1","location":"NY","qualifications":["Tech"]}"#).await;
        h.publish(SEEKERS, r#"{"id":"1","location":"LA","qualifications":["Tech"]}"#).await;
        h.settled(2).await;

        let (_, index, _) = h.stop().await;
        assert_eq!(index.len(EntityKind::JobSeeker), 1);
        let doc = index.document(EntityKind::JobSeeker, "1").unwrap();
        assert_eq!(doc["location"], "LA");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Whatever order seekers and jobs arrive in, each pair is stored once.
        #[test]
        fn every_fitting_pair_is_stored_exactly_once(
            events in prop::collection::vec((any::<bool>(), 0u8..3, 0u8..2), 1..12)
        ) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            let (store, expected) = rt.block_on(async {
                let h = setup().await;
                let mut seekers = std::collections::BTreeSet::new();
                let mut jobs = std::collections::BTreeSet::new();

                for (i, (is_seeker, id, loc)) in events.iter().enumerate() {
                    let location = if *loc == 0 { "NY" } else { "LA" };
                    if *is_seeker {
                        h.publish(
                            SEEKERS,
                            &format!(r#"{{"id":"u{id}","location":"{location}","qualifications":["Tech"]}}"#),
                        )
                        .await;
                        seekers.insert((format!("u{id}"), location));
                    } else {
                        h.publish(
                            JOBS,
                            &format!(r#"{{"id":"j{id}","location":"{location}","requirements":["Tech"]}}"#),
                        )
                        .await;
                        jobs.insert((format!("j{id}"), location));
                    }
                    // One message at a time keeps the last write per id well defined.
                    h.settled(i + 1).await;
                }

                let (_, _, store) = h.stop().await;
                (store, (seekers, jobs))
            });

            let keys: Vec<_> = store.all().iter().map(|m| m.key()).collect();
            let distinct: std::collections::HashSet<_> = keys.iter().cloned().collect();
            prop_assert_eq!(keys.len(), distinct.len());

            // Every stored match pairs a seeker and a job that shared a location at some point.
            let (seekers, jobs) = expected;
            for key in &keys {
                let fits = seekers.iter().any(|(s, sl)| {
                    s == key.user_id.as_str()
                        && jobs.iter().any(|(j, jl)| j == key.job_id.as_str() && jl == sl)
                });
                prop_assert!(fits);
            }
        }
    }
}
