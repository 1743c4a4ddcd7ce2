//! Label acquisition orchestrator. Turns enriched rows into a purchase report.
//!
//! Flow per run:
//! 1. Rows that failed validation are reported `Skipped`, never submitted
//! 2. Each remaining row is fingerprinted; a cache hit is reused as-is
//! 3. Cache misses go to the `LabelService` with bounded concurrency and a
//!    per-call timeout; failures are recorded and the run continues
//!
//! Outcomes land in a fixed slot per input index, so the report follows input
//! order whatever the completion order. Re-running a batch only buys the rows
//! that have no cached label yet.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::{PurchaseConfig, ServiceDefaults};
use crate::error::PurchaseError;
use crate::labels::cache::LabelCache;
use crate::labels::fingerprint::Fingerprint;
use crate::labels::types::{
    LabelArtifact, LabelService, PurchaseOutcome, PurchaseReport, RowOutcome, ShipmentRequest,
};
use crate::orders::model::Address;
use crate::rules::engine::{EnrichedRow, Readiness};

/// Stops a run from starting further rows. Rows already in flight finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Orchestrator {
    service: Arc<dyn LabelService>,
    cache: Arc<LabelCache>,
    from_address: Address,
    defaults: ServiceDefaults,
    max_concurrency: usize,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        service: Arc<dyn LabelService>,
        cache: Arc<LabelCache>,
        from_address: Address,
        defaults: ServiceDefaults,
        purchase: &PurchaseConfig,
    ) -> Self {
        Self {
            service,
            cache,
            from_address,
            defaults,
            max_concurrency: purchase.max_concurrency.max(1),
            timeout: purchase.timeout(),
        }
    }

    /// Acquire labels for `rows`. Never fails as a whole; per-row failures are outcomes.
    pub async fn run(&self, rows: &[EnrichedRow], cancel: &CancelFlag) -> PurchaseReport {
        info!(
            rows = rows.len(),
            service = self.service.name(),
            max_concurrency = self.max_concurrency,
            "Starting label acquisition"
        );

        let mut slots: Vec<Option<PurchaseOutcome>> = vec![None; rows.len()];
        let mut jobs = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            match &row.readiness {
                Readiness::Purchasable => jobs.push((
                    index,
                    ShipmentRequest::from_enriched(row, &self.from_address, &self.defaults),
                )),
                not_ready => {
                    debug!(row_id = %row.row_id(), reason = %not_ready.describe(), "Row skipped");
                    slots[index] = Some(PurchaseOutcome::Skipped {
                        reason: not_ready.describe(),
                    });
                }
            }
        }

        let finished: Vec<(usize, PurchaseOutcome)> = stream::iter(jobs)
            .map(|(index, request)| async move { (index, self.acquire(request, cancel).await) })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for (index, outcome) in finished {
            slots[index] = Some(outcome);
        }

        let outcomes: Vec<RowOutcome> = rows
            .iter()
            .zip(slots)
            .map(|(row, slot)| RowOutcome {
                row_id: row.row_id(),
                outcome: slot.unwrap_or(PurchaseOutcome::Cancelled),
            })
            .collect();

        let report = PurchaseReport { outcomes };
        let summary = report.summary();
        info!(
            purchased = summary.purchased,
            cached = summary.cached,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            total_cost = %summary.total_cost,
            "Label acquisition complete"
        );
        report
    }

    async fn acquire(&self, request: ShipmentRequest, cancel: &CancelFlag) -> PurchaseOutcome {
        let fingerprint = Fingerprint::of(&request);

        // Cached labels cost nothing, so they are returned even after a cancel.
        if let Some(hit) = self.cached(&request, &fingerprint).await {
            return hit;
        }
        if cancel.is_cancelled() {
            debug!(row_id = %request.row_id, "Row not started, run cancelled");
            return PurchaseOutcome::Cancelled;
        }

        let _guard = self.cache.purchase_guard(&fingerprint).await;
        // An overlapping run may have bought it while we waited.
        if let Some(hit) = self.cached(&request, &fingerprint).await {
            return hit;
        }

        let result = match tokio::time::timeout(self.timeout, self.service.purchase(&request)).await
        {
            Ok(result) => result,
            Err(_) => Err(PurchaseError::Timeout(self.timeout)),
        };

        match result {
            Ok(label) => {
                let artifact = LabelArtifact::new(&request, fingerprint, label);
                info!(
                    row_id = %request.row_id,
                    tracking_id = %artifact.tracking_id,
                    cost = %artifact.cost,
                    "Label purchased"
                );
                self.cache.insert(artifact.clone()).await;
                PurchaseOutcome::Artifact {
                    artifact,
                    from_cache: false,
                }
            }
            Err(e) => {
                warn!(
                    row_id = %request.row_id,
                    fingerprint = fingerprint.short(),
                    error = %e,
                    "Label purchase failed"
                );
                e.into()
            }
        }
    }

    /// Cache hit for `request`, re-pointed at the row asking for it.
    async fn cached(
        &self,
        request: &ShipmentRequest,
        fingerprint: &Fingerprint,
    ) -> Option<PurchaseOutcome> {
        let mut artifact = self.cache.get(fingerprint).await?;
        debug!(row_id = %request.row_id, fingerprint = fingerprint.short(), "Cache hit");
        artifact.row_id = request.row_id;
        Some(PurchaseOutcome::Artifact {
            artifact,
            from_cache: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::config::ShipConfig;
    use crate::labels::types::PurchasedLabel;
    use crate::orders::model::{MarketplaceFormat, OrderRow, RowId};
    use crate::rules::engine::RulesEngine;
    use crate::rules::model::{Dimensions, ShipmentKind};
    use crate::rules::overrides::{OverrideStore, OverrideValue};

    /// Stub service: counts calls, fails listed recipients, sleeps per row to
    /// scramble completion order.
    #[derive(Default)]
    struct StubService {
        calls: AtomicUsize,
        fail_names: HashSet<String>,
        delays_ms: HashMap<usize, u64>,
        seen: Mutex<Vec<RowId>>,
    }

    #[async_trait]
    impl LabelService for StubService {
        fn name(&self) -> &str {
            "stub"
        }

        async fn purchase(
            &self,
            request: &ShipmentRequest,
        ) -> Result<PurchasedLabel, PurchaseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.row_id);
            if let Some(ms) = self.delays_ms.get(&request.row_id.0) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            if self.fail_names.contains(&request.to_address.name) {
                return Err(PurchaseError::Rejected {
                    reason: "address not found".into(),
                    provider_detail: format!("cannot deliver to {}", request.to_address.name),
                });
            }
            Ok(PurchasedLabel {
                tracking_id: format!("TRK{}", request.row_id.0),
                label_image_ref: format!("labels/{}.png", request.row_id.0),
                cost: dec!(0.73),
            })
        }
    }

    fn make_row(id: usize, name: &str) -> OrderRow {
        OrderRow {
            row_id: RowId(id),
            recipient: Address {
                name: name.into(),
                street1: "1 Main St".into(),
                city: "Riverside".into(),
                region: "CA".into(),
                postal_code: "92504".into(),
                country: "US".into(),
                ..Default::default()
            },
            item_count: 2,
            declared_value: None,
            shipping_price_paid: Some(dec!(1.31)),
            marketplace_format: MarketplaceFormat::TcgPlayer,
            sort_key: None,
            order_ref: None,
        }
    }

    fn enrich(rows: &[OrderRow], store: &OverrideStore) -> Vec<EnrichedRow> {
        RulesEngine::from_config(&ShipConfig::default()).classify_all(rows, store)
    }

    fn orchestrator(service: Arc<StubService>, cache: Arc<LabelCache>, max: usize) -> Orchestrator {
        Orchestrator::new(
            service,
            cache,
            Address::default(),
            ServiceDefaults::default(),
            &PurchaseConfig {
                max_concurrency: max,
                timeout_secs: 5,
            },
        )
    }

    fn labels(report: &PurchaseReport) -> Vec<&'static str> {
        report.outcomes.iter().map(|o| o.outcome.label()).collect()
    }

    #[tokio::test]
    async fn report_follows_input_order_under_concurrency() {
        let service = Arc::new(StubService {
            delays_ms: HashMap::from([(0, 40), (1, 5), (2, 25), (3, 0)]),
            ..Default::default()
        });
        let rows: Vec<OrderRow> = (0..4).map(|i| make_row(i, &format!("R{i}"))).collect();
        let enriched = enrich(&rows, &OverrideStore::new());

        let report = orchestrator(service, LabelCache::new(), 4)
            .run(&enriched, &CancelFlag::new())
            .await;

        let ids: Vec<RowId> = report.outcomes.iter().map(|o| o.row_id).collect();
        assert_eq!(ids, [RowId(0), RowId(1), RowId(2), RowId(3)]);
        for (i, o) in report.outcomes.iter().enumerate() {
            assert_eq!(o.outcome.artifact().map(|a| a.row_id), Some(RowId(i)));
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let service = Arc::new(StubService {
            fail_names: HashSet::from(["Bad Address".to_string()]),
            ..Default::default()
        });
        let rows = vec![
            make_row(0, "A"),
            make_row(1, "B"),
            make_row(2, "Bad Address"),
            make_row(3, "D"),
        ];
        let enriched = enrich(&rows, &OverrideStore::new());

        let report = orchestrator(service.clone(), LabelCache::new(), 2)
            .run(&enriched, &CancelFlag::new())
            .await;

        assert_eq!(report.len(), 4);
        assert_eq!(labels(&report), ["purchased", "purchased", "failed", "purchased"]);
        match &report.outcomes[2].outcome {
            PurchaseOutcome::Failed {
                reason,
                provider_detail,
            } => {
                assert_eq!(reason, "address not found");
                assert!(provider_detail.contains("Bad Address"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(service.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn rerun_uses_cache_and_only_buys_the_remainder() {
        let cache = LabelCache::new();
        let rows = vec![make_row(0, "A"), make_row(1, "Bad Address"), make_row(2, "C")];
        let enriched = enrich(&rows, &OverrideStore::new());

        let failing = Arc::new(StubService {
            fail_names: HashSet::from(["Bad Address".to_string()]),
            ..Default::default()
        });
        let first = orchestrator(failing, cache.clone(), 2)
            .run(&enriched, &CancelFlag::new())
            .await;
        assert_eq!(labels(&first), ["purchased", "failed", "purchased"]);

        let healthy = Arc::new(StubService::default());
        let second = orchestrator(healthy.clone(), cache.clone(), 2)
            .run(&enriched, &CancelFlag::new())
            .await;
        assert_eq!(labels(&second), ["cached", "purchased", "cached"]);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*healthy.seen.lock().unwrap(), [RowId(1)]);
        assert_eq!(
            first.outcomes[0].outcome.artifact(),
            second.outcomes[0].outcome.artifact()
        );
    }

    #[tokio::test]
    async fn changing_weight_invalidates_cache_entry() {
        let cache = LabelCache::new();
        let rows = vec![make_row(0, "A"), make_row(1, "B")];
        let mut store = OverrideStore::new();

        let service = Arc::new(StubService::default());
        let orch = orchestrator(service.clone(), cache, 1);
        orch.run(&enrich(&rows, &store), &CancelFlag::new()).await;

        store.set(RowId(1), OverrideValue::WeightOz(dec!(3)));
        let report = orch.run(&enrich(&rows, &store), &CancelFlag::new()).await;

        assert_eq!(labels(&report), ["cached", "purchased"]);
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_purchasable_rows_are_skipped() {
        let mut store = OverrideStore::new();
        store.set(RowId(1), OverrideValue::Kind(ShipmentKind::Package));
        let rows = vec![make_row(0, "A"), make_row(1, "B")];

        let service = Arc::new(StubService::default());
        let report = orchestrator(service.clone(), LabelCache::new(), 2)
            .run(&enrich(&rows, &store), &CancelFlag::new())
            .await;

        assert_eq!(labels(&report), ["purchased", "skipped"]);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        store.set(
            RowId(1),
            OverrideValue::Dimensions(Dimensions::new(dec!(9), dec!(6), dec!(2))),
        );
        let report = orchestrator(service, LabelCache::new(), 2)
            .run(&enrich(&rows, &store), &CancelFlag::new())
            .await;
        assert_eq!(labels(&report), ["purchased", "purchased"]);
    }

    #[tokio::test]
    async fn cancelled_run_submits_nothing_new() {
        let service = Arc::new(StubService::default());
        let rows = vec![make_row(0, "A"), make_row(1, "B")];
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = orchestrator(service.clone(), LabelCache::new(), 1)
            .run(&enrich(&rows, &OverrideStore::new()), &cancel)
            .await;

        assert_eq!(labels(&report), ["cancelled", "cancelled"]);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cached_rows_survive_a_cancel() {
        let cache = LabelCache::new();
        let rows = vec![make_row(0, "A"), make_row(1, "B"), make_row(2, "C")];
        let enriched = enrich(&rows, &OverrideStore::new());

        let first = Arc::new(StubService::default());
        orchestrator(first, cache.clone(), 2)
            .run(&enriched[1..2], &CancelFlag::new())
            .await;

        let cancel = CancelFlag::new();
        cancel.cancel();
        let service = Arc::new(StubService::default());
        let report = orchestrator(service.clone(), cache, 2)
            .run(&enriched, &cancel)
            .await;

        assert_eq!(labels(&report), ["cancelled", "cached", "cancelled"]);
        assert_eq!(report.summary().cached, 1);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn overlapping_runs_buy_each_label_once() {
        let cache = LabelCache::new();
        let service = Arc::new(StubService {
            delays_ms: HashMap::from([(0, 30), (1, 30), (2, 30)]),
            ..Default::default()
        });
        let rows = vec![make_row(0, "A"), make_row(1, "B"), make_row(2, "C")];
        let enriched = enrich(&rows, &OverrideStore::new());
        let left = orchestrator(service.clone(), cache.clone(), 3);
        let right = orchestrator(service.clone(), cache.clone(), 3);

        let left_cancel = CancelFlag::new();
        let right_cancel = CancelFlag::new();
        let (a, b) = tokio::join!(
            left.run(&enriched, &left_cancel),
            right.run(&enriched, &right_cancel)
        );

        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
        let a = a.summary();
        let b = b.summary();
        assert_eq!(a.purchased + b.purchased, 3);
        assert_eq!(a.cached + b.cached, 3);
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test]
    async fn identical_rows_in_one_batch_share_a_label() {
        let service = Arc::new(StubService::default());
        let rows = vec![make_row(0, "A"), make_row(1, "A")];

        let report = orchestrator(service.clone(), LabelCache::new(), 2)
            .run(&enrich(&rows, &OverrideStore::new()), &CancelFlag::new())
            .await;

        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        let mut got = labels(&report);
        got.sort_unstable();
        assert_eq!(got, ["cached", "purchased"]);
        let second = report.outcomes[1].outcome.artifact().map(|a| a.row_id);
        assert_eq!(second, Some(RowId(1)));
    }

    #[tokio::test]
    async fn reexport_with_prepended_row_hits_cache() {
        let with_order = |id: usize, order: &str| OrderRow {
            order_ref: Some(order.into()),
            ..make_row(id, "Same Buyer")
        };
        let cache = LabelCache::new();
        let service = Arc::new(StubService::default());
        let orch = orchestrator(service.clone(), cache, 2);

        let morning = vec![with_order(0, "TCG-1"), with_order(1, "TCG-2")];
        let first = orch
            .run(&enrich(&morning, &OverrideStore::new()), &CancelFlag::new())
            .await;
        assert_eq!(labels(&first), ["purchased", "purchased"]);

        let evening = vec![
            with_order(0, "TCG-0"),
            with_order(1, "TCG-1"),
            with_order(2, "TCG-2"),
        ];
        let second = orch
            .run(&enrich(&evening, &OverrideStore::new()), &CancelFlag::new())
            .await;

        assert_eq!(labels(&second), ["purchased", "cached", "cached"]);
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
        let moved = second.outcomes[2].outcome.artifact().expect("cached artifact");
        let original = first.outcomes[1].outcome.artifact().expect("purchased artifact");
        assert_eq!(moved.row_id, RowId(2));
        assert_eq!(moved.tracking_id, original.tracking_id);
        assert_eq!(moved.fingerprint, original.fingerprint);
    }

    #[tokio::test]
    async fn cancel_mid_run_keeps_report_aligned() {
        struct CancelAfterFirst {
            cancel: CancelFlag,
        }

        #[async_trait]
        impl LabelService for CancelAfterFirst {
            fn name(&self) -> &str {
                "cancel-after-first"
            }

            async fn purchase(
                &self,
                request: &ShipmentRequest,
            ) -> Result<PurchasedLabel, PurchaseError> {
                self.cancel.cancel();
                Ok(PurchasedLabel {
                    tracking_id: "T".into(),
                    label_image_ref: format!("{}.png", request.row_id),
                    cost: Decimal::ONE,
                })
            }
        }

        let cancel = CancelFlag::new();
        let service = Arc::new(CancelAfterFirst {
            cancel: cancel.clone(),
        });
        let rows = vec![make_row(0, "A"), make_row(1, "B"), make_row(2, "C")];
        let orch = Orchestrator::new(
            service,
            LabelCache::new(),
            Address::default(),
            ServiceDefaults::default(),
            &PurchaseConfig {
                max_concurrency: 1,
                timeout_secs: 5,
            },
        );
        let report = orch.run(&enrich(&rows, &OverrideStore::new()), &cancel).await;
        assert_eq!(labels(&report), ["purchased", "cancelled", "cancelled"]);
    }

    #[tokio::test]
    async fn slow_service_times_out_as_failure() {
        struct Slow;

        #[async_trait]
        impl LabelService for Slow {
            fn name(&self) -> &str {
                "slow"
            }

            async fn purchase(&self, _: &ShipmentRequest) -> Result<PurchasedLabel, PurchaseError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(PurchaseError::Transport("unreachable".into()))
            }
        }

        let mut orch = Orchestrator::new(
            Arc::new(Slow),
            LabelCache::new(),
            Address::default(),
            ServiceDefaults::default(),
            &PurchaseConfig::default(),
        );
        orch.timeout = Duration::from_millis(20);

        let report = orch
            .run(&enrich(&[make_row(0, "A")], &OverrideStore::new()), &CancelFlag::new())
            .await;
        assert_eq!(
            report.outcomes[0].outcome,
            PurchaseOutcome::Failed {
                reason: "purchase timed out".into(),
                provider_detail: "no response within 20ms".into(),
            }
        );
    }
}
