//! Session: owns the configuration, the loaded batch, the user's overrides
//! and the label cache for one working session.
//!
//! Loading a new export replaces the batch wholesale and drops every
//! override. The label cache outlives batches, so reloading the same export
//! and buying again reuses labels already paid for.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::config::ShipConfig;
use crate::error::{Result, SessionError};
use crate::export::{self, BatchExportRow, FulfillmentRow};
use crate::labels::assembly::{AssemblyRequest, LabelRenderer};
use crate::labels::cache::LabelCache;
use crate::labels::orchestrator::{CancelFlag, Orchestrator};
use crate::labels::types::{LabelService, PurchaseReport};
use crate::orders::model::{FormatHint, RowId};
use crate::orders::normalize::{self, NormalizedBatch, RowIssue};
use crate::orders::table::RawTable;
use crate::rules::engine::{EnrichedRow, RulesEngine};
use crate::rules::overrides::{OverrideStore, OverrideValue};

pub struct Session {
    config: ShipConfig,
    engine: RulesEngine,
    overrides: OverrideStore,
    batch: Option<NormalizedBatch>,
    cache: Arc<LabelCache>,
}

impl Session {
    pub fn new(config: ShipConfig) -> Self {
        Self::with_cache(config, LabelCache::new())
    }

    /// Start with an existing (e.g. reloaded from disk) label cache.
    pub fn with_cache(config: ShipConfig, cache: Arc<LabelCache>) -> Self {
        Self {
            engine: RulesEngine::from_config(&config),
            config,
            overrides: OverrideStore::new(),
            batch: None,
            cache,
        }
    }

    pub fn config(&self) -> &ShipConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<LabelCache> {
        &self.cache
    }

    pub fn batch(&self) -> Option<&NormalizedBatch> {
        self.batch.as_ref()
    }

    /// Rows rejected while loading the current batch.
    pub fn issues(&self) -> &[RowIssue] {
        self.batch
            .as_ref()
            .map(|b| b.issues.as_slice())
            .unwrap_or_default()
    }

    /// Normalize `table` and make it the current batch.
    ///
    /// On a format error the previous batch and its overrides stay in place.
    pub fn load(&mut self, table: &RawTable, hint: FormatHint) -> Result<&NormalizedBatch> {
        let batch = normalize::normalize(table, hint, &self.config.defaults.country)?;
        let dropped = self.overrides.len();
        self.overrides.clear_all();
        info!(
            format = %batch.format,
            rows = batch.rows.len(),
            issues = batch.issues.len(),
            dropped_overrides = dropped,
            "Batch loaded"
        );
        Ok(&*self.batch.insert(batch))
    }

    /// Read CSV from `reader`, then `load`.
    pub fn load_csv<R: Read>(&mut self, reader: R, hint: FormatHint) -> Result<&NormalizedBatch> {
        let table = RawTable::from_csv_reader(reader)?;
        self.load(&table, hint)
    }

    /// Classify every row of the current batch, in batch order.
    pub fn evaluate(&self) -> Result<Vec<EnrichedRow>> {
        let batch = self.current()?;
        Ok(self.engine.classify_all(&batch.rows, &self.overrides))
    }

    /// Classify a single row.
    pub fn row(&self, row_id: RowId) -> Result<EnrichedRow> {
        let batch = self.current()?;
        let row = batch
            .rows
            .iter()
            .find(|r| r.row_id == row_id)
            .ok_or(SessionError::UnknownRow(row_id))?;
        Ok(self.engine.classify(row, &self.overrides.get(row_id)))
    }

    /// Record an override and return the re-evaluated row.
    pub fn set_override(&mut self, row_id: RowId, value: OverrideValue) -> Result<EnrichedRow> {
        self.ensure_row(row_id)?;
        self.overrides.set(row_id, value);
        self.row(row_id)
    }

    /// Drop all overrides on a row and return the re-evaluated row.
    pub fn clear_overrides(&mut self, row_id: RowId) -> Result<EnrichedRow> {
        self.ensure_row(row_id)?;
        self.overrides.clear(row_id);
        self.row(row_id)
    }

    /// Purchasable rows as batch export lines.
    pub fn export(&self) -> Result<Vec<BatchExportRow>> {
        let rows = self.evaluate()?;
        Ok(export::project(
            &rows,
            &self.config.from_address,
            &self.config.defaults,
        ))
    }

    /// Tracking lines for the marketplace, for rows `report` bought labels for.
    pub fn fulfillment(&self, report: &PurchaseReport) -> Result<Vec<FulfillmentRow>> {
        let rows = self.evaluate()?;
        Ok(export::project_fulfillment(
            &rows,
            report,
            &self.config.defaults.carrier,
        ))
    }

    /// Buy labels for the current batch.
    ///
    /// Safe to call concurrently: the shared cache lets only one caller buy
    /// any given shipment.
    pub async fn buy_labels(
        &self,
        service: Arc<dyn LabelService>,
        cancel: &CancelFlag,
    ) -> Result<PurchaseReport> {
        let rows = self.evaluate()?;
        let orchestrator = Orchestrator::new(
            service,
            self.cache.clone(),
            self.config.from_address.clone(),
            self.config.defaults.clone(),
            &self.config.purchase,
        );
        Ok(orchestrator.run(&rows, cancel).await)
    }

    /// Build the assembly request for `report` and render it.
    pub async fn assemble(
        &self,
        report: &PurchaseReport,
        renderer: &dyn LabelRenderer,
    ) -> Result<(AssemblyRequest, PathBuf)> {
        let request = AssemblyRequest::from_report(report);
        let output = renderer.render(&request).await?;
        info!(output = %output.display(), pages = request.pages.len(), "Labels rendered");
        Ok((request, output))
    }

    fn current(&self) -> std::result::Result<&NormalizedBatch, SessionError> {
        self.batch.as_ref().ok_or(SessionError::NoBatchLoaded)
    }

    fn ensure_row(&self, row_id: RowId) -> std::result::Result<(), SessionError> {
        if self.current()?.rows.iter().any(|r| r.row_id == row_id) {
            Ok(())
        } else {
            Err(SessionError::UnknownRow(row_id))
        }
    }
}
