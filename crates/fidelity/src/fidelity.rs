//! Main Fidelity struct and public API.

use std::path::PathBuf;

use tracing::info;

use crate::config::{KeyMode, ReconConfig};
use crate::error::{FidelityError, Result};
use crate::inference::{load_keys, sample_records, save_keys, KeyDiscoverer, KeyStrategy};
use crate::input::{list_files, DatasetLoader, FilePairer, Pairing};
use crate::reconciler::{CancelToken, Reconciler, RunOutcome};
use crate::report::ReportSink;
use crate::stats::StatsSnapshot;

/// Reconciliation of one configured legacy/new migration.
pub struct Fidelity {
    config: ReconConfig,
    loader: DatasetLoader,
    pairer: FilePairer,
}

impl Fidelity {
    /// Validate `config` and prepare a run.
    pub fn new(config: ReconConfig) -> Result<Self> {
        config.validate()?;
        let loader = DatasetLoader::from_config(&config);
        let pairer = FilePairer::new(&config.storage.rename_pattern)?;
        Ok(Self {
            config,
            loader,
            pairer,
        })
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    pub fn legacy_files(&self) -> Result<Vec<PathBuf>> {
        list_files(&self.config.storage.legacy, &self.config.storage.legacy_mask)
    }

    pub fn new_files(&self) -> Result<Vec<PathBuf>> {
        list_files(&self.config.storage.new, &self.config.storage.new_mask)
    }

    /// List both sides and pair them by canonical name.
    pub fn pair_files(&self) -> Result<Pairing> {
        let legacy = self.legacy_files()?;
        let new = self.new_files()?;
        Ok(self.pairer.pair(&legacy, &new))
    }

    /// Keys for this run.
    ///
    /// Manual mode uses the configured fields. Auto mode reuses the keys
    /// file when `search_each_run` is off and the file exists; otherwise it
    /// discovers keys from a sample of every legacy file, paired or not, and
    /// saves them.
    pub fn resolve_keys(&self) -> Result<KeyStrategy> {
        let keys = &self.config.keys;
        if let Some(fields) = self.config.manual_keys() {
            info!(mode = %KeyMode::Manual, ?fields, "using configured keys");
            return Ok(KeyStrategy::fields(fields.to_vec()));
        }

        if !keys.search_each_run && keys.keys_file.is_file() {
            let fields = load_keys(&keys.keys_file)?;
            self.check_persisted(&fields)?;
            info!(file = %keys.keys_file.display(), ?fields, "reusing saved keys");
            return Ok(KeyStrategy::fields(fields));
        }

        let fields = self.discover_keys(&self.legacy_files()?)?;
        save_keys(&keys.keys_file, &fields)?;
        Ok(KeyStrategy::fields(fields))
    }

    /// Discover key fields from the first `sample_size` well-formed records
    /// of `legacy_files`, in the order given.
    pub fn discover_keys(&self, legacy_files: &[PathBuf]) -> Result<Vec<usize>> {
        let keys = &self.config.keys;
        let sample = sample_records(
            &self.loader,
            legacy_files,
            self.config.records.number_of_fields,
            keys.sample_size,
        )?;
        let fields = KeyDiscoverer::new(keys.excluded.iter().copied()).discover(&sample)?;
        info!(?fields, sample = sample.len(), "discovered keys");
        Ok(fields)
    }

    fn check_persisted(&self, fields: &[usize]) -> Result<()> {
        let n = self.config.records.number_of_fields;
        if fields.is_empty() {
            return Err(FidelityError::Config(format!(
                "{} holds no keys",
                self.config.keys.keys_file.display()
            )));
        }
        if let Some(bad) = fields.iter().find(|&&i| i >= n) {
            return Err(FidelityError::Config(format!(
                "{}: key index {bad} is out of range for {n} field(s)",
                self.config.keys.keys_file.display()
            )));
        }
        Ok(())
    }

    /// A reconciler for this configuration.
    pub fn reconciler<'s>(&self, keys: KeyStrategy, sink: &'s dyn ReportSink) -> Reconciler<'s> {
        Reconciler::new(&self.config, keys, sink)
    }

    /// Pair, resolve keys and reconcile everything, reporting to `sink`.
    pub fn run(
        &self,
        sink: &dyn ReportSink,
        cancel: CancelToken,
        progress: Option<std::sync::mpsc::Sender<StatsSnapshot>>,
    ) -> Result<RunOutcome> {
        let pairing = self.pair_files()?;
        let keys = self.resolve_keys()?;

        let mut reconciler = self.reconciler(keys, sink).with_cancel(cancel);
        if let Some(progress) = progress {
            reconciler = reconciler.with_progress(progress);
        }
        reconciler.run(&pairing)
    }
}
