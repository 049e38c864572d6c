//! Process-wide dataset handle.
//!
//! The store hands out `Arc<Dataset>` snapshots. A reload builds the replacement
//! dataset completely before swapping the pointer, so readers holding a snapshot
//! keep seeing the old data and new readers see the new data, never a mix.

use crate::ingestion;
use crate::schema::Dataset;
use log::{info, warn};
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

static GLOBAL_STORE: Lazy<Arc<DatasetStore>> = Lazy::new(|| Arc::new(DatasetStore::new()));

/// The dataset handle shared by every request in this process.
pub fn global_store() -> Arc<DatasetStore> {
    Arc::clone(&GLOBAL_STORE)
}

#[derive(Debug)]
pub struct DatasetStore {
    current: RwLock<Arc<Dataset>>,
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetStore {
    /// A store holding an unavailable dataset until the first load.
    pub fn new() -> Self {
        Self::with_dataset(Dataset::unavailable("dataset has not been loaded"))
    }

    pub fn with_dataset(dataset: Dataset) -> Self {
        Self {
            current: RwLock::new(Arc::new(dataset)),
        }
    }

    /// The dataset as of now. Hold on to the returned `Arc` for the duration of a query.
    pub fn snapshot(&self) -> Arc<Dataset> {
        // The guarded value is a pointer that is only ever replaced whole, so a
        // poisoned lock still holds a consistent dataset.
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Swaps in `dataset` and returns the one it replaced.
    pub fn replace(&self, dataset: Dataset) -> Arc<Dataset> {
        self.install(Arc::new(dataset))
    }

    fn install(&self, next: Arc<Dataset>) -> Arc<Dataset> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Loads `path` and swaps the result in. A failed load installs an unavailable dataset.
    pub fn reload_from_path(&self, path: impl AsRef<Path>) -> Arc<Dataset> {
        let path = path.as_ref();
        let dataset = ingestion::load_csv_path(path);
        if dataset.is_empty() {
            warn!(
                "Reload from {} produced no data; queries will report unavailable",
                path.display()
            );
        } else {
            info!(
                "Dataset reloaded from {} ({} records)",
                path.display(),
                dataset.len()
            );
        }
        let dataset = Arc::new(dataset);
        self.install(Arc::clone(&dataset));
        dataset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SalesMedium, TransactionRecord};
    use chrono::NaiveDate;

    fn dataset_with(revenue: f64) -> Dataset {
        Dataset::from_records(vec![TransactionRecord {
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            product_name: "Milo".to_string(),
            sales_medium: SalesMedium::Online,
            sales_location: "NSW".to_string(),
            sales_count: 1,
            total_revenue: revenue,
        }])
        .unwrap()
    }

    #[test]
    fn test_new_store_is_unavailable() {
        let store = DatasetStore::new();
        let snapshot = store.snapshot();
        assert!(snapshot.is_empty());
        assert!(snapshot.ensure_available().is_err());
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let store = DatasetStore::with_dataset(dataset_with(10.0));
        let before = store.snapshot();

        let previous = store.replace(dataset_with(20.0));
        assert!(Arc::ptr_eq(&before, &previous));

        assert_eq!(before.records()[0].total_revenue, 10.0);
        assert_eq!(store.snapshot().records()[0].total_revenue, 20.0);
    }

    #[test]
    fn test_failed_reload_installs_unavailable_dataset() {
        let store = DatasetStore::with_dataset(dataset_with(10.0));
        let current = store.reload_from_path("/no/such/file.csv");
        assert!(current.is_empty());
        assert!(current.unavailable_reason().is_some());
    }

    #[test]
    fn test_concurrent_readers_see_whole_datasets() {
        let store = Arc::new(DatasetStore::with_dataset(dataset_with(1.0)));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let snapshot = store.snapshot();
                        assert_eq!(snapshot.len(), 1);
                        let revenue = snapshot.records()[0].total_revenue;
                        assert!(revenue == 1.0 || revenue == 2.0);
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            store.replace(dataset_with(2.0));
            store.replace(dataset_with(1.0));
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
