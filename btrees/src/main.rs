// Forbid unwrap() in production code to prevent panics from corrupt data.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

use btrees::config::WorkloadConfig;
use btrees::{BTree, FileStore, ObjectRef, ObjectStore, UOBTree, workload};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "btrees=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match WorkloadConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: data_file={}, operations={}, seed={}",
        config.data_file.display(),
        config.operations,
        config.seed
    );

    let mut tree = match open_tree(&config) {
        Ok(tree) => tree,
        Err(e) => {
            tracing::error!("Failed to open tree: {e}");
            std::process::exit(1);
        }
    };

    let report = match workload::run(&mut tree, config.operations, config.seed) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Workload failed: {e}");
            if let Err(e) = tree.abort() {
                tracing::error!("Abort failed: {e}");
            }
            std::process::exit(1);
        }
    };

    let height = match tree.check() {
        Ok(check) => check.height,
        Err(e) => {
            tracing::error!("Invariant check failed: {e}");
            std::process::exit(1);
        }
    };

    let stats = tree.stats();
    tracing::info!(
        inserted = report.inserted,
        replaced = report.replaced,
        rejected = report.rejected,
        removed = report.removed,
        lookups = report.lookups,
        hits = report.hits,
        commits = report.commits,
        len = stats.len,
        height,
        faults = stats.cache.faults,
        "workload finished"
    );
}

/// Open the tree recorded as the store's root, creating both if needed.
fn open_tree(config: &WorkloadConfig) -> Result<UOBTree<FileStore>, btrees::BTreeError> {
    let store = FileStore::open_or_create(&config.data_file)?;
    if let Some(meta_id) = store.root() {
        return BTree::<u32, ObjectRef, _>::open(store, meta_id);
    }

    let mut tree = BTree::create(store, config.tree)?;
    let meta_id = tree.meta_id();
    tree.store_mut().set_root(Some(meta_id))?;
    tree.store_mut().sync()?;
    tracing::info!(meta = meta_id, "created new tree");
    Ok(tree)
}
