use crate::error::RagError;
use crate::models::{IndexHandle, DEFAULT_NAMESPACE};
use crate::timeout::with_timeout;
use crate::traits::{CreateIndexOutcome, VectorStore};
use std::time::Duration;
use tracing::{debug, info};

/// Makes sure `name` exists with `dimensionality`, creating it if absent.
///
/// Check-then-create is not atomic against the store. A create that loses a
/// race to another caller reports `AlreadyExists`; the index is then re-read
/// and held to the same dimension check as a pre-existing one.
pub async fn ensure_index<S>(
    store: &S,
    name: &str,
    dimensionality: usize,
    limit: Duration,
) -> Result<IndexHandle, RagError>
where
    S: VectorStore + ?Sized,
{
    if name.trim().is_empty() {
        return Err(RagError::InvalidArgument("index name is empty".to_string()));
    }
    if dimensionality == 0 {
        return Err(RagError::InvalidArgument(
            "index dimensionality must be positive".to_string(),
        ));
    }

    let existing = with_timeout("describe index", limit, store.describe_index(name)).await?;
    if let Some(existing) = existing {
        debug!(index = name, dimensionality = existing, "index already present");
        return checked_handle(name, existing, dimensionality);
    }

    let outcome = with_timeout(
        "create index",
        limit,
        store.create_index(name, dimensionality),
    )
    .await?;

    match outcome {
        CreateIndexOutcome::Created => {
            info!(index = name, dimensionality, backend = store.backend(), "created index");
            Ok(handle(name, dimensionality))
        }
        CreateIndexOutcome::AlreadyExists => {
            let existing = with_timeout("describe index", limit, store.describe_index(name))
                .await?
                .ok_or_else(|| RagError::IndexNotFound(name.to_string()))?;
            checked_handle(name, existing, dimensionality)
        }
    }
}

/// Handle for an index that must already exist; used at query time.
pub async fn open_index<S>(
    store: &S,
    name: &str,
    namespace: &str,
    limit: Duration,
) -> Result<IndexHandle, RagError>
where
    S: VectorStore + ?Sized,
{
    let dimensionality = with_timeout("describe index", limit, store.describe_index(name))
        .await?
        .ok_or_else(|| RagError::IndexNotFound(name.to_string()))?;
    Ok(handle(name, dimensionality).in_namespace(namespace))
}

fn checked_handle(name: &str, existing: usize, requested: usize) -> Result<IndexHandle, RagError> {
    if existing != requested {
        return Err(RagError::DimensionMismatch {
            index: name.to_string(),
            existing,
            requested,
        });
    }
    Ok(handle(name, existing))
}

fn handle(name: &str, dimensionality: usize) -> IndexHandle {
    IndexHandle {
        name: name.to_string(),
        namespace: DEFAULT_NAMESPACE.to_string(),
        dimensionality,
    }
}
