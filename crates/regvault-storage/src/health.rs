//! Storage health check

use opendal::{ErrorKind, Operator};
use regvault_core::{RegError, RegResult};

use crate::store::RECORD_PREFIX;

/// Verify the backend answers by listing the record prefix. A prefix that
/// does not exist yet (fresh store) counts as healthy.
pub async fn check_health(op: &Operator) -> RegResult<()> {
    match op.list(RECORD_PREFIX).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RegError::Storage(format!("storage health check failed: {e}"))),
    }
}

/// Returns true if storage is reachable, false otherwise (non-panicking)
pub async fn is_healthy(op: &Operator) -> bool {
    check_health(op).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_is_healthy() {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        assert!(is_healthy(&op).await);
    }
}
