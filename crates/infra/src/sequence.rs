//! Per-tenant audit number allocation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stocktake_core::TenantId;

/// Allocates human-facing audit numbers: unique and monotonically
/// increasing within a tenant, starting at 1.
pub trait AuditNumberAllocator: Send + Sync {
    fn next(&self, tenant_id: TenantId) -> u64;
}

impl<S> AuditNumberAllocator for Arc<S>
where
    S: AuditNumberAllocator + ?Sized,
{
    fn next(&self, tenant_id: TenantId) -> u64 {
        (**self).next(tenant_id)
    }
}

/// In-memory allocator for tests/dev. Numbers restart on process restart,
/// which is fine only because the dev store restarts with it.
#[derive(Debug, Default)]
pub struct InMemoryAuditNumbers {
    counters: Mutex<HashMap<TenantId, u64>>,
}

impl InMemoryAuditNumbers {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditNumberAllocator for InMemoryAuditNumbers {
    fn next(&self, tenant_id: TenantId) -> u64 {
        let mut counters = match self.counters.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        };
        let counter = counters.entry(tenant_id).or_insert(0);
        *counter += 1;
        *counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_monotonic_per_tenant() {
        let seq = InMemoryAuditNumbers::new();
        let a = TenantId::new();
        let b = TenantId::new();

        assert_eq!(seq.next(a), 1);
        assert_eq!(seq.next(a), 2);
        assert_eq!(seq.next(b), 1);
        assert_eq!(seq.next(a), 3);
    }
}
