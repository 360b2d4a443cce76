//! Allocation/release bookkeeping for GPU objects owned by the layer.
//!
//! wgpu frees objects on drop, so nothing here is needed for correctness. The
//! ledger exists so hosts and tests can verify that `destroy` releases exactly
//! what construction and rendering allocated.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kinds of GPU objects tracked by the ledger.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    FrameBuffer,
    Texture,
    Sampler,
    Buffer,
    Shader,
    Program,
    VertexArray,
    BindGroup,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::FrameBuffer,
        ResourceKind::Texture,
        ResourceKind::Sampler,
        ResourceKind::Buffer,
        ResourceKind::Shader,
        ResourceKind::Program,
        ResourceKind::VertexArray,
        ResourceKind::BindGroup,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct Counters {
    allocated: [AtomicU64; 8],
    released: [AtomicU64; 8],
}

/// Shared allocation counters. Cloning shares the same counters.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    inner: Arc<Counters>,
}

/// Point-in-time copy of the ledger.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct LedgerSnapshot {
    pub allocated: [u64; 8],
    pub released: [u64; 8],
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn allocated(&self, kind: ResourceKind) {
        self.inner.allocated[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn released(&self, kind: ResourceKind) {
        self.inner.released[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Objects of `kind` allocated and not yet released.
    pub fn live(&self, kind: ResourceKind) -> i64 {
        let i = kind.index();
        self.inner.allocated[i].load(Ordering::Relaxed) as i64
            - self.inner.released[i].load(Ordering::Relaxed) as i64
    }

    /// Objects of any kind allocated and not yet released.
    pub fn total_live(&self) -> i64 {
        ResourceKind::ALL.iter().map(|&k| self.live(k)).sum()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut snap = LedgerSnapshot::default();
        for kind in ResourceKind::ALL {
            let i = kind.index();
            snap.allocated[i] = self.inner.allocated[i].load(Ordering::Relaxed);
            snap.released[i] = self.inner.released[i].load(Ordering::Relaxed);
        }
        snap
    }
}

impl LedgerSnapshot {
    pub fn allocated_of(&self, kind: ResourceKind) -> u64 {
        self.allocated[kind.index()]
    }

    pub fn released_of(&self, kind: ResourceKind) -> u64 {
        self.released[kind.index()]
    }

    /// True when every allocation has a matching release.
    pub fn is_balanced(&self) -> bool {
        self.allocated == self.released
    }
}
