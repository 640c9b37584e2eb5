use serde::{Deserialize, Serialize};

/// Per-id result partition for operations that act on a set of task ids.
///
/// Callers always get the explicit succeeded/failed split; the boolean is
/// derived convenience, never the only signal of partial failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub succeeded: Vec<i64>,
    pub failed: Vec<i64>,
}

impl Outcome {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// An outcome where every id failed (run-level failure path).
    pub fn all_failed(ids: &[i64]) -> Self {
        Self {
            succeeded: Vec::new(),
            failed: ids.to_vec(),
        }
    }

    pub fn record(&mut self, id: i64, ok: bool) {
        if ok {
            self.succeeded.push(id);
        } else {
            self.failed.push(id);
        }
    }
}
