//! Job pool: priority queues, the running set and the admission predicate.
//!
//! Positive priorities go into per-priority buckets, everything else into a
//! single FIFO. Dequeue takes the highest non-empty bucket first and falls
//! back to the FIFO. Within a bucket order is insertion order.
//!
//! A job id lives in at most one of {a bucket, the FIFO, the running set}.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use jobgrid_core::{JobId, ResourceLimits, ResourceSnapshot};

/// Read-only aggregate for observability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_queued: usize,
    /// Queued jobs per positive priority.
    pub per_bucket_counts: BTreeMap<i32, usize>,
    /// Jobs in the plain FIFO (priority ≤ 0).
    pub fifo_queued: usize,
    pub running_count: usize,
    pub max_concurrent: usize,
}

#[derive(Debug, Default)]
pub struct JobPool {
    limits: ResourceLimits,
    fifo: VecDeque<JobId>,
    buckets: BTreeMap<i32, VecDeque<JobId>>,
    /// Priority of every queued id.
    priorities: HashMap<JobId, i32>,
    running: HashSet<JobId>,
}

impl JobPool {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            ..Default::default()
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Replace the limits. Callers validate first.
    pub fn set_limits(&mut self, limits: ResourceLimits) {
        self.limits = limits;
    }

    /// Queue `id` at `priority`. Returns false if it is already queued or
    /// running, in which case nothing changes.
    pub fn add_job(&mut self, id: &str, priority: i32) -> bool {
        if self.priorities.contains_key(id) || self.running.contains(id) {
            return false;
        }
        if priority > 0 {
            self.buckets
                .entry(priority)
                .or_default()
                .push_back(id.to_string());
        } else {
            self.fifo.push_back(id.to_string());
        }
        self.priorities.insert(id.to_string(), priority);
        true
    }

    /// Pop the next id: highest bucket first, then the FIFO.
    pub fn get_next_job(&mut self) -> Option<JobId> {
        let id = match self.buckets.last_entry() {
            Some(mut bucket) => {
                let id = bucket.get_mut().pop_front();
                if bucket.get().is_empty() {
                    bucket.remove();
                }
                id
            }
            None => self.fifo.pop_front(),
        }?;
        self.priorities.remove(&id);
        Some(id)
    }

    /// Drop `id` from the queues. Absent ids are ignored. Returns whether
    /// anything was removed.
    pub fn remove_job(&mut self, id: &str) -> bool {
        let Some(priority) = self.priorities.remove(id) else {
            return false;
        };
        if priority > 0 {
            if let Some(queue) = self.buckets.get_mut(&priority) {
                queue.retain(|q| q != id);
                if queue.is_empty() {
                    self.buckets.remove(&priority);
                }
            }
        } else {
            self.fifo.retain(|q| q != id);
        }
        true
    }

    pub fn is_queued(&self, id: &str) -> bool {
        self.priorities.contains_key(id)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running.contains(id)
    }

    pub fn mark_running(&mut self, id: &str) {
        self.remove_job(id);
        self.running.insert(id.to_string());
    }

    /// Release a running slot. Returns false if `id` held none.
    pub fn mark_finished(&mut self, id: &str) -> bool {
        self.running.remove(id)
    }

    pub fn queued_count(&self) -> usize {
        self.priorities.len()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Admission predicate, evaluated against the latest snapshot.
    pub fn can_start_job(&self, snapshot: &ResourceSnapshot) -> bool {
        if self.running.len() >= self.limits.max_concurrent_jobs {
            return false;
        }
        if snapshot.cpu_percent > self.limits.max_cpu_percent {
            return false;
        }
        if snapshot.memory_free_gb < self.limits.min_memory_gb {
            return false;
        }
        if snapshot.disk_free_gb < self.limits.min_disk_gb {
            return false;
        }
        true
    }

    pub fn get_queue_stats(&self) -> QueueStats {
        QueueStats {
            total_queued: self.priorities.len(),
            per_bucket_counts: self
                .buckets
                .iter()
                .map(|(&p, q)| (p, q.len()))
                .collect(),
            fifo_queued: self.fifo.len(),
            running_count: self.running.len(),
            max_concurrent: self.limits.max_concurrent_jobs,
        }
    }
}
