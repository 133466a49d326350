//! Admission limits and their validated partial update.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ValidationError, ValidationResult};

/// Process-wide admission limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Upper bound on jobs in the running set (≥ 1).
    pub max_concurrent_jobs: usize,
    /// Admission stops while host CPU is above this (0, 100].
    pub max_cpu_percent: f64,
    /// Admission stops while free memory is below this (GB, ≥ 0).
    pub min_memory_gb: f64,
    /// Admission stops while free disk is below this (GB, ≥ 0).
    pub min_disk_gb: f64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            max_cpu_percent: 80.0,
            min_memory_gb: 2.0,
            min_disk_gb: 10.0,
        }
    }
}

impl ResourceLimits {
    /// Check every field against its range.
    pub fn validate(&self) -> ValidationResult<()> {
        check_concurrency(self.max_concurrent_jobs as i64)?;
        check_cpu(self.max_cpu_percent)?;
        check_floor("min_memory_gb", self.min_memory_gb)?;
        check_floor("min_disk_gb", self.min_disk_gb)?;
        Ok(())
    }

    /// Return a copy with `update` applied. `self` is never touched, so a
    /// rejected update leaves the current limits as they were.
    pub fn apply(&self, update: &LimitsUpdate) -> ValidationResult<ResourceLimits> {
        let mut next = self.clone();
        if let Some(v) = update.max_concurrent_jobs {
            next.max_concurrent_jobs = v;
        }
        if let Some(v) = update.max_cpu_percent {
            next.max_cpu_percent = v;
        }
        if let Some(v) = update.min_memory_gb {
            next.min_memory_gb = v;
        }
        if let Some(v) = update.min_disk_gb {
            next.min_disk_gb = v;
        }
        next.validate()?;
        Ok(next)
    }
}

/// A partial edit of `ResourceLimits`. Absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_jobs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_memory_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_disk_gb: Option<f64>,
}

impl LimitsUpdate {
    pub fn is_empty(&self) -> bool {
        self.max_concurrent_jobs.is_none()
            && self.max_cpu_percent.is_none()
            && self.min_memory_gb.is_none()
            && self.min_disk_gb.is_none()
    }

    /// Parse an untyped JSON object, checking the type and range of each
    /// field. The first bad field rejects the whole update.
    pub fn from_json(value: &Value) -> ValidationResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ValidationError::new("limits", "expected a JSON object"))?;

        let mut update = LimitsUpdate::default();
        for (key, v) in obj {
            match key.as_str() {
                "max_concurrent_jobs" => {
                    let n = v.as_i64().ok_or_else(|| {
                        ValidationError::new(key, "must be an integer")
                    })?;
                    check_concurrency(n)?;
                    update.max_concurrent_jobs = Some(n as usize);
                }
                "max_cpu_percent" => {
                    let n = number(key, v)?;
                    check_cpu(n)?;
                    update.max_cpu_percent = Some(n);
                }
                "min_memory_gb" => {
                    let n = number(key, v)?;
                    check_floor(key, n)?;
                    update.min_memory_gb = Some(n);
                }
                "min_disk_gb" => {
                    let n = number(key, v)?;
                    check_floor(key, n)?;
                    update.min_disk_gb = Some(n);
                }
                other => {
                    return Err(ValidationError::new(other, "unknown limit field"));
                }
            }
        }

        if update.is_empty() {
            return Err(ValidationError::new("limits", "no limit fields supplied"));
        }
        Ok(update)
    }
}

fn number(field: &str, v: &Value) -> ValidationResult<f64> {
    v.as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| ValidationError::new(field, "must be a number"))
}

fn check_concurrency(n: i64) -> ValidationResult<()> {
    if n < 1 {
        return Err(ValidationError::new(
            "max_concurrent_jobs",
            format!("must be at least 1, got {n}"),
        ));
    }
    Ok(())
}

fn check_cpu(n: f64) -> ValidationResult<()> {
    if !(n > 0.0 && n <= 100.0) {
        return Err(ValidationError::new(
            "max_cpu_percent",
            format!("must be in (0, 100], got {n}"),
        ));
    }
    Ok(())
}

fn check_floor(field: &str, n: f64) -> ValidationResult<()> {
    if !n.is_finite() || n < 0.0 {
        return Err(ValidationError::new(field, format!("must be >= 0, got {n}")));
    }
    Ok(())
}
