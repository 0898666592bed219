use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Latest slot occupancy, serialized with the dashboard's field names
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancySnapshot {
    pub total_slots: u32,
    pub occupied_slots: u32,
    pub free_slots: u32,
    pub occupancy_rate: f64,
}

impl OccupancySnapshot {
    /// Build a snapshot from per-label counts; `None` when nothing was observed
    pub fn from_counts(occupied: u32, free: u32) -> Option<Self> {
        let total = occupied + free;
        if total == 0 {
            return None;
        }

        Some(Self {
            total_slots: total,
            occupied_slots: occupied,
            free_slots: free,
            occupancy_rate: round_to_tenth(occupied as f64 / total as f64 * 100.0),
        })
    }

    /// Counts add up and the rate matches them
    pub fn is_consistent(&self) -> bool {
        if self.occupied_slots + self.free_slots != self.total_slots {
            return false;
        }
        if !(0.0..=100.0).contains(&self.occupancy_rate) {
            return false;
        }
        self.total_slots == 0
            || self.occupancy_rate
                == round_to_tenth(self.occupied_slots as f64 / self.total_slots as f64 * 100.0)
    }
}

impl Default for OccupancySnapshot {
    fn default() -> Self {
        Self {
            total_slots: 396,
            occupied_slots: 271,
            free_slots: 125,
            occupancy_rate: 68.4,
        }
    }
}

/// Revenue and enforcement figures shown next to occupancy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub daily_revenue: u64,
    pub active_vehicles: u32,
    /// Randomized placeholder, not derived from detections
    pub violations: u32,
}

/// Pricing used to derive revenue from occupancy
#[derive(Debug, Clone, Copy)]
pub struct RevenueModel {
    pub per_vehicle: f64,
    pub factor: f64,
}

impl Default for RevenueModel {
    fn default() -> Self {
        Self {
            per_vehicle: 150.0,
            factor: 0.8,
        }
    }
}

impl SystemMetrics {
    /// Derive metrics from the occupied count; `violations` is supplied by the caller
    pub fn derive(occupied: u32, revenue: &RevenueModel, violations: u32) -> Self {
        Self {
            daily_revenue: (occupied as f64 * revenue.per_vehicle * revenue.factor).round() as u64,
            active_vehicles: occupied,
            violations,
        }
    }
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self {
            daily_revenue: 22_400,
            active_vehicles: 143,
            violations: 3,
        }
    }
}

/// Round to one decimal place, ties to even on the exact binary value.
///
/// Float formatting rounds the exact value, so `6.25` becomes `6.2` and
/// `0.05` (stored slightly above the tie) becomes `0.1`.
fn round_to_tenth(value: f64) -> f64 {
    format!("{:.1}", value).parse().unwrap_or(value)
}

/// Shared holder of the latest snapshot pair.
///
/// One lock guards both values so readers never see a snapshot from one
/// cycle paired with metrics from another.
#[derive(Debug, Default)]
pub struct StatsStore {
    inner: Mutex<(OccupancySnapshot, SystemMetrics)>,
}

impl StatsStore {
    pub fn new(snapshot: OccupancySnapshot, metrics: SystemMetrics) -> Self {
        Self {
            inner: Mutex::new((snapshot, metrics)),
        }
    }

    /// Consistent copy of the current pair
    pub fn read(&self) -> (OccupancySnapshot, SystemMetrics) {
        *self.inner.lock()
    }

    pub fn snapshot(&self) -> OccupancySnapshot {
        self.inner.lock().0
    }

    pub fn metrics(&self) -> SystemMetrics {
        self.inner.lock().1
    }

    /// Replace both values atomically
    pub fn write(&self, snapshot: OccupancySnapshot, metrics: SystemMetrics) {
        *self.inner.lock() = (snapshot, metrics);
    }
}
