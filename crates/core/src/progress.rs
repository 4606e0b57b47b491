//! Progress snapshots and the record-count breakdown they carry.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Point-in-time progress of a generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// 1-based index of the day most recently generated.
    pub current_day: u32,
    pub total_days: u32,
    /// Calendar date of `current_day`.
    pub current_date: NaiveDate,
    /// Completion percentage, 0-100.
    pub percentage: f64,
    /// Generator module working on the current day, if reported.
    #[serde(default)]
    pub current_module: Option<String>,
    #[serde(default)]
    pub records: RecordCounts,
}

impl ProgressSnapshot {
    pub fn is_complete(&self) -> bool {
        self.current_day >= self.total_days
    }
}

/// Generated record counts, split by domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    #[serde(default)]
    pub mes: MesCounts,
    #[serde(default)]
    pub erp: ErpCounts,
}

impl RecordCounts {
    /// Sum across every counter in both domains.
    pub fn total(&self) -> u64 {
        self.mes.total() + self.erp.total()
    }
}

/// Manufacturing execution counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MesCounts {
    pub work_orders: u64,
    pub production_results: u64,
    pub quality_inspections: u64,
    pub equipment_events: u64,
    pub material_consumptions: u64,
    pub defects: u64,
}

impl MesCounts {
    pub fn total(&self) -> u64 {
        self.work_orders
            + self.production_results
            + self.quality_inspections
            + self.equipment_events
            + self.material_consumptions
            + self.defects
    }
}

/// Business (ERP) counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErpCounts {
    pub sales_orders: u64,
    pub purchase_orders: u64,
    pub inventory_transactions: u64,
    pub shipments: u64,
    pub invoices: u64,
}

impl ErpCounts {
    pub fn total(&self) -> u64 {
        self.sales_orders
            + self.purchase_orders
            + self.inventory_transactions
            + self.shipments
            + self.invoices
    }
}
