//! Fixed per-day accrual rates of the simulated record counters.

use genrun_core::progress::{ErpCounts, MesCounts, RecordCounts};

/// Records accrued for every simulated day.
pub const DAILY_RATES: RecordCounts = RecordCounts {
    mes: MesCounts {
        work_orders: 120,
        production_results: 240,
        quality_inspections: 60,
        equipment_events: 480,
        material_consumptions: 360,
        defects: 8,
    },
    erp: ErpCounts {
        sales_orders: 45,
        purchase_orders: 20,
        inventory_transactions: 300,
        shipments: 40,
        invoices: 45,
    },
};

/// Generator modules reported as `current_module`, cycled by day.
pub const MODULES: [&str; 7] = [
    "mes.work_orders",
    "mes.production",
    "mes.quality",
    "mes.equipment",
    "erp.sales",
    "erp.purchasing",
    "erp.inventory",
];

/// Cumulative record counts after `day` simulated days.
pub fn records_after(day: u32) -> RecordCounts {
    let d = u64::from(day);
    let mes = DAILY_RATES.mes;
    let erp = DAILY_RATES.erp;

    RecordCounts {
        mes: MesCounts {
            work_orders: mes.work_orders * d,
            production_results: mes.production_results * d,
            quality_inspections: mes.quality_inspections * d,
            equipment_events: mes.equipment_events * d,
            material_consumptions: mes.material_consumptions * d,
            defects: mes.defects * d,
        },
        erp: ErpCounts {
            sales_orders: erp.sales_orders * d,
            purchase_orders: erp.purchase_orders * d,
            inventory_transactions: erp.inventory_transactions * d,
            shipments: erp.shipments * d,
            invoices: erp.invoices * d,
        },
    }
}

/// Module label for a 1-based day.
pub fn module_for_day(day: u32) -> &'static str {
    let index = (day.saturating_sub(1) as usize) % MODULES.len();
    MODULES[index]
}
