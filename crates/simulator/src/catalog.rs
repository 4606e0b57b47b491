//! Flavor messages for simulated scenario events.
//!
//! These only decorate the log; they never touch counters or completion.

/// Chance that a tick emits a scenario event.
pub const EVENT_PROBABILITY: f64 = 0.1;

pub const SCENARIO_EVENTS: [&str; 8] = [
    "Machine breakdown on line 2, work orders rescheduled",
    "Supplier shipment arrived two days late",
    "Quality inspection rejected a material lot",
    "Rush order received from a key customer",
    "Preventive maintenance completed on press 4",
    "Raw material shortage triggered an expedited purchase order",
    "Overtime shift added to clear the backlog",
    "Customer return logged against last week's shipment",
];
