use prometheus::{IntCounterVec, Registry};

#[derive(Clone)]
pub struct LedgerMetrics {
    pub registry: Registry,
    pub movements_applied_total: IntCounterVec,
    pub movements_rejected_total: IntCounterVec,
    pub http_errors_total: IntCounterVec,
}

impl LedgerMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let movements_applied_total = IntCounterVec::new(
            prometheus::Opts::new(
                "ledger_movements_applied_total",
                "Committed stock movements by kind",
            ),
            &["kind"],
        ).unwrap();
        let movements_rejected_total = IntCounterVec::new(
            prometheus::Opts::new(
                "ledger_movements_rejected_total",
                "Rejected stock movements by error code",
            ),
            &["code"],
        ).unwrap();
        let http_errors_total = IntCounterVec::new(
            prometheus::Opts::new(
                "http_errors_total",
                "Count of HTTP error responses emitted (status >= 400)",
            ),
            &["service", "code", "status"],
        ).unwrap();
        let _ = registry.register(Box::new(movements_applied_total.clone()));
        let _ = registry.register(Box::new(movements_rejected_total.clone()));
        let _ = registry.register(Box::new(http_errors_total.clone()));
        LedgerMetrics { registry, movements_applied_total, movements_rejected_total, http_errors_total }
    }
}

impl Default for LedgerMetrics {
    fn default() -> Self { Self::new() }
}
