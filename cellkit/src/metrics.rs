use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    pub static ref STORE_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "cellkit_operation_duration_seconds",
        "Store operation duration in seconds",
        &["operation", "table", "status"]
    ).unwrap();

    pub static ref OPERATION_COUNTER: IntCounterVec = register_int_counter_vec!(
        "cellkit_operations_total",
        "Total number of store operations",
        &["operation", "status"]
    ).unwrap();

    pub static ref CONNECTION_ATTEMPTS: IntCounter = register_int_counter!(
        "cellkit_connection_attempts_total",
        "Connection attempts made against the store cluster"
    ).unwrap();

    pub static ref ACTIVE_CONNECTION: IntGauge = register_int_gauge!(
        "cellkit_active_connection",
        "1 while a store connection is held"
    ).unwrap();

    pub static ref BUFFERED_MUTATIONS: IntGauge = register_int_gauge!(
        "cellkit_buffered_mutations",
        "Row mutations waiting in write buffers"
    ).unwrap();
}

pub fn record_operation(operation: &str, table: &str, success: bool, duration: f64) {
    let status = if success { "success" } else { "failure" };
    STORE_OPERATION_DURATION
        .with_label_values(&[operation, table, status])
        .observe(duration);
    OPERATION_COUNTER
        .with_label_values(&[operation, status])
        .inc();
}

pub fn record_connection_attempt() {
    CONNECTION_ATTEMPTS.inc();
}

pub fn set_active_connection(active: bool) {
    ACTIVE_CONNECTION.set(if active { 1 } else { 0 });
}

pub fn add_buffered_mutations(delta: i64) {
    BUFFERED_MUTATIONS.add(delta);
}
