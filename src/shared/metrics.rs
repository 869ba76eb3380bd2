//! Prometheus Metrics Module
//!
//! 提供撮合引擎的核心性能指标监控
//!
//! ## 指标类型
//! - **Counter**: 操作总数（按操作与结果）、成交总数（按品种）
//! - **Histogram**: 单次操作耗时
//! - **Gauge**: 每个工作线程的队列深度
//!
//! ## 使用示例
//! ```rust,ignore
//! use rapid_match::shared::metrics::METRICS;
//!
//! METRICS.operations_total.with_label_values(&["add_order", "ok"]).inc();
//!
//! let timer = METRICS.operation_duration.with_label_values(&["add_order"]).start_timer();
//! // ... 执行撮合 ...
//! timer.observe_duration();
//! ```

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    /// 全局Metrics实例
    pub static ref METRICS: Metrics = Metrics::new();
}

/// 撮合引擎核心指标
pub struct Metrics {
    /// 操作总数 (operation: add_order/delete_order/add_symbol/delete_symbol, status: ok 或错误类别)
    pub operations_total: CounterVec,

    /// 成交总数
    pub executions_total: CounterVec,

    /// 操作耗时分布 (微秒)
    pub operation_duration: HistogramVec,

    /// 工作线程队列深度
    pub worker_queue_depth: GaugeVec,
}

impl Metrics {
    /// 创建新的Metrics实例
    ///
    /// Panics if the metric names are already registered, which only happens
    /// when a second instance is built next to `METRICS`.
    pub fn new() -> Self {
        Self {
            operations_total: register_counter_vec!(
                "rapid_match_operations_total",
                "Total number of market operations processed",
                &["operation", "status"]
            )
            .expect("operations_total registered once"),

            executions_total: register_counter_vec!(
                "rapid_match_executions_total",
                "Total number of matches executed",
                &["symbol"]
            )
            .expect("executions_total registered once"),

            operation_duration: register_histogram_vec!(
                "rapid_match_operation_duration_microseconds",
                "Market operation duration in microseconds",
                &["operation"],
                vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
            )
            .expect("operation_duration registered once"),

            worker_queue_depth: register_gauge_vec!(
                "rapid_match_worker_queue_depth",
                "Pending work items per worker",
                &["worker"]
            )
            .expect("worker_queue_depth registered once"),
        }
    }

    /// 导出Prometheus格式的指标
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_global() {
        // 使用全局METRICS实例而不是创建新的
        METRICS
            .operations_total
            .with_label_values(&["add_order", "ok"])
            .inc();

        let output = METRICS.export();
        assert!(output.contains("rapid_match_operations_total"));
    }

    #[test]
    fn test_histogram_global() {
        METRICS
            .operation_duration
            .with_label_values(&["add_order"])
            .observe(12.5);

        let output = METRICS.export();
        assert!(output.contains("rapid_match_operation_duration_microseconds"));
    }

    #[test]
    fn test_gauge_global() {
        METRICS.worker_queue_depth.with_label_values(&["0"]).set(3.0);

        // Note: 由于是全局共享，不能假设值精确匹配
        let output = METRICS.export();
        assert!(output.contains("rapid_match_worker_queue_depth"));
    }
}
