//! Prometheus metrics and tracing span helpers.
//!
//! Metrics live behind the `metrics` feature, spans behind `tracing`.

#[cfg(feature = "metrics")]
pub use prometheus_metrics::{render, ServiceMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<ServiceMetrics> = Lazy::new(ServiceMetrics::init);

    pub struct ServiceMetrics {
        registry: Registry,
        _provider: Option<SdkMeterProvider>,
        queries_total: Counter<u64>,
        query_errors_total: Counter<u64>,
        query_duration: Histogram<f64>,
        pool_wait_duration: Histogram<f64>,
        movements_recorded: Counter<u64>,
        movements_rejected: Counter<u64>,
        http_requests: Counter<u64>,
    }

    impl ServiceMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => Some(SdkMeterProvider::builder().with_reader(exporter).build()),
                Err(e) => {
                    log::error!("prometheus exporter unavailable, metrics disabled: {e}");
                    None
                }
            };
            let meter = match &provider {
                Some(p) => p.meter("cantiere"),
                None => opentelemetry::global::meter("cantiere"),
            };

            Self {
                queries_total: meter
                    .u64_counter("cantiere_queries_total")
                    .with_description("Total queries executed")
                    .build(),
                query_errors_total: meter
                    .u64_counter("cantiere_query_errors_total")
                    .with_description("Queries that returned an error")
                    .build(),
                query_duration: meter
                    .f64_histogram("cantiere_query_duration_seconds")
                    .with_description("Duration of queries")
                    .build(),
                pool_wait_duration: meter
                    .f64_histogram("cantiere_pool_wait_seconds")
                    .with_description("Time spent waiting for a pooled connection")
                    .build(),
                movements_recorded: meter
                    .u64_counter("cantiere_stock_movements_total")
                    .with_description("Stock movements committed, by kind")
                    .build(),
                movements_rejected: meter
                    .u64_counter("cantiere_stock_movements_rejected_total")
                    .with_description("Stock movements rejected, by kind and reason")
                    .build(),
                http_requests: meter
                    .u64_counter("cantiere_http_requests_total")
                    .with_description("HTTP requests served, by status class")
                    .build(),
                registry,
                _provider: provider,
            }
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn observe_wait(&self, duration: Duration) {
            self.pool_wait_duration.record(duration.as_secs_f64(), &[]);
        }

        pub fn record_movement(&self, kind: &'static str) {
            self.movements_recorded.add(1, &[KeyValue::new("kind", kind)]);
        }

        pub fn record_rejected_movement(&self, kind: &'static str, reason: &'static str) {
            self.movements_rejected.add(
                1,
                &[KeyValue::new("kind", kind), KeyValue::new("reason", reason)],
            );
        }

        pub fn record_http(&self, status: u16) {
            let class = match status {
                200..=299 => "2xx",
                400..=499 => "4xx",
                _ => "5xx",
            };
            self.http_requests.add(1, &[KeyValue::new("class", class)]);
        }
    }

    /// Prometheus text exposition of everything recorded so far
    pub fn render() -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&METRICS.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn acquire_connection_span() -> Span {
        info_span!("db.connect")
    }

    pub fn execute_query_span(query: &str) -> Span {
        info_span!("db.query", db.statement = %query)
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("db.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("db.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("db.transaction.rollback")
    }

    pub fn movement_span(item_id: i64, kind: &str) -> Span {
        info_span!("warehouse.movement", item_id, kind)
    }
}
