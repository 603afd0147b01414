//! Tracing initialization for the worker and dashboard.
//!
//! The worker binary builds a [`TracingConfig`] from its CLI flags and
//! calls [`init_tracing`] once at startup; `RUST_LOG` always overrides
//! the configured filter.

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// How the process logs and exports spans.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Service name attached to exported spans.
    pub service_name: String,
    /// Bridge spans to OpenTelemetry with a stdout exporter (local
    /// development; swap the exporter for OTLP in production).
    pub otel: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info,chronod_core=debug,chronod_api=debug".to_string(),
            service_name: "chronod".to_string(),
            otel: false,
        }
    }
}

/// The OTel provider installed by [`init_tracing`], kept so
/// [`shutdown_tracing`] can flush it on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been set.
pub fn init_tracing(config: &TracingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false));

    if !config.otel {
        subscriber.init();
        return Ok(());
    }

    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .build();
    let tracer = provider.tracer(config.service_name.clone());
    let _ = TRACER_PROVIDER.set(provider.clone());
    opentelemetry::global::set_tracer_provider(provider);

    subscriber
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .init();
    Ok(())
}

/// Flush pending spans and shut down the OTel provider, if one was
/// installed.
pub fn shutdown_tracing() {
    let Some(provider) = TRACER_PROVIDER.get() else {
        return;
    };
    if let Err(err) = provider.shutdown() {
        tracing::warn!(%err, "otel tracer provider shutdown failed");
    }
}
