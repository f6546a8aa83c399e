// ABOUTME: Optional OTLP span export wired into the tracing subscriber
// ABOUTME: Owns the tracer provider so shutdown can flush pending spans
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Distributed tracing export.
//!
//! Built with the `telemetry` feature, [`Telemetry::init`] installs an OTLP gRPC
//! exporter behind a batch span processor and hands a `tracing_opentelemetry`
//! layer to the logging setup. Without the feature, or with `TRACING_ENABLED`
//! unset, every method is a no-op and [`Telemetry::layer`] yields `None`.

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::config::TracingConfig;
use crate::errors::AppResult;

#[cfg(feature = "telemetry")]
use {
    crate::errors::AppError,
    opentelemetry::{global, trace::TracerProvider as _, KeyValue},
    opentelemetry_otlp::{SpanExporter, WithExportConfig},
    opentelemetry_sdk::{
        propagation::TraceContextPropagator,
        runtime,
        trace::{BatchConfigBuilder, BatchSpanProcessor, Sampler, TracerProvider},
        Resource,
    },
    tracing::{info, warn},
};

/// Handle on the span export pipeline
#[derive(Default)]
pub struct Telemetry {
    #[cfg(feature = "telemetry")]
    provider: Option<TracerProvider>,
}

impl Telemetry {
    /// Telemetry that exports nothing
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether spans are being exported
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "telemetry")]
        {
            self.provider.is_some()
        }
        #[cfg(not(feature = "telemetry"))]
        {
            false
        }
    }

    /// Build the export pipeline described by `config`
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the OTLP exporter cannot be built
    #[cfg(feature = "telemetry")]
    pub fn init(config: &TracingConfig) -> AppResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let endpoint = if config.endpoint.contains("://") {
            config.endpoint.clone()
        } else {
            format!("http://{}", config.endpoint)
        };

        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint.clone())
            .with_timeout(config.timeout)
            .build()
            .map_err(|e| AppError::config(format!("Failed to build OTLP exporter: {e}")))?;

        let processor = BatchSpanProcessor::builder(exporter, runtime::Tokio)
            .with_batch_config(
                BatchConfigBuilder::default()
                    .with_scheduled_delay(config.batch_timeout)
                    .build(),
            )
            .build();

        let provider = TracerProvider::builder()
            .with_span_processor(processor)
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                config.sampling_rate,
            ))))
            .with_resource(Resource::new(vec![
                KeyValue::new("service.name", config.service_name.clone()),
                KeyValue::new("service.version", config.version.clone()),
                KeyValue::new("deployment.environment", config.environment.clone()),
            ]))
            .build();

        global::set_text_map_propagator(TraceContextPropagator::new());
        global::set_tracer_provider(provider.clone());

        info!(
            endpoint = %endpoint,
            sampling_rate = config.sampling_rate,
            "OTLP span export enabled"
        );

        Ok(Self {
            provider: Some(provider),
        })
    }

    /// Build the export pipeline described by `config`
    ///
    /// # Errors
    ///
    /// Never fails when built without the `telemetry` feature
    #[cfg(not(feature = "telemetry"))]
    pub fn init(config: &TracingConfig) -> AppResult<Self> {
        if config.enabled {
            tracing::warn!("TRACING_ENABLED is set but the binary was built without the telemetry feature");
        }
        Ok(Self::disabled())
    }

    /// Subscriber layer forwarding spans to the exporter, if enabled
    #[must_use]
    pub fn layer<S>(&self) -> Option<Box<dyn Layer<S> + Send + Sync>>
    where
        S: Subscriber + for<'span> LookupSpan<'span> + Send + Sync + 'static,
    {
        #[cfg(feature = "telemetry")]
        {
            self.provider.as_ref().map(|provider| {
                let tracer = provider.tracer("tool-gateway");
                tracing_opentelemetry::layer().with_tracer(tracer).boxed()
            })
        }
        #[cfg(not(feature = "telemetry"))]
        {
            None
        }
    }

    /// Flush and stop the exporter
    pub fn shutdown(&self) {
        #[cfg(feature = "telemetry")]
        if let Some(provider) = &self.provider {
            if let Err(e) = provider.shutdown() {
                warn!("Failed to flush spans on shutdown: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_config_yields_no_layer() {
        let telemetry = Telemetry::init(&TracingConfig::default()).unwrap();
        assert!(!telemetry.is_enabled());
        assert!(telemetry
            .layer::<tracing_subscriber::Registry>()
            .is_none());
        telemetry.shutdown();
    }
}
