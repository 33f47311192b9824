//! Log formatting and optional OTLP trace export.
//!
//! Export is switched on by `OTEL_EXPORTER_OTLP_ENDPOINT`; only gRPC is
//! supported. Spans from the resolver and the control plane flow through the
//! same subscriber as the log lines.

use anyhow::{Context, Result, anyhow};
use base64ct::{Base64, Encoding};
use once_cell::sync::OnceCell;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
};
use std::{env::var, time::Duration};
use tonic::{
    metadata::{Ascii, Binary, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};
use ulid::Ulid;

const DEFAULT_ENDPOINT: &str = "http://localhost:4317";

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// Splits `k1=v1,k2=v2`; pairs without `=` are dropped.
fn parse_headers_env(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// Builds gRPC metadata. Keys ending in `-bin` carry base64 values.
fn headers_to_metadata(headers: &[(String, String)]) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::with_capacity(headers.len());

    for (key, value) in headers {
        if key.ends_with("-bin") {
            let bytes = Base64::decode_vec(value)
                .map_err(|err| anyhow!("failed to base64-decode value for key {key}: {err}"))?;
            let name = MetadataKey::<Binary>::from_bytes(key.as_bytes())
                .map_err(|err| anyhow!("invalid binary metadata key {key}: {err}"))?;
            metadata.insert_bin(name, MetadataValue::from_bytes(&bytes));
        } else {
            let name = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
                .map_err(|err| anyhow!("invalid metadata key {key}: {err}"))?;
            let parsed: MetadataValue<Ascii> = value
                .parse()
                .map_err(|err| anyhow!("invalid metadata value for key {key}: {err}"))?;
            metadata.insert(name, parsed);
        }
    }

    Ok(metadata)
}

/// Endpoints without a scheme default to https.
fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

fn tls_domain(endpoint: &str) -> Option<&str> {
    endpoint
        .strip_prefix("https://")
        .and_then(|rest| rest.split('/').next())
        .and_then(|authority| authority.split(':').next())
        .filter(|host| !host.is_empty())
}

fn init_tracer(endpoint: &str) -> Result<Tracer> {
    if let Ok(protocol) = var("OTEL_EXPORTER_OTLP_PROTOCOL")
        && protocol != "grpc"
    {
        debug!(%protocol, "OTEL_EXPORTER_OTLP_PROTOCOL ignored, exporting over grpc");
    }

    let endpoint = normalize_endpoint(endpoint);

    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .with_compression(Compression::Gzip)
        .with_timeout(Duration::from_secs(3));

    if let Some(domain) = tls_domain(&endpoint) {
        builder = builder.with_tls_config(
            ClientTlsConfig::new()
                .domain_name(domain.to_string())
                .with_native_roots(),
        );
    }

    if let Ok(raw) = var("OTEL_EXPORTER_OTLP_HEADERS") {
        let headers = parse_headers_env(&raw);
        if !headers.is_empty() {
            builder = builder.with_metadata(headers_to_metadata(&headers)?);
        }
    }

    let exporter = builder.build().context("failed to build OTLP exporter")?;

    let instance_id = var("OTEL_SERVICE_INSTANCE_ID").unwrap_or_else(|_| Ulid::new().to_string());

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder_empty()
                .with_attributes(vec![
                    KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    KeyValue::new("service.instance.id", instance_id),
                ])
                .build(),
        )
        .build();

    let _ = TRACER_PROVIDER.set(provider.clone());

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

/// Initialize logging and, when an OTLP endpoint is configured, trace export.
///
/// # Errors
///
/// Returns an error if the exporter or the global subscriber cannot be set up
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let verbosity_level = verbosity_level.unwrap_or(Level::ERROR);

    let fmt_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?);

    match var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(endpoint) => {
            let endpoint = if endpoint.trim().is_empty() {
                DEFAULT_ENDPOINT.to_string()
            } else {
                endpoint
            };
            let otel_layer = tracing_opentelemetry::layer().with_tracer(init_tracer(&endpoint)?);
            let subscriber = Registry::default()
                .with(fmt_layer)
                .with(otel_layer)
                .with(filter);
            tracing::subscriber::set_global_default(subscriber)?;
        }
        Err(_) => {
            let subscriber = Registry::default().with(fmt_layer).with(filter);
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

/// Flush and stop the tracer provider, if one was started.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("shutting down tracer provider");
        if let Err(err) = provider.shutdown() {
            debug!(%err, "tracer provider shutdown failed");
        }
    }
}
