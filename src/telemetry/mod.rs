//! # Módulo de Telemetria OpenTelemetry
//!
//! Liga o `tracing` do runner a um coletor OTLP (opcional) e ao console.
//!
//! ## Para todos entenderem:
//!
//! Cada execução de cenário vira um trace; cada step vira um span filho
//! com o kind, a ordem e o status. Assim dá para ver no Jaeger/Tempo qual
//! tela demorou ou qual seletor esgotou o prazo.
//!
//! ```text
//! [scenario PO-001] ─────────────────────────────────────────>
//!   [step 1 navigate] ──────>
//!                     [step 2 text_input] ─>
//!                                          [step 3 element_click] ──>
//! ```
//!
//! ## Configuração via variáveis de ambiente:
//!
//! - `OTEL_SERVICE_NAME`: Nome do serviço (padrão `rice-runner`)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: URL do coletor OTLP; sem ela, só console
//! - `OTEL_TRACES_SAMPLER_ARG`: Taxa de sampling (0.0-1.0)
//! - `RUST_LOG`: filtro de nível (sobrepõe `log_level`)

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::runtime::Tokio;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use tracing::Level;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_SERVICE_NAME: &str = "rice-runner";

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,

    /// Ex: "http://localhost:4317" (gRPC). `None` = só console.
    pub otlp_endpoint: Option<String>,

    /// 1.0 coleta tudo, 0.0 nada.
    pub sampling_ratio: f64,

    pub console_output: bool,

    pub log_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            otlp_endpoint: None,
            sampling_ratio: 1.0,
            console_output: true,
            log_level: Level::INFO,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Mesma lógica de [`from_env`](Self::from_env), com a fonte injetada.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("OTEL_SERVICE_NAME").filter(|n| !n.trim().is_empty()) {
            config.service_name = name;
        }

        if let Some(endpoint) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|e| !e.trim().is_empty()) {
            config.otlp_endpoint = Some(endpoint);
        }

        if let Some(ratio) = lookup("OTEL_TRACES_SAMPLER_ARG").and_then(|r| r.parse::<f64>().ok()) {
            config.sampling_ratio = ratio.clamp(0.0, 1.0);
        }

        config
    }

    /// `--verbose` na CLI.
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    fn sampler(&self) -> Sampler {
        match self.sampling_ratio {
            r if r >= 1.0 => Sampler::AlwaysOn,
            r if r <= 0.0 => Sampler::AlwaysOff,
            r => Sampler::TraceIdRatioBased(r),
        }
    }
}

/// Instala o subscriber global: filtro, camada OTLP (se houver endpoint)
/// e saída compacta no console.
///
/// Devolve o `Tracer` quando o OTLP foi ligado.
pub fn init_telemetry(config: TelemetryConfig) -> anyhow::Result<Option<Tracer>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    let tracer = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => Some(build_tracer(&config, endpoint)?),
        None => None,
    };

    let otel = tracer.clone().map(OpenTelemetryLayer::new);
    let console = config
        .console_output
        .then(|| tracing_subscriber::fmt::layer().with_target(false).compact());

    tracing_subscriber::registry()
        .with(filter)
        .with(otel)
        .with(console)
        .try_init()?;

    match config.otlp_endpoint.as_deref() {
        Some(endpoint) => tracing::info!(
            service = %config.service_name,
            endpoint,
            sampling = config.sampling_ratio,
            "📡 Exportando spans via OTLP"
        ),
        None => tracing::debug!("Telemetria só no console"),
    }

    Ok(tracer)
}

fn build_tracer(config: &TelemetryConfig, endpoint: &str) -> anyhow::Result<Tracer> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            sdktrace::Config::default()
                .with_sampler(config.sampler())
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build();

    let tracer = provider.tracer(config.service_name.clone());
    global::set_tracer_provider(provider);
    Ok(tracer)
}

/// Flush dos spans pendentes. Chamar antes de sair do processo, senão o
/// batch exporter perde o último lote.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

/// Helpers de instrumentação de steps.
pub mod instrumentation {
    use std::time::Instant;

    use crate::protocol::{StepKind, StepStatus};

    /// Atributos e cronômetro de um step em execução.
    #[derive(Debug)]
    pub struct StepSpanContext {
        pub scenario_key: String,
        pub order: u32,
        pub kind: StepKind,
        pub start_time: Instant,
        /// Preenchido por [`finish`](Self::finish).
        pub status: Option<StepStatus>,
        pub duration_ms: Option<u64>,
    }

    impl StepSpanContext {
        pub fn new(scenario_key: &str, order: u32, kind: StepKind) -> Self {
            Self {
                scenario_key: scenario_key.to_string(),
                order,
                kind,
                start_time: Instant::now(),
                status: None,
                duration_ms: None,
            }
        }

        /// Fecha o cronômetro e devolve a duração em ms.
        pub fn finish(&mut self, status: StepStatus) -> u64 {
            let elapsed = self.start_time.elapsed().as_millis() as u64;
            self.status = Some(status);
            self.duration_ms = Some(elapsed);
            elapsed
        }

        pub fn attributes(&self) -> Vec<(&'static str, String)> {
            let mut attrs = vec![
                ("scenario.key", self.scenario_key.clone()),
                ("step.order", self.order.to_string()),
                ("step.kind", self.kind.as_str().to_string()),
            ];

            if let Some(status) = self.status {
                attrs.push(("step.status", status.as_str().to_string()));
            }

            if let Some(duration) = self.duration_ms {
                attrs.push(("step.duration_ms", duration.to_string()));
            }

            attrs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{StepKind, StepStatus};

    #[test]
    fn test_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "rice-runner");
        assert!(config.otlp_endpoint.is_none());
        assert_eq!(config.sampling_ratio, 1.0);
        assert!(config.console_output);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = TelemetryConfig::from_lookup(|key| match key {
            "OTEL_EXPORTER_OTLP_ENDPOINT" => Some("http://collector:4317".to_string()),
            "OTEL_TRACES_SAMPLER_ARG" => Some("7".to_string()),
            _ => None,
        });
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://collector:4317"));
        assert_eq!(config.sampling_ratio, 1.0);
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn test_sampler_bounds() {
        let mut config = TelemetryConfig::default();
        assert!(matches!(config.sampler(), Sampler::AlwaysOn));
        config.sampling_ratio = 0.0;
        assert!(matches!(config.sampler(), Sampler::AlwaysOff));
        config.sampling_ratio = 0.25;
        assert!(matches!(config.sampler(), Sampler::TraceIdRatioBased(r) if r == 0.25));
    }

    #[test]
    fn test_step_span_context() {
        use instrumentation::StepSpanContext;

        let mut ctx = StepSpanContext::new("PO-001", 2, StepKind::TextInput);
        assert!(ctx.status.is_none());

        ctx.finish(StepStatus::Failed);

        let attrs = ctx.attributes();
        assert!(attrs.iter().any(|(k, v)| *k == "step.kind" && v == "text_input"));
        assert!(attrs.iter().any(|(k, v)| *k == "step.status" && v == "failed"));
        assert!(ctx.duration_ms.is_some());
    }
}
