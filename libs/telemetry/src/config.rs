use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtlpProtocol {
    Grpc,
    HttpProtobuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpExport {
    pub endpoint: String,
    pub protocol: OtlpProtocol,
}

/// Logging and export settings for a single service process.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub log_format: LogFormat,
    /// `RUST_LOG`-style directive used when the variable is unset.
    pub default_filter: String,
    pub otlp: Option<OtlpExport>,
}

impl TelemetryConfig {
    pub fn new(service_name: &str, service_version: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            service_version: service_version.to_string(),
            environment: "dev".into(),
            log_format: LogFormat::Json,
            default_filter: "info".into(),
            otlp: None,
        }
    }

    pub fn from_env(default_service_name: &str, default_service_version: &str) -> Self {
        Self::from_lookup(default_service_name, default_service_version, |key| {
            env::var(key).ok()
        })
    }

    pub fn from_lookup<F>(
        default_service_name: &str,
        default_service_version: &str,
        lookup: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let service_name = lookup("OTEL_SERVICE_NAME")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default_service_name.to_string());
        let service_version = lookup("OTEL_SERVICE_VERSION")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default_service_version.to_string());
        let environment = lookup("OTEL_RESOURCE_ATTRIBUTES")
            .and_then(|raw| environment_from_resource(&raw))
            .or_else(|| lookup("DEPLOYMENT_ENV"))
            .unwrap_or_else(|| "dev".into());
        let log_format = match lookup("LOG_FORMAT").map(|v| v.to_lowercase()) {
            Some(v) if matches!(v.as_str(), "text" | "pretty" | "plain") => LogFormat::Text,
            _ => LogFormat::Json,
        };

        let otel_enabled = lookup("ENABLE_OTEL")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        let endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_default();
        let otlp = (otel_enabled && !endpoint.trim().is_empty()).then(|| OtlpExport {
            endpoint,
            protocol: match lookup("OTEL_EXPORTER_OTLP_PROTOCOL")
                .map(|v| v.to_lowercase())
                .as_deref()
            {
                Some("http") | Some("http/protobuf") => OtlpProtocol::HttpProtobuf,
                _ => OtlpProtocol::Grpc,
            },
        });

        Self {
            service_name,
            service_version,
            environment,
            log_format,
            default_filter: "info".into(),
            otlp,
        }
    }
}

fn environment_from_resource(raw: &str) -> Option<String> {
    raw.split(',').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == "deployment.environment").then(|| value.trim().to_string())
    })
}
