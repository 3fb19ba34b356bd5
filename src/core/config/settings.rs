use std::time::Duration;

use super::parsing::{
    default_pacing_delay_ms, env_optional, env_or_default, parse_bool, parse_cors_origins,
    parse_environment, parse_positive_usize, parse_transport, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    AiSettings, ApiSettings, ConfigError, CorsSettings, QueueSettings, QueueTransportKind,
    RedisSettings, RuntimeSettings, ServerHost, ServerPort, ServerSettings, Settings,
    StoreSettings, TelemetrySettings, WorkerSettings,
};

const DEFAULT_QUEUE_BASE_URL: &str = "https://qstash.upstash.io";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("TUTOR_HOST", "0.0.0.0");
        let port = env_or_default("TUTOR_PORT", "8000");

        let environment =
            parse_environment(env_optional("TUTOR_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("TUTOR_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Tutor Grading API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        // An explicitly empty TUTOR_DATA_PATH keeps the registries in memory.
        let data_path = match std::env::var("TUTOR_DATA_PATH") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(value.trim().to_string()),
            Err(_) => Some("data/store.json".to_string()),
        };

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let transport = parse_transport(env_or_default("QUEUE_TRANSPORT", "http"))?;
        let queue_token = env_or_default("QUEUE_TOKEN", "");
        let queue_name = env_or_default("QUEUE_NAME", "grading-jobs");
        let webhook_url = env_or_default("GRADING_WEBHOOK_URL", "");
        let queue_base_url = env_or_default("QUEUE_BASE_URL", DEFAULT_QUEUE_BASE_URL);
        let max_delivery_attempts = parse_u32(
            "QUEUE_MAX_DELIVERY_ATTEMPTS",
            env_or_default("QUEUE_MAX_DELIVERY_ATTEMPTS", "3"),
        )?;
        let publish_timeout_seconds = parse_u64(
            "QUEUE_PUBLISH_TIMEOUT_SECONDS",
            env_or_default("QUEUE_PUBLISH_TIMEOUT_SECONDS", "10"),
        )?;

        let gemini_api_key = env_or_default("GEMINI_API_KEY", "");
        let gemini_base_url = env_or_default("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL);
        let request_timeout_seconds =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "30"))?;
        let max_retries = parse_u32("AI_MAX_RETRIES", env_or_default("AI_MAX_RETRIES", "2"))?;
        let retry_backoff_ms =
            parse_u64("AI_RETRY_BACKOFF_MS", env_or_default("AI_RETRY_BACKOFF_MS", "500"))?;

        let pacing_delay_ms = parse_u64(
            "WORKER_PACING_DELAY_MS",
            env_or_default("WORKER_PACING_DELAY_MS", default_pacing_delay_ms(environment)),
        )?;
        let max_concurrent_gradings = parse_positive_usize(
            "WORKER_MAX_CONCURRENT_GRADINGS",
            env_or_default("WORKER_MAX_CONCURRENT_GRADINGS", "1"),
        )?;
        let delivery_concurrency = parse_positive_usize(
            "WORKER_DELIVERY_CONCURRENCY",
            env_or_default("WORKER_DELIVERY_CONCURRENCY", "1"),
        )?;
        let delivery_timeout_seconds = parse_u64(
            "WORKER_DELIVERY_TIMEOUT_SECONDS",
            env_or_default("WORKER_DELIVERY_TIMEOUT_SECONDS", "300"),
        )?;

        let log_level = env_or_default("TUTOR_LOG_LEVEL", "info");
        let json = env_optional("TUTOR_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            store: StoreSettings { data_path },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            queue: QueueSettings {
                transport,
                token: queue_token,
                queue_name,
                webhook_url,
                base_url: queue_base_url.trim_end_matches('/').to_string(),
                max_delivery_attempts,
                publish_timeout_seconds,
            },
            ai: AiSettings {
                gemini_api_key,
                gemini_base_url: gemini_base_url.trim_end_matches('/').to_string(),
                request_timeout_seconds,
                max_retries,
                retry_backoff_ms,
            },
            worker: WorkerSettings {
                pacing_delay: Duration::from_millis(pacing_delay_ms),
                max_concurrent_gradings,
                delivery_concurrency,
                delivery_timeout_seconds,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn store(&self) -> &StoreSettings {
        &self.store
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn queue(&self) -> &QueueSettings {
        &self.queue
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn worker(&self) -> &WorkerSettings {
        &self.worker
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ai.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "AI_REQUEST_TIMEOUT",
                value: "0".to_string(),
            });
        }

        if self.worker.delivery_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "WORKER_DELIVERY_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.queue.max_delivery_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "QUEUE_MAX_DELIVERY_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if self.queue.transport == QueueTransportKind::Http
            && !self.queue.base_url.starts_with("http://")
            && !self.queue.base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "QUEUE_BASE_URL",
                value: self.queue.base_url.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.ai.gemini_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("GEMINI_API_KEY"));
        }
        if let Some(setting) = self.queue.missing_setting() {
            return Err(ConfigError::MissingSecret(setting));
        }

        Ok(())
    }
}
