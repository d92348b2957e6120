use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // LLM backend (OpenAI-compatible)
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,

    // Web search backend
    pub search_region: String,
    pub search_max_results: usize,

    // Web server
    pub api_host: String,
    pub api_port: u16,

    // Crawler
    pub crawler_concurrency: usize,
    pub crawler_timeout_secs: u64,
    /// Default politeness delay between article fetches when robots.txt
    /// specifies none.
    pub crawler_delay_secs: f64,
    /// Accept invalid TLS certificates. Development only.
    pub crawler_insecure_tls: bool,

    // Scheduler
    pub scheduler_check_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            search_region: env::var("SEARCH_REGION").unwrap_or_else(|_| "us-en".to_string()),
            search_max_results: parsed_env("SEARCH_MAX_RESULTS", 10),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: parsed_env("API_PORT", 8000),
            crawler_concurrency: parsed_env("CRAWLER_CONCURRENCY", 4),
            crawler_timeout_secs: parsed_env("CRAWLER_TIMEOUT_SECS", 30),
            crawler_delay_secs: parsed_env("CRAWLER_DELAY_SECS", 1.0),
            crawler_insecure_tls: env::var("CRAWLER_INSECURE_TLS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            scheduler_check_interval_secs: parsed_env("SCHEDULER_CHECK_INTERVAL_SECS", 60),
        }
    }

    /// Log the shape of each sensitive value without leaking it.
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", &self.database_url),
            ("LLM_BASE_URL", &self.llm_base_url),
            ("LLM_API_KEY", &self.llm_api_key),
            ("LLM_MODEL", &self.llm_model),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
