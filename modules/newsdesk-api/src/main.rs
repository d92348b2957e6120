use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use newsdesk_agent::{LlmClient, ReportAgent, ReportHub};
use newsdesk_common::Config;
use newsdesk_crawler::{
    build_http_client, RobotsHandler, SiteDiscovery, SitemapParser, UniversalScraper,
    WebSearchEngine,
};
use newsdesk_store::Store;
use newsdesk_tasks::{register_all, ExecutorDeps, SchedulerService, TaskManager};

mod error;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("newsdesk=info".parse()?),
        )
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;
    info!("database ready");

    let timeout = Duration::from_secs(config.crawler_timeout_secs);
    let http = build_http_client(timeout, config.crawler_insecure_tls);

    let deps = Arc::new(ExecutorDeps {
        store: store.clone(),
        scraper: UniversalScraper::new(timeout, config.crawler_insecure_tls),
        discovery: SiteDiscovery::new(
            RobotsHandler::new(http.clone()),
            SitemapParser::new(http.clone()),
            store.clone(),
        ),
        search: WebSearchEngine::new(http),
        default_delay_secs: config.crawler_delay_secs,
    });

    let tasks = Arc::new(TaskManager::new(store.clone()));
    register_all(&tasks, deps.clone()).await;

    let scheduler = Arc::new(SchedulerService::new(
        store.clone(),
        tasks.clone(),
        Duration::from_secs(config.scheduler_check_interval_secs),
    ));
    tokio::spawn(scheduler.clone().run());

    let llm = LlmClient::new(&config.llm_base_url, &config.llm_api_key, &config.llm_model);
    let report_agent = Arc::new(ReportAgent::new(store.clone(), llm.clone()));
    let report_hub = Arc::new(ReportHub::new());

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        tasks,
        scheduler,
        deps,
        llm,
        report_agent,
        report_hub,
    });

    let api = Router::new()
        // Sources
        .route("/sources", get(routes::sources::list).post(routes::sources::create))
        .route(
            "/sources/{id}",
            get(routes::sources::get).delete(routes::sources::delete),
        )
        .route("/sources/{id}/parser-config", put(routes::sources::update_parser_config))
        .route("/sources/{id}/enable", post(routes::sources::enable))
        .route("/sources/{id}/disable", post(routes::sources::disable))
        .route("/sources/{id}/initialize", post(routes::sources::initialize))
        .route("/sources/{id}/parser-debug", post(routes::sources::parser_debug))
        .route("/sources/{id}/stats", get(routes::sources::stats))
        // Sitemaps and pending URLs
        .route(
            "/sources/{id}/sitemaps",
            get(routes::sitemaps::list_for_source).post(routes::sitemaps::add),
        )
        .route("/sources/{id}/sitemaps/refresh", post(routes::sitemaps::refresh))
        .route("/sitemaps/{id}", delete(routes::sitemaps::delete))
        .route("/sources/{id}/pending", get(routes::sitemaps::pending_for_source))
        .route("/sources/{id}/pending/counts", get(routes::sitemaps::pending_counts))
        // Articles
        .route("/articles", get(routes::articles::list))
        .route(
            "/articles/{id}",
            get(routes::articles::get).delete(routes::articles::delete),
        )
        .route("/articles/bulk-delete", post(routes::articles::bulk_delete))
        .route("/articles/aggregate", post(routes::articles::aggregate))
        // Tasks
        .route("/tasks", get(routes::tasks::list).post(routes::tasks::create))
        .route("/tasks/{id}", get(routes::tasks::get))
        .route("/tasks/{id}/cancel", post(routes::tasks::cancel))
        .route("/tasks/{id}/events", get(routes::tasks::events))
        .route("/tasks/{id}/events/stream", get(routes::tasks::events_stream))
        // Schedules and the scheduler
        .route(
            "/schedules",
            get(routes::schedules::list).post(routes::schedules::create),
        )
        .route(
            "/schedules/{id}",
            get(routes::schedules::get)
                .put(routes::schedules::update)
                .delete(routes::schedules::delete),
        )
        .route("/schedules/{id}/pause", post(routes::schedules::pause))
        .route("/schedules/{id}/resume", post(routes::schedules::resume))
        .route("/schedules/{id}/execute", post(routes::schedules::execute))
        .route("/scheduler/status", get(routes::scheduler::status))
        .route("/scheduler/trigger", post(routes::scheduler::trigger))
        // Keywords
        .route(
            "/keywords",
            get(routes::keywords::list).post(routes::keywords::create),
        )
        .route(
            "/keywords/{id}",
            get(routes::keywords::get)
                .put(routes::keywords::update)
                .delete(routes::keywords::delete),
        )
        .route("/keywords/{id}/search", post(routes::keywords::run_search))
        .route("/keywords/active/list", get(routes::keywords::list_active))
        // Reports
        .route("/reports", get(routes::reports::list))
        .route("/reports/generate", post(routes::reports::generate))
        .route("/reports/templates", get(routes::reports::templates))
        .route(
            "/reports/{id}",
            get(routes::reports::get).delete(routes::reports::delete),
        )
        .route("/reports/{id}/references", get(routes::reports::references))
        .route("/reports/{id}/stream", get(routes::reports::stream));

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!(addr, "newsdesk API listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
