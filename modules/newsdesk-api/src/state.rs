use std::sync::Arc;

use newsdesk_agent::{LlmClient, ReportAgent, ReportHub};
use newsdesk_common::Config;
use newsdesk_store::Store;
use newsdesk_tasks::{ExecutorDeps, SchedulerService, TaskManager};

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub tasks: Arc<TaskManager>,
    pub scheduler: Arc<SchedulerService>,
    pub deps: Arc<ExecutorDeps>,
    pub llm: LlmClient,
    pub report_agent: Arc<ReportAgent>,
    pub report_hub: Arc<ReportHub>,
}
