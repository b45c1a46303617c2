use std::sync::Arc;

use tablevoice_agent::llm::OpenRouterClient;
use tablevoice_agent::reservation::register_reservation_tools;
use tablevoice_agent::runtime::AgentRuntime;
use tablevoice_agent::tools::ToolRegistry;
use tablevoice_core::calendar::InMemoryCalendar;
use tablevoice_core::config::{AppConfig, ConfigError, LoadOptions};
use tablevoice_core::errors::ApplicationError;
use tablevoice_core::Calendar;
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;

pub struct Application {
    pub config: AppConfig,
    pub calendar: Arc<InMemoryCalendar>,
    pub agent_runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("llm client setup failed: {0}")]
    Llm(#[source] ApplicationError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        restaurant = %config.restaurant.name,
        "starting application bootstrap"
    );

    // One store instance for the whole process, passed by handle into both
    // the agent tools and the HTTP surface. No ambient singletons.
    let calendar = Arc::new(InMemoryCalendar::new(config.restaurant.slot_policy()));

    let llm = OpenRouterClient::from_config(&config.llm).map_err(BootstrapError::Llm)?;
    let mut tools = ToolRegistry::default();
    register_reservation_tools(&mut tools, Arc::clone(&calendar) as Arc<dyn Calendar>);
    info!(
        event_name = "system.bootstrap.tools_registered",
        tool_count = tools.len(),
        "reservation tools registered"
    );

    let agent_runtime = Arc::new(AgentRuntime::new(Arc::new(llm), tools, &config.restaurant));

    Ok(Application { config, calendar, agent_runtime })
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState {
            calendar: Arc::clone(&self.calendar) as Arc<dyn Calendar>,
            agent: Arc::clone(&self.agent_runtime),
            restaurant_name: self.config.restaurant.name.clone(),
        }
    }
}
