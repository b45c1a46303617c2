use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

/// Description of a tool in the shape chat-completions APIs expect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    /// Tools encode expected failures (bad arguments, unavailable slots) as
    /// `{status, message}` values. An `Err` here means something genuinely
    /// unexpected and is caught by the registry.
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.spec().name.to_string(), Box::new(tool));
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<_> = self.tools.values().map(|tool| tool.spec()).collect();
        specs.sort_by_key(|spec| spec.name);
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Runs a tool by name. Infallible by contract: unknown tools and tool
    /// panics-turned-errors come back as `{status: "error"}` values that the
    /// model can narrate or retry, so nothing escapes into the agent loop.
    pub async fn dispatch(&self, name: &str, input: Value) -> Value {
        let Some(tool) = self.tools.get(name) else {
            warn!(event_name = "agent.tool.unknown", tool = name, "model called an unknown tool");
            return json!({
                "status": "error",
                "message": format!("unknown tool `{name}`"),
            });
        };

        match tool.execute(input).await {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    tool = name,
                    error = %error,
                    "tool execution failed unexpectedly"
                );
                json!({
                    "status": "error",
                    "message": format!("tool `{name}` failed: {error}"),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{Tool, ToolRegistry, ToolSpec};

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn spec(&self) -> ToolSpec {
            ToolSpec { name: "echo", description: "echoes input", parameters: json!({}) }
        }

        async fn execute(&self, input: Value) -> anyhow::Result<Value> {
            Ok(input)
        }
    }

    struct Explode;

    #[async_trait]
    impl Tool for Explode {
        fn spec(&self) -> ToolSpec {
            ToolSpec { name: "explode", description: "always fails", parameters: json!({}) }
        }

        async fn execute(&self, _input: Value) -> anyhow::Result<Value> {
            bail!("boom")
        }
    }

    #[tokio::test]
    async fn dispatch_runs_registered_tools() {
        let mut registry = ToolRegistry::default();
        registry.register(Echo);

        let result = registry.dispatch("echo", json!({"hello": "world"})).await;
        assert_eq!(result, json!({"hello": "world"}));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_an_error_value() {
        let registry = ToolRegistry::default();
        let result = registry.dispatch("nope", json!({})).await;
        assert_eq!(result["status"], "error");
        assert!(result["message"].as_str().expect("message").contains("nope"));
    }

    #[tokio::test]
    async fn tool_failure_becomes_an_error_value() {
        let mut registry = ToolRegistry::default();
        registry.register(Explode);

        let result = registry.dispatch("explode", json!({})).await;
        assert_eq!(result["status"], "error");
        assert!(result["message"].as_str().expect("message").contains("boom"));
    }

    #[test]
    fn specs_are_sorted_by_name() {
        let mut registry = ToolRegistry::default();
        registry.register(Explode);
        registry.register(Echo);

        let names: Vec<_> = registry.specs().iter().map(|spec| spec.name).collect();
        assert_eq!(names, ["echo", "explode"]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }
}
