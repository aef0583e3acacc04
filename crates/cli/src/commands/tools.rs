//! `veracity tools` — List the tools the current config enables.

use veracity_config::AppConfig;
use veracity_core::tool::{Capability, ToolDefinition};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = veracity_tools::registry_from_config(&config.tools);
    print!("{}", render(&registry.definitions()));
    Ok(())
}

fn render(tools: &[ToolDefinition]) -> String {
    let mut out = String::from("Enabled tools\n=============\n\n");
    if tools.is_empty() {
        out.push_str("  (none) — enable tool groups under [tools] in config.toml\n");
    }
    for tool in tools {
        out.push_str(&format!(
            "  {:<12} {:<10} {:<11} {}\n",
            tool.name,
            tool.risk.as_str(),
            tool.capability.label(),
            tool.description
        ));
    }

    let disabled: Vec<_> = Capability::ALL
        .iter()
        .filter(|c| !tools.iter().any(|t| t.capability == **c))
        .map(|c| c.label())
        .collect();
    if !disabled.is_empty() {
        out.push_str(&format!("\nDisabled: {}\n", disabled.join(", ")));
    }
    out
}
