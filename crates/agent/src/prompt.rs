//! The tool block appended to the system prompt.
//!
//! The block is plain templated text. What it must tell the model is fixed:
//! every enabled tool with its parameters, the two legal reply shapes, a
//! worked example when a content-writing tool is enabled, and which
//! capabilities are *not* available in this session.

use std::collections::BTreeSet;
use std::fmt::Write;
use veracity_core::tool::{Capability, ToolDefinition};

/// The system prompt for one turn: `base`, plus the tool block when at
/// least one tool is enabled.
pub fn system_prompt(base: &str, tools: &[ToolDefinition]) -> String {
    let block = tool_block(tools);
    if block.is_empty() {
        base.trim_end().to_string()
    } else {
        format!("{}\n\n{block}", base.trim_end())
    }
}

/// Describe `tools` and the reply contract. Empty when `tools` is empty.
pub fn tool_block(tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Tools\n\n");
    out.push_str(
        "You can use tools. Every reply must be exactly ONE JSON object and nothing else.\n\n\
         To call a tool:\n\
         {\"type\":\"tool_request\",\"tool_name\":\"<name>\",\"arguments\":{...}}\n\n\
         To answer the user:\n\
         {\"type\":\"final_answer\",\"content\":\"<your answer>\"}\n\n\
         Call at most one tool per reply. The tool's output comes back in a message \
         starting with \"Tool result (<name>):\". Only say you used a tool if you \
         actually called it and saw its result.\n\n",
    );

    out.push_str("Available tools:\n");
    for tool in tools {
        let _ = writeln!(out, "- {} [{}]: {}", tool.name, tool.risk.as_str(), tool.description);
        let _ = writeln!(out, "  parameters: {}", tool.parameters);
    }

    if let Some(writer) = tools.iter().find(|t| t.is_content_writer()) {
        let _ = write!(
            out,
            "\nExample, saving text with {}:\n{}\n",
            writer.name,
            write_example(writer)
        );
    }

    let enabled: BTreeSet<Capability> = tools.iter().map(|t| t.capability).collect();
    let disabled: Vec<Capability> = Capability::ALL
        .into_iter()
        .filter(|c| !enabled.contains(c))
        .collect();
    if !disabled.is_empty() {
        out.push_str("\nNot available in this session:\n");
        for capability in disabled {
            let _ = writeln!(out, "- {}: {}", capability.label(), unavailable_guidance(capability));
        }
    }

    out.trim_end().to_string()
}

fn unavailable_guidance(capability: Capability) -> &'static str {
    match capability {
        Capability::WebSearch => {
            "you cannot search or browse the internet. Never say you searched, looked something up or found something online."
        }
        Capability::Web => "you cannot open links. Say so if the user asks you to read a URL.",
        Capability::Filesystem => "you cannot read or write files.",
        Capability::Notes => "you cannot read or write notes.",
        Capability::Terminal => "you cannot run commands.",
    }
}

/// A `tool_request` line filling the writer's string parameters.
fn write_example(writer: &ToolDefinition) -> String {
    let mut arguments = serde_json::Map::new();
    if let Some(properties) = writer.parameters["properties"].as_object() {
        for (key, schema) in properties {
            let value = match key.as_str() {
                "content" => "# Summary\n\n- first point\n- second point",
                "path" => "summaries/today.md",
                _ if schema["type"] == "string" => "...",
                _ => continue,
            };
            arguments.insert(key.clone(), value.into());
        }
    }
    serde_json::json!({
        "type": "tool_request",
        "tool_name": writer.name,
        "arguments": arguments,
    })
    .to_string()
}
