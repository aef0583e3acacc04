//! `veracity doctor` — Diagnose config, provider and tools.

use veracity_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Veracity Doctor — System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_path();
    if !config_path.exists() {
        println!("  ⚠️  No config file — using defaults (run `veracity onboard`)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  {} issue(s) found.", issues + 1);
            return Ok(());
        }
    };

    let router = veracity_providers::router::build_from_config(&config);
    match router.default() {
        Some(provider) => match provider.health_check().await {
            Ok(true) => {
                println!("  ✅ Provider '{}' reachable", router.default_name());
                if let Ok(models) = provider.list_models().await
                    && !models.is_empty()
                    && !models.contains(&config.default_model)
                {
                    println!(
                        "  ⚠️  Model '{}' not offered by provider ({} models available)",
                        config.default_model,
                        models.len()
                    );
                    issues += 1;
                }
            }
            Ok(false) => {
                println!("  ❌ Provider '{}' is not healthy", router.default_name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider '{}' unreachable: {e}", router.default_name());
                issues += 1;
            }
        },
        None => {
            println!("  ❌ Provider '{}' is not configured", config.default_provider);
            issues += 1;
        }
    }

    let tools = veracity_tools::registry_from_config(&config.tools);
    if tools.is_empty() {
        println!("  ℹ️  No tools enabled (chat only)");
    } else {
        println!("  ✅ {} tool(s) enabled: {}", tools.len(), tools.names().join(", "));
    }
    if config.tools.filesystem_enabled && !config.tools.filesystem_active() {
        println!("  ⚠️  Filesystem tools enabled but filesystem_root is empty");
        issues += 1;
    }
    if config.tools.notes_enabled && !config.tools.notes_active() {
        println!("  ⚠️  Notes tools enabled but notes_vault is empty");
        issues += 1;
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
