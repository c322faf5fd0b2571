//! Subcommands and their output.
//!
//! Every command returns its report as a string so it can be printed by
//! `main` or inspected by tests.

use std::fmt::Write as _;

use clap::Subcommand;
use serde_json::json;
use tiknix_core::AccessLevel;
use tiknix_permissions::PermissionStats;
use tiknix_storage::QueryCacheStats;

use crate::error::CliResult;
use crate::services::CacheServices;

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Show permission and query cache statistics
    Stats,
    /// Clear the permission cache, reload it and report before and after
    Reset,
    /// Clear the permission cache in every process
    Clear,
    /// Clear and reload the permission cache
    Warmup,
    /// List loaded permissions
    Permissions,
    /// Decide whether a caller level may invoke a handler
    Check {
        control: String,
        method: String,
        /// Caller access level (1 = root, 50 = admin, 100 = member, 101 = public)
        level: i64,
    },
    /// Invalidate every cached query that references a table
    Invalidate { table: String },
    /// Remove every cached query for this site
    ClearQueries,
    /// Show query cache statistics
    QueryStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn render_permission_stats(out: &mut String, stats: &PermissionStats) {
    let _ = writeln!(out, "  Cached permissions: {}", stats.count);
    let _ = writeln!(out, "  Memory usage: {:.2} KB", stats.memory as f64 / 1024.0);
    let _ = writeln!(out, "  Cache loaded: {}", yes_no(stats.cache_loaded));
    let _ = writeln!(out, "  Shared tier available: {}", yes_no(stats.shared_available));
    let _ = writeln!(out, "  Currently in shared tier: {}", yes_no(stats.in_shared));
    let _ = writeln!(out, "  Cache hits: {}", stats.hits);
    let _ = writeln!(out, "  Cache misses: {}", stats.misses);
    let _ = writeln!(out, "  Hit rate: {:.1}%", stats.hit_rate);
    let _ = writeln!(out, "  Cache version: {}", stats.cache_version);
}

fn render_query_stats(out: &mut String, stats: &QueryCacheStats) {
    let _ = writeln!(out, "  Enabled: {}", yes_no(stats.enabled));
    let _ = writeln!(out, "  Backend: {}", stats.backend);
    let _ = writeln!(out, "  Hits: {}", stats.hits);
    let _ = writeln!(out, "  Misses: {}", stats.misses);
    let _ = writeln!(out, "  Hit rate: {:.2}%", stats.hit_rate);
    let _ = writeln!(out, "  Cached queries: {}", stats.cached_queries);
    let _ = writeln!(out, "  Cache size: {:.2} KB", stats.cache_size_kb);
}

/// Run one command against `services`.
pub async fn run(
    command: &Command,
    services: &CacheServices,
    format: OutputFormat,
) -> CliResult<String> {
    let permissions = &services.permissions;
    let mut out = String::new();

    match command {
        Command::Stats => {
            let perm = permissions.stats().await;
            let query = services.query_cache.stats().await;
            if format == OutputFormat::Json {
                return Ok(serde_json::to_string_pretty(
                    &json!({ "permissions": perm, "queries": query }),
                )?);
            }
            let _ = writeln!(out, "Site: {}", services.site);
            let _ = writeln!(out, "\nPermission cache:");
            render_permission_stats(&mut out, &perm);
            let _ = writeln!(out, "\nQuery cache:");
            render_query_stats(&mut out, &query);
        }
        Command::Reset => {
            let before = permissions.stats().await;
            let version = permissions.clear().await?;
            let reloaded = permissions.reload().await?;
            let after = permissions.stats().await;
            if format == OutputFormat::Json {
                return Ok(serde_json::to_string_pretty(&json!({
                    "before": before,
                    "cleared_version": version,
                    "reloaded": reloaded.len(),
                    "after": after,
                }))?);
            }
            let _ = writeln!(out, "Current cache status:");
            render_permission_stats(&mut out, &before);
            let _ = writeln!(out, "\nCache cleared (new version: {})", version);
            let _ = writeln!(out, "Cache reloaded with {} permissions", reloaded.len());
            let _ = writeln!(out, "\nFinal cache status:");
            render_permission_stats(&mut out, &after);
            let _ = writeln!(out, "\nNext request in every process uses the new cache version.");
        }
        Command::Clear => {
            let version = permissions.clear().await?;
            if format == OutputFormat::Json {
                return Ok(serde_json::to_string_pretty(&json!({ "cache_version": version }))?);
            }
            let _ = writeln!(out, "Permission cache cleared (version: {})", version);
        }
        Command::Warmup => {
            let stats = permissions.warmup().await?;
            if format == OutputFormat::Json {
                return Ok(serde_json::to_string_pretty(&stats)?);
            }
            let _ = writeln!(out, "Permission cache warmed up:");
            render_permission_stats(&mut out, &stats);
        }
        Command::Permissions => {
            let all = permissions.get_all().await;
            if format == OutputFormat::Json {
                return Ok(serde_json::to_string_pretty(&all)?);
            }
            if all.is_empty() {
                let _ = writeln!(out, "No permissions defined");
            }
            for (key, level) in &all {
                let _ = writeln!(out, "{:<40} {}", key, level);
            }
        }
        Command::Check {
            control,
            method,
            level,
        } => {
            let level = AccessLevel::new(*level);
            permissions.begin_request();
            let granted = permissions.check(control, method, level).await;
            if format == OutputFormat::Json {
                return Ok(serde_json::to_string_pretty(&json!({
                    "control": control,
                    "method": method,
                    "level": level,
                    "granted": granted,
                }))?);
            }
            let verdict = if granted { "GRANTED" } else { "DENIED" };
            let _ = writeln!(out, "{}::{} at level {}: {}", control, method, level, verdict);
        }
        Command::Invalidate { table } => {
            let bumped = services.query_cache.invalidate(table).await;
            if format == OutputFormat::Json {
                return Ok(serde_json::to_string_pretty(
                    &json!({ "table": table, "invalidated": bumped }),
                )?);
            }
            if bumped {
                let _ = writeln!(out, "Invalidated cached queries for table '{}'", table);
            } else {
                let _ = writeln!(out, "Shared tier unavailable; nothing to invalidate");
            }
        }
        Command::ClearQueries => {
            let deleted = services.query_cache.clear_all().await;
            if format == OutputFormat::Json {
                return Ok(serde_json::to_string_pretty(&json!({ "deleted": deleted }))?);
            }
            let _ = writeln!(out, "Removed {} cached queries", deleted);
        }
        Command::QueryStats => {
            let stats = services.query_cache.stats().await;
            if format == OutputFormat::Json {
                return Ok(serde_json::to_string_pretty(&stats)?);
            }
            let _ = writeln!(out, "Query cache:");
            render_query_stats(&mut out, &stats);
        }
    }

    Ok(out)
}
