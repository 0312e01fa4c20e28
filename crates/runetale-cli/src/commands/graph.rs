//! Graph command - print modules in dependency order and the derived tasks

use crate::config;
use crate::GlobalArgs;
use anyhow::Result;
use colored::*;
use runetale_build::{ModuleGraph, TaskGraph};
use serde_json::json;

pub fn run(args: &GlobalArgs) -> Result<bool> {
    let orchestrator = config::orchestrator(args)?;
    let modules = orchestrator.module_graph();
    let tasks = orchestrator.task_graph();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&to_json(modules, tasks))?);
        return Ok(true);
    }

    println!("{}", "Modules:".bold());
    for (level, group) in modules.levels().iter().enumerate() {
        for module in group {
            let deps: Vec<String> = module
                .dependencies
                .iter()
                .map(|d| format!("{} ({})", d.module, d.scope))
                .collect();
            println!(
                "  {} {} [{}]{}",
                format!("{:>2}", level).dimmed(),
                module.path.bold(),
                module.kind,
                if deps.is_empty() {
                    String::new()
                } else {
                    format!(" -> {}", deps.join(", "))
                }
            );
        }
    }

    println!();
    println!("{}", "Tasks:".bold());
    for task in tasks.tasks() {
        let prerequisites: Vec<String> = task
            .prerequisites
            .iter()
            .map(|&p| tasks.task(p).id.to_string())
            .collect();
        println!("  {}", task.id.to_string().cyan());
        if !prerequisites.is_empty() {
            println!("      {} {}", "after".dimmed(), prerequisites.join(", "));
        }
    }
    Ok(true)
}

fn to_json(modules: &ModuleGraph, tasks: &TaskGraph) -> serde_json::Value {
    let module_list: Vec<_> = modules
        .topological_order()
        .map(|m| {
            json!({
                "path": m.path,
                "kind": m.kind.to_string(),
                "version": m.version,
                "dependencies": m
                    .dependencies
                    .iter()
                    .map(|d| json!({ "module": d.module, "scope": d.scope.to_string() }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    let task_list: Vec<_> = tasks
        .tasks()
        .iter()
        .map(|t| {
            json!({
                "id": t.id.to_string(),
                "prerequisites": t
                    .prerequisites
                    .iter()
                    .map(|&p| tasks.task(p).id.to_string())
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "modules": module_list, "tasks": task_list })
}
