use crate::ui;
use anyhow::Result;
use colored::Colorize;
use slo_engine::{config::DEFAULT_INTERVAL_SECONDS, effective_interval, load_config_from_file};
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct QueryRow {
    #[tabled(rename = "Budget")]
    budget: String,
    #[tabled(rename = "Objective")]
    objective: String,
    #[tabled(rename = "Strategy")]
    strategy: &'static str,
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Query")]
    query: String,
}

pub async fn execute(config_file: PathBuf) -> Result<()> {
    ui::print_header("=== Validating Config ===");
    println!("File: {}", config_file.display());

    let config = match load_config_from_file(&config_file).await {
        Ok(config) => config,
        Err(e) => {
            println!();
            ui::print_error("Config is invalid!");
            println!("\nError: {:#}", e);
            return Err(e);
        }
    };

    println!();
    ui::print_success("Config is valid!");

    let engine = config.into_engine_config(DEFAULT_INTERVAL_SECONDS)?;

    println!("\n{}", "Budgets:".bold());
    for budget in &engine.budgets {
        println!(
            "  {} window {}s, evaluated every {:?}",
            budget.name.green(),
            budget.window_seconds(),
            effective_interval(engine.interval, budget)
        );
    }

    println!("\n{}", "Objectives:".bold());
    for objective in engine.objectives.iter() {
        println!(
            "  {} goal {} ({})",
            objective.name.green(),
            objective.goal,
            objective.strategy.kind()
        );
        if objective.goal >= 1.0 {
            ui::print_warning(&format!(
                "  objective '{}' has a goal of 1, any bad event exhausts its budget",
                objective.name
            ));
        }
    }

    let rows: Vec<QueryRow> = engine
        .budgets
        .iter()
        .flat_map(|budget| {
            engine.objectives.iter().flat_map(move |objective| {
                objective
                    .strategy
                    .rendered_queries(budget)
                    .into_iter()
                    .map(move |rendered| QueryRow {
                        budget: budget.name.clone(),
                        objective: objective.name.clone(),
                        strategy: objective.strategy.kind(),
                        stage: rendered.stage.to_string(),
                        query: rendered.query,
                    })
            })
        })
        .collect();

    println!("\n{}", "Rendered queries:".bold());
    println!("{}", Table::new(rows).with(Style::rounded()));

    Ok(())
}
