use std::process::ExitCode;
use std::sync::{Arc, RwLock};

use rocket_flight::sim::SimulationEngine;
use rocket_flight::vehicle::presets;
use rocket_flight::Simulation;

fn main() -> ExitCode {
    // -----------------------------------------------------------------------
    // Two-stage preset, default strategies
    // -----------------------------------------------------------------------
    let rocket = Arc::new(RwLock::new(presets::two_stage()));
    let mut sim = Simulation::new(rocket);
    sim.set_name("Two-stage demo");
    sim.listeners_mut().push("log-events".into());

    let engine = SimulationEngine::default();
    if let Err(err) = sim.simulate(&engine, vec![]) {
        eprintln!("simulation failed: {err}");
        if let Some(partial) = err.partial_data() {
            let samples: usize = partial.branches().iter().map(|b| b.samples().len()).sum();
            eprintln!(
                "  {} branch(es), {} samples recorded before the failure",
                partial.branches().len(),
                samples
            );
        }
        return ExitCode::FAILURE;
    }
    let Some(data) = sim.simulated_data() else {
        return ExitCode::FAILURE;
    };

    // -----------------------------------------------------------------------
    // Print results
    // -----------------------------------------------------------------------
    println!();
    println!("====================================================================");
    println!("  ROCKET FLIGHT SIMULATION: {}", sim.name());
    println!("====================================================================");
    println!();
    println!(
        "  Motors:        {}",
        sim.simulated_motor_description().unwrap_or("none")
    );
    println!(
        "  Time step:     {:>8.3} s     Max time:     {:>8.0} s",
        sim.conditions().time_step,
        sim.conditions().max_time
    );
    println!();

    for branch in data.branches() {
        println!("  Branch: {}", branch.name());
        println!("  ──────────────────────────────────────────────────────────────────");
        for event in branch.events() {
            let altitude = branch
                .samples()
                .iter()
                .find(|s| s.state.time >= event.time)
                .map_or(0.0, |s| s.state.pos.z);
            println!(
                "  {:<28} t={:>7.2}s   alt={:>8.1}m",
                event.kind.to_string(),
                event.time,
                altitude
            );
        }
        println!(
            "  {} samples, apogee {:.1} m, ended by {}",
            branch.samples().len(),
            branch.max_altitude(),
            branch.termination().map_or_else(|| "unknown".to_string(), |t| t.to_string())
        );
        println!();
    }

    if let Some(summary) = data.summary() {
        println!("  Performance Summary");
        println!("  ──────────────────────────────────────────────────────────────────");
        for line in summary.to_string().lines() {
            println!("  {line}");
        }
        println!();
    }

    let warnings = data.warnings();
    if !warnings.is_empty() {
        println!("  Warnings");
        println!("  ──────────────────────────────────────────────────────────────────");
        for warning in warnings.iter() {
            println!("  {warning}");
        }
        println!();
    }

    println!("====================================================================");
    println!();
    ExitCode::SUCCESS
}
