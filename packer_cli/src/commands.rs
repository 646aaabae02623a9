//! Command execution and report printing (pretty or JSON on stdout).

use std::path::Path;

use eyre::{Result, WrapErr};
use packer_core::{Machine, MeasurementReport, SelfCheckReport, SequenceReport, WrapSize};
use serde::Serialize;
use serde_json::json;

use crate::cli::Commands;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value).wrap_err("serialize report")?;
    println!("{line}");
    Ok(())
}

fn print_measurement(r: &MeasurementReport) {
    println!(
        "Object: {:.1} x {:.1} x {:.1} cm (L x W x H)",
        r.object.length, r.object.width, r.object.height
    );
    println!(
        "Optimized: {:.2} x {:.2} x {:.2} cm (fitness {:.4})",
        r.optimized.length, r.optimized.width, r.optimized.height, r.best_fitness
    );
    println!("Wrap: {:.2} x {:.2} cm", r.wrap.length, r.wrap.width);
    println!(
        "Side camera at {:.1} deg after {} iteration(s){}",
        r.positioner.angle,
        r.positioner.iterations,
        if r.positioner.converged {
            ""
        } else {
            " (not converged)"
        }
    );
    println!("Snapshots: {} {}", r.front_image.display(), r.side_image.display());
}

fn print_sequence(r: &SequenceReport) {
    let phases: Vec<&str> = r.phases_completed.iter().map(|p| p.as_str()).collect();
    println!("Completed: {} in {} ms", phases.join(" -> "), r.elapsed_ms);
}

fn print_self_check(r: &SelfCheckReport) {
    match (r.distance_cm, &r.distance_error) {
        (Some(d), _) => println!("Distance sensor: ok ({d:.1} cm)"),
        (None, Some(e)) => println!("Distance sensor: FAILED ({e})"),
        (None, None) => println!("Distance sensor: no reading"),
    }
    for (name, cam) in [("front", &r.front), ("side", &r.side)] {
        match &cam.error {
            None => println!("Camera {name}: ok ({}x{})", cam.width, cam.height),
            Some(e) => println!("Camera {name}: FAILED ({e})"),
        }
    }
    println!("Outputs registered: {} digital, {} pwm", r.outputs, r.pwms);
}

pub fn execute(machine: &Machine, cmd: &Commands, json: bool) -> Result<()> {
    match cmd {
        Commands::Capture => {
            let report = machine.capture_dimensions()?;
            if json {
                print_json(&report)
            } else {
                print_measurement(&report);
                Ok(())
            }
        }
        Commands::Pack => {
            let measurement = machine.capture_dimensions()?;
            let delivery = machine.deliver()?;
            if json {
                print_json(&json!({ "measurement": measurement, "delivery": delivery }))
            } else {
                print_measurement(&measurement);
                print_sequence(&delivery);
                Ok(())
            }
        }
        Commands::Deliver { length, width } => {
            let report = machine.deliver_with(WrapSize {
                length: *length,
                width: *width,
            })?;
            if json {
                print_json(&report)
            } else {
                print_sequence(&report);
                Ok(())
            }
        }
        Commands::Seal => {
            let report = machine.initial_seal()?;
            if json {
                print_json(&report)
            } else {
                print_sequence(&report);
                Ok(())
            }
        }
        Commands::Estop => {
            machine.emergency_stop();
            let (outputs, pwms) = machine.estop().registered();
            if json {
                print_json(&json!({ "estop": true, "outputs": outputs, "pwms": pwms }))
            } else {
                println!("Emergency stop: {outputs} outputs and {pwms} pwm lines de-energized.");
                Ok(())
            }
        }
        Commands::SelfCheck => {
            let report = machine.self_check()?;
            if json {
                print_json(&report)?;
            } else {
                print_self_check(&report);
            }
            if !report.ok() {
                eyre::bail!("self check failed");
            }
            Ok(())
        }
        Commands::Calibrate { csv } => calibrate(csv, json),
    }
}

pub fn calibrate(csv: &Path, json: bool) -> Result<()> {
    let fit = packer_config::load_ratio_csv(csv)?;
    tracing::info!(
        ratio = fit.ratio_cm_per_px,
        offset = fit.offset_cm,
        inliers = fit.inliers,
        "calibration fitted"
    );
    if json {
        print_json(&json!({
            "ratio_cm_per_px": fit.ratio_cm_per_px,
            "offset_cm": fit.offset_cm,
            "inliers": fit.inliers,
        }))
    } else {
        println!("ratio_cm_per_px = {:.6}", fit.ratio_cm_per_px);
        println!("offset_cm = {:.3}", fit.offset_cm);
        println!("inliers = {}", fit.inliers);
        Ok(())
    }
}
