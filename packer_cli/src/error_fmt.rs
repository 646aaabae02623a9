//! Human-readable error descriptions and structured JSON error formatting.

use packer_core::error::{BuildError, PackerError};
use packer_core::{Edge, VisionFailure};

/// Stable name for the error class, used as `reason` in JSON output.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(pe) = err.downcast_ref::<PackerError>() {
        return match pe {
            PackerError::SensorTimeout(_) => "SensorTimeout",
            PackerError::Vision(_) => "VisionFailure",
            PackerError::ActuatorFault { .. } => "ActuatorFault",
            PackerError::Precondition(_) => "PreconditionViolation",
            PackerError::Hardware(_) => "Hardware",
            PackerError::EstopEngaged => "EstopEngaged",
            PackerError::Config(_) => "Config",
            PackerError::Io(_) => "Io",
            PackerError::Busy => "Busy",
        };
    }
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::Claim { .. } => "PinClaim",
            BuildError::InvalidConfig(_) => "Config",
        };
    }
    "Error"
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::Claim { what, bcm, detail } => format!(
                "What happened: Could not claim the {what} line on BCM{bcm} ({detail}).\nLikely causes: Pin already in use, wrong pin number, or missing GPIO permissions.\nHow to fix: Check [pins] in the config and make sure no other process holds the line."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values or a GPIO pin assigned twice.\nHow to fix: Edit the config file, then rerun. See etc/packer.toml for a sample."
            ),
        };
    }

    if let Some(pe) = err.downcast_ref::<PackerError>() {
        return match pe {
            PackerError::SensorTimeout(edge) => {
                let which = match edge {
                    Edge::Rising => "never started",
                    Edge::Falling => "never ended",
                };
                format!(
                    "What happened: Ultrasonic echo {which} within the timeout.\nLikely causes: TRIG/ECHO wiring, no object in range, or sensor.timeout_ms too low.\nHow to fix: Verify the trigger/echo pins and power, then raise sensor.timeout_ms if needed."
                )
            }
            PackerError::Vision(v) => {
                let cause = match v {
                    VisionFailure::NoContour => {
                        "Nothing bright enough in the region of interest: empty tray, lighting, or vision.threshold too high."
                    }
                    VisionFailure::ContourTooSmall { .. } => {
                        "Only a small blob was found: object out of frame, reflections, or vision.min_area_px too high."
                    }
                    VisionFailure::BadFrame(_) => {
                        "The camera returned an unusable frame or the ROI is empty."
                    }
                };
                format!(
                    "What happened: {err}.\nLikely causes: {cause}\nHow to fix: Check the saved snapshots and camera placement, then capture again."
                )
            }
            PackerError::ActuatorFault { phase, .. } => format!(
                "What happened: {err}.\nLikely causes: Driver or relay wiring fault, or an emergency stop during {phase}.\nHow to fix: All outputs were de-energized. Clear the mechanism, check wiring, then start a new cycle."
            ),
            PackerError::EstopEngaged => "What happened: Emergency stop was triggered.\nLikely causes: Ctrl-C or an operator stop request.\nHow to fix: Make the machine safe, then start a new operation (it re-arms automatically).".to_string(),
            PackerError::Precondition(msg) => format!(
                "What happened: Request rejected ({msg}).\nLikely causes: Delivering before a capture, or a wrap size outside the stock.\nHow to fix: Run `packer capture` first or pass a valid --length/--width."
            ),
            PackerError::Busy => "What happened: The machine is busy with another operation.\nLikely causes: A capture or delivery is still running.\nHow to fix: Wait for it to finish and retry.".to_string(),
            PackerError::Hardware(_) | PackerError::Config(_) | PackerError::Io(_) => format!(
                "What happened: {err:#}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from config or calibration
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'pixels,cm'.".to_string();
    }

    if lower.contains("parse config") || lower.contains("read config") {
        return format!(
            "What happened: Could not load the configuration.\nLikely causes: Missing file, TOML syntax error, or a mistyped key.\nHow to fix: Pass --config with a valid file. Detail: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error class; anything unclassified returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<PackerError>() {
        Some(PackerError::SensorTimeout(_)) => 2,
        Some(PackerError::Vision(_)) => 3,
        Some(PackerError::ActuatorFault { .. } | PackerError::EstopEngaged) => 4,
        Some(PackerError::Precondition(_)) => 5,
        Some(PackerError::Busy) => 6,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(PackerError::ActuatorFault { phase, detail }) = err.downcast_ref::<PackerError>() {
        obj["details"] = json!({ "phase": phase, "detail": detail });
    }
    obj.to_string()
}
