//! Output formatting for CLI responses

use anyhow::Error;
use colored::*;
use ota_update::{OtaError, OtaUpdateReport};
use serde_json::{Value, json};

use crate::commands::version::VersionInfo;
use crate::error::CliError;

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": error_details(error)
    });
    match serde_json::to_string_pretty(&error_json) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to format error as JSON: {}", e),
    }
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

/// Print the summary of a finished update
pub fn print_update_report(report: &OtaUpdateReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({
            "success": true,
            "update": report
        }));
    }

    println!("{}", "OTA update created".green().bold());
    println!("  Update ID: {}", report.ota_update_id.bold());
    if let Some(arn) = &report.ota_update_arn {
        println!("  ARN: {}", arn.dimmed());
    }
    if let Some(status) = &report.ota_update_status {
        println!("  Status: {}", status);
    }
    println!("  Target: {}", report.target_arn);
    println!("  Version: {}", report.version);
    println!(
        "  Firmware: s3://{}/{} ({})",
        report.bucket, report.object_key, report.object_version
    );
    println!(
        "  Signing: job {} with profile {} after {} check(s)",
        report.signing_job_id, report.signing_profile, report.signing_attempts
    );
    if let Some(arn) = &report.created_profile_arn {
        println!("  {} {}", "Created signing profile".yellow(), arn);
    }
    println!("  Stream: {}", report.stream_id);
    Ok(())
}

/// Print resolved version information
pub fn print_version_info(info: &VersionInfo, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({
            "success": true,
            "version": info
        }));
    }

    println!("{} {}", "Version:".bold(), info.version.green());
    println!("  Source: {}", info.source);
    println!("  Build file: {}", info.build_file.display());
    println!("  Object key: {}", info.object_key);
    match info.staged_bytes {
        Some(bytes) => println!(
            "  {} {} ({} bytes)",
            "Staged".green(),
            info.staged_path.display(),
            bytes
        ),
        None => println!("  Staged path: {}", info.staged_path.display()),
    }
    Ok(())
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(CliError::from)?;
    println!("{}", text);
    Ok(())
}

fn error_details(error: &Error) -> Value {
    let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();

    match error.downcast_ref::<OtaError>() {
        Some(e) => json!({
            "message": error.to_string(),
            "type": format!("{:?}", e.category()),
            "stage": e.stage().map(|s| s.description()),
            "causes": causes
        }),
        None => json!({
            "message": error.to_string(),
            "type": error_type_name(error),
            "causes": causes
        }),
    }
}

fn error_type_name(error: &Error) -> String {
    match error.downcast_ref::<CliError>() {
        Some(CliError::InvalidArgument(_)) => "InvalidArgument",
        Some(CliError::JsonError(_)) => "Json",
        None => "Unknown",
    }
    .to_string()
}
