//! The remediation script: a standalone POSIX shell artifact that performs
//! only the low-risk deletions.
//!
//! Order of operations inside the script: operator acknowledgement (typed
//! `delete`, or `--yes`), snapshot through `deadscript backup`, deletions,
//! then the validation command with a rollback hint on failure.

use std::fmt::Write;

use super::ReportModel;
use crate::fix::DeletionTarget;

/// Single-quotes `s` for POSIX shells.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

pub fn render_remediation(model: &ReportModel, validate: Option<&str>) -> String {
    let mut out = String::with_capacity(1024 + model.low_risk_plan.len() * 96);
    if let Err(e) = write_script(&mut out, model, validate) {
        tracing::error!(error = %e, "failed to render remediation script");
    }
    out
}

fn write_script(out: &mut String, model: &ReportModel, validate: Option<&str>) -> std::fmt::Result {
    let files = model
        .low_risk_plan
        .iter()
        .filter(|t| matches!(t, DeletionTarget::File { .. }))
        .count();
    let functions = model.low_risk_plan.len() - files;

    writeln!(out, "#!/bin/sh")?;
    writeln!(out, "# Generated by deadscript: low-risk deletions only.")?;
    writeln!(out, "# Usage: remediate.sh [--yes]")?;
    writeln!(out, "set -eu")?;
    writeln!(out)?;
    writeln!(out, "ROOT={}", shell_quote(&model.root))?;
    writeln!(out, "DEADSCRIPT=\"${{DEADSCRIPT:-deadscript}}\"")?;
    writeln!(out)?;

    if model.low_risk_plan.is_empty() {
        writeln!(out, "echo \"Nothing to delete.\"")?;
        writeln!(out, "exit 0")?;
        return Ok(());
    }

    writeln!(out, "if [ \"${{1:-}}\" != \"--yes\" ]; then")?;
    writeln!(
        out,
        "  echo \"This will delete {} file(s) and {} function(s) under $ROOT.\"",
        files, functions
    )?;
    writeln!(out, "  printf 'Type \"delete\" to continue: '")?;
    writeln!(out, "  read -r answer")?;
    writeln!(out, "  if [ \"$answer\" != \"delete\" ]; then")?;
    writeln!(out, "    echo \"Aborted, nothing changed.\"")?;
    writeln!(out, "    exit 1")?;
    writeln!(out, "  fi")?;
    writeln!(out, "fi")?;
    writeln!(out)?;
    writeln!(
        out,
        "SNAPSHOT=$(\"$DEADSCRIPT\" \"$ROOT\" backup --purpose remediation)"
    )?;
    writeln!(out, "echo \"Snapshot: $SNAPSHOT\"")?;
    writeln!(out)?;

    for target in &model.low_risk_plan {
        match target {
            DeletionTarget::File { path } => {
                let quoted = shell_quote(path);
                writeln!(out, "if [ -L \"$ROOT\"/{} ]; then", quoted)?;
                writeln!(out, "  echo \"warning: refusing to delete symlink \"{} >&2", quoted)?;
                writeln!(out, "else")?;
                writeln!(out, "  rm -f -- \"$ROOT\"/{}", quoted)?;
                writeln!(out, "fi")?;
            }
            DeletionTarget::Function { path, name } => {
                writeln!(
                    out,
                    "\"$DEADSCRIPT\" \"$ROOT\" remove-function --file {} --name {} || echo \"warning: could not remove \"{}\" from \"{} >&2",
                    shell_quote(path),
                    shell_quote(name),
                    shell_quote(name),
                    shell_quote(path)
                )?;
            }
        }
    }
    writeln!(out)?;

    match validate {
        Some(cmd) => {
            writeln!(out, "if (cd \"$ROOT\" && sh -c {}); then", shell_quote(cmd))?;
            writeln!(out, "  echo \"Validation passed.\"")?;
            writeln!(out, "else")?;
            writeln!(out, "  echo \"Validation failed. To roll back:\" >&2")?;
            writeln!(out, "  echo \"  $DEADSCRIPT $ROOT rollback $SNAPSHOT\" >&2")?;
            writeln!(out, "  exit 1")?;
            writeln!(out, "fi")?;
        }
        None => {
            writeln!(out, "echo \"No validation command configured. To roll back:\"")?;
            writeln!(out, "echo \"  $DEADSCRIPT $ROOT rollback $SNAPSHOT\"")?;
        }
    }
    Ok(())
}
