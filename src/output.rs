use owo_colors::OwoColorize;

use crate::model::{MoveStep, Progress, Severity};

/// Small wrapper around stdout/stderr printing to provide consistent, colored
/// user-facing messages. Colors are enabled only when output is a TTY.
fn is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

pub fn print_info(msg: &str) {
    if is_tty() {
        println!("{} {}", "info:".cyan().bold(), msg);
    } else {
        println!("info: {}", msg);
    }
}

pub fn print_warn(msg: &str) {
    if is_tty() {
        eprintln!("{} {}", "warn:".yellow().bold(), msg);
    } else {
        eprintln!("warn: {}", msg);
    }
}

pub fn print_error(msg: &str) {
    if is_tty() {
        eprintln!("{} {}", "error:".red().bold(), msg);
    } else {
        eprintln!("error: {}", msg);
    }
}

pub fn print_success(msg: &str) {
    if is_tty() {
        println!("{} {}", "ok:".green().bold(), msg);
    } else {
        println!("ok: {}", msg);
    }
}

/// Privileged command about to run; shown verbatim for the audit trail.
pub fn print_command(msg: &str) {
    if is_tty() {
        println!("{} {}", "$".magenta().bold(), msg.dimmed());
    } else {
        println!("$ {}", msg);
    }
}

/// Route a log entry to the printer for its severity.
pub fn print_severity(msg: &str, severity: Severity) {
    match severity {
        Severity::Info => print_info(msg),
        Severity::Success => print_success(msg),
        Severity::Warning => print_warn(msg),
        Severity::Error => print_error(msg),
        Severity::Command => print_command(msg),
    }
}

pub fn print_step(step: MoveStep) {
    if is_tty() {
        println!("{} {}", "step:".blue().bold(), step);
    } else {
        println!("step: {}", step);
    }
}

pub fn print_progress(p: &Progress) {
    let line = format!("{} files copied, current: {}", p.files_copied, p.current_file);
    if is_tty() {
        println!("{} {}", "copy:".blue(), line);
    } else {
        println!("copy: {}", line);
    }
}

/// Print a plain user-facing line (no prefix). Use this for primary outputs
/// that users may script against.
pub fn print_user(msg: &str) {
    println!("{}", msg);
}
