//! Construction Shell Binary
//!
//! Line-oriented shell over a [`Construction`]: define and redefine elements,
//! batch redefinitions, undo and redo, and print snapshots.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `CONSTRUCTION_UNDO_DEPTH`: Maximum undo entries (default: 100)
//! - `CONSTRUCTION_UNDO`: `on`/`off` (default: on)
//! - `CONSTRUCTION_CODEC`: `json` or `xml` snapshots (default: json)
//! - `RUST_LOG`: Log level filter (default: construction_kernel=warn)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: pretty)
//!
//! ## Usage
//!
//! ```bash
//! printf 'a = 5\nb = a + 1\n:list\n' | cargo run --bin construction_shell
//! ```

use std::io::{self, BufRead, Write};

use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use construction_kernel::{Construction, ConstructionConfig, ConstructionError};

const HELP: &str = "\
  label = expr        define or redefine an element
  expr                define an element with a free label
  :cas label expr     define a CAS cell, or change its input
  :remove label       remove an element and its dependents
  :batch              start buffering redefinitions
  :commit             apply buffered redefinitions, stop buffering
  :discard            stop buffering, dropping what is buffered
  :undo / :redo       step through history
  :store              record an undo point
  :list               print elements in construction order
  :snapshot           print the current snapshot
  :clear              empty the construction
  :help               this text
  :quit               leave";

/// Initialize the tracing subscriber with JSON or pretty format, on stderr
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "construction_kernel=warn,construction_shell=info".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .flatten_event(true)
                    .with_writer(io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(io::stderr))
            .init();
    }
}

/// Outcome of one shell line.
enum Step {
    Continue,
    Quit,
}

fn print_list(construction: &Construction, out: &mut impl Write) -> io::Result<()> {
    for label in construction.construction_list() {
        let Some(geo) = construction.lookup(&label) else {
            continue;
        };
        let definition = construction.definition(&label).unwrap_or_default();
        let marker = if geo.is_independent() { ' ' } else { '*' };
        writeln!(
            out,
            "{:>3}{} {} = {}    [{}: {}]",
            geo.construction_index(),
            marker,
            label,
            definition,
            geo.type_name(),
            geo.value()
        )?;
    }
    Ok(())
}

fn run_line(construction: &mut Construction, line: &str, out: &mut impl Write) -> Result<Step, ConstructionError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Step::Continue);
    }
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        ":quit" | ":q" => return Ok(Step::Quit),
        ":help" => {
            let _ = writeln!(out, "{}", HELP);
        }
        ":list" => {
            let _ = print_list(construction, out);
        }
        ":snapshot" => {
            let text = construction.current_undo_xml()?;
            let _ = writeln!(out, "{}", text.trim_end());
        }
        ":undo" => {
            let changed = construction.undo()?;
            let _ = writeln!(out, "{}", if changed { "undone" } else { "nothing to undo" });
        }
        ":redo" => {
            let changed = construction.redo()?;
            let _ = writeln!(out, "{}", if changed { "redone" } else { "nothing to redo" });
        }
        ":store" => {
            construction.store_undo_info()?;
        }
        ":batch" => construction.start_collecting_redefines(),
        ":commit" => {
            let rebuilt = construction.commit()?;
            let _ = writeln!(out, "{}", if rebuilt { "committed" } else { "nothing to commit" });
        }
        ":discard" => construction.stop_collecting_redefines(),
        ":clear" => construction.clear_construction(),
        ":remove" => {
            let removed = construction.remove(rest)?;
            let _ = writeln!(out, "removed {}", removed.join(", "));
        }
        ":cas" => {
            let (label, input) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if construction.contains(label) {
                construction.change_cas_cell(label, input.trim())?;
            } else {
                construction.define_cas_cell(label, input.trim())?;
            }
            let _ = writeln!(out, "{} = {}", label, construction.value(label).map(ToString::to_string).unwrap_or_default());
        }
        _ => {
            let label = construction.eval_command(line)?;
            if construction.is_collecting_redefines() && !construction.pending_redefines().is_empty() {
                let _ = writeln!(out, "{} buffered", label);
            } else {
                let value = construction.value(&label).map(ToString::to_string).unwrap_or_default();
                let _ = writeln!(out, "{} = {}", label, value);
            }
        }
    }
    Ok(Step::Continue)
}

fn main() {
    init_tracing();

    let config = ConstructionConfig::from_env();
    info!(
        codec = ?config.codec,
        undo_enabled = config.undo_enabled,
        max_undo_depth = config.max_undo_depth,
        "starting construction shell"
    );
    let mut construction = Construction::with_config(config);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "failed to read input");
                break;
            }
        };
        match run_line(&mut construction, &line, &mut out) {
            Ok(Step::Continue) => {}
            Ok(Step::Quit) => break,
            Err(e) => {
                let _ = writeln!(out, "error: {}", e);
            }
        }
        let _ = out.flush();
    }
    info!(elements = construction.len(), "construction shell finished");
}
