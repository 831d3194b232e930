//! Colorful console output for synthesis events.
//!
//! Provides a `tracing` layer that renders engine events with colors.
//! Enabled with the `console` feature.

use owo_colors::OwoColorize;
use std::io::{self, Write};
use std::sync::OnceLock;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static INIT: OnceLock<()> = OnceLock::new();

const DEFAULT_FILTER: &str = "cmpforge_jit=info";

/// Installs the console subscriber.
///
/// Safe to call multiple times; only the first call has effect. `RUST_LOG`
/// overrides the default `cmpforge_jit=info` filter. Does nothing if another
/// global subscriber is already installed.
pub fn init() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(SynthesisConsoleLayer)
            .try_init();
    });
}

/// A tracing layer that formats engine events with colors.
pub struct SynthesisConsoleLayer;

impl<S: Subscriber> Layer<S> for SynthesisConsoleLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        // Only handle cmpforge_jit events
        if !metadata.target().starts_with("cmpforge_jit") {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let output = format_event(*metadata.level(), &visitor);
        if !output.is_empty() {
            let _ = writeln!(io::stdout(), "{}", output);
        }
    }
}

#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    event: Option<String>,
    artifact: Option<String>,
    definer: Option<String>,
    instantiator: Option<String>,
    wiring: Option<String>,
    candidate: Option<String>,
    context: Option<String>,
    error: Option<String>,
    capability: Option<String>,
    probe: Option<String>,
    spec: Option<String>,
    criteria: Option<u64>,
    serial: Option<u64>,
}

impl EventVisitor {
    fn set(&mut self, field: &Field, value: String) {
        let slot = match field.name() {
            "message" => &mut self.message,
            "event" => &mut self.event,
            "artifact" => &mut self.artifact,
            "definer" => &mut self.definer,
            "instantiator" => &mut self.instantiator,
            "wiring" => &mut self.wiring,
            "candidate" => &mut self.candidate,
            "context" => &mut self.context,
            "error" => &mut self.error,
            "capability" => &mut self.capability,
            "probe" => &mut self.probe,
            "spec" => &mut self.spec,
            _ => return,
        };
        *slot = Some(value);
    }

    fn set_count(&mut self, name: &str, value: u64) {
        match name {
            "criteria" => self.criteria = Some(value),
            "serial" => self.serial = Some(value),
            _ => {}
        }
    }

    // Counts and serials are never negative; anything else is dropped.
    fn set_signed_count(&mut self, name: &str, value: i64) {
        if let Ok(value) = u64::try_from(value) {
            self.set_count(name, value);
        }
    }
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let s = format!("{:?}", value);
        self.set(field, s.trim_matches('"').to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.set_count(field.name(), value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.set_signed_count(field.name(), value);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field, value.to_string());
    }
}

fn format_event(level: Level, v: &EventVisitor) -> String {
    if v.event.as_deref() == Some("artifact_synthesized") {
        return format_synthesized(v);
    }
    match v.message.as_deref().unwrap_or("") {
        "Candidate failed" => format_candidate_failed(v),
        "Capability resolved" | "Capability unavailable" => format_capability(v),
        "Rejected bridge resolution" => format_bridge_rejected(v),
        "" => String::new(),
        message => format!(
            "{} {} {} {}",
            timestamp().bright_black(),
            level_tag(level),
            "[Engine]".bright_cyan(),
            message
        ),
    }
}

fn format_synthesized(v: &EventVisitor) -> String {
    format!(
        "{} {} {} {} via {}/{}/{} ({} criteria)",
        timestamp().bright_black(),
        level_tag(Level::INFO),
        "[Synthesis]".bright_cyan(),
        v.artifact.as_deref().unwrap_or("?").white().bold(),
        v.definer.as_deref().unwrap_or("?").bright_magenta(),
        v.instantiator.as_deref().unwrap_or("?").bright_magenta(),
        v.wiring.as_deref().unwrap_or("?").bright_magenta(),
        v.criteria.unwrap_or(0).to_string().yellow()
    )
}

fn format_candidate_failed(v: &EventVisitor) -> String {
    format!(
        "{} {} {} {} failed for {}: {}",
        timestamp().bright_black(),
        level_tag(Level::DEBUG),
        "[Fallback]".bright_cyan(),
        v.candidate.as_deref().unwrap_or("?").yellow(),
        v.context.as_deref().unwrap_or("?"),
        v.error.as_deref().unwrap_or("").bright_red()
    )
}

fn format_capability(v: &EventVisitor) -> String {
    let capability = v.capability.as_deref().unwrap_or("?");
    let outcome = match (&v.probe, &v.error) {
        (Some(probe), _) => format!("resolved via {}", probe.bright_green()),
        (None, Some(error)) => format!("unavailable: {}", error.bright_red()),
        (None, None) => "unavailable".bright_red().to_string(),
    };
    format!(
        "{} {} {} {} {}",
        timestamp().bright_black(),
        level_tag(Level::DEBUG),
        "[Capability]".bright_cyan(),
        capability.white().bold(),
        outcome
    )
}

fn format_bridge_rejected(v: &EventVisitor) -> String {
    format!(
        "{} {} {} resolution for #{} rejected",
        timestamp().bright_black(),
        level_tag(Level::WARN),
        "[Bridge]".bright_cyan(),
        v.serial.unwrap_or(0).to_string().yellow()
    )
}

fn level_tag(level: Level) -> String {
    match level {
        Level::ERROR => "ERROR".bright_red().to_string(),
        Level::WARN => "WARN ".yellow().to_string(),
        Level::INFO => "INFO ".bright_green().to_string(),
        Level::DEBUG => "DEBUG".bright_blue().to_string(),
        Level::TRACE => "TRACE".bright_black().to_string(),
    }
}

fn timestamp() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| {
            let secs = d.as_secs() % 100000;
            let millis = d.subsec_millis();
            format!("{:5}.{:03}", secs, millis)
        })
        .unwrap_or_else(|_| "    0.000".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visitor() -> EventVisitor {
        EventVisitor {
            event: Some("artifact_synthesized".to_string()),
            artifact: Some("app.Ord$Point$3".to_string()),
            definer: Some("named".to_string()),
            instantiator: Some("by_name".to_string()),
            wiring: Some("bridge".to_string()),
            criteria: Some(2),
            ..EventVisitor::default()
        }
    }

    #[test]
    fn test_synthesized_event_mentions_backends() {
        let line = format_event(Level::INFO, &visitor());
        assert!(line.contains("app.Ord$Point$3"));
        assert!(line.contains("by_name"));
        assert!(line.contains("bridge"));
    }

    #[test]
    fn test_capability_event() {
        let v = EventVisitor {
            message: Some("Capability unavailable".to_string()),
            capability: Some("slot_writer".to_string()),
            error: Some("no probe succeeded".to_string()),
            ..EventVisitor::default()
        };
        let line = format_event(Level::DEBUG, &v);
        assert!(line.contains("slot_writer"));
        assert!(line.contains("no probe succeeded"));
    }

    #[test]
    fn test_negative_counts_are_ignored() {
        let mut v = EventVisitor::default();
        v.set_signed_count("criteria", -3);
        v.set_signed_count("serial", 42);
        assert_eq!(v.criteria, None);
        assert_eq!(v.serial, Some(42));
    }

    #[test]
    fn test_empty_events_are_skipped() {
        assert!(format_event(Level::TRACE, &EventVisitor::default()).is_empty());
    }
}
