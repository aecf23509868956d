//! JSONL output layer.
//!
//! One object per event:
//! `{"ts", "level", "event", "run_id"?, "stage"?, "message"?, "fields"?}`.
//! `run_id` and `stage` come from the event itself or, failing that, the
//! nearest enclosing span that recorded them.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const LIFTED: [&str; 2] = ["run_id", "stage"];

/// Collects tracing fields into JSON, splitting out the lifted keys.
#[derive(Default)]
struct Collected {
    lifted: Map<String, Value>,
    message: Option<String>,
    fields: Map<String, Value>,
}

impl Collected {
    fn put(&mut self, field: &Field, value: Value) {
        let name = field.name();
        if name == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else if LIFTED.contains(&name) {
            self.lifted.insert(name.to_string(), value);
        } else {
            self.fields.insert(name.to_string(), value);
        }
    }
}

impl Visit for Collected {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::from(format!("{:?}", value)));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON form
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(value.to_string()));
        self.put(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::from(value));
    }
}

/// Lifted keys recorded on a span, kept in its extensions.
struct SpanLifted(Map<String, Value>);

/// Writes one JSON line per event.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> JsonlLayer<W> {
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut collected = Collected::default();
        attrs.record(&mut collected);
        if collected.lifted.is_empty() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanLifted(collected.lifted));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut collected = Collected::default();
        event.record(&mut collected);

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(SpanLifted(from_span)) = span.extensions().get::<SpanLifted>() {
                    for (key, value) in from_span {
                        collected
                            .lifted
                            .entry(key.clone())
                            .or_insert_with(|| value.clone());
                    }
                }
            }
        }

        let meta = event.metadata();
        let mut line = Map::new();
        line.insert(
            "ts".into(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        line.insert(
            "level".into(),
            Value::from(meta.level().as_str().to_ascii_lowercase()),
        );
        line.insert("event".into(), Value::from(meta.target()));
        for key in LIFTED {
            if let Some(value) = collected.lifted.remove(key) {
                line.insert(key.into(), value);
            }
        }
        if let Some(message) = collected.message {
            line.insert("message".into(), Value::from(message));
        }
        if !collected.fields.is_empty() {
            line.insert("fields".into(), Value::Object(collected.fields));
        }

        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", Value::Object(line));
        }
    }
}
