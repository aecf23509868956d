//! Alert message composition.

use crate::aggregate::round2;
use crate::alert::AlertEvent;

/// Subject and body of one alert notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

/// Render a band bound without a trailing `.0` (`85`, `72.5`).
pub fn format_bound(bound: f64) -> String {
    if bound.fract() == 0.0 {
        format!("{:.0}", bound)
    } else {
        format!("{}", round2(bound))
    }
}

/// Build the human-readable message for an alert.
pub fn compose_message(event: &AlertEvent, subject_prefix: &str) -> AlertMessage {
    let entity = event.subject.entity_type.display_name();
    let scope = event.subject.scope_name();
    let bound = format_bound(event.band_lower_bound);

    let subject = format!(
        "{}MLR Alert: {} {} has reached the {} band ({}%)",
        subject_prefix, entity, scope, event.band_label, bound
    );

    let body = format!(
        "Medical loss ratio alert\n\
         \n\
         Scope: {scope}\n\
         Entity type: {entity}\n\
         Loss ratio: {ratio:.2}%\n\
         Band: {label} (at or above {bound}%)\n\
         Evaluated at: {ts}\n\
         \n\
         Please review the MLR dashboard for the full breakdown.\n",
        scope = scope,
        entity = entity,
        ratio = round2(event.ratio),
        label = event.band_label,
        bound = bound,
        ts = event.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    AlertMessage { subject, body }
}
