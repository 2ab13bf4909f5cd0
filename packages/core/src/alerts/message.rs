//! Alert text formatting.

use crate::alerts::notifier::{AlertMessage, Priority};
use crate::detection::{Episode, TreatmentEvent};

const TITLE: &str = "Missed bolus?";

/// Build the caregiver notification for an unexplained rise.
///
/// `unbolused_carbs` are carb entries inside the episode's lookback; an
/// escalated alert goes out at emergency priority with an urgent tag.
pub fn episode_alert(
    episode: &Episode,
    unbolused_carbs: &[&TreatmentEvent],
    escalated: bool,
    prior_sends: u32,
) -> AlertMessage {
    let mut body = format!(
        "Glucose rose {:.0} mg/dL ({:.0} → {:.0}) in {:.0} min, {}–{} UTC ({:.1} mg/dL/min) with no bolus logged.",
        episode.delta_mgdl,
        episode.start_mgdl,
        episode.end_mgdl,
        episode.duration_minutes,
        episode.start_ts.format("%H:%M"),
        episode.end_ts.format("%H:%M"),
        episode.severity,
    );

    for carbs in unbolused_carbs {
        if let Some(grams) = carbs.carbs_grams {
            body.push_str(&format!(
                "\n{:.0}g carbs at {} UTC with no bolus.",
                grams,
                carbs.timestamp.format("%H:%M")
            ));
        }
    }

    if escalated {
        body.push_str(&format!("\nStill unresolved after {} alerts.", prior_sends));
        AlertMessage {
            title: format!("[URGENT] {}", TITLE),
            body,
            priority: Priority::Emergency,
        }
    } else {
        AlertMessage {
            title: TITLE.to_string(),
            body,
            priority: Priority::High,
        }
    }
}

/// Meta-notification sent once an outage crosses the failure threshold.
pub fn detector_unavailable(failed_fetches: u32, last_error: &str) -> AlertMessage {
    AlertMessage {
        title: "Missed-bolus detector unavailable".to_string(),
        body: format!(
            "{} consecutive fetches from the care service failed. Missed boluses will not be detected until this clears.\nLast error: {}",
            failed_fetches, last_error
        ),
        priority: Priority::Normal,
    }
}

/// Short note written back to the care record after an alert.
pub fn annotation(episode: &Episode) -> String {
    format!(
        "Missed bolus? Rise of {:.0} mg/dL from {} UTC with no bolus logged",
        episode.delta_mgdl,
        episode.start_ts.format("%H:%M"),
    )
}
