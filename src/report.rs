//! Plain-text assessment report
//!
//! A pure function of `(metrics, prediction, advice)`: the same inputs always
//! render byte-identical output. Output is ASCII only.

use crate::state_machine::{Metrics, Prediction, RiskBand};
use std::fmt::Write;

const TITLE: &str = "Diabetes Risk Assessment Report";

const DISCLAIMER: &str = "This report is an automated screening aid, not a diagnosis. \
Please discuss the results with a healthcare professional.";

pub fn render_report(metrics: &Metrics, prediction: &Prediction, advice: Option<&str>) -> String {
    let mut out = String::new();

    heading(&mut out, TITLE, '=');

    heading(&mut out, "1. Patient Metrics", '-');
    for (field, value) in metrics.present() {
        let _ = writeln!(out, "- {}: {value}", field.label());
    }
    out.push('\n');

    heading(&mut out, "2. Clinical Analysis Result", '-');
    let _ = writeln!(out, "Assessment: {}", prediction.label.display_name());
    let _ = writeln!(out, "Probability: {}%", prediction.percent());
    let band = match prediction.band() {
        RiskBand::Low => "Low (0-30%)",
        RiskBand::Moderate => "Moderate (30-70%)",
        RiskBand::High => "High (70-100%)",
    };
    let _ = writeln!(out, "Risk band: {band}");
    out.push('\n');

    heading(&mut out, "3. Personalized Recommendations", '-');
    let advice = advice.map(sanitize).filter(|a| !a.is_empty());
    out.push_str(advice.as_deref().unwrap_or("No recommendations available."));
    out.push_str("\n\n");

    out.push_str(DISCLAIMER);
    out.push('\n');
    out
}

fn heading(out: &mut String, title: &str, underline: char) {
    out.push_str(title);
    out.push('\n');
    out.extend(std::iter::repeat_n(underline, title.len()));
    out.push_str("\n\n");
}

/// Drop markdown emphasis and heading markers, and every non-ASCII char
fn sanitize(text: &str) -> String {
    text.lines()
        .map(|line| {
            line.chars()
                .filter(|c| c.is_ascii() && *c != '*' && *c != '#')
                .collect::<String>()
                .trim()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
