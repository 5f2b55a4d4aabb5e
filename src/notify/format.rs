//! Telegram HTML message bodies.
//!
//! Rendering never invents values: a field without a comparison is shown
//! with its current price only.

use std::fmt::Write;

use crate::db::models::{MatchSnapshot, OddsField};
use crate::odds::OddsChange;

/// Escape the three characters Telegram's HTML mode reserves.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Display label for a field, using the team names and handicap lines of `m`.
pub fn field_label(m: &MatchSnapshot, field: OddsField) -> String {
    let with_line = |team: &str, line: &Option<String>| match line {
        Some(h) => format!("{} ({}) handicap", escape_html(team), escape_html(h)),
        None => format!("{} handicap", escape_html(team)),
    };
    match field {
        OddsField::Odds1 => escape_html(&m.team1),
        OddsField::Odds2 => escape_html(&m.team2),
        OddsField::HandicapOdd1 => with_line(&m.team1, &m.handicap1),
        OddsField::HandicapOdd2 => with_line(&m.team2, &m.handicap2),
    }
}

pub fn render_new_match(key: &str, m: &MatchSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "🆕 <b>{}</b>", escape_html(key));
    let _ = writeln!(out, "🕒 {}", escape_html(&m.time));
    for field in OddsField::ALL {
        if let Some(v) = m.odds.get(&field) {
            let _ = writeln!(out, "📊 {}: {:.2}", field_label(m, field), v);
        }
    }
    out
}

pub fn render_odds_change(change: &OddsChange) -> String {
    let m = &change.current;
    let mut out = String::new();
    let _ = writeln!(out, "⚠️ <b>{}</b>", escape_html(&change.key));
    let _ = writeln!(out, "🕒 {}", escape_html(&m.time));

    for field in OddsField::ALL {
        let label = field_label(m, field);
        match change.comparisons.get(&field) {
            Some(c) => {
                let arrow = match c.diff.partial_cmp(&0.0) {
                    Some(std::cmp::Ordering::Less) => "📉",
                    Some(std::cmp::Ordering::Greater) => "📈",
                    _ => "▫️",
                };
                let _ = write!(
                    out,
                    "{} {}: {:.2} → {:.2} ({:+.2})",
                    arrow, label, c.previous, c.current, c.diff
                );
                if c.significant {
                    out.push_str(" ❗");
                }
                if let Some(init) = change.initial.get(&field) {
                    let _ = write!(out, " [open {:.2}]", init);
                }
                out.push('\n');
            }
            None => {
                if let Some(v) = m.odds.get(&field) {
                    let _ = writeln!(out, "▫️ {}: {:.2}", label, v);
                }
            }
        }
    }
    out
}
