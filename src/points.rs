//! Key-point deduplication.
//!
//! Turns the candidate points of one or more model responses into the final
//! [`Summary`]: first-seen order, exact duplicates dropped, blanks dropped,
//! and anything starting with the "nothing relevant" sentinel dropped.

use serde::Serialize;

use crate::generation::ResponseUnit;

/// Prefix the model uses for "no relevant point found".
pub const NOT_FOUND_SENTINEL: &str = "Not Found";

/// Marker put in front of every accepted point.
pub const BULLET: &str = "- ";

/// Markers stripped from a candidate before it is compared.
const INCOMING_BULLETS: [&str; 3] = ["- ", "* ", "• "];

/// Ordered, duplicate-free, bullet-prefixed key points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Summary {
    points: Vec<String>,
}

impl Summary {
    pub fn points(&self) -> &[String] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// Deduplicate the points of every response unit, in order.
pub fn dedup_points(units: &[ResponseUnit], sentinel: &str) -> Summary {
    dedup_candidates(units.iter().flat_map(|u| u.points.iter()), sentinel)
}

pub fn dedup_candidates<I, S>(candidates: I, sentinel: &str) -> Summary
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut accepted: Vec<String> = Vec::new();

    for candidate in candidates {
        let core = strip_bullet(candidate.as_ref().trim());
        if core.is_empty() || core.starts_with(sentinel) {
            continue;
        }
        if accepted.iter().any(|seen| seen == core) {
            continue;
        }
        accepted.push(core.to_string());
    }

    Summary {
        points: accepted
            .into_iter()
            .map(|p| format!("{}{}", BULLET, p))
            .collect(),
    }
}

fn strip_bullet(s: &str) -> &str {
    for bullet in INCOMING_BULLETS {
        if let Some(rest) = s.strip_prefix(bullet) {
            return rest.trim();
        }
        if s == bullet.trim_end() {
            return "";
        }
    }
    s
}
