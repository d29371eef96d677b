//! Migration of legacy match filters into expression text.
//!
//! Two legacy shapes are recognized:
//!
//! - structured JSON: `{"artist": {"match": true}, "title": {"similarity": 0.8}}`
//! - predicate strings: `(item) => item.matching.artist.match && item.matching.title.similarity >= 0.8`
//!
//! Anything else yields `None`; callers treat that as "not a legacy filter".

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::expression::{parse_expression, Combinator, Condition, Operation};
use crate::models::MatchField;

/// Optional arrow-function prefix: "(item) =>", "item =>"
static ARROW_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\(\s*item\s*\)|item)\s*=>\s*").unwrap());

/// One lexeme of a predicate string, anchored at the current position.
static PREDICATE_LEXEME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:item\.matching\.(?P<sim_field>\w+)\.similarity\s*>=\s*(?P<threshold>-?\d*\.?\d+)|item\.matching\.(?P<flag_field>\w+)\.(?P<flag>match|contains)|(?P<and>&&)|(?P<or>\|\|)|(?P<open>\()|(?P<close>\)))",
    )
    .unwrap()
});

/// Convert a legacy filter into expression text, or `None` if unrecognized.
/// The returned text always parses.
pub fn migrate_legacy_filter(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let migrated = if trimmed.starts_with('{') {
        migrate_structured(trimmed)?
    } else {
        migrate_predicate(trimmed)?
    };

    // Re-print through the parser so the output is canonical
    parse_expression(&migrated).ok().map(|expr| expr.to_string())
}

fn lookup_field(name: &str) -> Option<MatchField> {
    MatchField::ALL
        .into_iter()
        .find(|f| f.as_str().eq_ignore_ascii_case(name))
}

fn migrate_structured(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;

    // Reject unknown keys rather than silently dropping them
    let mut fields = Vec::new();
    for (key, flags) in object {
        fields.push((lookup_field(key)?, flags.as_object()?));
    }

    let mut conditions = Vec::new();
    for field in MatchField::ALL {
        let Some((_, flags)) = fields.iter().find(|(f, _)| *f == field) else {
            continue;
        };
        for (flag, setting) in flags.iter() {
            match (flag.as_str(), setting) {
                ("match", Value::Bool(on)) => {
                    if *on {
                        conditions.push(Condition::new(field, Operation::Match));
                    }
                }
                ("contains", Value::Bool(on)) => {
                    if *on {
                        conditions.push(Condition::new(field, Operation::Contains));
                    }
                }
                ("similarity", Value::Number(n)) => {
                    let threshold = n.as_f64()?;
                    conditions.push(Condition {
                        field,
                        operation: Operation::Similarity,
                        threshold: Some(threshold.clamp(0.0, 1.0)),
                    });
                }
                _ => return None,
            }
        }
    }

    if conditions.is_empty() {
        return None;
    }
    Some(
        conditions
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" AND "),
    )
}

fn migrate_predicate(text: &str) -> Option<String> {
    let stripped = ARROW_PREFIX.replace(text, "");
    let mut rest: &str = &stripped;
    let mut parts: Vec<String> = Vec::new();

    while !rest.trim().is_empty() {
        let caps = PREDICATE_LEXEME.captures(rest)?;
        let part = if let Some(field) = caps.name("sim_field") {
            let threshold: f64 = caps.name("threshold")?.as_str().parse().ok()?;
            Condition {
                field: lookup_field(field.as_str())?,
                operation: Operation::Similarity,
                threshold: Some(threshold.clamp(0.0, 1.0)),
            }
            .to_string()
        } else if let Some(field) = caps.name("flag_field") {
            let operation = match caps.name("flag")?.as_str() {
                "match" => Operation::Match,
                _ => Operation::Contains,
            };
            Condition::new(lookup_field(field.as_str())?, operation).to_string()
        } else if caps.name("and").is_some() {
            Combinator::And.as_str().to_string()
        } else if caps.name("or").is_some() {
            Combinator::Or.as_str().to_string()
        } else if caps.name("open").is_some() {
            "(".to_string()
        } else {
            ")".to_string()
        };
        parts.push(part);
        let consumed = caps.get(0)?.end();
        rest = &rest[consumed..];
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.join(" "))
}
