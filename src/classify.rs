//! Outcome flags derived from a finished run.
use crate::recipe::Recipe;
use crate::report::{Report, ReportRow};
use plist::Value;

pub const VERSION_FIELD: &str = "version";
pub const REMOVED_COUNT_FIELD: &str = "removed count";
pub const PROMOTIONS_FIELD: &str = "promotions";

/// Set `updated`, `removed` and `promoted` on a recipe. Each check is independent.
pub fn classify(recipe: &mut Recipe) {
    recipe.updated = recipe.results.failed.is_empty()
        && !recipe.error
        && updated_version(&recipe.results).is_some();
    recipe.removed = removed_count(&recipe.results).is_some_and(|count| count > 0);
    recipe.promoted = recipe
        .results
        .promoted
        .first()
        .and_then(|row| row.get(PROMOTIONS_FIELD))
        .is_some_and(is_truthy);
}

/// Version from the first imported row with every space removed.
pub fn updated_version(report: &Report) -> Option<String> {
    let raw = report.imported.first()?.get(VERSION_FIELD)?;
    let text = match raw {
        Value::String(text) => text.clone(),
        Value::Integer(number) => number.to_string(),
        Value::Real(number) => number.to_string(),
        _ => return None,
    };
    let version: String = text.trim().chars().filter(|ch| *ch != ' ').collect();
    (!version.is_empty()).then_some(version)
}

/// `removed count` of the first removal row; unparsable values count as zero.
pub fn removed_count(report: &Report) -> Option<i64> {
    report.removed.first().map(row_removed_count)
}

fn row_removed_count(row: &ReportRow) -> i64 {
    match row.get(REMOVED_COUNT_FIELD) {
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0),
        Some(Value::Integer(number)) => number
            .as_signed()
            .or_else(|| number.as_unsigned().map(|n| i64::try_from(n).unwrap_or(i64::MAX)))
            .unwrap_or(0),
        _ => 0,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        Value::Dictionary(entries) => !entries.is_empty(),
        Value::String(text) => !text.is_empty(),
        Value::Boolean(flag) => *flag,
        Value::Integer(number) => number.as_signed() != Some(0),
        Value::Real(number) => *number != 0.0,
        Value::Data(bytes) => !bytes.is_empty(),
        _ => true,
    }
}
