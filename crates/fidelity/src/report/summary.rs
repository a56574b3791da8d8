//! Text layout of the summary reports.

use crate::stats::{Counters, FieldPatterns};

/// `"n (p.pp%)"` relative to `whole`; `"0 (0.00%)"` when `part` is zero.
pub fn with_percent(part: u64, whole: u64) -> String {
    if part == 0 {
        return "0 (0.00%)".to_string();
    }
    if whole == 0 {
        return format!("{part} (n/a)");
    }
    format!("{part} ({:.2}%)", part as f64 * 100.0 / whole as f64)
}

/// Column header of `diff_result.txt`.
pub fn summary_header(legacy_name: &str, new_name: &str) -> String {
    [
        "File name".to_string(),
        format!("{legacy_name} records"),
        format!("{new_name} records"),
        "Matched".to_string(),
        "Lost".to_string(),
        "Extra".to_string(),
        format!("{legacy_name} repeats"),
        format!("{new_name} repeats"),
        "Broken records".to_string(),
        "Broken attributes".to_string(),
        "Defective records".to_string(),
        "Identical records".to_string(),
        format!("{legacy_name} rejected lines"),
        format!("{new_name} rejected lines"),
    ]
    .join("\t")
}

/// One tab-separated summary row, percentages relative to legacy records.
/// Rejected lines never became records, so they are plain counts.
pub fn pair_summary(label: &str, counters: &Counters) -> String {
    let base = counters.legacy_records;
    [
        label.to_string(),
        counters.legacy_records.to_string(),
        counters.new_records.to_string(),
        with_percent(counters.matched, base),
        with_percent(counters.lost, base),
        with_percent(counters.extra, base),
        with_percent(counters.legacy_repeats, base),
        with_percent(counters.new_repeats, base),
        with_percent(counters.broken_records, base),
        counters.broken_fields.to_string(),
        with_percent(counters.defective_records, base),
        with_percent(counters.identical_records, base),
        counters.legacy_rejected.to_string(),
        counters.new_rejected.to_string(),
    ]
    .join("\t")
}

/// Blank line, header again, then the `TOTAL` row.
pub fn total_summary(legacy_name: &str, new_name: &str, counters: &Counters) -> String {
    format!(
        "\n{}\n{}\n",
        summary_header(legacy_name, new_name),
        pair_summary("TOTAL", counters)
    )
}

/// Per field: `\n{index} {name}:\n` then `{pattern:<40} : {count}` lines.
pub fn pattern_summary(fields: &[FieldPatterns], field_name: impl Fn(usize) -> String) -> String {
    let mut out = String::new();
    for field in fields {
        out.push_str(&format!("\n{} {}:\n", field.index, field_name(field.index)));
        for (pattern, count) in &field.patterns {
            out.push_str(&format!("{pattern:<40} : {count}\n"));
        }
    }
    out
}
