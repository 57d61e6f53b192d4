//! Terminal output of a decoded power limit

use clap::ValueEnum;

use crate::limits::types::PowerLimit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PrintFormat {
    #[default]
    Table,
    Json,
}

/// Render a power limit for the terminal
pub fn render(limit: &PowerLimit, format: PrintFormat) -> String {
    match format {
        PrintFormat::Table => to_table(limit),
        // The limit is plain data; serialization cannot fail
        PrintFormat::Json => serde_json::to_string_pretty(limit)
            .unwrap_or_else(|_| "{}".to_string()),
    }
}

/// Property/value table with the CLI flag that changes each settable row
fn to_table(limit: &PowerLimit) -> String {
    let rows: Vec<(&str, String, &str)> = vec![
        ("locked", limit.locked.to_string(), ""),
        ("pl1.enabled", limit.pl1.enabled.to_string(), ""),
        ("pl1.power", format!("{} W", limit.pl1.power), "--pl1"),
        ("pl1.clamping", limit.pl1.clamping.to_string(), "--clamping1"),
        ("pl1.time", format!("{} s", limit.pl1.time), "--time1"),
        ("pl2.enabled", limit.pl2.enabled.to_string(), "--enable2"),
        ("pl2.power", format!("{} W", limit.pl2.power), "--pl2"),
        ("pl2.clamping", limit.pl2.clamping.to_string(), "--clamping2"),
        ("pl2.time", format!("{} s", limit.pl2.time), ""),
    ];

    let prop_width = rows
        .iter()
        .map(|(p, _, _)| p.len())
        .max()
        .unwrap_or(0)
        .max("Property".len());
    let value_width = rows
        .iter()
        .map(|(_, v, _)| v.len())
        .max()
        .unwrap_or(0)
        .max("Value".len());

    let mut out = format!("{:prop_width$}  {:value_width$}  Option\n", "Property", "Value");
    for (prop, value, option) in &rows {
        out.push_str(&format!("{prop:prop_width$}  {value:value_width$}  {option}\n"));
    }
    out
}
