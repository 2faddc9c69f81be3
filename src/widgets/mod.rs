//! Plain-text renderings of the dashboard panels.

pub mod forecast_chart;
pub mod patient_table;
pub mod validation_panel;

use crate::style;

/// `12.3` -> `£12.30`
pub fn format_money(amount: f64) -> String {
    if amount < 0.0 {
        format!("-{}{:.2}", style::CURRENCY, -amount)
    } else {
        format!("{}{:.2}", style::CURRENCY, amount)
    }
}

/// Money with an explicit sign, for variance.
pub fn format_signed_money(amount: f64) -> String {
    if amount >= 0.0 {
        format!("+{}", format_money(amount))
    } else {
        format_money(amount)
    }
}

pub fn rule() -> String {
    style::RULE.to_string().repeat(style::RULE_WIDTH)
}
