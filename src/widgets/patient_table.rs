use std::fmt::Write;

use chrono::NaiveDate;

use crate::{
    models::RecordKind,
    patients::{Paginator, PatientRow, SpendTier, format_probability},
    style,
    widgets::{format_money, rule},
};

fn yes_no(flag: bool) -> &'static str {
    if flag { "Y" } else { "N" }
}

fn tier_marker(tier: SpendTier) -> &'static str {
    match tier {
        SpendTier::High => style::TIER_HIGH,
        SpendTier::Medium => style::TIER_MEDIUM,
        SpendTier::Low => style::TIER_LOW,
    }
}

pub struct PatientTable<'a> {
    pub date: NaiveDate,
    pub rows: &'a [PatientRow],
    pub pager: &'a Paginator,
}

impl<'a> PatientTable<'a> {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Patients for {}", self.date.format("%A, %B %d, %Y"));

        if self.rows.is_empty() {
            let _ = writeln!(out, "No patients found for selected date");
            return out;
        }

        let _ = writeln!(out, "{} patients", self.pager.summary());
        let _ = writeln!(out, "{}", rule());
        let _ = writeln!(
            out,
            "  {:>6} {:<8} {:>3} {:>5} Emp Ben Drv VDU Var HRx {:>9} {:>9} {:>6}",
            "ID", "Source", "Age", "LPS", "Predicted", "Actual", "Prob"
        );

        for row in self.pager.slice(self.rows) {
            let r = &row.record;
            let actual = match (row.source, r.actual_spend) {
                (RecordKind::Past, Some(amount)) => format_money(amount),
                _ => "-".to_string(),
            };
            let _ = writeln!(
                out,
                "{} {:>6} {:<8} {:>3} {:>5}  {}   {}   {}   {}   {}   {}  {:>9} {:>9} {:>6}",
                tier_marker(row.tier()),
                r.id,
                row.source.as_str(),
                r.age,
                r.days_since_last_purchase,
                yes_no(r.employed),
                yes_no(r.benefits),
                yes_no(r.driver),
                yes_no(r.vdu),
                yes_no(r.varifocal),
                yes_no(r.high_rx),
                format_money(r.predicted()),
                actual,
                format_probability(r.probability()),
            );
        }

        if self.pager.total_pages() > 1 {
            let pages: Vec<String> = self
                .pager
                .page_numbers()
                .into_iter()
                .map(|p| {
                    if p == self.pager.page() {
                        format!("[{}]", p)
                    } else {
                        p.to_string()
                    }
                })
                .collect();
            let _ = writeln!(
                out,
                "Page {} of {}: {}",
                self.pager.page(),
                self.pager.total_pages(),
                pages.join(" ")
            );
        }

        out
    }
}
