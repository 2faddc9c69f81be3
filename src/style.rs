// Chart bars
pub const BAR_PREDICTED: char = '█';
pub const BAR_ACTUAL: char = '▒';

// Rules
pub const RULE: char = '─';
pub const RULE_WIDTH: usize = 72;

// Status markers
pub const MARK_OK: &str = "✓";
pub const MARK_ERROR: &str = "✗";
pub const MARK_WARN: &str = "⚠";

// Spend tier markers
pub const TIER_HIGH: &str = "▲";
pub const TIER_MEDIUM: &str = "●";
pub const TIER_LOW: &str = "·";

pub const CURRENCY: &str = "£";
