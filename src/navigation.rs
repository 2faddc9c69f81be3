//! Forecast chart navigation: which window is on screen, and which fetch
//! result is allowed to land in it.
//!
//! Every change of view or anchor issues a new [`RequestToken`]. A result is
//! only accepted when it carries the latest token, so a slow fetch for a
//! window the user already left can never overwrite the current chart.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;

use crate::{
    error::ClientError,
    forecast::{self, ForecastSeries, Granularity, WindowAggregate},
    traits::{Clock, RecordSource},
};

/// Monotonic id of a window fetch.
pub type RequestToken = u64;

/// A window to fetch, tagged with the token it was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRequest {
    pub token: RequestToken,
    pub granularity: Granularity,
    pub anchor: NaiveDate,
}

impl WindowRequest {
    pub fn dates(&self) -> Vec<NaiveDate> {
        forecast::window_dates(self.granularity, self.anchor)
    }

    /// Aggregate the requested window. The token comes back even when the
    /// fetch fails, so the caller can tell whether the failure is current.
    pub async fn run<S>(
        self,
        source: Arc<S>,
    ) -> (RequestToken, Result<WindowAggregate, ClientError>)
    where
        S: RecordSource + 'static,
    {
        let aggregate = forecast::aggregate_window(source, self.granularity, self.anchor).await;
        (self.token, aggregate)
    }
}

#[derive(Debug, Clone)]
pub struct ForecastView {
    granularity: Granularity,
    anchor: NaiveDate,
    latest: RequestToken,
    current: Option<WindowAggregate>,
}

impl ForecastView {
    pub fn new(granularity: Granularity, anchor: NaiveDate) -> Self {
        Self {
            granularity,
            anchor,
            latest: 0,
            current: None,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    /// Last accepted aggregate, if any.
    pub fn current(&self) -> Option<&WindowAggregate> {
        self.current.as_ref()
    }

    pub fn series(&self) -> Option<ForecastSeries> {
        self.current.as_ref().map(WindowAggregate::series)
    }

    pub fn title(&self) -> String {
        forecast::chart_title(self.granularity, self.anchor)
    }

    pub fn next(&mut self) -> WindowRequest {
        self.anchor = forecast::shift_anchor(self.granularity, self.anchor, 1);
        self.request()
    }

    pub fn previous(&mut self) -> WindowRequest {
        self.anchor = forecast::shift_anchor(self.granularity, self.anchor, -1);
        self.request()
    }

    /// Change granularity, keeping the anchor.
    pub fn switch_to(&mut self, granularity: Granularity) -> WindowRequest {
        self.granularity = granularity;
        self.request()
    }

    pub fn jump_to(&mut self, anchor: NaiveDate) -> WindowRequest {
        self.anchor = anchor;
        self.request()
    }

    /// Issue a fresh token for the window currently in view.
    pub fn request(&mut self) -> WindowRequest {
        self.latest += 1;
        WindowRequest {
            token: self.latest,
            granularity: self.granularity,
            anchor: self.anchor,
        }
    }

    /// Store `aggregate` if `token` is still the latest. Returns whether it
    /// was accepted.
    pub fn accept(&mut self, token: RequestToken, aggregate: WindowAggregate) -> bool {
        if token != self.latest {
            tracing::debug!(
                token,
                latest = self.latest,
                "Discarding stale forecast result"
            );
            return false;
        }
        self.current = Some(aggregate);
        true
    }

    pub fn apply(&mut self, command: NavCommand) -> Option<WindowRequest> {
        match command {
            NavCommand::Next => Some(self.next()),
            NavCommand::Previous => Some(self.previous()),
            NavCommand::View(g) => Some(self.switch_to(g)),
            NavCommand::Jump(d) => Some(self.jump_to(d)),
            NavCommand::Quit => None,
        }
    }
}

/// Parse a user-supplied anchor. Monthly views also accept `YYYY-MM`, which
/// means the first of that month.
pub fn parse_anchor(granularity: Granularity, input: &str) -> Result<NaiveDate> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date);
    }
    if granularity == Granularity::Monthly {
        return NaiveDate::parse_from_str(&format!("{}-01", input), "%Y-%m-%d")
            .with_context(|| format!("Invalid month '{}', expected YYYY-MM", input));
    }
    bail!("Invalid date '{}', expected YYYY-MM-DD", input)
}

/// Anchor for a view: the parsed `input` when given, otherwise today's date
/// according to `clock`.
pub fn default_anchor<C: Clock + ?Sized>(
    clock: &C,
    granularity: Granularity,
    input: Option<&str>,
) -> Result<NaiveDate> {
    match input {
        Some(input) => parse_anchor(granularity, input),
        None => Ok(clock.today()),
    }
}

/// One keystroke-style command of the interactive forecast loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    Next,
    Previous,
    View(Granularity),
    Jump(NaiveDate),
    Quit,
}

/// `n`, `p`, `d`, `w`, `m`, `q`, or `g YYYY-MM-DD`.
pub fn parse_command(input: &str) -> Option<NavCommand> {
    let mut parts = input.split_whitespace();
    let head = parts.next()?.to_ascii_lowercase();
    let command = match head.as_str() {
        "n" | "next" => NavCommand::Next,
        "p" | "prev" | "previous" => NavCommand::Previous,
        "d" | "daily" => NavCommand::View(Granularity::Daily),
        "w" | "weekly" => NavCommand::View(Granularity::Weekly),
        "m" | "monthly" => NavCommand::View(Granularity::Monthly),
        "q" | "quit" | "exit" => NavCommand::Quit,
        "g" | "goto" => {
            let date = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;
            NavCommand::Jump(date)
        }
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(command)
}
