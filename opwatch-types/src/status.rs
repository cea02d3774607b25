//! Health states and the "worst wins" rules for combining them.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Separator placed between reasons in a summary.
pub const REASON_SEPARATOR: &str = ", ";

/// Upper bound (in bytes) on a combined reason summary.
pub const MAX_REASON_SUMMARY_LEN: usize = 1024;

/// Health of a monitored thing.
///
/// Variants are declared best to worst, so the derived `Ord` is the
/// aggregation order and the worst member of a set is its maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MonitorStatus {
    /// Everything checks out.
    #[default]
    Good,
    /// Nothing is known yet (no data, or data that can't be judged).
    Unknown,
    /// Deliberately out of rotation.
    Maintenance,
    /// Degraded but serving.
    Warning,
    /// Down or failing.
    Critical,
}

impl MonitorStatus {
    /// Short label for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            MonitorStatus::Good => "OK",
            MonitorStatus::Unknown => "UNKNOWN",
            MonitorStatus::Maintenance => "MAINT",
            MonitorStatus::Warning => "WARN",
            MonitorStatus::Critical => "CRIT",
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self, MonitorStatus::Good)
    }

    /// Map the health strings backends commonly report onto a status.
    ///
    /// Matching is case-insensitive; anything unrecognised is `Unknown`.
    pub fn from_str_lossy(s: &str) -> Self {
        let s = s.trim();
        let is = |candidates: &[&str]| candidates.iter().any(|c| s.eq_ignore_ascii_case(c));

        if is(&["ok", "good", "up", "healthy", "green", "pass", "passing", "online", "open"]) {
            MonitorStatus::Good
        } else if is(&["warn", "warning", "degraded", "yellow", "partial"]) {
            MonitorStatus::Warning
        } else if is(&[
            "crit", "critical", "down", "fail", "failing", "unhealthy", "red", "error", "offline",
        ]) {
            MonitorStatus::Critical
        } else if is(&["maint", "maintenance", "drain", "draining", "disabled"]) {
            MonitorStatus::Maintenance
        } else {
            MonitorStatus::Unknown
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Anything that can report its own health.
pub trait Monitored {
    fn monitor_status(&self) -> MonitorStatus;

    /// Human-readable explanation, usually only present when not `Good`.
    fn monitor_status_reason(&self) -> Option<String> {
        None
    }
}

/// One status with its optional explanation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusContribution {
    pub status: MonitorStatus,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub reason: Option<String>,
}

impl StatusContribution {
    pub fn new(status: MonitorStatus) -> Self {
        Self {
            status,
            reason: None,
        }
    }

    pub fn with_reason(status: MonitorStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
        }
    }

    pub fn good() -> Self {
        Self::new(MonitorStatus::Good)
    }

    /// Snapshot the status and reason of any monitored item.
    pub fn of<M: Monitored + ?Sized>(item: &M) -> Self {
        Self {
            status: item.monitor_status(),
            reason: item.monitor_status_reason(),
        }
    }
}

impl Monitored for StatusContribution {
    fn monitor_status(&self) -> MonitorStatus {
        self.status
    }

    fn monitor_status_reason(&self) -> Option<String> {
        self.reason.clone()
    }
}

/// The worst status in a collection; `Good` when it is empty.
///
/// The result does not depend on input order.
pub fn worst<I>(statuses: I) -> MonitorStatus
where
    I: IntoIterator<Item = MonitorStatus>,
{
    let mut worst = MonitorStatus::Good;
    for status in statuses {
        if status == MonitorStatus::Critical {
            return status;
        }
        worst = worst.max(status);
    }
    worst
}

/// The worst status over a collection of monitored items.
pub fn worst_of<'a, M, I>(items: I) -> MonitorStatus
where
    M: Monitored + ?Sized + 'a,
    I: IntoIterator<Item = &'a M>,
{
    worst(items.into_iter().map(|m| m.monitor_status()))
}

/// Combine the reasons of every non-`Good` contribution.
///
/// Reasons keep their input order, identical texts appear once, and the
/// result is capped at [`MAX_REASON_SUMMARY_LEN`] bytes with trailing
/// separators trimmed. Returns `None` when there is nothing to say.
pub fn reason_summary<'a, I>(contributions: I) -> Option<String>
where
    I: IntoIterator<Item = &'a StatusContribution>,
{
    let mut seen: Vec<&str> = Vec::new();
    for c in contributions {
        if c.status.is_good() {
            continue;
        }
        let Some(reason) = c.reason.as_deref().map(str::trim) else {
            continue;
        };
        if !reason.is_empty() && !seen.contains(&reason) {
            seen.push(reason);
        }
    }

    if seen.is_empty() {
        return None;
    }

    let mut summary = seen.join(REASON_SEPARATOR);
    if summary.len() > MAX_REASON_SUMMARY_LEN {
        let mut cut = MAX_REASON_SUMMARY_LEN;
        while !summary.is_char_boundary(cut) {
            cut -= 1;
        }
        summary.truncate(cut);
    }

    let trimmed_len = summary.trim_end_matches([',', ' ']).len();
    summary.truncate(trimmed_len);
    Some(summary)
}

/// [`reason_summary`] over monitored items.
pub fn reason_summary_of<'a, M, I>(items: I) -> Option<String>
where
    M: Monitored + ?Sized + 'a,
    I: IntoIterator<Item = &'a M>,
{
    let contributions: Vec<StatusContribution> =
        items.into_iter().map(StatusContribution::of).collect();
    reason_summary(&contributions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    use MonitorStatus::*;

    const ALL: [MonitorStatus; 5] = [Good, Unknown, Maintenance, Warning, Critical];

    #[test]
    fn worst_of_empty_is_good() {
        assert_eq!(worst(Vec::new()), Good);
    }

    #[test]
    fn critical_always_wins() {
        for other in ALL {
            assert_eq!(worst([other, Critical, Good]), Critical);
            assert_eq!(worst([Critical, other]), Critical);
        }
    }

    #[test]
    fn aggregation_order() {
        assert_eq!(worst([Good, Warning, Maintenance, Unknown]), Warning);
        assert_eq!(worst([Good, Maintenance, Unknown]), Maintenance);
        assert_eq!(worst([Good, Unknown, Good]), Unknown);
        assert_eq!(worst([Good, Good]), Good);
    }

    #[test]
    fn order_of_input_does_not_matter() {
        let mut values = vec![Unknown, Good, Maintenance, Warning, Good];
        let expected = worst(values.clone());
        for _ in 0..values.len() {
            values.rotate_left(1);
            assert_eq!(worst(values.clone()), expected);
        }
        values.reverse();
        assert_eq!(worst(values), expected);
    }

    #[test]
    fn worst_matches_max() {
        for a in ALL {
            for b in ALL {
                assert_eq!(worst([a, b]), a.max(b));
            }
        }
    }

    #[test]
    fn reason_summary_skips_good_and_dedupes() {
        let items = vec![
            StatusContribution::with_reason(Warning, "replication lag"),
            StatusContribution::with_reason(Good, "all fine"),
            StatusContribution::with_reason(Critical, "disk full"),
            StatusContribution::with_reason(Warning, "replication lag"),
            StatusContribution::new(Unknown),
        ];

        assert_eq!(
            reason_summary(&items).as_deref(),
            Some("replication lag, disk full")
        );
    }

    #[test]
    fn reason_summary_none_when_all_good() {
        let items = vec![
            StatusContribution::with_reason(Good, "ok"),
            StatusContribution::good(),
        ];
        assert_eq!(reason_summary(&items), None);
    }

    #[test]
    fn reason_summary_is_bounded_and_trimmed() {
        let long = "x".repeat(MAX_REASON_SUMMARY_LEN - 1);
        let items = vec![
            StatusContribution::with_reason(Warning, long.clone()),
            StatusContribution::with_reason(Warning, "second"),
        ];

        let summary = reason_summary(&items).unwrap();
        assert!(summary.len() <= MAX_REASON_SUMMARY_LEN);
        assert!(!summary.ends_with(','));
        assert!(!summary.ends_with(' '));
        assert_eq!(summary, long);
    }

    #[test]
    fn reason_summary_of_monitored_items() {
        let items = vec![
            StatusContribution::with_reason(Critical, "node-a down"),
            StatusContribution::with_reason(Warning, "node-b slow"),
        ];
        assert_eq!(worst_of(&items), Critical);
        assert_eq!(
            reason_summary_of(&items),
            Some("node-a down, node-b slow".to_string())
        );
    }

    #[test]
    fn lossy_parsing() {
        assert_eq!(MonitorStatus::from_str_lossy("UP"), Good);
        assert_eq!(MonitorStatus::from_str_lossy(" degraded "), Warning);
        assert_eq!(MonitorStatus::from_str_lossy("down"), Critical);
        assert_eq!(MonitorStatus::from_str_lossy("drain"), Maintenance);
        assert_eq!(MonitorStatus::from_str_lossy("???"), Unknown);
    }
}
