use std::fmt;

/// Progress of a batch run. Only the orchestrator builds new values; the
/// percentage is always derived from the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunState {
    active: bool,
    current_index: usize,
    total_count: usize,
    percent_complete: u8,
}

impl RunState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub(crate) fn started(total_count: usize) -> Self {
        Self {
            active: true,
            current_index: 0,
            total_count,
            percent_complete: 0,
        }
    }

    /// Chapter `current_index` (1-based) of `total_count` is in progress.
    pub(crate) fn working_on(current_index: usize, total_count: usize) -> Self {
        let done = current_index.saturating_sub(1) as f64;
        let percent = if total_count == 0 {
            0.0
        } else {
            (100.0 * done / total_count as f64).round()
        };
        Self {
            active: true,
            current_index,
            total_count,
            percent_complete: percent as u8,
        }
    }

    pub(crate) fn finished(total_count: usize) -> Self {
        Self {
            active: false,
            current_index: total_count,
            total_count,
            percent_complete: 100,
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn percent_complete(&self) -> u8 {
        self.percent_complete
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.active {
            write!(
                f,
                "Downloading chapter {}/{} ({}%)",
                self.current_index, self.total_count, self.percent_complete
            )
        } else {
            write!(f, "Idle ({}%)", self.percent_complete)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RunState;

    #[test]
    fn percent_reflects_chapters_before_current() {
        let percents: Vec<u8> = (1..=3)
            .map(|i| RunState::working_on(i, 3).percent_complete())
            .collect();
        assert_eq!(percents, [0, 33, 67]);
        assert_eq!(RunState::working_on(2, 8).percent_complete(), 13);
    }

    #[test]
    fn percent_never_decreases() {
        let total = 7;
        let mut last = RunState::started(total).percent_complete();
        for i in 1..=total {
            let p = RunState::working_on(i, total).percent_complete();
            assert!(p >= last);
            last = p;
        }
        assert!(RunState::finished(total).percent_complete() >= last);
    }

    #[test]
    fn finished_state() {
        let state = RunState::finished(3);
        assert!(!state.active());
        assert_eq!(state.current_index(), 3);
        assert_eq!(state.total_count(), 3);
        assert_eq!(state.percent_complete(), 100);
        assert_eq!(state.to_string(), "Idle (100%)");
        assert_eq!(
            RunState::working_on(2, 3).to_string(),
            "Downloading chapter 2/3 (33%)"
        );
    }
}
