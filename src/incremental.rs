//! Decides whether an artifact must be rendered or whether output left by a
//! previous build can be reused.
//!
//! Message pages are reused only when their file exists *and* the page is
//! full; a tail page may gain messages between builds so it is always
//! re-rendered. Day counters are reused whenever their file exists, subject
//! to the lookback rule implemented by [`DayCounterPass`].

use crate::paginate::Page;
use std::fmt;
use std::path::Path;

/// The outcome of a rebuild decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Render(Reason),
    Skip,
}

/// Why an artifact is rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    /// Incremental builds are off; everything is rendered.
    Full,

    /// No previous output exists for the artifact.
    Missing,

    /// The page holds `len` of `page_size` messages.
    NotFull { len: usize, page_size: usize },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reason::Full => write!(f, "incremental builds disabled"),
            Reason::Missing => write!(f, "file does not exist"),
            Reason::NotFull { len, page_size } => {
                write!(f, "page not full ({}/{} messages)", len, page_size)
            }
        }
    }
}

/// Returns the filename of the day counter for the day with slug `slug`.
pub fn day_counter_filename(slug: &str) -> String {
    format!("day-counter-{}.js", slug)
}

/// The rebuild policy for one build.
pub struct Policy<'a> {
    pub incremental: bool,
    pub page_size: usize,
    pub publish_dir: &'a Path,
}

impl Policy<'_> {
    /// Whether `filename` was left in the publish directory by an earlier
    /// build.
    pub fn exists(&self, filename: &str) -> bool {
        self.publish_dir.join(filename).exists()
    }

    /// Decides for a message page.
    pub fn page(&self, page: &Page) -> Decision {
        if !self.incremental {
            return Decision::Render(Reason::Full);
        }
        if !self.exists(&page.filename) {
            return Decision::Render(Reason::Missing);
        }
        match page.is_full(self.page_size) {
            true => Decision::Skip,
            false => Decision::Render(Reason::NotFull {
                len: page.messages.len(),
                page_size: self.page_size,
            }),
        }
    }

    /// Decides for a day counter whose output file existence is `exists`.
    pub fn day_counter(&self, exists: bool) -> Decision {
        match (self.incremental, exists) {
            (false, _) => Decision::Render(Reason::Full),
            (true, false) => Decision::Render(Reason::Missing),
            (true, true) => Decision::Skip,
        }
    }
}

/// Tracks one month's day-counter pass. A day counter also reflects the day
/// after it, so when a day is skipped it is held as the pending previous day;
/// the next day rendered because its output was missing flushes the pending
/// day so it is refreshed exactly once. If nothing at all was rendered the
/// month's last day is rendered by [`DayCounterPass::finish`] to keep the
/// month's boundary current.
#[derive(Debug)]
pub struct DayCounterPass<T> {
    incremental: bool,
    pending: Option<T>,
    last: Option<T>,
    rendered: bool,
}

impl<T: Clone> DayCounterPass<T> {
    pub fn new(incremental: bool) -> DayCounterPass<T> {
        DayCounterPass {
            incremental,
            pending: None,
            last: None,
            rendered: false,
        }
    }

    /// Visits the next day in iteration order given the policy's decision
    /// for it. Returns the days to render, in order.
    pub fn visit(&mut self, day: T, decision: Decision) -> Vec<T> {
        self.last = Some(day.clone());
        match decision {
            Decision::Skip => {
                self.pending = Some(day);
                Vec::new()
            }
            Decision::Render(reason) => {
                self.rendered = true;
                let mut days = vec![day];
                if reason == Reason::Missing {
                    if let Some(previous) = self.pending.take() {
                        days.push(previous);
                    }
                }
                days
            }
        }
    }

    /// Ends the pass, returning the day to force-render, if any.
    pub fn finish(self) -> Option<T> {
        match self.incremental && !self.rendered {
            true => self.last,
            false => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::test::message;

    fn policy(dir: &Path, incremental: bool) -> Policy<'_> {
        Policy {
            incremental,
            page_size: 10,
            publish_dir: dir,
        }
    }

    fn page(filename: &str, len: u64) -> Page {
        Page {
            number: 1,
            filename: filename.to_owned(),
            total_pages: 1,
            messages: (1..=len).map(|id| message(id, 2021, 1, 1)).collect(),
        }
    }

    #[test]
    fn test_page_decisions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.html"), "").unwrap();

        let full = policy(dir.path(), false);
        assert_eq!(
            Decision::Render(Reason::Full),
            full.page(&page("a.html", 10))
        );

        let incremental = policy(dir.path(), true);
        assert_eq!(Decision::Skip, incremental.page(&page("a.html", 10)));
        assert_eq!(
            Decision::Render(Reason::NotFull {
                len: 4,
                page_size: 10
            }),
            incremental.page(&page("a.html", 4))
        );
        assert_eq!(
            Decision::Render(Reason::Missing),
            incremental.page(&page("b.html", 10))
        );
    }

    #[test]
    fn test_day_counter_decisions() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            Decision::Render(Reason::Full),
            policy(dir.path(), false).day_counter(true)
        );
        assert_eq!(Decision::Skip, policy(dir.path(), true).day_counter(true));
        assert_eq!(
            Decision::Render(Reason::Missing),
            policy(dir.path(), true).day_counter(false)
        );
    }

    #[test]
    fn test_day_counter_filename() {
        assert_eq!("day-counter-2021-01-02.js", day_counter_filename("2021-01-02"));
    }

    #[test]
    fn test_pass_full_build_renders_each_day_once() {
        let mut pass = DayCounterPass::new(false);
        let mut rendered = Vec::new();
        for day in 0..3 {
            rendered.extend(pass.visit(day, Decision::Render(Reason::Full)));
        }
        assert_eq!(vec![0, 1, 2], rendered);
        assert_eq!(None, pass.finish());
    }

    #[test]
    fn test_pass_new_day_refreshes_previous_once() {
        let mut pass = DayCounterPass::new(true);
        let mut rendered = Vec::new();
        rendered.extend(pass.visit(0, Decision::Skip));
        rendered.extend(pass.visit(1, Decision::Skip));
        rendered.extend(pass.visit(2, Decision::Render(Reason::Missing)));
        rendered.extend(pass.visit(3, Decision::Render(Reason::Missing)));
        assert_eq!(vec![2, 1, 3], rendered);
        assert_eq!(None, pass.finish());
    }

    #[test]
    fn test_pass_materialized_month_renders_last_day() {
        let mut pass = DayCounterPass::new(true);
        for day in 0..3 {
            assert!(pass.visit(day, Decision::Skip).is_empty());
        }
        assert_eq!(Some(2), pass.finish());
    }

    #[test]
    fn test_pass_empty_month() {
        let pass: DayCounterPass<usize> = DayCounterPass::new(true);
        assert_eq!(None, pass.finish());
    }
}
