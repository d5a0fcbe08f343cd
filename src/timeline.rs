//! Groups the archive's months by year, keeping the order in which the
//! [`crate::archive::Archive`] returned them. Templates use this to render the
//! year/month navigation on every page.

use crate::archive::Month;

/// The months of a single year in traversal order.
#[derive(Clone, Debug, PartialEq)]
pub struct Year {
    pub year: i32,
    pub months: Vec<Month>,
}

/// Months grouped by year. Years appear in the order their first month was
/// encountered.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Timeline {
    years: Vec<Year>,
}

impl Timeline {
    pub fn new(months: &[Month]) -> Timeline {
        let mut timeline = Timeline::default();
        for month in months {
            timeline.push(month.clone());
        }
        timeline
    }

    fn push(&mut self, month: Month) {
        match self.years.iter_mut().find(|y| y.year == month.year) {
            Some(year) => year.months.push(month),
            None => self.years.push(Year {
                year: month.year,
                months: vec![month],
            }),
        }
    }

    pub fn years(&self) -> &[Year] {
        &self.years
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}
