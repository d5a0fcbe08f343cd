//! Walks a month's messages page by page. Page boundaries are a function of
//! each message's ascending rank within the month, so page `k` holds the
//! same messages whichever [`Direction`] the month is traversed in; only the
//! order in which pages are produced differs. The partial tail page is always
//! the highest-numbered page.

use crate::archive::{self, Archive, Direction, Message, Month};

/// The starting cursor for descending traversal. The cursor is inclusive, so
/// no id is above it.
pub const ID_CEILING: u64 = u64::MAX;

/// Returns the output filename for page `page` of the month with slug `slug`:
/// `{slug}.html` for the first page and `{slug}_{page}.html` after that.
pub fn make_filename(slug: &str, page: usize) -> String {
    match page > 1 {
        false => format!("{}.html", slug),
        true => format!("{}_{}.html", slug, page),
    }
}

/// The number of pages needed to hold `total` messages, `page_size` per page.
pub fn total_pages(total: usize, page_size: usize) -> usize {
    match total % page_size {
        0 => total / page_size,
        _ => total / page_size + 1,
    }
}

/// A batch of messages destined for a single output file.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    /// The 1-based page number in rendering order.
    pub number: usize,
    pub filename: String,
    pub total_pages: usize,

    /// The page's messages in traversal order.
    pub messages: Vec<Message>,
}

impl Page {
    /// A page is full when it holds exactly `page_size` messages. Anything
    /// smaller is a tail page whose content may still grow.
    pub fn is_full(&self, page_size: usize) -> bool {
        self.messages.len() == page_size
    }
}

/// A lazy iterator over the [`Page`]s of one month. Each call to
/// [`Iterator::next`] pulls a single batch from the [`Archive`]; an empty
/// batch ends the iteration.
pub struct Pages<'a, A: ?Sized> {
    archive: &'a A,
    month: &'a Month,
    direction: Direction,
    page_size: usize,
    total: usize,
    total_pages: usize,

    /// The inclusive id bound for the next batch. `None` once exhausted.
    cursor: Option<u64>,

    /// The number of the next page to be produced.
    next_page: usize,
}

impl<'a, A: Archive + ?Sized> Pages<'a, A> {
    pub fn new(
        archive: &'a A,
        month: &'a Month,
        direction: Direction,
        page_size: usize,
    ) -> archive::Result<Pages<'a, A>> {
        let total = archive.get_message_count(month.year, month.month)?;
        let total_pages = total_pages(total, page_size);
        Ok(Pages {
            archive,
            month,
            direction,
            page_size,
            total,
            total_pages,
            cursor: Some(match direction {
                Direction::OldestFirst => 0,
                Direction::NewestFirst => ID_CEILING,
            }),
            next_page: match direction {
                Direction::OldestFirst => 1,
                Direction::NewestFirst => total_pages,
            },
        })
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// The number of messages page `number` holds.
    fn batch_size(&self, number: usize) -> usize {
        match self.direction {
            Direction::OldestFirst => self.page_size,
            Direction::NewestFirst => {
                let before = (number - 1) * self.page_size;
                self.page_size.min(self.total.saturating_sub(before)).max(1)
            }
        }
    }

    fn fetch(&mut self, cursor: u64, number: usize) -> archive::Result<Option<Page>> {
        let messages = self.archive.get_messages(
            self.month.year,
            self.month.month,
            self.direction,
            cursor,
            self.batch_size(number),
        )?;
        let last_id = match messages.last() {
            None => return Ok(None),
            Some(last) => last.id,
        };

        self.cursor = match self.direction {
            Direction::OldestFirst => last_id.checked_add(1),
            Direction::NewestFirst => last_id.checked_sub(1),
        };
        self.next_page = match self.direction {
            Direction::OldestFirst => number + 1,
            Direction::NewestFirst => number - 1,
        };

        Ok(Some(Page {
            number,
            filename: make_filename(&self.month.slug, number),
            total_pages: self.total_pages.max(number),
            messages,
        }))
    }
}

impl<A: Archive + ?Sized> Iterator for Pages<'_, A> {
    type Item = archive::Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor?;
        let number = self.next_page;
        if number == 0 {
            self.cursor = None;
            return None;
        }
        match self.fetch(cursor, number) {
            Ok(Some(page)) => Some(Ok(page)),
            Ok(None) => {
                self.cursor = None;
                None
            }
            Err(err) => {
                self.cursor = None;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::test::message;
    use crate::archive::MemoryArchive;
    use std::collections::BTreeMap;

    fn archive(n: u64) -> MemoryArchive {
        MemoryArchive::new(
            (1..=n)
                .map(|id| message(id, 2021, 5, 1 + (id as u32 % 28)))
                .collect(),
        )
    }

    fn month(archive: &MemoryArchive) -> Month {
        archive.get_timeline(Direction::OldestFirst).unwrap().remove(0)
    }

    fn collect(archive: &MemoryArchive, direction: Direction, page_size: usize) -> Vec<Page> {
        let month = month(archive);
        Pages::new(archive, &month, direction, page_size)
            .unwrap()
            .collect::<archive::Result<Vec<Page>>>()
            .unwrap()
    }

    fn membership(pages: &[Page]) -> BTreeMap<String, Vec<u64>> {
        pages
            .iter()
            .map(|p| {
                let mut ids: Vec<u64> = p.messages.iter().map(|m| m.id).collect();
                ids.sort_unstable();
                (p.filename.clone(), ids)
            })
            .collect()
    }

    #[test]
    fn test_make_filename() {
        assert_eq!("2021-05.html", make_filename("2021-05", 1));
        assert_eq!("2021-05_2.html", make_filename("2021-05", 2));
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(0, total_pages(0, 10));
        assert_eq!(2, total_pages(20, 10));
        assert_eq!(3, total_pages(25, 10));
    }

    #[test]
    fn test_oldest_first() {
        let pages = collect(&archive(25), Direction::OldestFirst, 10);
        let shape: Vec<(usize, &str, usize)> = pages
            .iter()
            .map(|p| (p.number, p.filename.as_str(), p.messages.len()))
            .collect();
        assert_eq!(
            vec![
                (1, "2021-05.html", 10),
                (2, "2021-05_2.html", 10),
                (3, "2021-05_3.html", 5),
            ],
            shape
        );
        assert!(pages.iter().all(|p| p.total_pages == 3));
        assert_eq!(21, pages[2].messages[0].id);
    }

    #[test]
    fn test_newest_first() {
        let pages = collect(&archive(25), Direction::NewestFirst, 10);
        let shape: Vec<(usize, usize)> = pages
            .iter()
            .map(|p| (p.number, p.messages.len()))
            .collect();
        assert_eq!(vec![(3, 5), (2, 10), (1, 10)], shape);
        assert_eq!(25, pages[0].messages[0].id);
        assert!(!pages[0].is_full(10));
        assert!(pages[1].is_full(10));
    }

    #[test]
    fn test_directions_agree_on_membership() {
        for &(n, page_size) in &[(25, 10), (20, 10), (1, 10), (7, 1), (9, 4)] {
            let archive = archive(n);
            let oldest = collect(&archive, Direction::OldestFirst, page_size);
            let newest = collect(&archive, Direction::NewestFirst, page_size);
            assert_eq!(
                membership(&oldest),
                membership(&newest),
                "n={} p={}",
                n,
                page_size
            );
            assert_eq!(total_pages(n as usize, page_size), oldest.len());
        }
    }

    #[test]
    fn test_largest_ids_are_paginated() {
        let archive = MemoryArchive::new(vec![
            message(1, 2021, 5, 2),
            message(2, 2021, 5, 2),
            message(u64::MAX, 2021, 5, 2),
        ]);
        for &direction in &[Direction::OldestFirst, Direction::NewestFirst] {
            let pages = collect(&archive, direction, 2);
            let ids = membership(&pages);
            assert_eq!(Some(&vec![1, 2]), ids.get("2021-05.html"));
            assert_eq!(Some(&vec![u64::MAX]), ids.get("2021-05_2.html"));
        }
    }

    #[test]
    fn test_empty_month_has_no_pages() {
        let archive = archive(3);
        let empty = Month {
            year: 2021,
            month: 6,
            slug: "2021-06".to_owned(),
            label: "June 2021".to_owned(),
            count: 0,
        };
        for &direction in &[Direction::OldestFirst, Direction::NewestFirst] {
            let mut pages = Pages::new(&archive, &empty, direction, 10).unwrap();
            assert_eq!(0, pages.total_pages());
            assert!(pages.next().is_none());
        }
    }
}
