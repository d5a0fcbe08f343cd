//! Maps every rendered message to the page it was rendered on, so a reply can
//! link to its parent wherever the parent landed.

use std::collections::HashMap;

/// Message id to output filename. Scoped to a single build; entries are
/// never removed.
#[derive(Debug, Default)]
pub struct ReplyIndex {
    pages: HashMap<u64, String>,
}

impl ReplyIndex {
    pub fn new() -> ReplyIndex {
        ReplyIndex::default()
    }

    /// Records that `message_id` is rendered on `filename`. The last write
    /// wins.
    pub fn record(&mut self, message_id: u64, filename: &str) {
        if let Some(previous) = self.pages.insert(message_id, filename.to_owned()) {
            if previous != filename {
                log::warn!(
                    "Message {} moved from {} to {}",
                    message_id,
                    previous,
                    filename
                );
            }
        }
    }

    pub fn lookup(&self, message_id: u64) -> Option<&str> {
        self.pages.get(&message_id).map(String::as_str)
    }

    /// Returns the href for a link from `current_filename` to `target_id`:
    /// a same-document anchor when the target is on the current page, a
    /// cross-document link otherwise, and `None` if the target was never
    /// rendered.
    pub fn link(&self, target_id: u64, current_filename: &str) -> Option<String> {
        self.lookup(target_id).map(|filename| match filename == current_filename {
            true => format!("#{}", target_id),
            false => format!("{}#{}", filename, target_id),
        })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
