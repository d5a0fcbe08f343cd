//! Shared fixtures for build integration tests
#![allow(dead_code)]

use annals::archive::{MemoryArchive, Message, User};
use annals::config::Config;
use annals::render::{self, AbstractContext, DayCounterContext, PageContext, Render};
use chrono::{Duration, TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builds a message with id `id` in May 2021, five messages per day.
pub fn message(id: u64) -> Message {
    let day = 1 + ((id - 1) / 5) as u32;
    Message {
        id,
        date: Utc
            .with_ymd_and_hms(2021, 5, day, 12, 0, 0)
            .single()
            .unwrap()
            + Duration::seconds(id as i64),
        user: User {
            id: 1,
            username: "alice".to_owned(),
            first_name: "Alice".to_owned(),
            last_name: None,
        },
        content: format!("message {}", id),
        reply_to: if id > 1 { Some(id - 1) } else { None },
        media: None,
    }
}

pub fn archive(n: u64) -> MemoryArchive {
    MemoryArchive::new((1..=n).map(message).collect())
}

/// A scratch project directory with a `static/` tree.
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("static")).expect("Failed to create static dir");
        fs::write(
            dir.path().join("static/style.css"),
            "body {\n    color: black;\n}\n\n/* theme */\n",
        )
        .expect("Failed to write style.css");
        Project { dir }
    }

    /// Loads a config rooted at the project with `extra` YAML appended.
    pub fn config(&self, extra: &str) -> Config {
        let yaml = format!("publish_dir: site\nper_page: 10\ndebug_mode: true\n{}", extra);
        Config::from_yaml(&yaml, self.dir.path()).expect("Failed to load config")
    }

    pub fn site(&self) -> PathBuf {
        self.dir.path().join("site")
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.site().join(name)).expect("Failed to read output file")
    }

    /// The sorted names of the message pages written to the site.
    pub fn pages(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.site())
            .expect("Failed to read site dir")
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("2021-") && name.ends_with(".html"))
            .collect();
        names.sort();
        names
    }
}

/// Renders pages as their sorted message ids and checks, while rendering,
/// that every message on the page is recorded against the page's filename.
pub struct Fixture;

impl Render for Fixture {
    fn render_page(&self, ctx: &PageContext) -> render::Result<String> {
        for m in &ctx.page.messages {
            assert_eq!(Some(ctx.page.filename.as_str()), ctx.replies.lookup(m.id));
        }
        let mut ids: Vec<u64> = ctx.page.messages.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        Ok(ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(","))
    }

    fn render_day_counter(&self, ctx: &DayCounterContext) -> render::Result<String> {
        Ok(format!(
            "{}:{}:{}",
            ctx.day.slug,
            ctx.day.count,
            ctx.next.map(|d| d.slug.as_str()).unwrap_or("-")
        ))
    }

    fn render_abstract(&self, _: &AbstractContext) -> render::Result<Option<String>> {
        Ok(None)
    }
}

pub fn exists(dir: &Path, name: &str) -> bool {
    dir.join(name).exists()
}
