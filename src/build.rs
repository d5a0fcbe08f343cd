//! Exports [`Builder`], which stitches together the high-level steps of
//! building the site: preparing the publish directory, walking every month to
//! render day counters ([`crate::incremental`]) and message pages
//! ([`crate::paginate`]), designating the index page, emitting the feeds
//! ([`crate::feed`]), and minifying static assets ([`crate::minify`]).
//!
//! A build moves through these stages strictly in order:
//!
//! ```text
//! Preparing → PerMonthLoop{DayPass, PagePass} → Finalizing → FeedEmission
//!           → StaticOptimization → Done
//! ```
//!
//! All state accumulated along the way (the [`ReplyIndex`], the
//! [`FeedWindow`], the timeline) lives in a [`BuildState`] owned by a single
//! call to [`Builder::build`] and is dropped when it returns.

use crate::archive::{self, Archive, Day, Direction, Month};
use crate::config::Config;
use crate::feed::{self, FeedWindow};
use crate::incremental::{day_counter_filename, DayCounterPass, Decision, Policy};
use crate::minify;
use crate::paginate::{Page, Pages};
use crate::publish::{self, Placement};
use crate::render::{self, DayCounterContext, PageContext, Render};
use crate::replies::ReplyIndex;
use crate::timeline::Timeline;
use chrono::Utc;
use log::{debug, info};
use std::fmt;
use std::path::PathBuf;

/// What a build did.
#[derive(Debug)]
pub enum Outcome {
    /// The archive held no messages; nothing was written.
    Empty,
    Built(Summary),
}

/// Counters describing a completed build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    pub pages_rendered: usize,
    pub pages_skipped: usize,
    pub day_counters_rendered: usize,
    pub day_counters_skipped: usize,
    pub feed_entries: usize,

    /// The page `index.html` designates.
    pub index: Option<String>,
}

/// The stages of a build, logged as they are entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Preparing,
    PerMonthLoop,
    Finalizing,
    FeedEmission,
    StaticOptimization,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The chronologically last page seen so far, keyed by
/// `(year, month, page number)`.
type Latest = ((i32, u32, usize), String);

/// Build-scoped mutable state.
pub struct BuildState {
    pub replies: ReplyIndex,
    pub feed: FeedWindow,
    latest: Option<Latest>,
    summary: Summary,
}

impl BuildState {
    fn new(feed_capacity: usize) -> BuildState {
        BuildState {
            replies: ReplyIndex::new(),
            feed: FeedWindow::new(feed_capacity),
            latest: None,
            summary: Summary::default(),
        }
    }

    fn note_page(&mut self, month: &Month, page: &Page) {
        let key = (month.year, month.month, page.number);
        let later = match &self.latest {
            Some((latest, _)) => key > *latest,
            None => true,
        };
        if later {
            self.latest = Some((key, page.filename.clone()));
        }
    }
}

/// Builds a site from an [`Archive`] into the configured publish directory.
pub struct Builder<'a, A: ?Sized> {
    pub config: &'a Config,
    pub archive: &'a A,
    pub renderer: &'a dyn Render,

    /// Exposed to page templates as `config.build_timestamp`.
    pub build_timestamp: i64,
}

impl<'a, A: Archive + ?Sized> Builder<'a, A> {
    pub fn new(config: &'a Config, archive: &'a A, renderer: &'a dyn Render) -> Builder<'a, A> {
        Builder {
            config,
            archive,
            renderer,
            build_timestamp: Utc::now().timestamp(),
        }
    }

    fn direction(&self) -> Direction {
        Direction::from_new_on_top(self.config.new_on_top)
    }

    fn policy(&self) -> Policy<'_> {
        Policy {
            incremental: self.config.incremental_builds,
            page_size: self.config.per_page,
            publish_dir: &self.config.publish_dir,
        }
    }

    /// Runs a complete build.
    pub fn build(&self) -> Result<Outcome> {
        let months = self.archive.get_timeline(self.direction())?;
        if months.is_empty() {
            info!("No data found to publish site.");
            return Ok(Outcome::Empty);
        }

        self.enter(Stage::Preparing);
        self.prepare()?;

        info!("Start building.");
        self.enter(Stage::PerMonthLoop);
        let timeline = Timeline::new(&months);
        let mut state = BuildState::new(self.config.rss_feed_entries);
        for month in &months {
            let dayline = self.archive.get_dayline(
                month.year,
                month.month,
                self.direction(),
                self.config.per_page,
            )?;
            self.day_pass(month, &dayline, &mut state)?;
            self.page_pass(month, &dayline, &timeline, &mut state)?;
        }

        self.enter(Stage::Finalizing);
        if let Some((_, filename)) = &state.latest {
            let linked = publish::designate_index(
                &self.config.publish_dir,
                filename,
                self.config.symlink,
            )?;
            info!(
                "{} {} as {}",
                if linked { "Linked" } else { "Copied" },
                filename,
                publish::INDEX_FILE_NAME
            );
            state.summary.index = Some(filename.clone());
        }

        self.enter(Stage::FeedEmission);
        if self.config.publish_rss_feed {
            let feeds = feed::write_feeds(
                self.config,
                &state.feed,
                &state.replies,
                self.renderer,
            )?;
            info!("Wrote {} feed entries", feeds.entries);
            state.summary.feed_entries = feeds.entries;
        }

        self.enter(Stage::StaticOptimization);
        self.optimize_static();

        self.enter(Stage::Done);
        Ok(Outcome::Built(state.summary))
    }

    fn enter(&self, stage: Stage) {
        debug!("Build stage: {}", stage);
    }

    /// Clears the publish directory unless building incrementally, then makes
    /// sure the static and media trees are in place.
    fn prepare(&self) -> Result<()> {
        let publish_dir = &self.config.publish_dir;
        info!("Incremental builds setting: {}", self.config.incremental_builds);
        if !self.config.incremental_builds {
            publish::clear_dir(publish_dir)?.log();
        }
        std::fs::create_dir_all(publish_dir).map_err(|err| Error::Io {
            path: publish_dir.clone(),
            err,
        })?;

        match publish::place_dir(&self.config.static_dir, publish_dir, self.config.symlink) {
            Placement::Failed { target: _, err } => return Err(Error::Publish(err)),
            placement => placement.log("static assets"),
        }
        // media is best-effort; a partial media tree doesn't fail the build
        publish::place_dir(&self.config.media_dir, publish_dir, self.config.symlink).log("media");
        Ok(())
    }

    fn day_pass(&self, month: &Month, dayline: &[Day], state: &mut BuildState) -> Result<()> {
        let policy = self.policy();
        let mut pass = DayCounterPass::new(self.config.incremental_builds);
        for (i, day) in dayline.iter().enumerate() {
            let filename = day_counter_filename(&day.slug);
            let decision = policy.day_counter(policy.exists(&filename));
            if decision == Decision::Skip {
                info!("Incremental builds: file {} exists. Skip rendering.", filename);
                state.summary.day_counters_skipped += 1;
            }
            for j in pass.visit(i, decision) {
                self.render_day_counter(month, dayline, j)?;
                state.summary.day_counters_rendered += 1;
            }
        }
        if let Some(last) = pass.finish() {
            self.render_day_counter(month, dayline, last)?;
            state.summary.day_counters_rendered += 1;
        }
        Ok(())
    }

    fn render_day_counter(&self, month: &Month, dayline: &[Day], i: usize) -> Result<()> {
        let day = &dayline[i];
        let filename = day_counter_filename(&day.slug);
        info!("Rendering: {}", filename);
        let js = self.renderer.render_day_counter(&DayCounterContext {
            config: self.config,
            month,
            day,
            next: dayline.get(i + 1),
        })?;
        self.write(&filename, &js)
    }

    fn page_pass(
        &self,
        month: &Month,
        dayline: &[Day],
        timeline: &Timeline,
        state: &mut BuildState,
    ) -> Result<()> {
        let policy = self.policy();
        let pages = Pages::new(self.archive, month, self.direction(), self.config.per_page)?;
        for page in pages {
            let page = page?;
            for m in &page.messages {
                state.replies.record(m.id, &page.filename);
            }
            // feed freshness doesn't depend on whether the page is rendered
            if self.config.publish_rss_feed {
                for m in &page.messages {
                    state.feed.push(m.clone());
                }
            }
            state.note_page(month, &page);

            match policy.page(&page) {
                Decision::Skip => {
                    info!(
                        "Incremental builds: file {} exists. Skip rendering.",
                        page.filename
                    );
                    state.summary.pages_skipped += 1;
                }
                Decision::Render(reason) => {
                    if self.config.incremental_builds {
                        info!("Rendering {}: {}", page.filename, reason);
                    }
                    self.render_page(month, dayline, timeline, &page, &state.replies)?;
                    state.summary.pages_rendered += 1;
                }
            }
        }
        Ok(())
    }

    fn render_page(
        &self,
        month: &Month,
        dayline: &[Day],
        timeline: &Timeline,
        page: &Page,
        replies: &ReplyIndex,
    ) -> Result<()> {
        info!("Rendering: {}", page.filename);
        let html = self.renderer.render_page(&PageContext {
            config: self.config,
            build_timestamp: self.build_timestamp,
            timeline,
            dayline,
            month,
            page,
            replies,
        })?;
        match self.config.debug_mode {
            true => self.write(&page.filename, &html),
            false => self.write(&page.filename, &minify::html(&html)),
        }
    }

    fn write(&self, filename: &str, contents: &str) -> Result<()> {
        let path = self.config.publish_dir.join(filename);
        std::fs::write(&path, contents).map_err(|err| Error::Io { path, err })
    }

    /// Minifies the published stylesheet and script. Never fails the build.
    fn optimize_static(&self) {
        if self.config.debug_mode {
            info!("Debug mode: skipping static file optimization");
            return;
        }
        let static_target = self.config.publish_dir.join(self.config.static_dir_name());
        if publish::is_symlink(&static_target) {
            info!(
                "{} is a link to the source tree; skipping static file optimization",
                static_target.display()
            );
            return;
        }
        for outcome in minify::static_assets(&static_target) {
            outcome.log();
        }
    }
}

/// The result of a fallible build operation.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Errors can come from the archive,
/// templating, feed emission, publishing, and other I/O.
#[derive(Debug)]
pub enum Error {
    /// Returned for errors reading the archive.
    Archive(archive::Error),

    /// Returned for errors rendering pages or day counters.
    Render(render::Error),

    /// Returned for errors writing the feeds.
    Feed(feed::Error),

    /// Returned for errors preparing the publish directory or designating
    /// the index page.
    Publish(publish::Error),

    /// Returned for I/O problems writing output files.
    Io { path: PathBuf, err: std::io::Error },
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Archive(err) => err.fmt(f),
            Error::Render(err) => err.fmt(f),
            Error::Feed(err) => err.fmt(f),
            Error::Publish(err) => err.fmt(f),
            Error::Io { path, err } => {
                write!(f, "Writing '{}': {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Archive(err) => Some(err),
            Error::Render(err) => Some(err),
            Error::Feed(err) => Some(err),
            Error::Publish(err) => Some(err),
            Error::Io { path: _, err } => Some(err),
        }
    }
}

impl From<archive::Error> for Error {
    /// Converts [`archive::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: archive::Error) -> Error {
        Error::Archive(err)
    }
}

impl From<render::Error> for Error {
    /// Converts [`render::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: render::Error) -> Error {
        Error::Render(err)
    }
}

impl From<feed::Error> for Error {
    /// Converts [`feed::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: feed::Error) -> Error {
        Error::Feed(err)
    }
}

impl From<publish::Error> for Error {
    /// Converts [`publish::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: publish::Error) -> Error {
        Error::Publish(err)
    }
}
