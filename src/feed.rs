//! Support for the site's syndication feeds: the [`FeedWindow`] that keeps
//! the most recent messages seen during a build, and [`write_feeds`] which
//! turns the window into an RSS 2.0 document (`index.xml`) and an Atom
//! document (`index.atom`).

use crate::archive::Message;
use crate::config::Config;
use crate::render::{self, AbstractContext, Render};
use crate::replies::ReplyIndex;
use atom_syndication::{
    Content, Entry, Error as AtomError, Feed, FixedDateTime, Generator, Link,
};
use chrono::{DateTime, Utc};
use rss::{Channel, Enclosure, Guid, Item};
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::path::Path;

/// The MIME type for media whose type can't be determined.
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// The MIME type assumed for remote media.
pub const REMOTE_MIME: &str = "text/html";

/// The file names of the emitted feeds, relative to the publish directory.
pub const RSS_FILE_NAME: &str = "index.xml";
pub const ATOM_FILE_NAME: &str = "index.atom";

/// A bounded FIFO of the most recently pushed messages. Once full, each push
/// evicts the oldest entry.
#[derive(Debug)]
pub struct FeedWindow {
    capacity: usize,
    entries: VecDeque<Message>,
}

impl FeedWindow {
    pub fn new(capacity: usize) -> FeedWindow {
        FeedWindow {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, message: Message) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    /// Yields the window's contents front to back, leaving the window intact.
    pub fn drain(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The type and size of a media attachment as published in an enclosure.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub mime: String,

    /// `None` when the file couldn't be read or the media is remote.
    pub length: Option<u64>,
}

/// Determines the MIME type and size of the media at `media_url`. Remote URIs
/// are treated as web pages. Local files are sniffed by content, then by
/// extension. Anything unreadable degrades to [`FALLBACK_MIME`] with no size.
pub fn detect_media(media_dir: &Path, media_url: &str) -> MediaInfo {
    if media_url.contains("://") {
        return MediaInfo {
            mime: REMOTE_MIME.to_owned(),
            length: None,
        };
    }

    let path = media_dir.join(media_url);
    let length = match std::fs::metadata(&path) {
        Ok(meta) => meta.len(),
        Err(err) => {
            log::debug!("Inspecting media '{}': {}", path.display(), err);
            return MediaInfo {
                mime: FALLBACK_MIME.to_owned(),
                length: None,
            };
        }
    };

    let mime = match infer::get_from_path(&path) {
        Ok(Some(kind)) => Some(kind.mime_type().to_owned()),
        Ok(None) => None,
        Err(err) => {
            log::debug!("Sniffing media '{}': {}", path.display(), err);
            None
        }
    }
    .or_else(|| {
        mime_guess::from_path(&path)
            .first()
            .map(|m| m.essence_str().to_owned())
    })
    .unwrap_or_else(|| FALLBACK_MIME.to_owned());

    MediaInfo {
        mime,
        length: Some(length),
    }
}

/// A feed entry before serialization to either format.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedEntry {
    pub url: String,
    pub title: String,
    pub published: DateTime<Utc>,
    pub content: String,
    pub enclosure: Option<FeedEnclosure>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeedEnclosure {
    pub url: String,
    pub media: MediaInfo,
}

/// Summary of a feed emission.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FeedSummary {
    pub entries: usize,
}

/// Builds the entries for the messages in `window`, resolving each message to
/// its page URL through `replies`.
pub fn feed_entries(
    config: &Config,
    window: &FeedWindow,
    replies: &ReplyIndex,
    renderer: &dyn Render,
) -> Result<Vec<FeedEntry>> {
    let mut entries = Vec::with_capacity(window.len());
    for m in window.drain() {
        let page = replies.lookup(m.id).ok_or(Error::Unpublished(m.id))?;
        let url = config.site_url.join(&format!("{}#{}", page, m.id))?;

        let mut media_mime = String::new();
        let enclosure = match &m.media {
            Some(media) if !media.url.is_empty() => {
                let info = detect_media(&config.media_dir, &media.url);
                media_mime = info.mime.clone();
                Some(FeedEnclosure {
                    url: config
                        .site_url
                        .join(&format!("{}/{}", config.media_dir_name(), media.url))?
                        .to_string(),
                    media: info,
                })
            }
            _ => None,
        };

        let content = match renderer.render_abstract(&AbstractContext {
            config,
            message: m,
            media_mime: &media_mime,
            replies,
        })? {
            Some(content) => content,
            None => abstract_fallback(m),
        };

        entries.push(FeedEntry {
            url: url.to_string(),
            title: format!(
                "@{} on {} (#{})",
                m.user.username,
                m.date.format("%Y-%m-%d %H:%M:%S"),
                m.id
            ),
            published: m.date,
            content,
            enclosure,
        });
    }
    Ok(entries)
}

/// The message content, or the media title for content-less media messages.
fn abstract_fallback(m: &Message) -> String {
    if !m.content.is_empty() {
        return m.content.clone();
    }
    match &m.media {
        Some(media) => media.title.clone(),
        None => String::new(),
    }
}

/// Writes `index.xml` and `index.atom` into the publish directory from the
/// contents of `window`.
pub fn write_feeds(
    config: &Config,
    window: &FeedWindow,
    replies: &ReplyIndex,
    renderer: &dyn Render,
) -> Result<FeedSummary> {
    let entries = feed_entries(config, window, replies, renderer)?;
    rss_channel(config, &entries)
        .write_to(File::create(config.publish_dir.join(RSS_FILE_NAME))?)?;
    atom_feed(config, &entries)
        .write_to(File::create(config.publish_dir.join(ATOM_FILE_NAME))?)?;
    Ok(FeedSummary {
        entries: entries.len(),
    })
}

fn generator_name() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

fn rss_channel(config: &Config, entries: &[FeedEntry]) -> Channel {
    let mut channel = Channel::default();
    channel.set_title(config.site_title());
    channel.set_link(config.site_url.to_string());
    channel.set_description(config.site_description.clone());
    channel.set_generator(Some(generator_name()));
    channel.set_items(
        entries
            .iter()
            .map(|entry| {
                let mut guid = Guid::default();
                guid.set_value(entry.url.clone());
                guid.set_permalink(true);

                let mut item = Item::default();
                item.set_title(Some(entry.title.clone()));
                item.set_link(Some(entry.url.clone()));
                item.set_guid(Some(guid));
                item.set_pub_date(Some(entry.published.to_rfc2822()));
                item.set_description(Some(entry.content.clone()));
                if let Some(enc) = &entry.enclosure {
                    let mut enclosure = Enclosure::default();
                    enclosure.set_url(enc.url.clone());
                    enclosure.set_mime_type(enc.media.mime.clone());
                    // RSS requires a length; zero stands for unknown
                    enclosure.set_length(enc.media.length.unwrap_or(0).to_string());
                    item.set_enclosure(Some(enclosure));
                }
                item
            })
            .collect::<Vec<Item>>(),
    );
    channel
}

fn atom_feed(config: &Config, entries: &[FeedEntry]) -> Feed {
    let mut generator = Generator::default();
    generator.set_value(env!("CARGO_PKG_NAME"));
    generator.set_version(Some(env!("CARGO_PKG_VERSION").to_owned()));

    let mut feed = Feed::default();
    feed.set_id(config.site_url.to_string());
    feed.set_title(config.site_title());
    feed.set_subtitle(Some(config.site_description.clone().into()));
    feed.set_generator(Some(generator));
    feed.set_updated(FixedDateTime::from(Utc::now()));
    feed.set_links(vec![link(config.site_url.as_str(), "alternate")]);
    feed.set_entries(
        entries
            .iter()
            .map(|entry| {
                let date = FixedDateTime::from(entry.published);
                let mut links = vec![link(&entry.url, "alternate")];
                if let Some(enc) = &entry.enclosure {
                    let mut enclosure = link(&enc.url, "enclosure");
                    enclosure.set_mime_type(Some(enc.media.mime.clone()));
                    enclosure.set_length(enc.media.length.map(|l| l.to_string()));
                    links.push(enclosure);
                }

                let mut content = Content::default();
                content.set_value(Some(entry.content.clone()));
                content.set_content_type(Some("html".to_owned()));

                let mut e = Entry::default();
                e.set_id(entry.url.clone());
                e.set_title(entry.title.clone());
                e.set_updated(date);
                e.set_published(Some(date));
                e.set_links(links);
                e.set_content(Some(content));
                e
            })
            .collect::<Vec<Entry>>(),
    );
    feed
}

fn link(href: &str, rel: &str) -> Link {
    let mut link = Link::default();
    link.set_href(href);
    link.set_rel(rel);
    link
}

/// The result of a fallible feed operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed. Variants include I/O, serialization,
/// URL, and templating issues.
#[derive(Debug)]
pub enum Error {
    /// Returned when there is a generic I/O error.
    Io(std::io::Error),

    /// Returned when there is an Atom-related error.
    Atom(AtomError),

    /// Returned when there is an RSS-related error.
    Rss(rss::Error),

    /// Returned when an entry URL can't be built from `site_url`.
    Url(url::ParseError),

    /// Returned when an entry abstract fails to render.
    Render(render::Error),

    /// Returned when a message in the window was never assigned a page.
    Unpublished(u64),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Atom(err) => err.fmt(f),
            Error::Rss(err) => err.fmt(f),
            Error::Url(err) => err.fmt(f),
            Error::Render(err) => err.fmt(f),
            Error::Unpublished(id) => write!(f, "message {} has no page", id),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Atom(err) => Some(err),
            Error::Rss(err) => Some(err),
            Error::Url(err) => Some(err),
            Error::Render(err) => Some(err),
            Error::Unpublished(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator in fallible feed operations.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<AtomError> for Error {
    /// Converts [`AtomError`]s into [`Error`]. This allows us to use the `?`
    /// operator in fallible feed operations.
    fn from(err: AtomError) -> Error {
        Error::Atom(err)
    }
}

impl From<rss::Error> for Error {
    fn from(err: rss::Error) -> Error {
        Error::Rss(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::Url(err)
    }
}

impl From<render::Error> for Error {
    fn from(err: render::Error) -> Error {
        Error::Render(err)
    }
}
