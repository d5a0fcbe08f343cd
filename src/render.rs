//! The boundary between the build pipeline and the templating engine. The
//! pipeline hands a context to a [`Render`] implementation and gets text back;
//! it never inspects the markup. [`GtmplRenderer`] is the template-file backed
//! implementation used by the binary. Tests substitute fixtures.
//!
//! Template contexts are plain values: the page filename for any page number
//! and the newline-to-break transform are computed here, before templating,
//! rather than being called from inside the template.

use crate::archive::{Day, Media, Message, Month, User};
use crate::config::Config;
use crate::paginate::{make_filename, Page};
use crate::replies::ReplyIndex;
use crate::timeline::Timeline;
use gtmpl::{Context, Template, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

/// The template used for `day-counter-*.js` files when the configuration
/// doesn't name one.
pub const DAY_COUNTER_TEMPLATE: &str = r#"window.dayCounters = window.dayCounters || {};
window.dayCounters["{{ .day.slug }}"] = {
  count: {{ .day.count }},
  href: "{{ .day.href }}",
  next: {{ if .next }}"{{ .next.slug }}"{{ else }}null{{ end }}
};
"#;

/// Everything needed to render one message page.
pub struct PageContext<'a> {
    pub config: &'a Config,
    pub build_timestamp: i64,
    pub timeline: &'a Timeline,
    pub dayline: &'a [Day],
    pub month: &'a Month,
    pub page: &'a Page,
    pub replies: &'a ReplyIndex,
}

/// Everything needed to render one day counter. `next` is the day following
/// `day` in iteration order.
pub struct DayCounterContext<'a> {
    pub config: &'a Config,
    pub month: &'a Month,
    pub day: &'a Day,
    pub next: Option<&'a Day>,
}

/// Everything needed to render the abstract of one feed entry.
pub struct AbstractContext<'a> {
    pub config: &'a Config,
    pub message: &'a Message,
    pub media_mime: &'a str,
    pub replies: &'a ReplyIndex,
}

/// Converts contexts into output text.
pub trait Render {
    fn render_page(&self, ctx: &PageContext) -> Result<String>;

    fn render_day_counter(&self, ctx: &DayCounterContext) -> Result<String>;

    /// Returns `None` when no abstract template is configured, in which case
    /// the feed falls back to the message content.
    fn render_abstract(&self, ctx: &AbstractContext) -> Result<Option<String>>;
}

/// A [`Render`] implementation backed by Go-style templates. Templates are
/// parsed once, when the renderer is built.
pub struct GtmplRenderer {
    page: Template,
    day_counter: Template,
    abstract_: Option<Template>,
}

impl GtmplRenderer {
    /// Loads and parses the templates named by `config`.
    pub fn from_config(config: &Config) -> Result<GtmplRenderer> {
        Ok(GtmplRenderer {
            page: load_template(&config.template)?,
            day_counter: match &config.day_counter_template {
                Some(path) => load_template(path)?,
                None => parse_template(Path::new("day counter"), DAY_COUNTER_TEMPLATE)?,
            },
            abstract_: match &config.rss_template {
                Some(path) => Some(load_template(path)?),
                None => None,
            },
        })
    }

    /// Builds a renderer from template text rather than files.
    pub fn from_strings(
        page: &str,
        day_counter: &str,
        abstract_: Option<&str>,
    ) -> Result<GtmplRenderer> {
        Ok(GtmplRenderer {
            page: parse_template(Path::new("page"), page)?,
            day_counter: parse_template(Path::new("day counter"), day_counter)?,
            abstract_: match abstract_ {
                Some(contents) => Some(parse_template(Path::new("abstract"), contents)?),
                None => None,
            },
        })
    }
}

impl Render for GtmplRenderer {
    fn render_page(&self, ctx: &PageContext) -> Result<String> {
        execute(&self.page, page_value(ctx))
    }

    fn render_day_counter(&self, ctx: &DayCounterContext) -> Result<String> {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("config".to_owned(), config_value(ctx.config, None));
        m.insert("month".to_owned(), Value::from(ctx.month));
        m.insert("day".to_owned(), day_value(ctx.day, ctx.month));
        m.insert(
            "next".to_owned(),
            match ctx.next {
                Some(next) => day_value(next, ctx.month),
                None => Value::Nil,
            },
        );
        execute(&self.day_counter, Value::Object(m))
    }

    fn render_abstract(&self, ctx: &AbstractContext) -> Result<Option<String>> {
        let template = match &self.abstract_ {
            Some(template) => template,
            None => return Ok(None),
        };
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("config".to_owned(), config_value(ctx.config, None));
        m.insert("m".to_owned(), message_value(ctx.message, None, ctx.replies));
        m.insert(
            "media_mime".to_owned(),
            Value::String(ctx.media_mime.to_owned()),
        );
        execute(template, Value::Object(m)).map(Some)
    }
}

/// Escapes message text for HTML and converts its line breaks with
/// [`nl2br`].
pub fn text_to_html(s: &str) -> String {
    nl2br(&html_escape::encode_safe(s))
}

/// Converts text to HTML line breaks. Runs of two or more newlines collapse to
/// a single blank line, then every newline is followed by `<br />`. The
/// newline is kept ahead of the tag so URL auto-linking in templates still
/// sees a word boundary.
pub fn nl2br(s: &str) -> String {
    fn flush(out: &mut String, newlines: usize) {
        for _ in 0..newlines.min(2) {
            out.push_str("\n<br />");
        }
    }

    let mut out = String::with_capacity(s.len());
    let mut newlines = 0;
    for c in s.chars() {
        if c == '\n' {
            newlines += 1;
            continue;
        }
        flush(&mut out, newlines);
        newlines = 0;
        out.push(c);
    }
    flush(&mut out, newlines);
    out
}

fn load_template(path: &Path) -> Result<Template> {
    use std::io::Read;
    let mut contents = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut contents))
        .map_err(|err| Error::OpenTemplateFile {
            path: path.to_owned(),
            err,
        })?;
    parse_template(path, &contents)
}

/// Parses `contents`; `path` names the template in errors.
fn parse_template(path: &Path, contents: &str) -> Result<Template> {
    let mut template = Template::default();
    template.parse(contents).map_err(|err| Error::Parse {
        path: path.to_owned(),
        err: err.to_string(),
    })?;
    Ok(template)
}

fn execute(template: &Template, value: Value) -> Result<String> {
    let context = Context::from(value).map_err(|e| Error::Execute(e.to_string()))?;
    let mut out: Vec<u8> = Vec::new();
    template
        .execute(&mut out, &context)
        .map_err(|e| Error::Execute(e.to_string()))?;
    String::from_utf8(out).map_err(|e| Error::Execute(e.to_string()))
}

fn page_value(ctx: &PageContext) -> Value {
    let page = ctx.page;
    let mut m: HashMap<String, Value> = HashMap::new();
    m.insert(
        "config".to_owned(),
        config_value(ctx.config, Some(ctx.build_timestamp)),
    );
    m.insert("timeline".to_owned(), timeline_value(ctx.timeline, ctx.month));
    m.insert(
        "dayline".to_owned(),
        Value::Array(ctx.dayline.iter().map(|d| day_value(d, ctx.month)).collect()),
    );
    m.insert("month".to_owned(), Value::from(ctx.month));
    m.insert(
        "messages".to_owned(),
        Value::Array(
            page.messages
                .iter()
                .map(|msg| message_value(msg, Some(&page.filename), ctx.replies))
                .collect(),
        ),
    );
    m.insert("filename".to_owned(), Value::String(page.filename.clone()));

    let pages = (1..=page.total_pages)
        .map(|number| {
            let mut p: HashMap<String, Value> = HashMap::new();
            p.insert("number".to_owned(), Value::from(number as u64));
            p.insert(
                "filename".to_owned(),
                Value::String(make_filename(&ctx.month.slug, number)),
            );
            p.insert("current".to_owned(), Value::Bool(number == page.number));
            Value::Object(p)
        })
        .collect();
    let mut pagination: HashMap<String, Value> = HashMap::new();
    pagination.insert("current".to_owned(), Value::from(page.number as u64));
    pagination.insert("total".to_owned(), Value::from(page.total_pages as u64));
    pagination.insert("pages".to_owned(), Value::Array(pages));
    m.insert("pagination".to_owned(), Value::Object(pagination));

    Value::Object(m)
}

fn config_value(config: &Config, build_timestamp: Option<i64>) -> Value {
    let mut m: HashMap<String, Value> = HashMap::new();
    m.insert("site_url".to_owned(), Value::String(config.site_url.to_string()));
    m.insert("site_name".to_owned(), Value::String(config.site_title()));
    m.insert(
        "site_description".to_owned(),
        Value::String(config.site_description.clone()),
    );
    m.insert("group".to_owned(), Value::String(config.group.clone()));
    m.insert("per_page".to_owned(), Value::from(config.per_page as u64));
    m.insert("new_on_top".to_owned(), Value::Bool(config.new_on_top));
    m.insert("publish_rss_feed".to_owned(), Value::Bool(config.publish_rss_feed));
    m.insert("media_dir".to_owned(), Value::String(config.media_dir_name()));
    m.insert("static_dir".to_owned(), Value::String(config.static_dir_name()));
    if let Some(ts) = build_timestamp {
        m.insert("build_timestamp".to_owned(), Value::from(ts));
    }
    Value::Object(m)
}

fn timeline_value(timeline: &Timeline, current: &Month) -> Value {
    Value::Array(
        timeline
            .years()
            .iter()
            .map(|year| {
                let months = year
                    .months
                    .iter()
                    .map(|month| {
                        let mut value = Value::from(month);
                        if let Value::Object(m) = &mut value {
                            m.insert(
                                "selected".to_owned(),
                                Value::Bool(month.slug == current.slug),
                            );
                        }
                        value
                    })
                    .collect();
                let mut m: HashMap<String, Value> = HashMap::new();
                m.insert("year".to_owned(), Value::from(year.year as i64));
                m.insert("months".to_owned(), Value::Array(months));
                Value::Object(m)
            })
            .collect(),
    )
}

/// Converts a [`Day`] into a template value. `href` points at the day's anchor
/// on the page where it starts.
fn day_value(day: &Day, month: &Month) -> Value {
    let mut m: HashMap<String, Value> = HashMap::new();
    m.insert("slug".to_owned(), Value::String(day.slug.clone()));
    m.insert("label".to_owned(), Value::String(day.label.clone()));
    m.insert("count".to_owned(), Value::from(day.count as u64));
    m.insert("page".to_owned(), Value::from(day.page as u64));
    m.insert(
        "href".to_owned(),
        Value::String(format!("{}#{}", make_filename(&month.slug, day.page), day.slug)),
    );
    Value::Object(m)
}

/// Converts a [`Message`] into a template value. When `current_filename` is
/// known, a reply resolves to a same-page anchor or a link to the page the
/// parent message was rendered on.
fn message_value(
    message: &Message,
    current_filename: Option<&str>,
    replies: &ReplyIndex,
) -> Value {
    let mut m: HashMap<String, Value> = HashMap::new();
    m.insert("id".to_owned(), Value::from(message.id));
    m.insert("date".to_owned(), Value::String(message.date.to_rfc3339()));
    m.insert(
        "day".to_owned(),
        Value::String(message.date.format("%Y-%m-%d").to_string()),
    );
    m.insert(
        "time".to_owned(),
        Value::String(message.date.format("%H:%M").to_string()),
    );
    m.insert("user".to_owned(), Value::from(&message.user));
    m.insert("content".to_owned(), Value::String(message.content.clone()));
    m.insert(
        "content_html".to_owned(),
        Value::String(text_to_html(&message.content)),
    );
    m.insert(
        "media".to_owned(),
        match &message.media {
            Some(media) => Value::from(media),
            None => Value::Nil,
        },
    );

    let reply = message.reply_to.and_then(|target| {
        let href = match current_filename {
            Some(current) => replies.link(target, current),
            None => replies.lookup(target).map(|f| format!("{}#{}", f, target)),
        }?;
        let mut r: HashMap<String, Value> = HashMap::new();
        r.insert("id".to_owned(), Value::from(target));
        r.insert("href".to_owned(), Value::String(href));
        Some(Value::Object(r))
    });
    m.insert("reply".to_owned(), reply.unwrap_or(Value::Nil));
    Value::Object(m)
}

impl From<&Month> for Value {
    /// Converts [`Month`]s into [`Value`]s for templating.
    fn from(month: &Month) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("slug".to_owned(), Value::String(month.slug.clone()));
        m.insert("label".to_owned(), Value::String(month.label.clone()));
        m.insert("year".to_owned(), Value::from(month.year as i64));
        m.insert("month".to_owned(), Value::from(month.month as u64));
        m.insert("count".to_owned(), Value::from(month.count as u64));
        m.insert(
            "filename".to_owned(),
            Value::String(make_filename(&month.slug, 1)),
        );
        Value::Object(m)
    }
}

impl From<&User> for Value {
    fn from(user: &User) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("id".to_owned(), Value::from(user.id));
        m.insert("username".to_owned(), Value::String(user.username.clone()));
        m.insert("first_name".to_owned(), Value::String(user.first_name.clone()));
        m.insert(
            "last_name".to_owned(),
            match &user.last_name {
                Some(name) => Value::String(name.clone()),
                None => Value::Nil,
            },
        );
        Value::Object(m)
    }
}

impl From<&Media> for Value {
    fn from(media: &Media) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("kind".to_owned(), Value::String(media.kind.clone()));
        m.insert("url".to_owned(), Value::String(media.url.clone()));
        m.insert("title".to_owned(), Value::String(media.title.clone()));
        Value::Object(m)
    }
}

/// The result of a fallible rendering operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading or executing a template.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems while opening template files.
    OpenTemplateFile { path: PathBuf, err: std::io::Error },

    /// Returned for errors parsing template files.
    Parse { path: PathBuf, err: String },

    /// Returned for errors during templating.
    Execute(String),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as presentable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OpenTemplateFile { path, err } => {
                write!(f, "Opening template file '{}': {}", path.display(), err)
            }
            Error::Parse { path, err } => {
                write!(f, "Parsing template '{}': {}", path.display(), err)
            }
            Error::Execute(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::OpenTemplateFile { path: _, err } => Some(err),
            Error::Parse { .. } => None,
            Error::Execute(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::test::message;
    use crate::archive::{Archive, Direction, MemoryArchive};
    use std::path::Path;

    fn config() -> Config {
        Config::from_yaml("group: rustaceans\nper_page: 2", Path::new("/srv")).unwrap()
    }

    #[test]
    fn test_nl2br() {
        assert_eq!("a\n<br />b", nl2br("a\nb"));
        assert_eq!("a\n<br />\n<br />b", nl2br("a\n\n\n\nb"));
        assert_eq!("plain", nl2br("plain"));
        assert_eq!("end\n<br />", nl2br("end\n"));
    }

    #[test]
    fn test_text_to_html_escapes_markup() {
        assert_eq!("a &lt; b &amp; c\n<br />d", text_to_html("a < b & c\nd"));
        let out = text_to_html("<script>alert(1)</script>\nbye");
        assert!(!out.contains("<script>"));
        assert!(out.starts_with("&lt;script&gt;alert(1)&lt;"));
        assert!(out.ends_with("\n<br />bye"));
    }

    #[test]
    fn test_render_page_escapes_content() -> Result<()> {
        let config = config();
        let mut msg = message(1, 2021, 1, 1);
        msg.content = "<b>hi</b>\n\"quoted\"".to_owned();
        let archive = MemoryArchive::new(vec![msg.clone()]);
        let months = archive.get_timeline(Direction::OldestFirst).unwrap();
        let page = Page {
            number: 1,
            filename: "2021-01.html".to_owned(),
            total_pages: 1,
            messages: vec![msg],
        };
        let renderer = GtmplRenderer::from_strings(
            "{{ range .messages }}{{ .content_html }}{{ end }}",
            DAY_COUNTER_TEMPLATE,
            None,
        )?;
        let out = renderer.render_page(&PageContext {
            config: &config,
            build_timestamp: 0,
            timeline: &Timeline::new(&months),
            dayline: &[],
            month: &months[0],
            page: &page,
            replies: &ReplyIndex::new(),
        })?;
        assert!(!out.contains("<b>"));
        assert!(out.starts_with("&lt;b&gt;hi&lt;"));
        assert!(out.contains("\n<br />&quot;quoted&quot;"));
        Ok(())
    }

    #[test]
    fn test_render_page() -> Result<()> {
        let config = config();
        let archive = MemoryArchive::new(vec![message(1, 2021, 1, 1), message(2, 2021, 1, 1)]);
        let months = archive.get_timeline(Direction::OldestFirst).unwrap();
        let timeline = Timeline::new(&months);
        let dayline = archive.get_dayline(2021, 1, Direction::OldestFirst, 2).unwrap();
        let mut reply = message(3, 2021, 1, 1);
        reply.reply_to = Some(1);
        reply.content = "see\nabove".to_owned();
        let page = Page {
            number: 2,
            filename: "2021-01_2.html".to_owned(),
            total_pages: 2,
            messages: vec![reply],
        };
        let mut replies = ReplyIndex::new();
        replies.record(1, "2021-01.html");
        replies.record(3, "2021-01_2.html");

        let renderer = GtmplRenderer::from_strings(
            concat!(
                "{{ .config.site_name }}|{{ .month.label }}|",
                "{{ range .messages }}",
                "{{ .id }}:{{ .reply.href }}:{{ .content_html }}",
                "{{ end }}|",
                "{{ range .pagination.pages }}{{ .filename }} {{ end }}",
            ),
            DAY_COUNTER_TEMPLATE,
            None,
        )?;
        let out = renderer.render_page(&PageContext {
            config: &config,
            build_timestamp: 0,
            timeline: &timeline,
            dayline: &dayline,
            month: &months[0],
            page: &page,
            replies: &replies,
        })?;
        assert_eq!(
            concat!(
                "@rustaceans (Telegram) archive|January 2021|",
                "3:2021-01.html#1:see\n<br />above|",
                "2021-01.html 2021-01_2.html ",
            ),
            out
        );
        Ok(())
    }

    #[test]
    fn test_render_day_counter() -> Result<()> {
        let config = config();
        let archive = MemoryArchive::new(vec![message(1, 2021, 1, 1), message(2, 2021, 1, 2)]);
        let months = archive.get_timeline(Direction::OldestFirst).unwrap();
        let days = archive.get_dayline(2021, 1, Direction::OldestFirst, 2).unwrap();
        let renderer = GtmplRenderer::from_strings("", DAY_COUNTER_TEMPLATE, None)?;

        let first = renderer.render_day_counter(&DayCounterContext {
            config: &config,
            month: &months[0],
            day: &days[0],
            next: days.get(1),
        })?;
        assert!(first.contains(r#"window.dayCounters["2021-01-01"]"#));
        assert!(first.contains(r#"href: "2021-01.html#2021-01-01""#));
        assert!(first.contains(r#"next: "2021-01-02""#));

        let last = renderer.render_day_counter(&DayCounterContext {
            config: &config,
            month: &months[0],
            day: &days[1],
            next: None,
        })?;
        assert!(last.contains("next: null"));
        Ok(())
    }

    #[test]
    fn test_render_abstract() -> Result<()> {
        let config = config();
        let replies = ReplyIndex::new();
        let msg = message(7, 2021, 1, 1);
        let ctx = AbstractContext {
            config: &config,
            message: &msg,
            media_mime: "image/png",
            replies: &replies,
        };
        let without = GtmplRenderer::from_strings("", "", None)?;
        assert_eq!(None, without.render_abstract(&ctx)?);

        let with = GtmplRenderer::from_strings(
            "",
            "",
            Some("{{ .m.content }} ({{ .media_mime }})"),
        )?;
        assert_eq!(Some("message 7 (image/png)".to_owned()), with.render_abstract(&ctx)?);
        Ok(())
    }

    #[test]
    fn test_missing_template_file() {
        let mut config = config();
        config.template = PathBuf::from("/nonexistent/template.html");
        match GtmplRenderer::from_config(&config) {
            Err(Error::OpenTemplateFile { .. }) => {}
            _ => panic!("expected OpenTemplateFile"),
        }
    }
}
