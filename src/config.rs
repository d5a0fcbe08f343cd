//! Loads the site configuration from a YAML project file. Relative paths in
//! the file are resolved against the file's directory.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use url::Url;

/// The name of the project file searched for by [`Config::from_directory`].
pub const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Deserialize)]
struct PageSize(usize);
impl Default for PageSize {
    fn default() -> Self {
        PageSize(1000)
    }
}

#[derive(Deserialize)]
struct FeedSize(usize);
impl Default for FeedSize {
    fn default() -> Self {
        FeedSize(100)
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct Project {
    publish_dir: PathBuf,
    static_dir: PathBuf,
    media_dir: PathBuf,
    template: PathBuf,
    rss_template: Option<PathBuf>,
    day_counter_template: Option<PathBuf>,
    per_page: PageSize,
    new_on_top: bool,
    incremental_builds: bool,
    publish_rss_feed: bool,
    rss_feed_entries: FeedSize,
    debug_mode: bool,
    site_url: String,
    site_name: String,
    site_description: String,
    group: String,
}

impl Default for Project {
    fn default() -> Self {
        Project {
            publish_dir: PathBuf::from("site"),
            static_dir: PathBuf::from("static"),
            media_dir: PathBuf::from("media"),
            template: PathBuf::from("template.html"),
            rss_template: None,
            day_counter_template: None,
            per_page: PageSize::default(),
            new_on_top: false,
            incremental_builds: false,
            publish_rss_feed: true,
            rss_feed_entries: FeedSize::default(),
            debug_mode: false,
            site_url: String::from("https://localhost"),
            site_name: String::from("@{group} (Telegram) archive"),
            site_description: String::from("Public archive of Telegram messages."),
            group: String::new(),
        }
    }
}

/// The resolved configuration for a build.
#[derive(Clone, Debug)]
pub struct Config {
    pub publish_dir: PathBuf,
    pub static_dir: PathBuf,
    pub media_dir: PathBuf,

    /// The page template.
    pub template: PathBuf,

    /// The template for feed entry abstracts. Entries fall back to the
    /// message content when absent.
    pub rss_template: Option<PathBuf>,

    /// The template for `day-counter-*.js` files. A built-in template is used
    /// when absent.
    pub day_counter_template: Option<PathBuf>,

    /// The number of messages per page.
    pub per_page: usize,
    pub new_on_top: bool,
    pub incremental_builds: bool,
    pub publish_rss_feed: bool,

    /// The capacity of the feed window.
    pub rss_feed_entries: usize,

    /// Disables minification.
    pub debug_mode: bool,

    /// The public URL of the publish directory. Always ends in a slash so
    /// that [`Url::join`] keeps the last path segment.
    pub site_url: Url,
    pub site_name: String,
    pub site_description: String,
    pub group: String,

    /// Place static assets, media, and `index.html` as symbolic links rather
    /// than copies. Set from the command line.
    pub symlink: bool,
}

impl Config {
    /// Searches `dir` and its ancestors for [`CONFIG_FILE_NAME`] and loads the
    /// first one found.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Config::from_file(&path)
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent),
                None => Err(anyhow!(
                    "Could not find `{}` in any parent directory",
                    CONFIG_FILE_NAME
                )),
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let file = File::open(path)
            .with_context(|| format!("Opening config file `{}`", path.display()))?;
        let project: Project = serde_yaml::from_reader(file)
            .with_context(|| format!("Loading configuration `{}`", path.display()))?;
        let root = match path.parent() {
            Some(root) => root,
            None => {
                return Err(anyhow!(
                    "Can't get parent directory for provided config file path '{:?}'",
                    path
                ))
            }
        };
        Config::from_project(project, root)
    }

    /// Parses configuration from a YAML string, resolving relative paths
    /// against `root`.
    pub fn from_yaml(yaml: &str, root: &Path) -> Result<Config> {
        Config::from_project(serde_yaml::from_str(yaml)?, root)
    }

    fn from_project(project: Project, root: &Path) -> Result<Config> {
        if project.per_page.0 == 0 {
            return Err(anyhow!("`per_page` must be at least 1"));
        }

        let mut site_url = project.site_url;
        if !site_url.ends_with('/') {
            site_url.push('/');
        }
        let site_url = Url::parse(&site_url)
            .with_context(|| format!("Parsing `site_url` '{}'", site_url))?;

        Ok(Config {
            publish_dir: root.join(project.publish_dir),
            static_dir: root.join(project.static_dir),
            media_dir: root.join(project.media_dir),
            template: root.join(project.template),
            rss_template: project.rss_template.map(|p| root.join(p)),
            day_counter_template: project.day_counter_template.map(|p| root.join(p)),
            per_page: project.per_page.0,
            new_on_top: project.new_on_top,
            incremental_builds: project.incremental_builds,
            publish_rss_feed: project.publish_rss_feed,
            rss_feed_entries: project.rss_feed_entries.0,
            debug_mode: project.debug_mode,
            site_url,
            site_name: project.site_name,
            site_description: project.site_description,
            group: project.group,
            symlink: false,
        })
    }

    /// The site name with `{group}` substituted.
    pub fn site_title(&self) -> String {
        self.site_name.replace("{group}", &self.group)
    }

    /// The directory name under which media is published, i.e. the last
    /// component of `media_dir`.
    pub fn media_dir_name(&self) -> String {
        dir_name(&self.media_dir)
    }

    /// The directory name under which static assets are published.
    pub fn static_dir_name(&self) -> String {
        dir_name(&self.static_dir)
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() -> Result<()> {
        let config = Config::from_yaml("group: rustaceans", Path::new("/srv/archive"))?;
        assert_eq!(Path::new("/srv/archive/site"), config.publish_dir);
        assert_eq!(1000, config.per_page);
        assert_eq!(100, config.rss_feed_entries);
        assert!(config.publish_rss_feed);
        assert!(!config.incremental_builds);
        assert_eq!("https://localhost/", config.site_url.as_str());
        assert_eq!("@rustaceans (Telegram) archive", config.site_title());
        assert_eq!("media", config.media_dir_name());
        Ok(())
    }

    #[test]
    fn test_overrides() -> Result<()> {
        let config = Config::from_yaml(
            r#"
publish_dir: out
per_page: 25
new_on_top: true
incremental_builds: true
rss_feed_entries: 5
site_url: https://example.org/archive
rss_template: rss.html
"#,
            Path::new("/srv"),
        )?;
        assert_eq!(Path::new("/srv/out"), config.publish_dir);
        assert_eq!(25, config.per_page);
        assert!(config.new_on_top);
        assert!(config.incremental_builds);
        assert_eq!(5, config.rss_feed_entries);
        assert_eq!("https://example.org/archive/", config.site_url.as_str());
        assert_eq!(Some(PathBuf::from("/srv/rss.html")), config.rss_template);
        Ok(())
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        assert!(Config::from_yaml("per_page: 0", Path::new("/")).is_err());
    }

    #[test]
    fn test_from_directory_searches_ancestors() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "per_page: 3")?;
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested)?;
        let config = Config::from_directory(&nested)?;
        assert_eq!(3, config.per_page);
        assert_eq!(dir.path().join("site"), config.publish_dir);
        Ok(())
    }
}
