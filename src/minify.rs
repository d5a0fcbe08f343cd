//! Byte-reducing transforms for rendered pages and static assets. The
//! transforms themselves are opaque; this module only decides what to run
//! them on and reports how much they saved.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Static assets minified in place after a build, relative to the published
/// static directory.
pub const STYLESHEET: &str = "style.css";
pub const SCRIPT: &str = "main.js";

/// Minifies a rendered HTML page, dropping comments.
pub fn html(page: &str) -> String {
    let cfg = minify_html::Cfg {
        keep_comments: false,
        ..minify_html::Cfg::default()
    };
    String::from_utf8_lossy(&minify_html::minify(page.as_bytes(), &cfg)).into_owned()
}

pub fn css(source: &str) -> Result<String, String> {
    minifier::css::minify(source)
        .map(|minified| minified.to_string())
        .map_err(|e| e.to_owned())
}

pub fn js(source: &str) -> String {
    minifier::js::minify(source).to_string()
}

/// The outcome of minifying a static asset. None of these fail a build.
#[derive(Debug)]
pub enum Outcome {
    Minified { path: PathBuf, before: usize, after: usize },

    /// The asset doesn't exist in the published static directory.
    Missing(PathBuf),

    /// The asset couldn't be read, transformed, or written back.
    Failed { path: PathBuf, err: String },
}

impl Outcome {
    /// The percentage of bytes saved, as logged.
    pub fn reduction(before: usize, after: usize) -> usize {
        match before {
            0 => 0,
            _ => 100usize.saturating_sub(after * 100 / before),
        }
    }

    pub fn log(&self) {
        match self {
            Outcome::Minified { path, before, after } => log::info!(
                "{}: {} → {} bytes ({}% reduction)",
                path.display(),
                before,
                after,
                Outcome::reduction(*before, *after)
            ),
            Outcome::Missing(path) => {
                log::info!("{} not found, skipping minification", path.display())
            }
            Outcome::Failed { path, err } => {
                log::warn!("Minifying {}: {}", path.display(), err)
            }
        }
    }
}

/// Minifies the stylesheet and script in `static_target` in place.
pub fn static_assets(static_target: &Path) -> Vec<Outcome> {
    vec![
        minify_file(&static_target.join(STYLESHEET), css),
        minify_file(&static_target.join(SCRIPT), |s| Ok(js(s))),
    ]
}

fn minify_file<F>(path: &Path, transform: F) -> Outcome
where
    F: Fn(&str) -> Result<String, String>,
{
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Outcome::Missing(path.to_owned())
        }
        Err(err) => {
            return Outcome::Failed {
                path: path.to_owned(),
                err: err.to_string(),
            }
        }
    };
    let minified = match transform(&source) {
        Ok(minified) => minified,
        Err(err) => {
            return Outcome::Failed {
                path: path.to_owned(),
                err,
            }
        }
    };
    if let Err(err) = fs::write(path, &minified) {
        return Outcome::Failed {
            path: path.to_owned(),
            err: err.to_string(),
        };
    }
    Outcome::Minified {
        path: path.to_owned(),
        before: source.len(),
        after: minified.len(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_html_drops_comments() {
        let out = html("<html>\n  <body>\n    <!-- note -->\n    <p>hi</p>\n  </body>\n</html>\n");
        assert!(!out.contains("note"));
        assert!(out.contains("hi"));
    }

    #[test]
    fn test_reduction() {
        assert_eq!(25, Outcome::reduction(100, 75));
        assert_eq!(0, Outcome::reduction(0, 0));
    }

    #[test]
    fn test_static_assets() {
        let dir = tempfile::tempdir().unwrap();
        let css_source = "body {\n    color: red;\n}\n\n/* comment */\n";
        fs::write(dir.path().join(STYLESHEET), css_source).unwrap();

        let outcomes = static_assets(dir.path());
        match &outcomes[0] {
            Outcome::Minified { before, after, .. } => {
                assert_eq!(css_source.len(), *before);
                assert!(after < before);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        match &outcomes[1] {
            Outcome::Missing(path) => assert!(path.ends_with(SCRIPT)),
            other => panic!("unexpected outcome: {:?}", other),
        }
        let written = fs::read_to_string(dir.path().join(STYLESHEET)).unwrap();
        assert!(written.len() < css_source.len());
    }
}
