//! [`Indicator`](crate::traits::Indicator) implementations.
//!
//! [`text::TextIndicator`] writes the current layer to any
//! [`Write`](std::io::Write) sink, one line per change, which is what status
//! bars like waybar expect from a custom module.  When the `indicator-gtk`
//! feature is enabled, [`gtk::run_main_loop`] takes over the main thread and
//! shows a small layer-shell label instead.

pub mod text;

#[cfg(feature = "indicator-gtk")]
pub mod gtk;

use log::{info, warn};
use std::borrow::Cow;
use std::path::Path;

/// The user stylesheet at `path`, or `builtin` when there is none or it
/// cannot be read.
pub fn stylesheet(path: Option<&Path>, builtin: &'static str) -> Cow<'static, str> {
    let Some(path) = path else {
        return Cow::Borrowed(builtin);
    };
    match std::fs::read_to_string(path) {
        Ok(css) => {
            info!("using stylesheet {} ({} bytes)", path.display(), css.len());
            Cow::Owned(css)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Cow::Borrowed(builtin),
        Err(e) => {
            warn!("cannot read stylesheet {}: {}, using the built-in one", path.display(), e);
            Cow::Borrowed(builtin)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUILTIN: &str = ".kanata-layer {}";

    #[test]
    fn no_path_uses_builtin() {
        assert_eq!(stylesheet(None, BUILTIN), BUILTIN);
    }

    #[test]
    fn missing_file_uses_builtin() {
        let css = stylesheet(Some(Path::new("/nonexistent/style.css")), BUILTIN);
        assert!(matches!(css, Cow::Borrowed(BUILTIN)));
    }

    #[test]
    fn user_file_replaces_builtin() {
        let path = std::env::temp_dir().join(format!("kanata-indicator-{}.css", std::process::id()));
        std::fs::write(&path, ".kanata-layer { color: red; }").unwrap();
        let css = stylesheet(Some(&path), BUILTIN);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(css, ".kanata-layer { color: red; }");
    }

    #[test]
    fn directory_path_uses_builtin() {
        let css = stylesheet(Some(&std::env::temp_dir()), BUILTIN);
        assert_eq!(css, BUILTIN);
    }
}
