//! Error types for inlining and rendering

use thiserror::Error;

/// Result type alias for rasterizer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while inlining or rendering a document
///
/// Almost none of these reach a caller of the public `draw_*` functions: the
/// pipeline turns them into [`crate::ResourceError`] records and keeps going.
#[derive(Error, Debug)]
pub enum Error {
    /// A resource was unreachable or blocked
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// A reference token did not parse
    #[error("Invalid reference: {0}")]
    Format(String),

    /// Fetched bytes are not a valid image
    #[error("Failed to decode image {url}: {reason}")]
    Decode { url: String, reason: String },

    /// The SVG envelope was rejected by the loader or the surface
    #[error("Rendering failed: {0}")]
    Render(String),

    /// A sandboxed script threw
    #[error("Script execution failed: {0}")]
    Script(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Local file access
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn fetch(url: &str, reason: impl ToString) -> Self {
        Error::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(url: &str, reason: impl ToString) -> Self {
        Error::Decode {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_names_the_url() {
        let err = Error::fetch("http://example.com/a.css", "404");
        assert_eq!(err.to_string(), "Failed to fetch http://example.com/a.css: 404");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
