use std::path::PathBuf;

use crate::error::GenerationError;

/// Where document templates come from.
pub trait TemplateSource {
    /// Raw bytes of the template `name` (a file name such as `KDN_proto.docx`).
    fn load(&self, name: &str) -> Result<Vec<u8>, GenerationError>;
}

/// Templates stored as files in one directory.
#[derive(Clone, Debug)]
pub struct TemplateDir {
    pub root: PathBuf,
}

impl TemplateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TemplateSource for TemplateDir {
    fn load(&self, name: &str) -> Result<Vec<u8>, GenerationError> {
        let unavailable = |reason: String| GenerationError::TemplateUnavailable {
            name: name.to_string(),
            reason,
        };
        if name.is_empty() || name.contains("..") {
            return Err(unavailable("invalid template name".to_string()));
        }
        let path = self.root.join(name);
        tracing::debug!(path = %path.display(), "loading template");
        std::fs::read(&path).map_err(|e| unavailable(format!("{}: {e}", path.display())))
    }
}
