//! Raw ingredient text sources.
//!
//! Front-ends (a text box, OCR output, a scraped page) all reduce to one
//! contract: produce a raw string of candidate ingredient text, or fail with
//! a descriptive error. The engine does not care how the string was obtained.

use crate::{Error, Result};
use std::io::Read;
use std::path::PathBuf;

/// Produces the raw text of an ingredient list.
pub trait IngredientSource: Send + Sync {
    /// Short human-readable description, used in logs.
    fn describe(&self) -> String;

    /// Reads the raw text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be obtained.
    fn read_raw(&self) -> Result<String>;
}

/// Literal text supplied by the caller.
#[derive(Debug, Clone)]
pub struct TextSource {
    text: String,
}

impl TextSource {
    /// Wraps literal text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl IngredientSource for TextSource {
    fn describe(&self) -> String {
        "text".to_string()
    }

    fn read_raw(&self) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// Text file, e.g. saved OCR output or a scraped page dump.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Creates a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl IngredientSource for FileSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn read_raw(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| Error::OperationFailed {
            operation: "read_source".to_string(),
            cause: format!("{}: {e}", self.path.display()),
        })
    }
}

/// Standard input, read to the end.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinSource;

impl IngredientSource for StdinSource {
    fn describe(&self) -> String {
        "stdin".to_string()
    }

    fn read_raw(&self) -> Result<String> {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| Error::OperationFailed {
                operation: "read_source".to_string(),
                cause: format!("stdin: {e}"),
            })?;
        Ok(input)
    }
}
