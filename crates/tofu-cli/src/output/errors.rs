//! Error message formatting with actionable suggestions.

use std::error::Error;

use tofu_core::error::TofuError;

use super::colors::ColorSupport;

/// Error formatter with suggestions
pub struct ErrorFormatter {
    colors: ColorSupport,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self {
            colors: ColorSupport::detect(),
        }
    }

    pub fn with_colors(colors: ColorSupport) -> Self {
        Self { colors }
    }

    /// Format an error with its suggestion and source chain
    pub fn format_error(&self, error: &TofuError) -> String {
        let mut output = self.headline(&error.to_string());
        self.push_suggestion(&mut output, error);

        let mut source = error.source();
        while let Some(err) = source {
            self.push_cause(&mut output, &err.to_string());
            source = err.source();
        }
        output
    }

    /// Format a command failure.
    ///
    /// The first `TofuError` anywhere in the chain supplies the suggestion.
    pub fn format_report(&self, error: &anyhow::Error) -> String {
        let mut output = self.headline(&error.to_string());

        if let Some(tofu) = error.chain().find_map(|e| e.downcast_ref::<TofuError>()) {
            self.push_suggestion(&mut output, tofu);
        }

        for cause in error.chain().skip(1) {
            self.push_cause(&mut output, &cause.to_string());
        }
        output
    }

    fn headline(&self, message: &str) -> String {
        format!("{}: {}\n", self.colors.red("error"), message)
    }

    fn push_suggestion(&self, output: &mut String, error: &TofuError) {
        if let Some(suggestion) = error.suggestion() {
            output.push('\n');
            output.push_str(&self.colors.dim("help"));
            output.push_str(": ");
            output.push_str(suggestion);
            output.push('\n');
        }
    }

    fn push_cause(&self, output: &mut String, cause: &str) {
        output.push('\n');
        output.push_str(&self.colors.dim("caused by"));
        output.push_str(": ");
        output.push_str(cause);
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn formatter() -> ErrorFormatter {
        ErrorFormatter::with_colors(ColorSupport::disabled())
    }

    #[test]
    fn test_format_error_includes_suggestion_and_source() {
        let error = TofuError::io(
            "Failed to write ledger".to_string(),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = formatter().format_error(&error);
        assert!(text.starts_with("error: IO error: Failed to write ledger"));
        assert!(text.contains("caused by: denied"));

        let text = formatter().format_error(&TofuError::config("url", "empty"));
        assert!(text.contains("help: Check the remote and repository sections"));
    }

    #[test]
    fn test_format_report_finds_wrapped_error() {
        let result: Result<(), TofuError> = Err(TofuError::NotFound {
            what: "hashicorp/consul/aws".to_string(),
        });
        let error = result.context("Sync of 'main' failed").unwrap_err();

        let text = formatter().format_report(&error);
        assert!(text.starts_with("error: Sync of 'main' failed"));
        assert!(text.contains("help: Check the address spelling"));
        assert!(text.contains("caused by: hashicorp/consul/aws not found in registry"));
    }
}
