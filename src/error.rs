use std::path::Path;

/// Failure classes of a detection run.
///
/// Library functions return `anyhow::Result`; these values travel inside the
/// `anyhow::Error` so callers can `downcast_ref::<PipelineError>()` and branch
/// on the class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineError {
    /// Invalid input directory, model path, or option value.
    Configuration { argument: String, message: String },
    /// The detector backend could not be initialized.
    ModelLoad { model: String, message: String },
    /// A single image failed to decode or score.
    Inference { image: String, message: String },
    /// An artifact or directory could not be read or written.
    Io { path: String, message: String },
    /// The run was interrupted between images.
    Cancelled { processed: usize, total: usize },
}

impl PipelineError {
    pub fn configuration(argument: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            argument: argument.to_string(),
            message: message.into(),
        }
    }

    pub fn model_load(model: &Path, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            model: model.display().to_string(),
            message: message.into(),
        }
    }

    pub fn inference(image: &str, message: impl Into<String>) -> Self {
        Self::Inference {
            image: image.to_string(),
            message: message.into(),
        }
    }

    pub fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Short stable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::ModelLoad { .. } => "MODEL_LOAD_ERROR",
            Self::Inference { .. } => "INFERENCE_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::Cancelled { .. } => "CANCELLED",
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration { argument, message } => {
                write!(f, "{}: argument {}: {}", self.code(), argument, message)
            }
            Self::ModelLoad { model, message } => {
                write!(f, "{}: model \"{}\": {}", self.code(), model, message)
            }
            Self::Inference { image, message } => {
                write!(f, "{}: image \"{}\": {}", self.code(), image, message)
            }
            Self::Io { path, message } => {
                write!(f, "{}: path \"{}\": {}", self.code(), path, message)
            }
            Self::Cancelled { processed, total } => {
                write!(
                    f,
                    "{}: run interrupted after {} of {} images",
                    self.code(),
                    processed,
                    total
                )
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// Extract the pipeline error class from an `anyhow::Error`, if any.
pub fn classify(err: &anyhow::Error) -> Option<&PipelineError> {
    err.downcast_ref::<PipelineError>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_offending_argument() {
        let err = PipelineError::configuration("images_dir", "path \"/nope\" not found");
        assert_eq!(
            err.to_string(),
            "CONFIGURATION_ERROR: argument images_dir: path \"/nope\" not found"
        );
    }

    #[test]
    fn classify_recovers_typed_error() {
        let err: anyhow::Error = PipelineError::inference("a.jpg", "decode failed").into();
        let class = classify(&err).expect("typed error");
        assert_eq!(class.code(), "INFERENCE_ERROR");

        let plain = anyhow::anyhow!("untyped");
        assert!(classify(&plain).is_none());
    }
}
