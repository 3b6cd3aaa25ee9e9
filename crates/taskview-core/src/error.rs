use thiserror::Error;

use crate::view::ViewName;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("repository failure: {0}")]
    Repository(String),

    #[error("view {0} is not open")]
    ViewNotOpen(ViewName),
}

impl Error {
    pub fn task_not_found(id: u64) -> Self {
        Self::NotFound {
            entity: "task",
            id: id.to_string(),
        }
    }

    pub fn category_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "category",
            id: id.to_string(),
        }
    }

    pub fn validation<M: Into<String>>(message: M) -> Self {
        Self::Validation(message.into())
    }

    pub fn repository<M: Into<String>>(message: M) -> Self {
        Self::Repository(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation(_) => "validation",
            Self::Repository(_) => "repository",
            Self::ViewNotOpen(_) => "view_not_open",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Repository(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Repository(err.to_string())
    }
}
