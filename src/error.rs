/*
sparsepad, to bloat and trim Android sparse images: error module
Copyright (C) 2024-present Guoxin "7Ji" Pu

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as
published by the Free Software Foundation, either version 3 of the
License, or (at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use std::{fmt::Display, path::{Path, PathBuf}};

#[derive(Debug)]
pub(crate) enum Error {
    IOError (std::io::Error),
    FileOpenError {
        path: PathBuf,
        error: std::io::Error,
    },
    SamePathError {
        path: PathBuf,
    },
    SparseError (crate::sparse::SparseError),
    YamlError (serde_yaml::Error),
    TemplateError (indicatif::style::TemplateError),
}

impl Error {
    pub(crate) fn file_open<P: AsRef<Path>>(path: P, error: std::io::Error)
        -> Self
    {
        Self::FileOpenError { path: path.as_ref().into(), error }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IOError(e) => write!(f, "I/O error: {}", e),
            Error::FileOpenError { path, error } =>
                write!(f, "Could not open file '{}': {}", path.display(), error),
            Error::SamePathError { path } =>
                write!(f, "Input and output are the same file '{}'",
                    path.display()),
            Error::SparseError(e) => write!(f, "{}", e),
            Error::YamlError(e) => write!(f, "YAML error: {}", e),
            Error::TemplateError(e) =>
                write!(f, "Progress bar template error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IOError(e) => Some(e),
            Error::FileOpenError { error, .. } => Some(error),
            Error::YamlError(e) => Some(e),
            Error::TemplateError(e) => Some(e),
            Error::SamePathError { .. } | Error::SparseError(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<crate::sparse::SparseError> for Error {
    fn from(value: crate::sparse::SparseError) -> Self {
        Self::SparseError(value)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(value: serde_yaml::Error) -> Self {
        Self::YamlError(value)
    }
}

impl From<indicatif::style::TemplateError> for Error {
    fn from(value: indicatif::style::TemplateError) -> Self {
        Self::TemplateError(value)
    }
}

pub(crate) type Result<T> = std::result::Result<T, Error>;
