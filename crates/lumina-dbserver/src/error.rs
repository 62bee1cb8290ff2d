use std::panic::Location;
use std::path::PathBuf;

use error_location::ErrorLocation;
use thiserror::Error;

/// Coarse classification of lifecycle failures, matching what the
/// database settings dialog distinguishes: an unsupported engine kind
/// versus any failure while bringing the server up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotSupported,
    StartError,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Database type is not supported {location}")]
    NotSupported { location: ErrorLocation },

    #[error("No path to the database {which} command set in the configuration {location}")]
    MissingCommand {
        which: &'static str,
        location: ErrorLocation,
    },

    #[error("Cannot create directory {path}: {source} {location}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },

    #[error("Cannot find the database server default configuration ({path}) {location}")]
    ConfigTemplateMissing {
        path: PathBuf,
        location: ErrorLocation,
    },

    #[error(
        "Unable to create the database server configuration file. \
         Either the template {template} was not readable or the target \
         {target} could not be written: {source} {location}"
    )]
    ConfigWrite {
        template: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },

    #[error("{context}\n{report} {location}")]
    ToolFailed {
        context: &'static str,
        report: String,
        location: ErrorLocation,
    },

    #[error("Failed to spawn {program}: {source} {location}")]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },

    #[error("{context}\n{report} {location}")]
    ServerExited {
        context: &'static str,
        report: String,
        location: ErrorLocation,
    },

    #[error(
        "Could not connect to the database server after trying for \
         {seconds} seconds: {last_error} {location}"
    )]
    ConnectTimeout {
        seconds: u64,
        last_error: String,
        location: ErrorLocation,
    },

    #[error(
        "Failed to create database {database}. \
         Query error: {query_error}. Server error: {server_error} {location}"
    )]
    CreateDatabaseFailed {
        database: String,
        query_error: String,
        server_error: String,
        location: ErrorLocation,
    },

    #[error("Failed to acquire lock at {path}: {source} {location}")]
    LockAcquisition {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },

    #[error("IO error: {source} {location}")]
    Io {
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },
}

impl ServerError {
    /// Map the variant onto the coarse taxonomy the settings dialog
    /// reports to the user.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSupported { .. } => ErrorKind::NotSupported,
            _ => ErrorKind::StartError,
        }
    }

    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::NotSupported { .. } => {
                "Only the internal MySQL database can be managed here. \
                 Select it in the database settings, or configure the \
                 other engine kinds directly."
            }
            Self::MissingCommand { .. } => {
                "Set the paths to the database server tools in the \
                 database settings, or reinstall the database server \
                 package."
            }
            Self::DirectoryCreation { .. } => {
                "Unable to create the database directories. \
                 Check file permissions or available disk space."
            }
            Self::ConfigTemplateMissing { .. } => {
                "The application installation appears incomplete. \
                 Please reinstall Lumina."
            }
            Self::ConnectTimeout { .. } => {
                "The database server is taking too long to accept \
                 connections. Check mysql.err in the database data \
                 directory for details."
            }
            Self::ServerExited { .. } | Self::ToolFailed { .. } => {
                "The database server tools reported an error. \
                 Check mysql.err in the database data directory."
            }
            Self::LockAcquisition { .. } => {
                "Unable to create the lock file. \
                 Check file permissions in the application data directory."
            }
            _ => "An unexpected error occurred. Please check the logs for details.",
        }
    }
}

impl From<std::io::Error> for ServerError {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

pub type ServerResult<T> = std::result::Result<T, ServerError>;
