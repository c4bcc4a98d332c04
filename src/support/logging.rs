//-
// Copyright (c) 2020, 2024, Jason Lingle
//
// This file is part of Archivemail.
//
// Archivemail is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Archivemail is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// Archivemail. If not, see <http://www.gnu.org/licenses/>.

use std::path::Path;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Choose the log level implied by the `quiet` and `verbose` options.
pub fn level_for(quiet: bool, verbose: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Warn
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Initialise logging.
///
/// If `config_file` is given, it is handed to log4rs verbatim and `level` is
/// ignored; it is an error for it not to be a regular file. Otherwise,
/// everything at `level` or above is written to standard error.
///
/// Returns an error message if logging could not be set up; the caller
/// should treat this as a configuration error.
pub fn init(
    config_file: Option<&Path>,
    level: LevelFilter,
) -> Result<(), String> {
    if let Some(config_file) = config_file {
        if !config_file.is_file() {
            return Err(format!(
                "{}: not a log configuration file",
                config_file.display()
            ));
        }

        return log4rs::init_file(
            config_file,
            log4rs::file::Deserializers::new(),
        )
        .map_err(|e| format!("{}: {}", config_file.display(), e));
    }

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{l}: {m}{n}")))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| e.to_string())?;

    log4rs::init_config(config)
        .map(|_| ())
        .map_err(|e| e.to_string())
}
