//-
// Copyright (c) 2024, Jason Lingle
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

use std::fs;
use std::path::{Path, PathBuf};

use chrono::prelude::*;
use log::{error, info};
use structopt::StructOpt;

use crate::archive::transaction::archive_mailbox;
use crate::support::archive_config::{parse_cutoff_date, ArchiveConfig};
use crate::support::logging;
use crate::support::sysexits::*;

/// Archive and compress old mail in mbox mailboxes.
///
/// Messages older than the cutoff are moved out of each MAILBOX into an
/// archive mailbox named after it, gzipped by default. Both dotlocking and
/// flock() are used to keep mail delivery agents from writing to a mailbox
/// while it is being archived.
///
/// Options given here override those loaded from --config, which is a TOML
/// file whose keys are the long option names with '_' for '-' (e.g.
/// `days_old_max = 30`, `archive_suffix = "_%Y"`, `no_compress = true`).
///
/// Prefix and suffix patterns are expanded at the cutoff time using the
/// pattern syntax of the Rust crate "chrono":
/// https://docs.rs/chrono/0.4.13/chrono/format/strftime/index.html
#[derive(StructOpt, Debug)]
#[structopt(max_term_width = 80)]
struct Options {
    /// Archive messages older than this many days [default: 180]
    #[structopt(short, long, conflicts_with = "date")]
    days: Option<u32>,

    /// Archive messages dated before this day, given as e.g. 2000-07-29 or
    /// '29 Jul 2000'
    #[structopt(short = "D", long, parse(try_from_str = parse_cutoff_date))]
    date: Option<NaiveDate>,

    /// Write archives to this directory instead of next to the mailbox
    #[structopt(short, long, parse(from_os_str))]
    output_dir: Option<PathBuf>,

    /// Prepend this pattern to archive names
    #[structopt(short, long)]
    prefix: Option<String>,

    /// Append this pattern to archive names [default: _archive]
    #[structopt(short, long)]
    suffix: Option<String>,

    /// Use this name for the archive instead of the mailbox's name
    #[structopt(short, long)]
    archive_name: Option<String>,

    /// Only archive messages of at least this many bytes
    #[structopt(short = "S", long)]
    size: Option<u64>,

    /// Don't change anything; only report what would be archived
    #[structopt(short = "n", long)]
    dry_run: bool,

    /// Never archive messages which have not been read
    #[structopt(short = "u", long)]
    preserve_unread: bool,

    /// Also archive messages flagged as important
    #[structopt(long)]
    include_flagged: bool,

    /// Archive all messages, regardless of age, size, or status
    #[structopt(long)]
    all: bool,

    /// Delete old messages instead of archiving them
    #[structopt(long, conflicts_with = "copy")]
    delete: bool,

    /// Copy old messages to the archive without removing them
    #[structopt(long)]
    copy: bool,

    /// Don't compress archives
    #[structopt(long)]
    no_compress: bool,

    /// Report details of what is being done
    #[structopt(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only report problems
    #[structopt(short, long)]
    quiet: bool,

    /// Load options from this TOML file
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Configure logging from this log4rs TOML file instead of writing
    /// to standard error
    #[structopt(long, parse(from_os_str))]
    log_config: Option<PathBuf>,

    /// The mbox files to archive
    #[structopt(parse(from_os_str), required = true)]
    mailboxes: Vec<PathBuf>,
}

impl Options {
    /// Build the configuration for the run: the --config file if given,
    /// overridden by the flags.
    fn configure(&self) -> Result<ArchiveConfig, String> {
        let mut config = match self.config {
            Some(ref path) => load_config(path)?,
            None => ArchiveConfig::default(),
        };
        self.apply(&mut config);
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }

    fn apply(&self, config: &mut ArchiveConfig) {
        if let Some(days) = self.days {
            config.days_old_max = Some(days);
            config.date_old_max = None;
        }
        if let Some(date) = self.date {
            config.date_old_max = Some(date);
            config.days_old_max = None;
        }
        if let Some(ref dir) = self.output_dir {
            config.output_dir = Some(dir.clone());
        }
        if let Some(ref prefix) = self.prefix {
            config.archive_prefix = Some(prefix.clone());
        }
        if let Some(ref suffix) = self.suffix {
            config.archive_suffix = suffix.clone();
        }
        if let Some(ref name) = self.archive_name {
            config.archive_name = Some(name.clone());
        }
        if let Some(size) = self.size {
            config.min_size = Some(size);
        }

        config.dry_run |= self.dry_run;
        config.preserve_unread |= self.preserve_unread;
        config.include_flagged |= self.include_flagged;
        config.archive_all |= self.all;
        config.no_compress |= self.no_compress;

        if self.delete {
            config.delete_old_mail = true;
            config.copy_old_mail = false;
        }
        if self.copy {
            config.copy_old_mail = true;
            config.delete_old_mail = false;
        }
        if self.verbose {
            config.verbose = true;
            config.quiet = false;
        }
        if self.quiet {
            config.quiet = true;
            config.verbose = false;
        }
    }
}

fn load_config(path: &Path) -> Result<ArchiveConfig, String> {
    let data = fs::read(path)
        .map_err(|e| format!("Error reading '{}': {}", path.display(), e))?;
    toml::from_slice(&data).map_err(|e| {
        format!("Error in config file at '{}': {}", path.display(), e)
    })
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let matches = match Options::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    };
    let options = Options::from_clap(&matches);

    let config = match options.configure() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            EX_CONFIG.exit()
        }
    };

    if let Err(e) = logging::init(
        options.log_config.as_deref(),
        logging::level_for(config.quiet, config.verbose),
    ) {
        eprintln!("Failed to initialise logging: {}", e);
        EX_CONFIG.exit();
    }

    // Every mailbox is judged against the same cutoff
    let now = Utc::now();
    let mut status = EX_OK;
    for mailbox in &options.mailboxes {
        match archive_mailbox(mailbox, &config, now) {
            Ok(outcome) => info!("{}", outcome),
            Err(e) => {
                error!("{}: {}", mailbox.display(), e);
                status = Sysexit::from(&e);
            }
        }
    }

    status.exit()
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, clap::Error> {
        Options::from_iter_safe(
            std::iter::once("archivemail").chain(args.iter().copied()),
        )
    }

    #[test]
    fn defaults() {
        let options = parse(&["inbox"]).unwrap();
        assert_eq!(vec![PathBuf::from("inbox")], options.mailboxes);

        let config = options.configure().unwrap();
        assert_eq!(None, config.days_old_max);
        assert_eq!(None, config.date_old_max);
        assert_eq!("_archive", config.archive_suffix);
        assert!(!config.dry_run);
        assert!(!config.no_compress);
        assert!(!config.quiet);
    }

    #[test]
    fn flags_set_options() {
        let config = parse(&[
            "-d",
            "30",
            "-n",
            "-u",
            "--include-flagged",
            "--no-compress",
            "-p",
            "%Y-",
            "-s",
            "_%m",
            "-a",
            "old",
            "-o",
            "/srv/archive",
            "-S",
            "1000",
            "-v",
            "inbox",
            "outbox",
        ])
        .unwrap()
        .configure()
        .unwrap();

        assert_eq!(Some(30), config.days_old_max);
        assert!(config.dry_run);
        assert!(config.preserve_unread);
        assert!(config.include_flagged);
        assert!(config.no_compress);
        assert!(config.verbose);
        assert!(!config.archive_all);
        assert_eq!(Some("%Y-".to_owned()), config.archive_prefix);
        assert_eq!("_%m", config.archive_suffix);
        assert_eq!(Some("old".to_owned()), config.archive_name);
        assert_eq!(Some(PathBuf::from("/srv/archive")), config.output_dir);
        assert_eq!(Some(1000), config.min_size);
    }

    #[test]
    fn cutoff_date() {
        let config = parse(&["-D", "29 Jul 2000", "inbox"])
            .unwrap()
            .configure()
            .unwrap();
        assert_eq!(
            Some(NaiveDate::from_ymd_opt(2000, 7, 29).unwrap()),
            config.date_old_max
        );
    }

    #[test]
    fn usage_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["-d", "soon", "inbox"]).is_err());
        assert!(parse(&["-D", "yesterday", "inbox"]).is_err());
        assert!(parse(&["-d", "30", "-D", "2000-07-29", "inbox"]).is_err());
        assert!(parse(&["--delete", "--copy", "inbox"]).is_err());
        assert!(parse(&["-q", "-v", "inbox"]).is_err());
        assert!(parse(&["-s", "_%J", "inbox"])
            .unwrap()
            .configure()
            .is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let root = tempfile::TempDir::new().unwrap();
        let path = root.path().join("archivemail.toml");
        fs::write(
            &path,
            "days_old_max = 30\n\
             no_compress = true\n\
             copy_old_mail = true\n",
        )
        .unwrap();
        let path = path.to_str().unwrap();

        let config = parse(&["-c", path, "inbox"])
            .unwrap()
            .configure()
            .unwrap();
        assert_eq!(Some(30), config.days_old_max);
        assert!(config.no_compress);
        assert!(config.copy_old_mail);

        let config = parse(&["-c", path, "-D", "2000-07-29", "--delete", "x"])
            .unwrap()
            .configure()
            .unwrap();
        assert_eq!(None, config.days_old_max);
        assert!(config.date_old_max.is_some());
        assert!(config.delete_old_mail);
        assert!(!config.copy_old_mail);
        assert!(config.no_compress);
    }

    #[test]
    fn bad_config_files() {
        let root = tempfile::TempDir::new().unwrap();
        let path = root.path().join("archivemail.toml");
        let path_str = path.to_str().unwrap();

        assert!(parse(&["-c", path_str, "inbox"])
            .unwrap()
            .configure()
            .is_err());

        fs::write(&path, "days_old_max = \"many\"\n").unwrap();
        assert!(parse(&["-c", path_str, "inbox"])
            .unwrap()
            .configure()
            .is_err());

        fs::write(&path, "quiet = true\nverbose = true\n").unwrap();
        assert!(parse(&["-c", path_str, "inbox"])
            .unwrap()
            .configure()
            .is_err());
    }
}
