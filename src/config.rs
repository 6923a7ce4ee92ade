use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command, value_parser};

pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub data_file: PathBuf,
}

impl Config {
    pub fn new(data_file: impl Into<PathBuf>) -> Self {
        Config {
            bind_addr: "127.0.0.1".to_string(),
            port: 5432,
            data_file: data_file.into(),
        }
    }

    fn command() -> Command {
        Command::new("pagedb")
            .about("Single-file paged relational database speaking the PostgreSQL wire protocol")
            .arg(
                Arg::new("data-file")
                    .value_name("FILE")
                    .default_value("pagedb.db")
                    .value_parser(value_parser!(PathBuf))
                    .help("Database file, created if missing"),
            )
            .arg(
                Arg::new("bind")
                    .long("bind")
                    .value_name("ADDR")
                    .default_value("127.0.0.1")
                    .help("Address to listen on"),
            )
            .arg(
                Arg::new("port")
                    .long("port")
                    .short('p')
                    .value_name("PORT")
                    .default_value("5432")
                    .value_parser(value_parser!(u16))
                    .help("Port to listen on"),
            )
    }

    /// Parse the process arguments, exiting with usage on error
    pub fn from_args() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    pub fn try_from_iter<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        Ok(Self::from_matches(&matches))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        let defaults = Config::new("pagedb.db");
        Config {
            bind_addr: matches
                .get_one::<String>("bind")
                .cloned()
                .unwrap_or(defaults.bind_addr),
            port: matches.get_one::<u16>("port").copied().unwrap_or(defaults.port),
            data_file: matches
                .get_one::<PathBuf>("data-file")
                .cloned()
                .unwrap_or(defaults.data_file),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
