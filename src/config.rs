//! Command line, environment and config file settings.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use serde::Deserialize;

use crate::error::Error;
use crate::files::Selection;
use crate::report::RenderOptions;

const DEFAULT_EXTRACT_DIR: &str = "./extracted";

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Summarize ARP, DHCP, DNS and HTTP activity in a capture file, extract transferred files and map who talked to whom.")]
pub struct Args {
    /// Capture file to analyze
    #[arg(short, long, env = "WIREBRIEF_FILE")]
    pub file: Option<PathBuf>,

    /// Show every line of every block
    #[arg(long)]
    pub full_output: bool,

    /// Print blocks even if they have no content
    #[arg(long)]
    pub print_empty_blocks: bool,

    /// Extract every file found in the capture
    #[arg(long)]
    pub extract_all: bool,

    /// Extract the files with these identifiers
    #[arg(long, value_delimiter = ',')]
    pub extract_these: Vec<String>,

    /// Directory extracted files are written to [default: ./extracted]
    #[arg(long, env = "WIREBRIEF_EXTRACT_TO")]
    pub extract_to: Option<PathBuf>,

    /// Write the communication graph to this .dot file
    #[arg(long, env = "WIREBRIEF_CREATE_GRAPH")]
    pub create_graph: Option<PathBuf>,

    /// JSON file with defaults for the options above
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Disable colored headlines
    #[arg(long)]
    pub no_color: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Same keys as the command line, all optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ConfigFile {
    pub file: Option<PathBuf>,
    pub full_output: Option<bool>,
    pub print_empty_blocks: Option<bool>,
    pub extract_all: Option<bool>,
    pub extract_these: Option<Vec<String>>,
    pub extract_to: Option<PathBuf>,
    pub create_graph: Option<PathBuf>,
    pub no_color: Option<bool>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub input: PathBuf,
    pub full_output: bool,
    pub print_empty_blocks: bool,
    pub extract_all: bool,
    pub extract_these: Vec<String>,
    pub extract_to: PathBuf,
    pub create_graph: Option<PathBuf>,
    pub color: bool,
}

impl Settings {
    /// Merges the command line with the config file it names, if any.
    pub fn resolve(args: Args) -> Result<Self, Error> {
        let file = match &args.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        Settings::merge(args, file)
    }

    /// Command line values win; toggles are on if either side enables them.
    pub fn merge(args: Args, file: ConfigFile) -> Result<Self, Error> {
        let input = args.file.or(file.file).ok_or(Error::MissingInput)?;

        let extract_these = if args.extract_these.is_empty() {
            file.extract_these.unwrap_or_default()
        } else {
            args.extract_these
        };

        Ok(Settings {
            input,
            full_output: args.full_output || file.full_output.unwrap_or(false),
            print_empty_blocks: args.print_empty_blocks || file.print_empty_blocks.unwrap_or(false),
            extract_all: args.extract_all || file.extract_all.unwrap_or(false),
            extract_these: extract_these
                .into_iter()
                .map(|id| id.trim().to_ascii_lowercase())
                .filter(|id| !id.is_empty())
                .collect(),
            extract_to: args
                .extract_to
                .or(file.extract_to)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXTRACT_DIR)),
            create_graph: args.create_graph.or(file.create_graph),
            color: !(args.no_color || file.no_color.unwrap_or(false)),
        })
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            full_output: self.full_output,
            print_empty_blocks: self.print_empty_blocks,
            color: self.color,
            ..RenderOptions::default()
        }
    }

    pub fn selection(&self) -> Selection {
        if self.extract_all {
            Selection::All
        } else if !self.extract_these.is_empty() {
            Selection::Ids(self.extract_these.clone())
        } else {
            Selection::Nothing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["wirebrief"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_cli_flags() {
        let settings = Settings::merge(
            args(&["-f", "dump.pcap", "--extract-these", "ABC123, def456", "--no-color"]),
            ConfigFile::default(),
        )
        .unwrap();

        assert_eq!(settings.input, PathBuf::from("dump.pcap"));
        assert_eq!(settings.extract_to, PathBuf::from("./extracted"));
        assert!(!settings.color);
        assert_eq!(
            settings.selection(),
            Selection::Ids(vec!["abc123".to_string(), "def456".to_string()])
        );
    }

    #[test]
    fn test_missing_input() {
        let result = Settings::merge(Args::default(), ConfigFile::default());
        assert!(matches!(result, Err(Error::MissingInput)));
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: ConfigFile = serde_json::from_str(
            r#"{"file": "from-file.pcap", "extract-to": "/tmp/out", "full-output": true, "extract-all": false}"#,
        )
        .unwrap();
        let cli = Args {
            file: Some(PathBuf::from("cli.pcap")),
            extract_all: true,
            ..Args::default()
        };

        let settings = Settings::merge(cli, file).unwrap();
        assert_eq!(settings.input, PathBuf::from("cli.pcap"));
        assert_eq!(settings.extract_to, PathBuf::from("/tmp/out"));
        assert!(settings.full_output);
        assert_eq!(settings.selection(), Selection::All);
        assert!(settings.render_options().full_output);
    }

    #[test]
    fn test_config_file_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wirebrief.json");
        fs::write(&path, r#"{"interface": "eth0"}"#).unwrap();
        assert!(matches!(ConfigFile::load(&path), Err(Error::Config { .. })));
    }

    #[test]
    fn test_resolve_reads_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wirebrief.json");
        fs::write(&path, r#"{"file": "a.pcap", "create-graph": "g.dot"}"#).unwrap();

        let settings = Settings::resolve(Args {
            config: Some(path),
            ..Args::default()
        })
        .unwrap();
        assert_eq!(settings.input, PathBuf::from("a.pcap"));
        assert_eq!(settings.create_graph, Some(PathBuf::from("g.dot")));
        assert_eq!(settings.selection(), Selection::Nothing);
    }
}
