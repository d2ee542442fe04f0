use clap::Parser;

/// Minimal command-line entry point: at most one argument, a `.torrent`
/// file path or a `magnet:` URI to add once the controller has finished
/// initializing.
#[derive(Parser, Debug)]
#[command(name = "seedcore", about = "BitTorrent session core")]
pub struct Cli {
    /// A `.torrent` file path or `magnet:` URI to add on startup.
    pub target: Option<String>,

    /// Data directory holding `settings.db`, `resume.db`, and
    /// `rss_history.db`. Defaults to `$HOME/.seedcore`.
    #[arg(long, env = "SEEDCORE_DATA_DIR")]
    pub data_dir: Option<std::path::PathBuf>,
}

/// What the single optional positional argument resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupTarget {
    /// A local `.torrent` metainfo file.
    TorrentFile(std::path::PathBuf),
    /// A `magnet:` URI.
    Magnet(String),
}

impl Cli {
    /// Classify the positional `target` argument, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is present but neither ends with
    /// `.torrent` nor begins `magnet:`.
    pub fn startup_target(&self) -> Result<Option<StartupTarget>, String> {
        let Some(target) = &self.target else { return Ok(None) };

        if target.starts_with("magnet:") {
            Ok(Some(StartupTarget::Magnet(target.clone())))
        } else if target.ends_with(".torrent") {
            Ok(Some(StartupTarget::TorrentFile(std::path::PathBuf::from(target))))
        } else {
            Err(format!("'{target}' is neither a magnet: URI nor a .torrent file path"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnet_argument_is_classified() {
        let cli = Cli { target: Some("magnet:?xt=urn:btih:abc".to_string()), data_dir: None };
        assert_eq!(cli.startup_target().unwrap(), Some(StartupTarget::Magnet("magnet:?xt=urn:btih:abc".to_string())));
    }

    #[test]
    fn torrent_file_argument_is_classified() {
        let cli = Cli { target: Some("ubuntu.torrent".to_string()), data_dir: None };
        assert_eq!(
            cli.startup_target().unwrap(),
            Some(StartupTarget::TorrentFile(std::path::PathBuf::from("ubuntu.torrent")))
        );
    }

    #[test]
    fn absent_argument_is_none() {
        let cli = Cli { target: None, data_dir: None };
        assert_eq!(cli.startup_target().unwrap(), None);
    }

    #[test]
    fn unrecognized_argument_is_rejected() {
        let cli = Cli { target: Some("not-a-target".to_string()), data_dir: None };
        assert!(cli.startup_target().is_err());
    }
}
