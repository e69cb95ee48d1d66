//! Resolution of the mutually exclusive run mode flags.

use std::path::{Path, PathBuf};

use crate::error::DumpError;

/// What the run does with each readable bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Ask before downloading each bucket.
    Interactive,
    /// Download every readable bucket without asking.
    DownloadAll,
    /// Enumerate and record key names, never download.
    NamesOnly,
    /// Download only the keys listed in the given names file.
    DownloadNames(PathBuf),
}

impl Mode {
    /// Build the mode from the raw flags. At most one may be set.
    pub fn resolve(
        dl_all: bool,
        names_only: bool,
        dl_names: Option<PathBuf>,
    ) -> Result<Self, DumpError> {
        match (dl_all, names_only, dl_names) {
            (false, false, None) => Ok(Self::Interactive),
            (true, false, None) => Ok(Self::DownloadAll),
            (false, true, None) => Ok(Self::NamesOnly),
            (false, false, Some(path)) => Ok(Self::DownloadNames(path)),
            _ => Err(DumpError::InvalidArgumentCombination),
        }
    }

    pub fn prompts(&self) -> bool {
        matches!(self, Self::Interactive)
    }

    /// Whether file contents are fetched at all.
    pub fn downloads(&self) -> bool {
        !matches!(self, Self::NamesOnly)
    }

    /// Whether keys are discovered by listing rather than read from a file.
    pub fn enumerates(&self) -> bool {
        !matches!(self, Self::DownloadNames(_))
    }

    pub fn names_file(&self) -> Option<&Path> {
        match self {
            Self::DownloadNames(path) => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_is_interactive() {
        let mode = Mode::resolve(false, false, None).unwrap();
        assert_eq!(mode, Mode::Interactive);
        assert!(mode.prompts());
        assert!(mode.downloads());
        assert!(mode.enumerates());
    }

    #[test]
    fn single_flags_resolve() {
        assert_eq!(Mode::resolve(true, false, None).unwrap(), Mode::DownloadAll);

        let names_only = Mode::resolve(false, true, None).unwrap();
        assert!(!names_only.downloads());
        assert!(names_only.enumerates());

        let dl_names = Mode::resolve(false, false, Some("names.txt".into())).unwrap();
        assert!(!dl_names.enumerates());
        assert!(!dl_names.prompts());
        assert_eq!(dl_names.names_file(), Some(Path::new("names.txt")));
    }

    #[test]
    fn combined_flags_are_rejected() {
        let combos = [
            (true, true, None),
            (true, false, Some(PathBuf::from("n.txt"))),
            (false, true, Some(PathBuf::from("n.txt"))),
            (true, true, Some(PathBuf::from("n.txt"))),
        ];
        for (dl_all, names_only, dl_names) in combos {
            assert!(matches!(
                Mode::resolve(dl_all, names_only, dl_names),
                Err(DumpError::InvalidArgumentCombination)
            ));
        }
    }
}
