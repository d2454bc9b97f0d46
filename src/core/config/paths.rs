use std::path::PathBuf;

use super::validation::{optional_string, string_or};

/// Filesystem locations the service reads from and writes to.
///
/// Relative paths resolve against the working directory, matching how the
/// service is deployed next to its `documents.txt` and `system.txt`.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub documents: PathBuf,
    pub system_prompt: PathBuf,
    pub index_cache: PathBuf,
    pub history_file: PathBuf,
    pub history_db: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl AppPaths {
    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        AppPaths {
            documents: PathBuf::from(string_or(lookup("DOCUMENTS_PATH"), "documents.txt")),
            system_prompt: PathBuf::from(string_or(lookup("SYSTEM_PROMPT_PATH"), "system.txt")),
            index_cache: PathBuf::from(string_or(
                lookup("INDEX_CACHE_PATH"),
                "corpus_index.json",
            )),
            history_file: PathBuf::from(string_or(
                lookup("HISTORY_FILE"),
                "saved_messages.jsonl",
            )),
            history_db: optional_string(lookup("HISTORY_DB_PATH")).map(PathBuf::from),
            log_file: optional_string(lookup("LOG_FILE")).map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_layout() {
        let paths = AppPaths::from_lookup(&|_: &str| None);
        assert_eq!(paths.documents, PathBuf::from("documents.txt"));
        assert_eq!(paths.system_prompt, PathBuf::from("system.txt"));
        assert_eq!(paths.history_file, PathBuf::from("saved_messages.jsonl"));
        assert!(paths.history_db.is_none());
        assert!(paths.log_file.is_none());
    }

    #[test]
    fn overrides_are_respected() {
        let paths = AppPaths::from_lookup(&|key: &str| match key {
            "LOG_FILE" => Some("/var/log/giacomino.log".to_string()),
            "HISTORY_DB_PATH" => Some("history.db".to_string()),
            _ => None,
        });
        assert_eq!(paths.log_file, Some(PathBuf::from("/var/log/giacomino.log")));
        assert_eq!(paths.history_db, Some(PathBuf::from("history.db")));
    }
}
